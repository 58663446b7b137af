use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::encoding::{dot, l2_normalize};
use crate::providers::TextEncoder;

const DEFAULT_THRESHOLD: f32 = 0.32;

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

/// 单个类目配置，prompt 缺省时直接用类目名做文本
#[derive(Debug, Clone, Deserialize)]
pub struct LabelSpec {
    pub name: String,
    pub prompt: Option<String>,
    pub threshold: Option<f32>,
}

/// labels.json 的根结构
#[derive(Debug, Clone, Deserialize)]
pub struct LabelConfig {
    #[serde(default = "default_threshold")]
    pub default_threshold: f32,
    pub labels: Vec<LabelSpec>,
}

impl LabelConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("无法打开类目配置 {path:?}"))?;
        let config = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("类目配置 {path:?} 格式错误"))?;
        Ok(config)
    }
}

struct LabelEntry {
    name: String,
    embedding: Vec<f32>,
    threshold: f32,
}

/// 零样本分类器，类目 prompt 预先编码为归一化向量。
/// 图片向量与类目向量做点积取最大者，低于该类目阈值则不归类。
pub struct Classifier {
    entries: Vec<LabelEntry>,
}

impl Classifier {
    /// 用文本编码器把全部类目 prompt 编码一遍
    pub fn open(config: &LabelConfig, encoder: &dyn TextEncoder) -> Result<Self> {
        let mut entries = Vec::with_capacity(config.labels.len());
        for label in &config.labels {
            let text = label.prompt.as_deref().unwrap_or(&label.name);
            let mut embedding = encoder
                .encode_text(text)
                .with_context(|| format!("类目 {} 的 prompt 编码失败", label.name))?;
            l2_normalize(&mut embedding);
            entries.push(LabelEntry {
                name: label.name.clone(),
                embedding,
                threshold: label.threshold.unwrap_or(config.default_threshold),
            });
        }
        Ok(Self { entries })
    }

    /// 直接用现成向量构造，向量须已归一化
    pub fn from_embeddings(labels: Vec<(String, Vec<f32>, f32)>) -> Self {
        let entries = labels
            .into_iter()
            .map(|(name, embedding, threshold)| LabelEntry { name, embedding, threshold })
            .collect();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 返回得分最高的类目及分数，忽略维度不匹配的类目
    pub fn best_label(&self, vector: &[f32]) -> Option<(&str, f32)> {
        self.entries
            .iter()
            .filter(|e| e.embedding.len() == vector.len())
            .map(|e| (e.name.as_str(), dot(&e.embedding, vector)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then_with(|| b.0.cmp(a.0)))
    }

    /// 过阈值则返回类目，否则视为无类目
    pub fn classify(&self, vector: &[f32]) -> Option<(&str, f32)> {
        let (name, score) = self.best_label(vector)?;
        (score >= self.threshold_for(name)).then_some((name, score))
    }

    pub fn threshold_for(&self, name: &str) -> f32 {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.threshold)
            .unwrap_or(DEFAULT_THRESHOLD)
    }
}
