//! fastembed 后端的默认嵌入实现
//!
//! CLIP ViT-B/32 的文本塔和图像塔提供文图共享空间，Unicom ViT-B/32 提供
//! 以图搜图的相似空间。人脸模型不在内置范围，按需通过
//! [`crate::providers::FaceEncoder`] 接入外部实现。

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fastembed::{
    EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, InitOptions,
    TextEmbedding,
};
use log::info;

use crate::providers::{ImageEncoder, ProviderError, ProviderResult, TextEncoder};

/// CLIP 文本塔
pub struct ClipTextProvider {
    // fastembed 的 embed 需要 &mut self
    model: Mutex<TextEmbedding>,
}

impl ClipTextProvider {
    /// 打开文本编码器，模型首次使用时下载到 `cache_dir`
    pub fn open(cache_dir: &Path) -> ProviderResult<Self> {
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::ClipVitB32)
                .with_cache_dir(models_dir(cache_dir)?)
                .with_show_download_progress(true),
        )
        .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        info!("CLIP 文本编码器就绪");
        Ok(Self { model: Mutex::new(model) })
    }
}

impl TextEncoder for ClipTextProvider {
    fn encode_text(&self, text: &str) -> ProviderResult<Vec<f32>> {
        let mut model =
            self.model.lock().map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        let mut embeddings = model
            .embed(vec![text.to_string()], None)
            .map_err(|e| ProviderError::Inference(e.to_string()))?;
        embeddings
            .pop()
            .ok_or_else(|| ProviderError::Inference("编码器未返回向量".to_string()))
    }
}

/// fastembed 图像塔的通用封装
struct VisionProvider {
    model: Mutex<ImageEmbedding>,
}

impl VisionProvider {
    fn open(which: ImageEmbeddingModel, cache_dir: &Path) -> ProviderResult<Self> {
        let model = ImageEmbedding::try_new(
            ImageInitOptions::new(which).with_cache_dir(models_dir(cache_dir)?),
        )
        .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        Ok(Self { model: Mutex::new(model) })
    }

    fn encode(&self, path: &Path) -> ProviderResult<Vec<f32>> {
        let mut model =
            self.model.lock().map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        let mut embeddings = model
            .embed(vec![path.to_string_lossy().into_owned()], None)
            .map_err(|e| ProviderError::Inference(e.to_string()))?;
        embeddings
            .pop()
            .ok_or_else(|| ProviderError::Inference("编码器未返回向量".to_string()))
    }
}

/// CLIP 图像塔，与文本塔共享嵌入空间
pub struct ClipImageProvider(VisionProvider);

impl ClipImageProvider {
    pub fn open(cache_dir: &Path) -> ProviderResult<Self> {
        let inner = VisionProvider::open(ImageEmbeddingModel::ClipVitB32, cache_dir)?;
        info!("CLIP 图像编码器就绪");
        Ok(Self(inner))
    }
}

impl ImageEncoder for ClipImageProvider {
    fn encode_image(&self, path: &Path, _accelerated: bool) -> ProviderResult<Vec<f32>> {
        self.0.encode(path)
    }
}

/// Unicom 图像编码器，以图搜图的相似空间
pub struct UnicomImageProvider(VisionProvider);

impl UnicomImageProvider {
    pub fn open(cache_dir: &Path) -> ProviderResult<Self> {
        let inner = VisionProvider::open(ImageEmbeddingModel::UnicomVitB32, cache_dir)?;
        info!("Unicom 图像编码器就绪");
        Ok(Self(inner))
    }
}

impl ImageEncoder for UnicomImageProvider {
    fn encode_image(&self, path: &Path, _accelerated: bool) -> ProviderResult<Vec<f32>> {
        self.0.encode(path)
    }
}

fn models_dir(cache_dir: &Path) -> ProviderResult<PathBuf> {
    std::fs::create_dir_all(cache_dir)
        .map_err(|e| ProviderError::Unavailable(format!("无法创建模型缓存目录: {e}")))?;
    Ok(cache_dir.to_path_buf())
}
