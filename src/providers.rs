use std::path::Path;

use log::warn;
use thiserror::Error;

use crate::accel::AccelController;

/// 推理侧错误分类
///
/// `Unavailable` 会终止整个批次并交给上层重试；`Inference` 只影响单条，
/// 调用方记录后跳过即可。
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("推理后端未初始化: {0}")]
    Unavailable(String),
    #[error("单条推理失败: {0}")]
    Inference(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// 图像 -> 向量
pub trait ImageEncoder: Send + Sync {
    /// `accelerated` 为健康控制器给出的加速路径提示，实现方可以忽略
    fn encode_image(&self, path: &Path, accelerated: bool) -> ProviderResult<Vec<f32>>;
}

/// 文本 -> 向量
pub trait TextEncoder: Send + Sync {
    fn encode_text(&self, text: &str) -> ProviderResult<Vec<f32>>;
}

/// 图像 -> 零到多个人脸向量
pub trait FaceEncoder: Send + Sync {
    fn encode_faces(&self, path: &Path, accelerated: bool) -> ProviderResult<Vec<Vec<f32>>>;
}

/// 文本 -> 文本，失败时调用方退回原文
pub trait Translator: Send + Sync {
    fn translate(&self, text: &str) -> ProviderResult<String>;
}

/// 原样返回输入的兜底翻译器
pub struct NoopTranslator;

impl Translator for NoopTranslator {
    fn translate(&self, text: &str) -> ProviderResult<String> {
        Ok(text.to_string())
    }
}

/// 嵌入服务集合，统一接入加速路径健康控制
pub struct Providers {
    clip_image: Box<dyn ImageEncoder>,
    clip_text: Box<dyn TextEncoder>,
    image: Box<dyn ImageEncoder>,
    face: Option<Box<dyn FaceEncoder>>,
    translator: Box<dyn Translator>,
    accel: AccelController,
}

impl Providers {
    pub fn new(
        clip_image: Box<dyn ImageEncoder>,
        clip_text: Box<dyn TextEncoder>,
        image: Box<dyn ImageEncoder>,
    ) -> Self {
        Self {
            clip_image,
            clip_text,
            image,
            face: None,
            translator: Box::new(NoopTranslator),
            accel: AccelController::default(),
        }
    }

    pub fn with_face(mut self, face: Box<dyn FaceEncoder>) -> Self {
        self.face = Some(face);
        self
    }

    pub fn with_translator(mut self, translator: Box<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn has_face(&self) -> bool {
        self.face.is_some()
    }

    /// 文图空间的图像嵌入
    pub fn clip_embedding(&self, path: &Path) -> ProviderResult<Vec<f32>> {
        self.guarded("clip-image", |accel| self.clip_image.encode_image(path, accel))
    }

    /// 图像相似空间的嵌入
    pub fn image_embedding(&self, path: &Path) -> ProviderResult<Vec<f32>> {
        self.guarded("image", |accel| self.image.encode_image(path, accel))
    }

    /// 查询文本的嵌入
    pub fn text_embedding(&self, text: &str) -> ProviderResult<Vec<f32>> {
        self.clip_text.encode_text(text)
    }

    /// 人脸嵌入，未配置人脸后端时返回空列表
    pub fn face_embeddings(&self, path: &Path) -> ProviderResult<Vec<Vec<f32>>> {
        match &self.face {
            Some(face) => self.guarded("face", |accel| face.encode_faces(path, accel)),
            None => Ok(vec![]),
        }
    }

    /// 查询文本翻译，任何失败都退回原文
    pub fn translate_lossy(&self, text: &str) -> String {
        match self.translator.translate(text) {
            Ok(out) => out,
            Err(e) => {
                warn!("翻译失败，使用原文: {e}");
                text.to_string()
            }
        }
    }

    /// 带加速路径健康跟踪的调用封装
    fn guarded<T>(
        &self,
        key: &str,
        f: impl FnOnce(bool) -> ProviderResult<T>,
    ) -> ProviderResult<T> {
        let accelerated = self.accel.should_accelerate(key);
        match f(accelerated) {
            Ok(v) => {
                self.accel.record_success(key);
                Ok(v)
            }
            Err(e) => {
                if matches!(e, ProviderError::Inference(_)) {
                    self.accel.record_failure(key);
                }
                Err(e)
            }
        }
    }
}
