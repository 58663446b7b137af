#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use tempfile::TempDir;

use photosearch::assets::{Asset, AssetSource};
use photosearch::db::{self, Database, FeatureRecord, FeatureType};
use photosearch::encoding;
use photosearch::jobs::CancelToken;
use photosearch::providers::{
    FaceEncoder, ImageEncoder, ProviderError, ProviderResult, TextEncoder,
};

pub async fn test_db(dir: &TempDir) -> Database {
    db::init_db(dir.path().join("test.db")).await.unwrap()
}

pub async fn insert_vector(db: &Database, key: &str, ty: FeatureType, sub: i64, v: &[f32]) {
    let record = FeatureRecord {
        media_key: key.to_string(),
        feat_type: ty.code(),
        sub_index: sub,
        vector: encoding::floats_to_bytes(v),
        updated_at: db::unix_ts(),
    };
    db::crud::upsert_feature(db, &record).await.unwrap();
}

pub fn asset(key: &str, modified_at: i64) -> Asset {
    Asset { media_key: key.to_string(), modified_at, captured_at: None }
}

/// 内存资产目录
pub struct StubAssetSource {
    assets: Mutex<Vec<Asset>>,
}

impl StubAssetSource {
    pub fn new(assets: Vec<Asset>) -> Self {
        Self { assets: Mutex::new(assets) }
    }

    pub fn set(&self, assets: Vec<Asset>) {
        *self.assets.lock().unwrap() = assets;
    }

    fn sorted(&self) -> Vec<Asset> {
        let mut assets = self.assets.lock().unwrap().clone();
        assets.sort_by(|a, b| b.modified_at.cmp(&a.modified_at).then(a.media_key.cmp(&b.media_key)));
        assets
    }
}

impl AssetSource for StubAssetSource {
    fn query_latest(&self, n: usize) -> Result<Vec<Asset>> {
        let mut assets = self.sorted();
        assets.truncate(n);
        Ok(assets)
    }

    fn query_paged(&self, limit: usize, offset: usize) -> Result<Vec<Asset>> {
        Ok(self.sorted().into_iter().skip(offset).take(limit).collect())
    }

    fn query_modified_after(&self, ts: i64) -> Result<Vec<Asset>> {
        Ok(self.sorted().into_iter().filter(|a| a.modified_at > ts).collect())
    }

    fn find_by_key(&self, key: &str) -> Result<Option<Asset>> {
        Ok(self.assets.lock().unwrap().iter().find(|a| a.media_key == key).cloned())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.assets.lock().unwrap().len())
    }
}

/// 按 media_key 查表的图像编码器
///
/// 没有配置向量的 key 视为单条推理失败，加入 unavailable 集合的 key
/// 会报后端不可用。调用次数用于断言跳过逻辑。
pub struct StubImageEncoder {
    vectors: HashMap<String, Vec<f32>>,
    unavailable: HashSet<String>,
    cancel_on_call: Option<CancelToken>,
    pub calls: AtomicUsize,
}

impl StubImageEncoder {
    pub fn new(vectors: &[(&str, &[f32])]) -> Self {
        Self {
            vectors: vectors
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect(),
            unavailable: HashSet::new(),
            cancel_on_call: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_unavailable(mut self, keys: &[&str]) -> Self {
        self.unavailable = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// 模拟在推理进行中收到取消请求
    pub fn with_cancel_on_call(mut self, cancel: CancelToken) -> Self {
        self.cancel_on_call = Some(cancel);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageEncoder for StubImageEncoder {
    fn encode_image(&self, path: &Path, _accelerated: bool) -> ProviderResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(cancel) = &self.cancel_on_call {
            cancel.cancel();
        }
        let key = path.to_string_lossy();
        if self.unavailable.contains(key.as_ref()) {
            return Err(ProviderError::Unavailable("stub backend down".to_string()));
        }
        self.vectors
            .get(key.as_ref())
            .cloned()
            .ok_or_else(|| ProviderError::Inference(format!("no vector for {key}")))
    }
}

/// 按查询文本查表的文本编码器
pub struct StubTextEncoder {
    vectors: HashMap<String, Vec<f32>>,
}

impl StubTextEncoder {
    pub fn new(vectors: &[(&str, &[f32])]) -> Self {
        Self {
            vectors: vectors.iter().map(|(k, v)| (k.to_string(), v.to_vec())).collect(),
        }
    }
}

impl TextEncoder for StubTextEncoder {
    fn encode_text(&self, text: &str) -> ProviderResult<Vec<f32>> {
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| ProviderError::Inference(format!("no vector for {text}")))
    }
}

/// 按 media_key 查表的人脸编码器，没配置的 key 返回零张人脸
pub struct StubFaceEncoder {
    faces: HashMap<String, Vec<Vec<f32>>>,
}

impl StubFaceEncoder {
    pub fn new(faces: &[(&str, &[&[f32]])]) -> Self {
        Self {
            faces: faces
                .iter()
                .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_vec()).collect()))
                .collect(),
        }
    }
}

impl FaceEncoder for StubFaceEncoder {
    fn encode_faces(&self, path: &Path, _accelerated: bool) -> ProviderResult<Vec<Vec<f32>>> {
        Ok(self.faces.get(path.to_string_lossy().as_ref()).cloned().unwrap_or_default())
    }
}

/// 共享句柄，测试在把编码器交给 Providers 之后继续读调用计数
pub struct Shared<T>(pub Arc<T>);

impl<T: ImageEncoder> ImageEncoder for Shared<T> {
    fn encode_image(&self, path: &Path, accelerated: bool) -> ProviderResult<Vec<f32>> {
        self.0.encode_image(path, accelerated)
    }
}

impl<T: TextEncoder> TextEncoder for Shared<T> {
    fn encode_text(&self, text: &str) -> ProviderResult<Vec<f32>> {
        self.0.encode_text(text)
    }
}

impl<T: FaceEncoder> FaceEncoder for Shared<T> {
    fn encode_faces(&self, path: &Path, accelerated: bool) -> ProviderResult<Vec<Vec<f32>>> {
        self.0.encode_faces(path, accelerated)
    }
}
