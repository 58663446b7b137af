use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use log::{debug, warn};
use tokio::task::block_in_place;

use crate::assets::{Asset, AssetSource};
use crate::config::FusionOptions;
use crate::db::{self, Database, FeatureRecord, FeatureType};
use crate::encoding;
use crate::fusion;
use crate::hnsw::parse_media_key;
use crate::index::IndexManager;
use crate::providers::Providers;

/// 人脸重排阶段每个查询人脸取回的候选倍数
const FACE_CANDIDATE_FACTOR: usize = 5;

/// 一条搜索结果
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub media_key: String,
    pub score: f32,
    /// 资产目录里的元数据，资产已不存在时为 None
    pub asset: Option<Asset>,
}

/// 查询入口
///
/// 文本搜索走文图共享空间；以图搜图走图像相似空间，并在库里有
/// 人脸特征时叠加人脸身份重排。查询向量的编码失败不会让搜索报错，
/// 只会退回空结果或基础排序。
pub struct Searcher {
    db: Database,
    assets: Arc<dyn AssetSource>,
    providers: Arc<Providers>,
    index: Arc<IndexManager>,
    fusion: FusionOptions,
}

impl Searcher {
    pub fn new(
        db: Database,
        assets: Arc<dyn AssetSource>,
        providers: Arc<Providers>,
        index: Arc<IndexManager>,
        fusion: FusionOptions,
    ) -> Self {
        Self { db, assets, providers, index, fusion }
    }

    /// 以文搜图
    pub async fn search_text(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let translated = self.providers.translate_lossy(query);
        let mut embedding =
            match block_in_place(|| self.providers.text_embedding(&translated)) {
                Ok(v) => v,
                Err(e) => {
                    warn!("查询文本编码失败: {e}");
                    return Ok(vec![]);
                }
            };
        encoding::l2_normalize(&mut embedding);

        let hits = self.index.search(FeatureType::Clip, &embedding, top_k).await?;
        Ok(self.to_hits(collapse_max(hits, top_k)))
    }

    /// 以图搜图，库内有目标图的人脸特征时做身份重排
    pub async fn search_similar(&self, key: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let Some(query) = self.query_vector(key).await? else {
            return Ok(vec![]);
        };

        // 多取一个以便剔除查询图本身
        let raw = self.index.search(FeatureType::Image, &query, top_k + 1).await?;
        let base: Vec<(String, f32)> = collapse_max(raw, top_k + 1)
            .into_iter()
            .filter(|(k, _)| k != key)
            .take(top_k)
            .collect();

        let face_sims = self.face_similarities(key, top_k).await?;
        if face_sims.is_empty() {
            return Ok(self.to_hits(base));
        }
        Ok(self.to_hits(fusion::fuse(&base, &face_sims, &self.fusion, top_k)))
    }

    /// 查询图的相似空间向量，优先用库里缓存的，缺失时现算并回填
    async fn query_vector(&self, key: &str) -> Result<Option<Vec<f32>>> {
        if let Some(blob) = db::crud::vector_for(&self.db, key, FeatureType::Image).await? {
            return Ok(Some(encoding::bytes_to_floats(&blob)));
        }

        let mut vector =
            match block_in_place(|| self.providers.image_embedding(Path::new(key))) {
                Ok(v) => v,
                Err(e) => {
                    warn!("查询图 {key} 编码失败: {e}");
                    return Ok(None);
                }
            };
        encoding::l2_normalize(&mut vector);

        let record = FeatureRecord {
            media_key: key.to_string(),
            feat_type: FeatureType::Image.code(),
            sub_index: 0,
            vector: encoding::floats_to_bytes(&vector),
            updated_at: db::unix_ts(),
        };
        if let Err(e) = db::crud::upsert_feature(&self.db, &record).await {
            warn!("查询图 {key} 的向量回填失败: {e}");
        }
        Ok(Some(vector))
    }

    /// 计算每个候选与查询图人脸的最大相似度
    ///
    /// 查询图没有人脸、或人脸索引为空时返回空表，上层退回基础排序。
    /// 库里没有查询图的人脸特征时现算并回填，编码失败同样退回基础排序。
    async fn face_similarities(
        &self,
        key: &str,
        top_k: usize,
    ) -> Result<HashMap<String, f32>> {
        let stored = db::crud::vectors_for(&self.db, key, FeatureType::Face).await?;
        let mut query_faces: Vec<Vec<f32>> = stored
            .iter()
            .filter_map(|f| encoding::decode_checked(&f.vector, f.vector.len() / 4))
            .collect();
        if query_faces.is_empty() {
            query_faces = self.query_faces_live(key).await?;
        }

        let mut sims: HashMap<String, f32> = HashMap::new();
        for vector in &query_faces {
            let hits = self
                .index
                .search(FeatureType::Face, vector, top_k * FACE_CANDIDATE_FACTOR)
                .await?;
            for (id, score) in hits {
                let candidate = parse_media_key(&id);
                if candidate == key {
                    continue;
                }
                let entry = sims.entry(candidate.to_string()).or_insert(f32::MIN);
                *entry = entry.max(score);
            }
        }
        debug!("{} 个候选带人脸信号", sims.len());
        Ok(sims)
    }

    /// 现算查询图的人脸向量并回填特征库，与 query_vector 同一套缓存策略
    async fn query_faces_live(&self, key: &str) -> Result<Vec<Vec<f32>>> {
        if !self.providers.has_face() {
            return Ok(vec![]);
        }
        let faces = match block_in_place(|| self.providers.face_embeddings(Path::new(key))) {
            Ok(faces) => faces,
            Err(e) => {
                warn!("查询图 {key} 的人脸编码失败: {e}");
                return Ok(vec![]);
            }
        };

        let now = db::unix_ts();
        let mut out = Vec::with_capacity(faces.len());
        for (sub_index, mut vector) in faces.into_iter().enumerate() {
            encoding::l2_normalize(&mut vector);
            let record = FeatureRecord {
                media_key: key.to_string(),
                feat_type: FeatureType::Face.code(),
                sub_index: sub_index as i64,
                vector: encoding::floats_to_bytes(&vector),
                updated_at: now,
            };
            if let Err(e) = db::crud::upsert_feature(&self.db, &record).await {
                warn!("查询图 {key} 的人脸回填失败: {e}");
            }
            out.push(vector);
        }
        Ok(out)
    }

    fn to_hits(&self, results: Vec<(String, f32)>) -> Vec<SearchHit> {
        results
            .into_iter()
            .map(|(media_key, score)| {
                let asset = self.assets.find_by_key(&media_key).unwrap_or(None);
                SearchHit { media_key, score, asset }
            })
            .collect()
    }
}

/// 把索引条目 id 折叠到 media_key，同一资产取最大分
fn collapse_max(hits: Vec<(String, f32)>, top_k: usize) -> Vec<(String, f32)> {
    let mut best: HashMap<String, f32> = HashMap::new();
    for (id, score) in hits {
        let key = parse_media_key(&id).to_string();
        let entry = best.entry(key).or_insert(f32::MIN);
        *entry = entry.max(score);
    }
    let mut out: Vec<(String, f32)> = best.into_iter().collect();
    out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
    out.truncate(top_k);
    out
}
