use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use log::{debug, info, warn};
use tokio::task::block_in_place;

use crate::assets::{Asset, AssetSource};
use crate::classify::Classifier;
use crate::config::PipelineOptions;
use crate::db::{self, Database, FeatureRecord, FeatureType};
use crate::encoding;
use crate::index::IndexManager;
use crate::jobs::CancelToken;
use crate::providers::{ProviderError, Providers};

/// 上次同步水位线在 meta 表里的键
const LAST_SYNC_KEY: &str = "last_sync_ts";

/// 一次流水线运行的统计
#[derive(Debug, Default, Clone, Copy)]
pub struct RunStats {
    /// 本次访问过的资产数
    pub scanned: usize,
    /// 新写入的特征记录数
    pub encoded: usize,
    /// 已有特征、直接跳过的 (资产, 类型) 组合数
    pub skipped: usize,
    /// 单条推理失败数
    pub failed: usize,
    /// 写入分类结果的资产数
    pub classified: usize,
    /// 删除级联清掉的资产数
    pub removed: usize,
}

/// 嵌入流水线
///
/// 负责把资产目录里的媒体变成特征库里的向量：逐资产、逐特征类型地
/// 补齐缺失嵌入，批次结束后重建被触碰的索引，再对新向量跑一遍分类。
///
/// 错误分两档：`Unavailable` 代表推理后端整体不可用，立即终止批次，
/// 已写入的记录保留，下次运行自然续上；`Inference` 只记数跳过。
pub struct Pipeline {
    db: Database,
    assets: Arc<dyn AssetSource>,
    providers: Arc<Providers>,
    index: Arc<IndexManager>,
    classifier: Option<Arc<Classifier>>,
    opts: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        db: Database,
        assets: Arc<dyn AssetSource>,
        providers: Arc<Providers>,
        index: Arc<IndexManager>,
        opts: PipelineOptions,
    ) -> Self {
        Self { db, assets, providers, index, classifier: None, opts }
    }

    pub fn with_classifier(mut self, classifier: Arc<Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// 处理最近修改的若干资产，前台轻量任务用
    pub async fn run_recent(
        &self,
        limit: Option<usize>,
        force: bool,
        cancel: &CancelToken,
    ) -> Result<RunStats> {
        let limit = limit.unwrap_or(self.opts.recent_limit);
        let assets = self.assets.query_latest(limit)?;
        self.run_batch(&assets, force, cancel).await
    }

    /// 分页遍历整个资产目录
    pub async fn run_full(&self, force: bool, cancel: &CancelToken) -> Result<RunStats> {
        let mut stats = RunStats::default();
        let mut offset = 0usize;

        loop {
            if cancel.is_cancelled() {
                info!("全量扫描被取消，已处理 {} 个资产", stats.scanned);
                break;
            }
            let page = self.assets.query_paged(self.opts.page_size, offset)?;
            if page.is_empty() {
                break;
            }
            offset += page.len();
            stats.merge(self.run_batch(&page, force, cancel).await?);
        }

        Ok(stats)
    }

    /// 基于水位线的增量同步
    ///
    /// 首次运行退化为全量扫描。水位线在批次成功后才推进，
    /// 中途失败下次会重扫同一窗口，幂等写入保证安全。
    pub async fn run_incremental(&self, cancel: &CancelToken) -> Result<RunStats> {
        let now = db::unix_ts();

        let mut stats = match db::crud::meta_get(&self.db, LAST_SYNC_KEY).await? {
            None => {
                info!("无同步水位线，执行首次全量扫描");
                self.run_full(false, cancel).await?
            }
            Some(ts) => {
                let ts: i64 = ts.parse().unwrap_or(0);
                let assets = self.assets.query_modified_after(ts)?;
                debug!("水位线 {ts} 之后有 {} 个资产变动", assets.len());
                self.run_batch(&assets, false, cancel).await?
            }
        };

        if !cancel.is_cancelled() {
            stats.removed = self.sync_deleted().await?;
            db::crud::meta_set(&self.db, LAST_SYNC_KEY, &now.to_string()).await?;
        }
        Ok(stats)
    }

    /// 清掉资产目录里已不存在的资产的全部派生数据
    pub async fn sync_deleted(&self) -> Result<usize> {
        let mut removed = 0usize;
        for key in db::crud::all_media_keys(&self.db).await? {
            if self.assets.find_by_key(&key)?.is_none() {
                db::crud::delete_by_key(&self.db, &key).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!("删除级联清理了 {removed} 个资产的数据");
            for ty in FeatureType::ALL {
                self.index.rebuild(ty).await?;
            }
        }
        Ok(removed)
    }

    /// 编码一批资产并在结束后重建被触碰的索引、补跑分类
    async fn run_batch(
        &self,
        assets: &[Asset],
        force: bool,
        cancel: &CancelToken,
    ) -> Result<RunStats> {
        let mut stats = RunStats::default();
        let mut touched: HashSet<FeatureType> = HashSet::new();
        let mut encoded_keys: Vec<String> = Vec::new();

        for asset in assets {
            if cancel.is_cancelled() {
                break;
            }
            stats.scanned += 1;
            let wrote = self.encode_asset(asset, force, cancel, &mut stats, &mut touched).await?;
            if wrote {
                encoded_keys.push(asset.media_key.clone());
            }
        }

        for ty in &touched {
            let count = self.index.rebuild(*ty).await?;
            info!("{} 索引重建完成，共 {count} 条", ty.index_name());
        }

        if !encoded_keys.is_empty() {
            stats.classified = self.classify_keys(&encoded_keys, cancel).await?;
        }

        Ok(stats)
    }

    /// 为单个资产补齐全部特征类型
    ///
    /// 返回是否写入了 Clip 向量（分类阶段只关心这些资产）。
    async fn encode_asset(
        &self,
        asset: &Asset,
        force: bool,
        cancel: &CancelToken,
        stats: &mut RunStats,
        touched: &mut HashSet<FeatureType>,
    ) -> Result<bool> {
        // media_key 即文件路径，见 FsAssetSource
        let path = Path::new(&asset.media_key);
        let mut wrote_clip = false;

        for ty in FeatureType::ALL {
            // 推理一次可能耗时数秒，特征之间也要响应取消
            if cancel.is_cancelled() {
                break;
            }
            if ty == FeatureType::Face && !self.providers.has_face() {
                continue;
            }
            if !force && db::crud::feature_exists(&self.db, &asset.media_key, ty).await? {
                stats.skipped += 1;
                continue;
            }
            // 强制重算先删旧行，人脸数量变化时不会留下残行
            db::crud::delete_by_key_and_type(&self.db, &asset.media_key, ty).await?;

            let result = block_in_place(|| match ty {
                FeatureType::Clip => self.providers.clip_embedding(path).map(|v| vec![v]),
                FeatureType::Image => self.providers.image_embedding(path).map(|v| vec![v]),
                FeatureType::Face => self.providers.face_embeddings(path),
            });
            let vectors = match result {
                Ok(vectors) => vectors,
                Err(ProviderError::Inference(e)) => {
                    warn!("{} 的 {} 推理失败: {e}", asset.media_key, ty.index_name());
                    stats.failed += 1;
                    continue;
                }
                Err(e @ ProviderError::Unavailable(_)) => return Err(e.into()),
            };

            let now = db::unix_ts();
            for (sub_index, mut vector) in vectors.into_iter().enumerate() {
                encoding::l2_normalize(&mut vector);
                let record = FeatureRecord {
                    media_key: asset.media_key.clone(),
                    feat_type: ty.code(),
                    sub_index: sub_index as i64,
                    vector: encoding::floats_to_bytes(&vector),
                    updated_at: now,
                };
                if let Err(e) = db::crud::upsert_feature(&self.db, &record).await {
                    warn!("{} 的特征写入失败: {e}", asset.media_key);
                    continue;
                }
                stats.encoded += 1;
                touched.insert(ty);
                if ty == FeatureType::Clip {
                    wrote_clip = true;
                }
            }
        }

        Ok(wrote_clip)
    }

    /// 对指定资产重跑零样本分类，旧结果整体替换
    async fn classify_keys(&self, keys: &[String], cancel: &CancelToken) -> Result<usize> {
        let Some(classifier) = &self.classifier else {
            return Ok(0);
        };
        if classifier.is_empty() {
            return Ok(0);
        }

        let mut classified = 0usize;
        for key in keys {
            if cancel.is_cancelled() {
                break;
            }
            let Some(blob) = db::crud::vector_for(&self.db, key, FeatureType::Clip).await? else {
                continue;
            };
            let vector = encoding::bytes_to_floats(&blob);

            db::crud::delete_categories_by_key(&self.db, key).await?;
            if let Some((label, score)) = classifier.classify(&vector) {
                let record = crate::db::CategoryRecord {
                    media_key: key.clone(),
                    label: label.to_string(),
                    score: score as f64,
                    updated_at: db::unix_ts(),
                };
                db::crud::upsert_categories(&self.db, std::slice::from_ref(&record)).await?;
                classified += 1;
            }
        }
        Ok(classified)
    }
}

impl RunStats {
    fn merge(&mut self, other: RunStats) {
        self.scanned += other.scanned;
        self.encoded += other.encoded;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.classified += other.classified;
        self.removed += other.removed;
    }
}
