use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use log::{debug, info, warn};
use smallvec::SmallVec;
use tokio::task::block_in_place;

use crate::config::IndexOptions;
use crate::db::{Database, FeatureType, crud};
use crate::encoding;
use crate::hnsw::{AnnIndex, FACE_SEP};

/// 索引重建和兜底扫描的分页大小
const SCAN_PAGE: usize = 1000;

/// 每种特征类型一个 HNSW 索引的管理器
///
/// 索引是特征库的派生缓存：惰性加载、可缺失、可过期。重建在旁路完成后
/// 原子替换，查询期间永远只会看到旧索引或新索引，不会看到半成品。
/// 没有索引时退化为对特征库的线性扫描，语义同前，只是更慢。
pub struct IndexManager {
    db: Database,
    dir: PathBuf,
    opts: IndexOptions,
    slots: [RwLock<Slot>; FeatureType::ALL.len()],
}

/// NotLoaded 表示还没尝试过从磁盘加载
enum Slot {
    NotLoaded,
    Missing,
    Ready(Arc<AnnIndex>),
}

impl IndexManager {
    pub fn new(db: Database, dir: impl Into<PathBuf>, opts: IndexOptions) -> Self {
        Self {
            db,
            dir: dir.into(),
            opts,
            slots: [
                RwLock::new(Slot::NotLoaded),
                RwLock::new(Slot::NotLoaded),
                RwLock::new(Slot::NotLoaded),
            ],
        }
    }

    fn slot(&self, ty: FeatureType) -> &RwLock<Slot> {
        &self.slots[ty.code() as usize - 1]
    }

    /// 当前可用的索引，第一次访问时尝试从磁盘加载
    pub fn current(&self, ty: FeatureType) -> Option<Arc<AnnIndex>> {
        {
            let slot = self.slot(ty).read().unwrap();
            match &*slot {
                Slot::Ready(index) => return Some(index.clone()),
                Slot::Missing => return None,
                Slot::NotLoaded => {}
            }
        }

        let mut slot = self.slot(ty).write().unwrap();
        if let Slot::NotLoaded = &*slot {
            *slot = match AnnIndex::load(&self.dir, ty.index_name()) {
                Ok(Some(index)) => {
                    info!("加载 {} 索引，共 {} 条", ty.index_name(), index.len());
                    Slot::Ready(Arc::new(index))
                }
                Ok(None) => Slot::Missing,
                Err(e) => {
                    // 损坏的索引当作缺失处理，走线性兜底，等待下次重建
                    warn!("加载 {} 索引失败，退回线性扫描: {e}", ty.index_name());
                    Slot::Missing
                }
            };
        }
        match &*slot {
            Slot::Ready(index) => Some(index.clone()),
            _ => None,
        }
    }

    /// 从特征库重建某类型的索引并原子替换
    ///
    /// 返回写入索引的条目数。零条记录时不产出任何索引文件，已有的
    /// 残留文件也会被清掉。
    pub async fn rebuild(&self, ty: FeatureType) -> Result<usize> {
        let name = ty.index_name();
        let mut items: Vec<(String, Vec<f32>)> = Vec::new();
        let mut dim = 0usize;
        let mut skipped = 0usize;
        let mut offset = 0usize;

        loop {
            let page = crud::features_paged(&self.db, ty, SCAN_PAGE, offset).await?;
            if page.is_empty() {
                break;
            }
            offset += page.len();
            for record in &page {
                // 维数以第一条合法记录为准，长度不符的行直接排除
                if dim == 0 && record.vector.len() >= 4 && record.vector.len() % 4 == 0 {
                    dim = record.vector.len() / 4;
                }
                let Some(vector) = encoding::decode_checked(&record.vector, dim) else {
                    skipped += 1;
                    continue;
                };
                items.push((item_id(record.media_key.as_str(), ty, record.sub_index), vector));
            }
        }

        if skipped > 0 {
            warn!("重建 {name} 索引时排除 {skipped} 条维数不符的记录");
        }

        if items.is_empty() {
            debug!("{name} 没有可索引的向量，跳过重建");
            AnnIndex::remove_files(&self.dir, name)?;
            *self.slot(ty).write().unwrap() = Slot::Missing;
            return Ok(0);
        }

        let total = items.len();
        let index = block_in_place(|| {
            let index = AnnIndex::build(items, dim, &self.opts);
            index.save(&self.dir, name)?;
            anyhow::Ok(index)
        })?;

        *self.slot(ty).write().unwrap() = Slot::Ready(Arc::new(index));
        info!("重建 {name} 索引完成，共 {total} 条，维数 {dim}");
        Ok(total)
    }

    /// 丢弃某类型的索引（内存和磁盘）
    pub fn clear(&self, ty: FeatureType) -> Result<()> {
        AnnIndex::remove_files(&self.dir, ty.index_name())?;
        *self.slot(ty).write().unwrap() = Slot::Missing;
        Ok(())
    }

    /// k 近邻搜索，索引缺失时自动退化为线性扫描
    ///
    /// 返回 (条目 id, 相似度)，降序排列。搜索永远不会因索引缺失而失败。
    pub async fn search(
        &self,
        ty: FeatureType,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(String, f32)>> {
        if let Some(index) = self.current(ty) {
            return Ok(block_in_place(|| index.knn(query, k, self.opts.ef_search)));
        }
        debug!("{} 索引缺失，使用线性扫描", ty.index_name());
        self.linear_scan(ty, query, k).await
    }

    /// 对特征库的分页全量扫描，与索引查询保持相同的 top-k 语义
    async fn linear_scan(
        &self,
        ty: FeatureType,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(String, f32)>> {
        let mut best: SmallVec<[(String, f32); 16]> = SmallVec::new();
        let mut offset = 0usize;

        loop {
            let page = crud::features_paged(&self.db, ty, SCAN_PAGE, offset).await?;
            if page.is_empty() {
                break;
            }
            offset += page.len();
            for record in &page {
                let Some(vector) = encoding::decode_checked(&record.vector, query.len()) else {
                    continue;
                };
                let score = encoding::dot(query, &vector);
                best.push((item_id(record.media_key.as_str(), ty, record.sub_index), score));
            }
            // 每页收敛一次，内存占用与语料规模无关
            best.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
            best.truncate(k);
        }

        Ok(best.into_vec())
    }
}

/// 索引条目 id：单实例类型就是 media_key，人脸类型带上序号
pub fn item_id(media_key: &str, ty: FeatureType, sub_index: i64) -> String {
    if ty.multi_instance() {
        format!("{media_key}{FACE_SEP}{sub_index}")
    } else {
        media_key.to_string()
    }
}
