use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::Result;
use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::IndexOptions;

/// 人脸条目 id 的分隔符，`<media_key>#f<sub_index>`
pub const FACE_SEP: &str = "#f";

/// 从条目 id 解析出 media_key
pub fn parse_media_key(id: &str) -> &str {
    match id.find(FACE_SEP) {
        Some(pos) if pos > 0 => &id[..pos],
        _ => id,
    }
}

#[derive(Serialize, Deserialize)]
struct IdSidecar {
    dim: usize,
    ids: Vec<String>,
}

/// 单个特征类型的 HNSW 索引
///
/// 向量在写入前已经归一化，DistDot 的距离即 1 - 余弦相似度。
/// 索引本身是可丢弃的派生产物，任何时候都能从特征库重建。
pub struct AnnIndex {
    index: Hnsw<'static, f32, DistDot>,
    ids: Vec<String>,
    dim: usize,
}

impl AnnIndex {
    /// 从 (条目 id, 归一化向量) 列表构建索引
    pub fn build(items: Vec<(String, Vec<f32>)>, dim: usize, opts: &IndexOptions) -> Self {
        let index = Hnsw::<f32, _>::new(
            opts.hnsw_m,
            items.len().max(16),
            16,
            opts.ef_construction,
            DistDot {},
        );
        let mut ids = Vec::with_capacity(items.len());
        for (pos, (id, vector)) in items.into_iter().enumerate() {
            index.insert((vector.as_slice(), pos));
            ids.push(id);
        }
        Self { index, ids, dim }
    }

    /// 持久化到 `dir` 下的 `<name>.hnsw.*` 和 `<name>.ids`
    pub fn save(&self, dir: &Path, name: &str) -> Result<()> {
        self.index.file_dump(dir, name)?;

        // ids 先写临时文件再原子替换，避免读到半个文件
        let tmp = dir.join(format!("{name}.ids.tmp"));
        let writer = BufWriter::new(File::create(&tmp)?);
        bincode::serialize_into(writer, &IdSidecar { dim: self.dim, ids: self.ids.clone() })?;
        std::fs::rename(&tmp, dir.join(format!("{name}.ids")))?;
        Ok(())
    }

    /// 从磁盘加载，不存在时返回 None
    pub fn load(dir: &Path, name: &str) -> Result<Option<Self>> {
        let graph = dir.join(format!("{name}.hnsw.graph"));
        let sidecar = dir.join(format!("{name}.ids"));
        if !graph.exists() || !sidecar.exists() {
            return Ok(None);
        }

        let IdSidecar { dim, ids } = bincode::deserialize_from(File::open(&sidecar)?)?;

        let reloader = HnswIo::new(dir, name);
        let reloader = Box::leak(Box::new(reloader));
        let index = reloader.load_hnsw_with_dist(DistDot {})?;

        Ok(Some(Self { index, ids, dim }))
    }

    /// 删除某个索引的全部持久化文件
    pub fn remove_files(dir: &Path, name: &str) -> Result<()> {
        for suffix in ["hnsw.graph", "hnsw.data", "ids"] {
            let path = dir.join(format!("{name}.{suffix}"));
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    pub fn exists(dir: &Path, name: &str) -> bool {
        dir.join(format!("{name}.hnsw.graph")).exists() && dir.join(format!("{name}.ids")).exists()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// k 近邻查询，返回 (条目 id, 相似度)，按相似度降序
    pub fn knn(&self, query: &[f32], k: usize, ef_search: usize) -> Vec<(String, f32)> {
        if query.len() != self.dim || self.ids.is_empty() {
            return vec![];
        }
        let mut out: Vec<(String, f32)> = self
            .index
            .search(query, k, ef_search)
            .into_iter()
            .filter_map(|n| {
                self.ids.get(n.d_id).map(|id| (id.clone(), 1.0 - n.distance))
            })
            .collect();
        out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: &[f32]) -> Vec<f32> {
        let mut v = v.to_vec();
        crate::encoding::l2_normalize(&mut v);
        v
    }

    #[test]
    fn parse_media_key_strips_face_suffix() {
        assert_eq!(parse_media_key("a/b.jpg#f3"), "a/b.jpg");
        assert_eq!(parse_media_key("a/b.jpg"), "a/b.jpg");
        assert_eq!(parse_media_key("#f0"), "#f0");
    }

    #[test]
    fn knn_orders_by_similarity() {
        let opts = IndexOptions::default();
        let items = vec![
            ("m1".to_string(), unit(&[1.0, 0.1])),
            ("m2".to_string(), unit(&[0.5, 0.5])),
            ("m3".to_string(), unit(&[0.0, 1.0])),
        ];
        let index = AnnIndex::build(items, 2, &opts);
        let hits = index.knn(&unit(&[1.0, 0.0]), 2, opts.ef_search);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, "m1");
        assert_eq!(hits[1].0, "m2");
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn knn_rejects_dim_mismatch() {
        let opts = IndexOptions::default();
        let index = AnnIndex::build(vec![("m1".to_string(), unit(&[1.0, 0.0]))], 2, &opts);
        assert!(index.knn(&[1.0, 0.0, 0.0], 1, opts.ef_search).is_empty());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let opts = IndexOptions::default();
        let items = vec![
            ("m1".to_string(), unit(&[1.0, 0.0])),
            ("m2".to_string(), unit(&[0.0, 1.0])),
        ];
        let index = AnnIndex::build(items, 2, &opts);
        index.save(dir.path(), "clip").unwrap();
        assert!(AnnIndex::exists(dir.path(), "clip"));

        let loaded = AnnIndex::load(dir.path(), "clip").unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.dim(), 2);
        let hits = loaded.knn(&unit(&[1.0, 0.0]), 1, opts.ef_search);
        assert_eq!(hits[0].0, "m1");
    }

    #[test]
    fn load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AnnIndex::load(dir.path(), "clip").unwrap().is_none());
    }
}
