use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::Result;
use regex::Regex;
use walkdir::WalkDir;

/// 媒体库中的一个资产
#[derive(Debug, Clone)]
pub struct Asset {
    /// 稳定的资产标识，所有派生表的关联键
    pub media_key: String,
    /// 最后修改时间（Unix 秒）
    pub modified_at: i64,
    /// 尽力而为的拍摄时间
    pub captured_at: Option<i64>,
}

/// 只读的资产目录
///
/// 实现方负责提供稳定的 media_key 和修改时间，核心只消费不修改。
pub trait AssetSource: Send + Sync {
    /// 按修改时间倒序返回最近的 n 个资产
    fn query_latest(&self, n: usize) -> Result<Vec<Asset>>;

    /// 按修改时间倒序分页
    fn query_paged(&self, limit: usize, offset: usize) -> Result<Vec<Asset>>;

    /// 返回修改时间晚于 ts 的资产
    fn query_modified_after(&self, ts: i64) -> Result<Vec<Asset>>;

    fn find_by_key(&self, key: &str) -> Result<Option<Asset>>;

    fn count(&self) -> Result<usize>;
}

/// 基于文件系统的资产目录，media_key 为文件路径
pub struct FsAssetSource {
    root: PathBuf,
    suffix_re: Regex,
}

impl FsAssetSource {
    /// 默认识别的图片后缀
    pub const DEFAULT_SUFFIX: &'static str = "jpg,jpeg,png,webp,bmp";

    pub fn new(root: impl AsRef<Path>, suffix: &str) -> Result<Self> {
        let suffix_re = Regex::new(&format!("(?i)^({})$", suffix.replace(',', "|")))?;
        Ok(Self { root: root.as_ref().to_path_buf(), suffix_re })
    }

    /// 全量扫描媒体目录，按修改时间倒序
    fn scan(&self) -> Vec<Asset> {
        let mut assets: Vec<Asset> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .map(|s| self.suffix_re.is_match(&s.to_string_lossy()))
                    == Some(true)
            })
            .filter_map(|entry| asset_from_path(entry.path()))
            .collect();
        assets.sort_by(|a, b| b.modified_at.cmp(&a.modified_at).then(a.media_key.cmp(&b.media_key)));
        assets
    }
}

impl AssetSource for FsAssetSource {
    fn query_latest(&self, n: usize) -> Result<Vec<Asset>> {
        let mut assets = self.scan();
        assets.truncate(n);
        Ok(assets)
    }

    fn query_paged(&self, limit: usize, offset: usize) -> Result<Vec<Asset>> {
        Ok(self.scan().into_iter().skip(offset).take(limit).collect())
    }

    fn query_modified_after(&self, ts: i64) -> Result<Vec<Asset>> {
        Ok(self.scan().into_iter().filter(|a| a.modified_at > ts).collect())
    }

    fn find_by_key(&self, key: &str) -> Result<Option<Asset>> {
        Ok(asset_from_path(Path::new(key)))
    }

    fn count(&self) -> Result<usize> {
        Ok(self.scan().len())
    }
}

fn asset_from_path(path: &Path) -> Option<Asset> {
    let meta = std::fs::metadata(path).ok()?;
    let modified_at = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Some(Asset { media_key: path.to_string_lossy().into_owned(), modified_at, captured_at: None })
}
