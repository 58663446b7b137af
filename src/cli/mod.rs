mod build;
mod clean;
mod scan;
mod search;
mod similar;
pub mod server;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use log::info;

pub use build::*;
pub use clean::*;
pub use scan::*;
pub use search::*;
pub use similar::*;
pub use server::*;

use crate::assets::{AssetSource, FsAssetSource};
use crate::classify::{Classifier, LabelConfig};
use crate::clip::{ClipImageProvider, ClipTextProvider, UnicomImageProvider};
use crate::config::{IndexOptions, Opts};
use crate::db::{self, Database};
use crate::index::IndexManager;
use crate::providers::Providers;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// 各子命令共用的服务集合
pub(crate) struct Services {
    pub db: Database,
    pub assets: Arc<dyn AssetSource>,
    pub providers: Arc<Providers>,
    pub index: Arc<IndexManager>,
    pub classifier: Option<Arc<Classifier>>,
}

/// 打开数据库、嵌入后端和索引
///
/// labels.json 存在时顺带构建分类器，类目 prompt 在这里一次性编码。
pub(crate) async fn open_services(
    opts: &Opts,
    media_root: &Path,
    suffix: &str,
    index_opts: IndexOptions,
) -> Result<Services> {
    let db = db::init_db(opts.conf_dir.database()).await?;
    let models = opts.conf_dir.models();

    let clip_text = ClipTextProvider::open(&models)?;
    let clip_image = ClipImageProvider::open(&models)?;
    let image = UnicomImageProvider::open(&models)?;

    let labels = opts.conf_dir.labels();
    let classifier = if labels.is_file() {
        let config = LabelConfig::load(&labels)?;
        info!("加载了 {} 个分类类目", config.labels.len());
        Some(Arc::new(Classifier::open(&config, &clip_text)?))
    } else {
        None
    };

    let providers =
        Arc::new(Providers::new(Box::new(clip_image), Box::new(clip_text), Box::new(image)));
    let assets = Arc::new(FsAssetSource::new(media_root, suffix)?);
    let index =
        Arc::new(IndexManager::new(db.clone(), opts.conf_dir.index_dir(), index_opts));

    Ok(Services { db, assets, providers, index, classifier })
}
