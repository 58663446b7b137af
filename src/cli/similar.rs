use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::assets::FsAssetSource;
use crate::cli::search::{OutputFormat, print_result};
use crate::cli::{SubCommandExtend, open_services};
use crate::config::{Opts, SearchOptions};
use crate::searcher::Searcher;

#[derive(Parser, Debug, Clone)]
pub struct SimilarCommand {
    /// 查询图片的路径
    pub image: PathBuf,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 媒体库根目录，用于回查结果元数据
    #[arg(long, default_value = ".")]
    pub media_root: PathBuf,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SimilarCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let services =
            open_services(opts, &self.media_root, FsAssetSource::DEFAULT_SUFFIX, self.search.index)
                .await?;
        let searcher = Searcher::new(
            services.db,
            services.assets,
            services.providers,
            services.index,
            self.search.fusion,
        );

        let key = self.image.to_string_lossy();
        let result = searcher.search_similar(&key, self.search.count).await?;
        print_result(&result, self.output_format)
    }
}
