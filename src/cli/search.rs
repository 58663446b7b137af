use std::convert::Infallible;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use crate::assets::FsAssetSource;
use crate::cli::{SubCommandExtend, open_services};
use crate::config::{Opts, SearchOptions};
use crate::searcher::{SearchHit, Searcher};

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    /// 查询文本
    pub query: String,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 媒体库根目录，用于回查结果元数据
    #[arg(long, default_value = ".")]
    pub media_root: PathBuf,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
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

        let result = searcher.search_text(&self.query, self.search.count).await?;
        print_result(&result, self.output_format)
    }
}

pub(crate) fn print_result(result: &[SearchHit], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let rows: Vec<(f32, &str)> =
                result.iter().map(|hit| (hit.score, hit.media_key.as_str())).collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Table => {
            for hit in result {
                println!("{:.4}\t{}", hit.score, hit.media_key);
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}

impl FromStr for OutputFormat {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            _ => unreachable!(),
        }
    }
}
