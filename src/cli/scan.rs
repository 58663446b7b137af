use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use indicatif::ProgressBar;
use log::info;

use crate::assets::FsAssetSource;
use crate::cli::{SubCommandExtend, open_services};
use crate::config::{IndexOptions, Opts, PipelineOptions};
use crate::jobs::CancelToken;
use crate::pipeline::Pipeline;

#[derive(Parser, Debug, Clone)]
pub struct ScanCommand {
    /// 媒体库根目录
    pub path: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = FsAssetSource::DEFAULT_SUFFIX)]
    pub suffix: String,
    /// 忽略同步水位线，遍历整个媒体库
    #[arg(long)]
    pub full: bool,
    /// 重算已有特征，而不是跳过
    #[arg(long)]
    pub force: bool,
    /// 只处理最近修改的 N 个资产
    #[arg(short, long, value_name = "N")]
    pub limit: Option<usize>,
    #[command(flatten)]
    pub pipeline: PipelineOptions,
    #[command(flatten)]
    pub index: IndexOptions,
}

impl SubCommandExtend for ScanCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let services = open_services(opts, &self.path, &self.suffix, self.index).await?;
        let pipeline = Pipeline::new(
            services.db,
            services.assets,
            services.providers,
            services.index,
            self.pipeline.clone(),
        );
        let pipeline = match services.classifier {
            Some(classifier) => pipeline.with_classifier(classifier),
            None => pipeline,
        };

        // Ctrl-C 只打断流水线，已写入的特征保留
        let cancel = CancelToken::new();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("收到中断信号，等待当前资产处理完成");
                    cancel.cancel();
                }
            }
        });

        let pb = ProgressBar::new_spinner().with_message("扫描媒体库中……");
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        let stats = if let Some(limit) = self.limit {
            pipeline.run_recent(Some(limit), self.force, &cancel).await?
        } else if self.full {
            pipeline.run_full(self.force, &cancel).await?
        } else {
            pipeline.run_incremental(&cancel).await?
        };

        pb.finish_and_clear();
        info!(
            "扫描完成：访问 {}，新增 {}，跳过 {}，失败 {}，分类 {}，清理 {}",
            stats.scanned,
            stats.encoded,
            stats.skipped,
            stats.failed,
            stats.classified,
            stats.removed
        );
        Ok(())
    }
}
