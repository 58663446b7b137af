use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::info;
use tokio::net::TcpListener;

use crate::assets::FsAssetSource;
use crate::cli::{SubCommandExtend, open_services};
use crate::config::{Opts, PipelineOptions, SearchOptions};
use crate::pipeline::Pipeline;
use crate::searcher::Searcher;
use crate::server;

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub search: SearchOptions,
    #[command(flatten)]
    pub pipeline: PipelineOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
    /// 媒体库根目录
    #[arg(long, default_value = ".")]
    pub media_root: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = FsAssetSource::DEFAULT_SUFFIX)]
    pub suffix: String,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let services =
            open_services(opts, &self.media_root, &self.suffix, self.search.index).await?;

        let searcher = Searcher::new(
            services.db.clone(),
            services.assets.clone(),
            services.providers.clone(),
            services.index.clone(),
            self.search.fusion,
        );
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

        let state = server::AppState::new(searcher, Arc::new(pipeline), self.search.count);
        let app = server::create_app(state);

        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}
