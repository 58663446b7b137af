use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::{IndexOptions, Opts};
use crate::db::{self, FeatureType};
use crate::index::IndexManager;

#[derive(Parser, Debug, Clone)]
pub struct BuildCommand {
    #[command(flatten)]
    pub index: IndexOptions,
}

impl SubCommandExtend for BuildCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = db::init_db(opts.conf_dir.database()).await?;
        let index = IndexManager::new(db, opts.conf_dir.index_dir(), self.index);

        for ty in FeatureType::ALL {
            let count = index.rebuild(ty).await?;
            info!("{} 索引重建完成，共 {count} 条", ty.index_name());
        }
        Ok(())
    }
}
