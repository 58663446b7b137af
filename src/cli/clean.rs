use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::{IndexOptions, Opts};
use crate::db::{self, FeatureType};
use crate::index::IndexManager;

#[derive(Parser, Debug, Clone)]
pub struct CleanCommand {
    /// 删除全部特征记录
    #[arg(long)]
    pub features: bool,
    /// 删除全部分类结果
    #[arg(long)]
    pub categories: bool,
    /// 删除索引文件，特征记录保留
    #[arg(long)]
    pub index: bool,
    /// 以上三者全部删除
    #[arg(long)]
    pub all: bool,
}

impl SubCommandExtend for CleanCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = db::init_db(opts.conf_dir.database()).await?;
        let index =
            IndexManager::new(db.clone(), opts.conf_dir.index_dir(), IndexOptions::default());

        if self.features || self.all {
            for ty in FeatureType::ALL {
                db::crud::delete_by_type(&db, ty).await?;
            }
            info!("特征记录已清空");
        }
        if self.categories || self.all {
            db::crud::delete_all_categories(&db).await?;
            info!("分类结果已清空");
        }
        if self.index || self.all || self.features {
            // 特征没了索引也必须作废，否则会查出悬空的 id
            for ty in FeatureType::ALL {
                index.clear(ty)?;
            }
            info!("索引文件已删除");
        }
        Ok(())
    }
}
