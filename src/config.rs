use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let proj_dirs =
        ProjectDirs::from("", "", "photosearch").expect("failed to get project dir");
    ConfDir { path: proj_dirs.config_dir().to_path_buf() }
});

fn default_config_dir() -> &'static str {
    CONF_DIR.path().to_str().unwrap()
}

/// HNSW 索引的构建与查询参数
#[derive(Parser, Debug, Clone, Copy)]
pub struct IndexOptions {
    /// HNSW 图的最大连接数
    #[arg(long, value_name = "M", default_value_t = 16)]
    pub hnsw_m: usize,
    /// HNSW 构建时的搜索宽度
    #[arg(long, value_name = "EF", default_value_t = 200)]
    pub ef_construction: usize,
    /// HNSW 查询时的搜索宽度
    #[arg(long, value_name = "EF", default_value_t = 64)]
    pub ef_search: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self { hnsw_m: 16, ef_construction: 200, ef_search: 64 }
    }
}

/// 人脸融合重排参数
#[derive(Parser, Debug, Clone, Copy)]
pub struct FusionOptions {
    /// 人脸相似度低阈值，低于该值的人脸信号被忽略
    #[arg(long, value_name = "T", default_value_t = 0.4)]
    pub face_sim_soft: f32,
    /// 人脸相似度高阈值，达到该值后人脸信号主导排序
    #[arg(long, value_name = "T", default_value_t = 0.6)]
    pub face_sim_strong: f32,
    /// 人脸主导时的混合系数
    #[arg(long, value_name = "B", default_value_t = 0.85)]
    pub face_blend: f32,
}

impl Default for FusionOptions {
    fn default() -> Self {
        Self { face_sim_soft: 0.4, face_sim_strong: 0.6, face_blend: 0.85 }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 显示的结果数量
    #[arg(long, value_name = "COUNT", default_value_t = 10)]
    pub count: usize,
    #[command(flatten)]
    pub index: IndexOptions,
    #[command(flatten)]
    pub fusion: FusionOptions,
}

/// 嵌入流水线参数
#[derive(Parser, Debug, Clone)]
pub struct PipelineOptions {
    /// 全量扫描的分页大小
    #[arg(long, value_name = "SIZE", default_value_t = 200)]
    pub page_size: usize,
    /// 增量任务默认处理的最近资产数量
    #[arg(long, value_name = "N", default_value_t = 120)]
    pub recent_limit: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self { page_size: 200, recent_limit: 120 }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "photosearch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// photosearch 配置文件目录
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 扫描媒体库并计算缺失的嵌入向量
    Scan(ScanCommand),
    /// 以文搜图
    Search(SearchCommand),
    /// 以图搜图
    Similar(SimilarCommand),
    /// 从特征库重建全部 HNSW 索引
    Build(BuildCommand),
    /// 清理特征、分类或索引数据
    Clean(CleanCommand),
    /// 启动 HTTP 搜索服务
    Server(ServerCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("photosearch.db")
    }

    /// 返回索引文件所在目录
    pub fn index_dir(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回分类标签配置的路径
    pub fn labels(&self) -> PathBuf {
        self.path.join("labels.json")
    }

    /// 返回嵌入模型缓存目录
    pub fn models(&self) -> PathBuf {
        self.path.join("models")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

impl From<&Path> for ConfDir {
    fn from(path: &Path) -> Self {
        Self { path: path.to_path_buf() }
    }
}
