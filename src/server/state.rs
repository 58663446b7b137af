use std::sync::Arc;

use crate::jobs::JobRegistry;
use crate::pipeline::Pipeline;
use crate::searcher::Searcher;

/// 应用状态
pub struct AppState {
    /// 查询入口
    pub searcher: Searcher,
    /// 嵌入流水线，后台扫描任务用
    pub pipeline: Arc<Pipeline>,
    /// 后台任务注册表
    pub jobs: JobRegistry,
    /// 未指定 count 时的默认结果数量
    pub default_count: usize,
}

impl AppState {
    pub fn new(searcher: Searcher, pipeline: Arc<Pipeline>, default_count: usize) -> Arc<Self> {
        Arc::new(AppState { searcher, pipeline, jobs: JobRegistry::new(), default_count })
    }
}
