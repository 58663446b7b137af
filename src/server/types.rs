use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 文本搜索请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchRequest {
    /// 查询文本，任意语言
    pub query: String,
    /// 返回的结果数量，缺省用服务器配置
    pub count: Option<usize>,
}

/// 以图搜图请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct SimilarRequest {
    /// 查询图的 media_key
    pub media_key: String,
    /// 返回的结果数量，缺省用服务器配置
    pub count: Option<usize>,
}

/// 后台扫描请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct ScanRequest {
    /// 忽略同步水位线，遍历整个媒体库
    #[serde(default)]
    #[schema(default = false)]
    pub full: bool,
    /// 重算已有特征
    #[serde(default)]
    #[schema(default = false)]
    pub force: bool,
    /// 已有扫描任务在跑时，取消它并重新开始
    #[serde(default)]
    #[schema(default = false)]
    pub replace: bool,
}

/// 一条搜索结果
#[derive(Debug, Serialize, ToSchema)]
pub struct HitEntry {
    pub media_key: String,
    /// 相似度，越大越相似
    pub score: f32,
}

/// 搜索响应
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    /// 搜索耗时，单位为毫秒
    pub time: u128,
    pub result: Vec<HitEntry>,
}

/// 扫描任务状态
#[derive(Debug, Serialize, ToSchema)]
pub struct ScanResponse {
    /// 本次请求是否启动了新任务
    pub started: bool,
    /// 当前是否有扫描任务在运行
    pub running: bool,
}
