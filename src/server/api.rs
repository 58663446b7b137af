use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use log::{error, info};

use super::error::Result;
use super::state::AppState;
use super::types::*;
use crate::jobs::ExistingJobPolicy;
use crate::searcher::SearchHit;

/// 以文搜图
#[utoipa::path(
    post,
    path = "/search",
    request_body = SearchRequest,
    responses(
        (status = 200, body = SearchResponse),
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let start = Instant::now();
    let count = data.count.unwrap_or(state.default_count);

    info!("正在搜索: {}", data.query);
    let result = state.searcher.search_text(&data.query, count).await?;

    Ok(Json(SearchResponse {
        time: start.elapsed().as_millis(),
        result: to_entries(result),
    }))
}

/// 以图搜图
#[utoipa::path(
    post,
    path = "/similar",
    request_body = SimilarRequest,
    responses(
        (status = 200, body = SearchResponse),
    )
)]
pub async fn similar_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<SimilarRequest>,
) -> Result<Json<SearchResponse>> {
    let start = Instant::now();
    let count = data.count.unwrap_or(state.default_count);

    let result = state.searcher.search_similar(&data.media_key, count).await?;

    Ok(Json(SearchResponse {
        time: start.elapsed().as_millis(),
        result: to_entries(result),
    }))
}

/// 启动后台扫描任务
///
/// 同名任务单飞：默认已有任务在跑时丢弃本次请求，`replace` 为真时
/// 取消旧任务重新开始。
#[utoipa::path(
    post,
    path = "/scan",
    request_body = ScanRequest,
    responses(
        (status = 200, body = ScanResponse),
    )
)]
pub async fn scan_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<ScanRequest>,
) -> Result<Json<ScanResponse>> {
    let policy =
        if data.replace { ExistingJobPolicy::Replace } else { ExistingJobPolicy::Keep };

    let pipeline = state.pipeline.clone();
    let started = state.jobs.spawn("scan", policy, move |cancel| async move {
        let result = if data.full {
            pipeline.run_full(data.force, &cancel).await
        } else {
            pipeline.run_incremental(&cancel).await
        };
        match result {
            Ok(stats) => info!("后台扫描完成：新增 {}，失败 {}", stats.encoded, stats.failed),
            Err(e) => error!("后台扫描失败: {e}"),
        }
    });

    Ok(Json(ScanResponse { started, running: state.jobs.is_running("scan") }))
}

/// 查询扫描任务状态
#[utoipa::path(
    get,
    path = "/scan",
    responses(
        (status = 200, body = ScanResponse),
    )
)]
pub async fn scan_status_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ScanResponse>> {
    Ok(Json(ScanResponse { started: false, running: state.jobs.is_running("scan") }))
}

fn to_entries(hits: Vec<SearchHit>) -> Vec<HitEntry> {
    hits.into_iter()
        .map(|hit| HitEntry { media_key: hit.media_key, score: hit.score })
        .collect()
}
