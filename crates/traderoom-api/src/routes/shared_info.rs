//! 공유 정보 API 라우트
//!
//! - `POST /api/v1/rooms/{id}/shared-info` - 정보 공유 (활성 멤버 전용)
//! - `GET /api/v1/rooms/{id}/shared-info?limit=N` - 최근 공유 정보 (오래된 순)

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use super::validated;
use crate::error::ApiResponse;
use crate::rooms::NewSharedInfo;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 200;

/// 정보 공유 요청
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShareInfoRequest {
    #[validate(length(min = 1, max = 64, message = "지갑 주소는 1-64자여야 합니다"))]
    pub wallet: String,
    #[validate(url(message = "올바른 URL이 아닙니다"))]
    pub url: String,
    /// 정보 유형 (예: chart, news, tweet)
    #[serde(default, alias = "type")]
    #[validate(length(max = 32, message = "정보 유형은 최대 32자입니다"))]
    pub info_type: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// 목록 쿼리
#[derive(Debug, Default, Deserialize)]
pub struct SharedInfoListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

async fn share_info(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    body: Result<Json<ShareInfoRequest>, JsonRejection>,
) -> Response {
    let request = match validated(body) {
        Ok(request) => request,
        Err(response) => return response.into_response(),
    };

    let result = state
        .rooms
        .share_info(
            &room_id,
            &request.wallet,
            NewSharedInfo {
                url: request.url,
                info_type: request.info_type,
                metadata: request.metadata,
            },
        )
        .await;
    ApiResponse::from_result(result).into_response()
}

async fn list_shared_info(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(query): Query<SharedInfoListQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    ApiResponse::from_result(state.rooms.list_shared_info(&room_id, limit).await).into_response()
}

/// 공유 정보 라우터 (`/api/v1/rooms` 하위에 병합).
pub fn shared_info_router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/{room_id}/shared-info",
        post(share_info).get(list_shared_info),
    )
}
