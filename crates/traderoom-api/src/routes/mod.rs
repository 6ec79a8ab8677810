//! API 라우트.
//!
//! 모든 REST API 엔드포인트를 정의하고 라우터를 구성합니다.
//!
//! # 라우트 구조
//!
//! - `/health` - 헬스 체크 (liveness)
//! - `/health/ready` - 상세 헬스 체크 (readiness)
//! - `/api/v1/rooms` - 룸 생성/조회/참여/퇴장/종료
//! - `/api/v1/rooms/{id}/shared-info` - 공유 정보
//! - `/api/v1/ranking` - 스마트 머니 토큰 랭킹, 지갑 태그 관리
//! - `/api/v1/tokens` - 토큰 메타데이터, 심볼 해석
//! - `/api/v1/webhook` - 프로바이더 웹훅 수신

pub mod health;
pub mod ranking;
pub mod rooms;
pub mod shared_info;
pub mod tokens;
pub mod webhook;

pub use health::{health_router, ComponentHealth, ComponentStatus, HealthResponse};
pub use ranking::{ranking_router, RankingQuery, SmartMoneyRequest};
pub use rooms::{
    rooms_router, CreateRoomRequest, JoinRoomRequest, JoinRoomResponse, LeaveRoomResponse,
    RoomListResponse, WalletRequest,
};
pub use shared_info::{shared_info_router, ShareInfoRequest, SharedInfoListQuery};
pub use tokens::{tokens_router, ResolveQuery, UpsertTokenRequest};
pub use webhook::{webhook_router, WebhookAck};

use axum::{extract::rejection::JsonRejection, Json, Router};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use validator::Validate;

use crate::error::ApiResponse;
use crate::state::AppState;

/// API v1 라우터 생성.
///
/// 모든 `/api/v1` 서브 라우터를 조합합니다. 헬스 체크는 rate limit 밖에 두기 위해
/// [`health_router`]로 따로 마운트합니다.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/api/v1/rooms", rooms_router().merge(shared_info_router()))
        .nest("/api/v1/ranking", ranking_router())
        .nest("/api/v1/tokens", tokens_router())
        .nest("/api/v1/webhook", webhook_router())
}

/// JSON 본문 추출 결과를 검증합니다.
///
/// 본문 파싱 실패와 검증 실패 모두 HTTP 200 실패 envelope로 변환됩니다.
pub(crate) fn validated<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiResponse<()>>
where
    T: DeserializeOwned + Validate,
{
    let Json(request) = body.map_err(|rejection| {
        ApiResponse::fail_with_code("INVALID_BODY", rejection.body_text())
    })?;
    request.validate().map_err(|errors| ApiResponse::invalid(&errors))?;
    Ok(request)
}
