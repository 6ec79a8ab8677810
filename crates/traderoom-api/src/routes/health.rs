//! 헬스 체크 endpoint.
//!
//! 서버 상태 확인을 위한 헬스 체크 엔드포인트를 제공합니다.
//! 로드밸런서나 오케스트레이션 시스템(Kubernetes 등)에서 사용됩니다.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

/// 헬스 체크 응답 구조체.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// 전체 서비스 상태 ("healthy" | "degraded")
    pub status: String,

    /// API 버전
    pub version: String,

    /// 서버 업타임(초)
    pub uptime_secs: i64,

    /// 현재 시간 (ISO 8601)
    pub timestamp: String,

    /// 개별 컴포넌트 상태
    pub components: ComponentHealth,
}

/// 개별 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// 룸 상태 저장소
    pub rooms: ComponentStatus,

    /// WebSocket 연결
    pub connections: ComponentStatus,

    /// 관찰 주소 구독
    pub subscriptions: ComponentStatus,

    /// 수집 큐
    pub ingest: ComponentStatus,
}

/// 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// 상태 ("up" | "degraded")
    pub status: String,

    /// 추가 정보 (선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentStatus {
    /// 정보 포함 정상 상태.
    pub fn up_with_info(message: impl Into<String>) -> Self {
        Self {
            status: "up".to_string(),
            message: Some(message.into()),
        }
    }

    /// 성능 저하 상태.
    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: "degraded".to_string(),
            message: Some(message.into()),
        }
    }
}

/// 간단한 헬스 체크 (liveness probe용).
///
/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// 상세 헬스 체크 (readiness probe용).
///
/// 수집 큐가 가득 찼거나 재시도 대기 중인 구독이 있으면 degraded로 보고합니다.
/// GET /health/ready
pub async fn health_ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut overall_status = "healthy";

    let store = state.rooms.store();
    let rooms_status = ComponentStatus::up_with_info(format!(
        "{} rooms, {} open",
        store.len(),
        store.open_count()
    ));

    let connections_status = ComponentStatus::up_with_info(format!(
        "{} live connections",
        state.registry.total_connections()
    ));

    let subs = &state.subscriptions;
    let subscription_info = format!(
        "{} watched, {} active, {} pending retry",
        subs.watched_count(),
        subs.active_count(),
        subs.pending_count()
    );
    let subscriptions_status = if subs.pending_count() > 0 {
        overall_status = "degraded";
        ComponentStatus::degraded(subscription_info)
    } else {
        ComponentStatus::up_with_info(subscription_info)
    };

    let queued = state.ingest.queued();
    let capacity = state.ingest.capacity();
    let ingest_info = format!("{}/{} queued", queued, capacity);
    let ingest_status = if queued >= capacity {
        overall_status = "degraded";
        ComponentStatus::degraded(ingest_info)
    } else {
        ComponentStatus::up_with_info(ingest_info)
    };

    let response = HealthResponse {
        status: overall_status.to_string(),
        version: state.version.clone(),
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        components: ComponentHealth {
            rooms: rooms_status,
            connections: connections_status,
            subscriptions: subscriptions_status,
            ingest: ingest_status,
        },
    };

    (StatusCode::OK, Json(response))
}

/// 헬스 체크 라우터 생성.
pub fn health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(health_ready))
}
