//! 트레이드 룸 REST API 및 WebSocket 서버.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - Axum 기반 REST API (룸, 공유 정보, 랭킹, 토큰, 웹훅)
//! - 룸 단위 실시간 WebSocket 팬아웃
//! - 프로바이더 트랜잭션 수집 파이프라인
//! - 헬스 체크 엔드포인트
//! - Prometheus 메트릭
//!
//! # 모듈 구성
//!
//! - [`state`]: 애플리케이션 공유 상태 (AppState)
//! - [`rooms`]: 룸/멤버 상태 머신과 서비스
//! - [`routes`]: REST API 엔드포인트
//! - [`websocket`]: 연결 레지스트리와 브로드캐스트
//! - [`subscription`]: 관찰 주소 구독 관리
//! - [`ingest`]: 웹훅/로그 알림 파싱과 라우팅
//! - [`ranking`]: 스마트 머니 랭킹 집계
//! - [`tasks`]: 주기적 정리 작업
//! - [`metrics`]: Prometheus 메트릭 수집
//! - [`middleware`]: HTTP 미들웨어

pub mod auth;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod middleware;
pub mod ranking;
pub mod repository;
pub mod rooms;
pub mod routes;
pub mod state;
pub mod subscription;
pub mod tasks;
pub mod websocket;

pub use auth::{hash_password, verify_password};
pub use error::ApiResponse;
pub use metrics::setup_metrics_recorder;
pub use middleware::metrics_layer;
pub use routes::*;
pub use state::{AppState, IngestWorker};
pub use tasks::spawn_background_tasks;
pub use websocket::{
    room_socket_handler, websocket_router, ClientMessage, ConnectionRegistry, ServerMessage, WsError,
};

#[cfg(any(test, feature = "test-utils"))]
pub use state::{create_test_state, create_test_state_with};
