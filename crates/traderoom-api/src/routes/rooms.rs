//! 룸 API 라우트
//!
//! # 엔드포인트
//!
//! - `POST /api/v1/rooms` - 룸 생성 (생성자 자동 참여)
//! - `GET /api/v1/rooms` - 룸 목록 (`?status=open|closed|creating`)
//! - `GET /api/v1/rooms/{id}` - 룸 상태 스냅샷
//! - `POST /api/v1/rooms/{id}/join` - 참여
//! - `POST /api/v1/rooms/{id}/leave` - 퇴장
//! - `POST /api/v1/rooms/{id}/close` - 종료 (생성자 전용)

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::validated;
use crate::error::ApiResponse;
use crate::rooms::NewRoom;
use crate::state::AppState;
use traderoom_core::{Member, Room, RoomStatus};

// ================================================================================================
// Request/Response Types
// ================================================================================================

/// 룸 생성 요청
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    /// 생성자 지갑 주소
    #[validate(length(min = 1, max = 64, message = "지갑 주소는 1-64자여야 합니다"))]
    pub creator_wallet: String,
    /// 관찰할 토큰 민트 주소
    #[serde(default)]
    #[validate(length(min = 1, max = 64, message = "토큰 주소는 1-64자여야 합니다"))]
    pub token_address: Option<String>,
    /// 재활용 시간 (시간, 기본값은 설정 참조)
    #[serde(default)]
    #[validate(range(min = 1, max = 720, message = "재활용 시간은 1-720시간이어야 합니다"))]
    pub recycle_hours: Option<i64>,
    /// 비밀번호 (빈 문자열은 비밀번호 없음)
    #[serde(default)]
    pub password: Option<String>,
}

/// 참여 요청
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    #[validate(length(min = 1, max = 64, message = "지갑 주소는 1-64자여야 합니다"))]
    pub wallet: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// 지갑 주소만 담는 요청 (퇴장, 종료)
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WalletRequest {
    #[validate(length(min = 1, max = 64, message = "지갑 주소는 1-64자여야 합니다"))]
    pub wallet: String,
}

/// 룸 목록 쿼리
#[derive(Debug, Default, Deserialize)]
pub struct ListRoomsQuery {
    #[serde(default)]
    pub status: Option<String>,
}

/// 룸 목록 응답
#[derive(Debug, Serialize)]
pub struct RoomListResponse {
    pub rooms: Vec<Room>,
    pub total: usize,
}

/// 참여 응답
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomResponse {
    pub room: Room,
    pub member: Member,
    /// 이번 요청으로 새로 활성화되었는지 여부
    pub newly_joined: bool,
}

/// 퇴장 응답
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomResponse {
    /// 실제로 비활성화되었는지 여부 (이미 나간 상태면 false)
    pub left: bool,
    pub member: Option<Member>,
}

// ================================================================================================
// Handlers
// ================================================================================================

async fn create_room(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Response {
    let request = match validated(body) {
        Ok(request) => request,
        Err(response) => return response.into_response(),
    };

    let result = state
        .rooms
        .create_room(NewRoom {
            creator_wallet: request.creator_wallet,
            token_address: request.token_address,
            recycle_hours: request.recycle_hours,
            password: request.password,
        })
        .await;
    ApiResponse::from_result(result).into_response()
}

async fn list_rooms(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRoomsQuery>,
) -> Response {
    let status = match query.status.as_deref().map(str::parse::<RoomStatus>).transpose() {
        Ok(status) => status,
        Err(e) => return ApiResponse::<()>::fail(e).into_response(),
    };

    let rooms = state.rooms.list_rooms(status);
    ApiResponse::ok(RoomListResponse {
        total: rooms.len(),
        rooms,
    })
    .into_response()
}

async fn get_room(State(state): State<Arc<AppState>>, Path(room_id): Path<String>) -> Response {
    ApiResponse::from_result(state.rooms.get_status(&room_id).await).into_response()
}

async fn join_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    body: Result<Json<JoinRoomRequest>, JsonRejection>,
) -> Response {
    let request = match validated(body) {
        Ok(request) => request,
        Err(response) => return response.into_response(),
    };

    let result = state
        .rooms
        .join_room(&room_id, &request.wallet, request.password.as_deref())
        .await
        .map(|outcome| JoinRoomResponse {
            room: outcome.room,
            member: outcome.member,
            newly_joined: outcome.newly_joined,
        });
    ApiResponse::from_result(result).into_response()
}

async fn leave_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    body: Result<Json<WalletRequest>, JsonRejection>,
) -> Response {
    let request = match validated(body) {
        Ok(request) => request,
        Err(response) => return response.into_response(),
    };

    let result = state
        .rooms
        .leave_room(&room_id, &request.wallet)
        .await
        .map(|member| LeaveRoomResponse {
            left: member.is_some(),
            member,
        });
    ApiResponse::from_result(result).into_response()
}

async fn close_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    body: Result<Json<WalletRequest>, JsonRejection>,
) -> Response {
    let request = match validated(body) {
        Ok(request) => request,
        Err(response) => return response.into_response(),
    };

    ApiResponse::from_result(state.rooms.close_room(&room_id, &request.wallet).await).into_response()
}

/// 룸 라우터 생성.
pub fn rooms_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_room).get(list_rooms))
        .route("/{room_id}", get(get_room))
        .route("/{room_id}/join", post(join_room))
        .route("/{room_id}/leave", post(leave_room))
        .route("/{room_id}/close", post(close_room))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{get as get_json, send};
    use crate::state::create_test_state;
    use serde_json::json;

    fn app() -> (Router, Arc<AppState>) {
        let state = Arc::new(create_test_state());
        let app = Router::new()
            .nest("/api/v1/rooms", rooms_router())
            .with_state(state.clone());
        (app, state)
    }

    #[tokio::test]
    async fn test_room_lifecycle_over_http() {
        let (app, state) = app();

        let created = send(
            &app,
            "POST",
            "/api/v1/rooms",
            json!({"creatorWallet": "creator", "tokenAddress": "MintX", "password": "pw"}),
        )
        .await;
        assert_eq!(created["success"], true);
        assert_eq!(created["data"]["hasPassword"], true);
        assert!(created["data"].get("passwordHash").is_none());
        let room_id = created["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(state.subscriptions.ref_count("MintX"), 1);

        let denied = send(
            &app,
            "POST",
            &format!("/api/v1/rooms/{}/join", room_id),
            json!({"wallet": "alice", "password": "nope"}),
        )
        .await;
        assert_eq!(denied["success"], false);
        assert_eq!(denied["code"], "AUTH_ERROR");

        let joined = send(
            &app,
            "POST",
            &format!("/api/v1/rooms/{}/join", room_id),
            json!({"wallet": "alice", "password": "pw"}),
        )
        .await;
        assert_eq!(joined["data"]["newlyJoined"], true);

        let status = get_json(&app, &format!("/api/v1/rooms/{}", room_id)).await;
        assert_eq!(status["data"]["members"].as_array().unwrap().len(), 2);

        let forbidden = send(
            &app,
            "POST",
            &format!("/api/v1/rooms/{}/close", room_id),
            json!({"wallet": "alice"}),
        )
        .await;
        assert_eq!(forbidden["code"], "FORBIDDEN");

        let closed = send(
            &app,
            "POST",
            &format!("/api/v1/rooms/{}/close", room_id),
            json!({"wallet": "creator"}),
        )
        .await;
        assert_eq!(closed["data"]["status"], "closed");

        let late = send(
            &app,
            "POST",
            &format!("/api/v1/rooms/{}/join", room_id),
            json!({"wallet": "bob"}),
        )
        .await;
        assert_eq!(late["code"], "ROOM_CLOSED");
    }

    #[tokio::test]
    async fn test_validation_and_list_filter() {
        let (app, _state) = app();

        let invalid = send(&app, "POST", "/api/v1/rooms", json!({"creatorWallet": ""})).await;
        assert_eq!(invalid["success"], false);
        assert_eq!(invalid["code"], "VALIDATION_ERROR");
        assert!(invalid["details"]["creator_wallet"].is_array());

        send(&app, "POST", "/api/v1/rooms", json!({"creatorWallet": "c1"})).await;

        let open = get_json(&app, "/api/v1/rooms?status=open").await;
        assert_eq!(open["data"]["total"], 1);
        let closed = get_json(&app, "/api/v1/rooms?status=closed").await;
        assert_eq!(closed["data"]["total"], 0);
        let bad = get_json(&app, "/api/v1/rooms?status=zombie").await;
        assert_eq!(bad["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let (app, state) = app();
        let room = state
            .rooms
            .create_room(NewRoom {
                creator_wallet: "creator".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let uri = format!("/api/v1/rooms/{}/leave", room.id);

        let first = send(&app, "POST", &uri, json!({"wallet": "creator"})).await;
        assert_eq!(first["data"]["left"], true);
        let second = send(&app, "POST", &uri, json!({"wallet": "creator"})).await;
        assert_eq!(second["success"], true);
        assert_eq!(second["data"]["left"], false);
    }
}
