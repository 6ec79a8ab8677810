//! WebSocket 연결 handler.
//!
//! `GET /ws/rooms/{room_id}?wallet=...&password=...`
//!
//! 업그레이드 전에 룸 존재/종료 여부와 비밀번호를 확인합니다. 업그레이드 후에는 연결을
//! 레지스트리에 등록하고 곧바로 룸에 참여시키므로, 등록된 연결은 항상 활성 멤버의 연결입니다.
//! 참여에 실패하면(그 사이 룸이 종료된 경우 등) 에러를 보내고 연결을 닫습니다.
//! `leave`는 멤버십을 비활성화하고 해당 지갑의 연결을 닫습니다.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::messages::{ClientMessage, ServerMessage};
use super::registry::{ConnectionId, Outbound};
use crate::auth::check_room_password;
use crate::error::ApiResponse;
use crate::metrics::{decrement_websocket_connections, increment_websocket_connections};
use crate::rooms::NewSharedInfo;
use crate::state::AppState;
use traderoom_core::RoomError;

/// 연결 쿼리 파라미터.
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    #[serde(default)]
    pub wallet: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// WebSocket 업그레이드 핸들러.
///
/// 지갑 주소가 없거나, 룸이 없거나, 종료된 룸이면 업그레이드하지 않고 실패 envelope를 반환합니다.
pub async fn room_socket_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(query): Query<ConnectQuery>,
) -> Response {
    let wallet = query.wallet.trim().to_string();
    if wallet.is_empty() {
        return ApiResponse::<()>::fail(RoomError::Validation("wallet 파라미터가 필요합니다".into()))
            .into_response();
    }

    match state.rooms.store().get_room(&room_id) {
        Ok(room) if room.is_closed() => {
            return ApiResponse::<()>::fail(RoomError::ClosedRoom(room_id)).into_response();
        }
        Ok(room) => {
            if let Err(e) = check_room_password(&room, query.password.as_deref()) {
                return ApiResponse::<()>::fail(e).into_response();
            }
        }
        Err(e) => return ApiResponse::<()>::fail(e).into_response(),
    }

    let password = query.password;
    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| handle_socket(socket, state, room_id, wallet, password))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

/// WebSocket 연결 처리.
async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    room_id: String,
    wallet: String,
    password: Option<String>,
) {
    let settings = &state.config.websocket;
    let (tx, rx) = mpsc::channel(settings.outbound_buffer);
    let handle = state.registry.register(&room_id, &wallet, tx);
    let connection_id = handle.id;
    let cancel = handle.cancel_token();

    increment_websocket_connections();
    info!(room_id = %room_id, wallet = %wallet, connection_id, "WebSocket connected");

    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(write_loop(sink, rx, cancel.clone(), settings.write_timeout()));

    join_on_connect(&state, &room_id, &wallet, password.as_deref(), connection_id).await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_client_message(&state, &room_id, &wallet, connection_id, text.as_str()).await;
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    state.registry.touch(connection_id);
                }
                Some(Ok(Message::Binary(_))) => {
                    reply(
                        &state,
                        connection_id,
                        ServerMessage::error("INVALID_MESSAGE", "바이너리 메시지는 지원하지 않습니다"),
                    );
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(connection_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
        }
    }

    // 룸 멤버십은 연결 종료와 무관하게 유지됩니다
    state.registry.unregister(connection_id);
    cancel.cancel();
    let _ = writer.await;

    decrement_websocket_connections();
    info!(room_id = %room_id, wallet = %wallet, connection_id, "WebSocket disconnected");
}

/// 연결별 송신 큐를 소켓으로 흘려보냅니다.
///
/// 쓰기가 `write_timeout` 안에 끝나지 않거나 실패하면 연결을 종료합니다.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    cancel: CancellationToken,
    write_timeout: Duration,
) {
    let mut send_close = true;

    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = rx.recv() => item,
        };

        match item {
            Some(Outbound::Frame(frame)) => {
                match tokio::time::timeout(write_timeout, sink.send(Message::Text(frame.as_ref().into())))
                    .await
                {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(error = %e, "WebSocket write failed");
                        send_close = false;
                        break;
                    }
                    Err(_) => {
                        warn!(timeout_ms = write_timeout.as_millis() as u64, "WebSocket write timed out");
                        send_close = false;
                        break;
                    }
                }
            }
            Some(Outbound::Close) | None => break,
        }
    }

    if send_close {
        let _ = tokio::time::timeout(write_timeout, sink.send(Message::Close(None))).await;
    }
    cancel.cancel();
}

/// 등록 직후 룸 참여. 실패하면 에러를 보낸 뒤 연결을 닫고 `false`.
async fn join_on_connect(
    state: &AppState,
    room_id: &str,
    wallet: &str,
    password: Option<&str>,
    connection_id: ConnectionId,
) -> bool {
    match state.rooms.join_room(room_id, wallet, password).await {
        Ok(_) => true,
        Err(e) => {
            debug!(room_id = %room_id, wallet = %wallet, code = e.code(), error = %e, "Join on connect rejected");
            reply(state, connection_id, ServerMessage::error(e.code(), e.to_string()));
            state.registry.close_connection(connection_id);
            false
        }
    }
}

/// 클라이언트 메시지 처리. 에러는 보낸 연결에만 응답합니다.
async fn handle_client_message(
    state: &AppState,
    room_id: &str,
    wallet: &str,
    connection_id: ConnectionId,
    text: &str,
) {
    let message = match ClientMessage::from_json(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(connection_id, error = %e, "Invalid client message");
            reply(state, connection_id, ServerMessage::error(e.code(), e.to_string()));
            return;
        }
    };

    let result = match message {
        ClientMessage::Join(data) => state
            .rooms
            .join_room(room_id, wallet, data.password.as_deref())
            .await
            .map(|_| ()),
        ClientMessage::Leave => state.rooms.leave_room(room_id, wallet).await.map(|_| ()),
        ClientMessage::ShareInfo(data) => state
            .rooms
            .share_info(
                room_id,
                wallet,
                NewSharedInfo {
                    url: data.url,
                    info_type: data.info_type,
                    metadata: data.metadata,
                },
            )
            .await
            .map(|_| ()),
        ClientMessage::Ping => {
            state.registry.touch(connection_id);
            if state.rooms.store().is_active_member(room_id, wallet) {
                if let Err(e) = state.rooms.touch(room_id, wallet) {
                    debug!(room_id = %room_id, error = %e, "Touch on ping failed");
                }
            }
            reply(state, connection_id, ServerMessage::pong());
            Ok(())
        }
    };

    if let Err(e) = result {
        debug!(room_id = %room_id, wallet = %wallet, code = e.code(), error = %e, "Client request rejected");
        reply(state, connection_id, ServerMessage::error(e.code(), e.to_string()));
    }
}

fn reply(state: &AppState, connection_id: ConnectionId, message: ServerMessage) {
    if let Err(e) = state.rooms.broadcast().send_to_connection(connection_id, &message) {
        debug!(connection_id, error = %e, "Direct reply not delivered");
    }
}

/// WebSocket 라우터 (`/ws` 하위에 마운트).
pub fn websocket_router() -> Router<Arc<AppState>> {
    Router::new().route("/rooms/{room_id}", get(room_socket_handler))
}
