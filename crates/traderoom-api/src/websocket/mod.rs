//! 룸 단위 실시간 WebSocket 서버.
//!
//! # 엔드포인트
//!
//! `GET /ws/rooms/{room_id}?wallet=<address>&password=<optional>`
//!
//! 연결되면 해당 지갑으로 룸에 참여합니다. `leave` 이후 소켓은 닫힙니다.
//!
//! # 메시지 형식
//!
//! 모든 메시지는 `{type, data}` JSON envelope로 교환됩니다.
//!
//! ## 클라이언트 → 서버
//!
//! ```json
//! {"type": "join", "data": {"password": "optional"}}
//! {"type": "leave"}
//! {"type": "share_info", "data": {"url": "https://...", "type": "chart"}}
//! {"type": "ping"}
//! ```
//!
//! ## 서버 → 클라이언트
//!
//! ```json
//! {"type": "member_joined", "data": {...}}
//! {"type": "member_left", "data": {...}}
//! {"type": "shared_info", "data": {...}}
//! {"type": "trade_event", "data": {...}}
//! {"type": "room_update", "data": {...}}
//! {"type": "pong", "data": {"timestamp": 1738300800000}}
//! {"type": "error", "data": {"code": "ROOM_CLOSED", "message": "..."}}
//! ```

pub mod broadcast;
pub mod handler;
pub mod messages;
pub mod registry;

pub use broadcast::{BroadcastService, DeliveryReport};
pub use handler::{room_socket_handler, websocket_router, ConnectQuery};
pub use messages::{
    ClientMessage, JoinData, MemberEventData, RoomUpdateData, ServerMessage, ShareInfoData, WsError,
};
pub use registry::{ConnectionHandle, ConnectionId, ConnectionInfo, ConnectionRegistry, Outbound};
