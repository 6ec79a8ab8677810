//! WebSocket 메시지 타입.
//!
//! 모든 메시지는 `{type, data}` envelope로 교환됩니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use traderoom_core::{Member, Room, RoomStatus, SharedInfo, TradeEvent};

/// WebSocket 에러.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("잘못된 메시지 형식: {0}")]
    InvalidMessage(String),
    #[error("알 수 없는 메시지 타입: {0}")]
    UnknownMessageType(String),
    #[error("직렬화 실패: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl WsError {
    /// 클라이언트에 전달할 에러 코드.
    pub fn code(&self) -> &'static str {
        match self {
            WsError::InvalidMessage(_) => "INVALID_MESSAGE",
            WsError::UnknownMessageType(_) => "UNKNOWN_MESSAGE_TYPE",
            WsError::SerializationError(_) => "SERIALIZATION_ERROR",
        }
    }
}

// ==================== 클라이언트 → 서버 메시지 ====================

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// `join` 데이터.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinData {
    #[serde(default)]
    pub password: Option<String>,
}

/// `share_info` 데이터.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareInfoData {
    pub url: String,
    #[serde(default, alias = "type")]
    pub info_type: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// 클라이언트에서 서버로 보내는 메시지.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// 룸 참여 (비밀번호 선택)
    Join(JoinData),
    /// 룸 퇴장
    Leave,
    /// 정보 공유
    ShareInfo(ShareInfoData),
    /// 핑 (연결 유지)
    Ping,
}

impl ClientMessage {
    /// JSON 문자열에서 파싱.
    ///
    /// `data`가 없거나 `null`이면 빈 객체로 취급합니다.
    pub fn from_json(json: &str) -> Result<Self, WsError> {
        let envelope: Envelope =
            serde_json::from_str(json).map_err(|e| WsError::InvalidMessage(e.to_string()))?;
        let data = match envelope.data {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        let parse_err = |e: serde_json::Error| WsError::InvalidMessage(e.to_string());
        match envelope.kind.as_str() {
            "join" => Ok(ClientMessage::Join(
                serde_json::from_value(data).map_err(parse_err)?,
            )),
            "leave" => Ok(ClientMessage::Leave),
            "share_info" => Ok(ClientMessage::ShareInfo(
                serde_json::from_value(data).map_err(parse_err)?,
            )),
            "ping" => Ok(ClientMessage::Ping),
            other => Err(WsError::UnknownMessageType(other.to_string())),
        }
    }
}

// ==================== 서버 → 클라이언트 메시지 ====================

/// 멤버 참여/퇴장 이벤트 데이터.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberEventData {
    pub room_id: String,
    pub wallet_address: String,
    pub at: DateTime<Utc>,
}

impl From<&Member> for MemberEventData {
    fn from(member: &Member) -> Self {
        Self {
            room_id: member.room_id.clone(),
            wallet_address: member.wallet_address.clone(),
            at: member.leave_time.unwrap_or(member.last_active_time),
        }
    }
}

/// 룸 상태 업데이트 데이터.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUpdateData {
    pub room_id: String,
    pub status: RoomStatus,
    pub token_address: Option<String>,
    pub active_members: Vec<String>,
    pub last_active_time: DateTime<Utc>,
}

impl RoomUpdateData {
    pub fn new(room: &Room, active_members: Vec<String>) -> Self {
        Self {
            room_id: room.id.clone(),
            status: room.status,
            token_address: room.token_address.clone(),
            active_members,
            last_active_time: room.last_active_time,
        }
    }
}

/// 서버에서 클라이언트로 보내는 메시지.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// 멤버 참여
    MemberJoined(MemberEventData),
    /// 멤버 퇴장
    MemberLeft(MemberEventData),
    /// 공유 정보
    SharedInfo(SharedInfo),
    /// 라우팅된 거래 이벤트
    TradeEvent(TradeEvent),
    /// 룸 상태 변경
    RoomUpdate(RoomUpdateData),
    /// 퐁 응답
    Pong {
        /// 서버 타임스탬프 (밀리초)
        timestamp: i64,
    },
    /// 에러
    Error {
        /// 에러 코드
        code: String,
        /// 에러 메시지
        message: String,
    },
}

impl ServerMessage {
    /// JSON 문자열로 직렬화.
    pub fn to_json(&self) -> Result<String, WsError> {
        serde_json::to_string(self).map_err(WsError::from)
    }

    /// 팬아웃용 공유 프레임으로 직렬화합니다 (한 번만 직렬화).
    pub fn to_frame(&self) -> Result<Arc<str>, WsError> {
        Ok(Arc::from(self.to_json()?))
    }

    /// 에러 메시지 생성 헬퍼.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// 퐁 메시지 생성 헬퍼.
    pub fn pong() -> Self {
        ServerMessage::Pong {
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// 메시지 타입 이름 (로그용).
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::MemberJoined(_) => "member_joined",
            ServerMessage::MemberLeft(_) => "member_left",
            ServerMessage::SharedInfo(_) => "shared_info",
            ServerMessage::TradeEvent(_) => "trade_event",
            ServerMessage::RoomUpdate(_) => "room_update",
            ServerMessage::Pong { .. } => "pong",
            ServerMessage::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use traderoom_core::NATIVE_QUOTE_MINT;

    #[test]
    fn test_parse_client_messages() {
        assert!(matches!(
            ClientMessage::from_json(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping
        ));
        assert!(matches!(
            ClientMessage::from_json(r#"{"type":"leave","data":{}}"#).unwrap(),
            ClientMessage::Leave
        ));

        match ClientMessage::from_json(r#"{"type":"join","data":{"password":"pw"}}"#).unwrap() {
            ClientMessage::Join(data) => assert_eq!(data.password.as_deref(), Some("pw")),
            other => panic!("unexpected: {:?}", other),
        }

        match ClientMessage::from_json(
            r#"{"type":"share_info","data":{"url":"https://x.io","type":"chart"}}"#,
        )
        .unwrap()
        {
            ClientMessage::ShareInfo(data) => {
                assert_eq!(data.url, "https://x.io");
                assert_eq!(data.info_type, "chart");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            ClientMessage::from_json("not json"),
            Err(WsError::InvalidMessage(_))
        ));
        assert!(matches!(
            ClientMessage::from_json(r#"{"type":"subscribe"}"#),
            Err(WsError::UnknownMessageType(_))
        ));
        assert!(matches!(
            ClientMessage::from_json(r#"{"type":"share_info","data":{}}"#),
            Err(WsError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_server_message_envelope() {
        let event = TradeEvent::builder("sig1", "wallet")
            .input(NATIVE_QUOTE_MINT, dec!(1))
            .output("MintX", dec!(10))
            .build(NATIVE_QUOTE_MINT);
        let json: Value = serde_json::from_str(&ServerMessage::TradeEvent(event).to_json().unwrap())
            .unwrap();
        assert_eq!(json["type"], "trade_event");
        assert_eq!(json["data"]["signature"], "sig1");

        let pong: Value = serde_json::from_str(&ServerMessage::pong().to_json().unwrap()).unwrap();
        assert_eq!(pong["type"], "pong");
        assert!(pong["data"]["timestamp"].is_i64());

        let err: Value =
            serde_json::from_str(&ServerMessage::error("ROOM_CLOSED", "closed").to_json().unwrap())
                .unwrap();
        assert_eq!(err["data"]["code"], "ROOM_CLOSED");
    }
}
