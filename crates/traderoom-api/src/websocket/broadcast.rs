//! 룸 브로드캐스트 서비스.
//!
//! 룸 상태 저장소와 연결 레지스트리를 조합하여 룸에 등록된 연결 전체, 또는 단일 연결에
//! 메시지를 전달합니다. 레지스트리에는 활성 멤버의 연결만 등록됩니다.
//! 메시지는 한 번만 직렬화하고 연결별 송신 큐에 `try_send`로 넣으므로
//! 느린 소켓 하나가 룸 전체 팬아웃을 멈추지 않습니다.
//!
//! 같은 생산자가 순서대로 제출한 메시지는 각 연결 큐에 같은 순서로 들어갑니다.

use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;

use super::messages::ServerMessage;
use super::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, Outbound};
use crate::metrics::record_delivery_failure;
use crate::rooms::RoomStore;
use traderoom_core::{RoomError, RoomResult};

/// 브로드캐스트 결과.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// 큐에 전달된 연결 수
    pub delivered: usize,
    /// 전달 실패로 제거된 연결 수
    pub failed: usize,
}

/// 브로드캐스트 서비스.
#[derive(Clone)]
pub struct BroadcastService {
    rooms: Arc<RoomStore>,
    registry: Arc<ConnectionRegistry>,
    require_recipients: bool,
}

impl BroadcastService {
    pub fn new(rooms: Arc<RoomStore>, registry: Arc<ConnectionRegistry>, require_recipients: bool) -> Self {
        Self {
            rooms,
            registry,
            require_recipients,
        }
    }

    /// 연결 레지스트리.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// 룸에 등록된 연결 전체에 메시지를 전달합니다.
    ///
    /// 종료된 룸이면 `ClosedRoom`. 개별 연결 실패는 해당 연결만 제거하고 계속 진행합니다.
    /// `require_recipients`가 켜져 있고 수신자가 없으면 `NotFound`를 반환합니다.
    pub fn broadcast_to_room(&self, room_id: &str, message: &ServerMessage) -> RoomResult<DeliveryReport> {
        if self.rooms.get_room(room_id)?.is_closed() {
            return Err(RoomError::ClosedRoom(room_id.to_string()));
        }

        let recipients = self.registry.snapshot(room_id);

        if recipients.is_empty() {
            if self.require_recipients {
                return Err(RoomError::NotFound(format!(
                    "룸에 연결된 수신자가 없습니다: {}",
                    room_id
                )));
            }
            return Ok(DeliveryReport::default());
        }

        let frame = message
            .to_frame()
            .map_err(|e| RoomError::Internal(e.to_string()))?;

        let report = self.fan_out(&recipients, &frame);
        tracing::debug!(
            room_id = %room_id,
            kind = message.kind(),
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast delivered"
        );
        Ok(report)
    }

    /// 단일 연결에 메시지를 전달합니다 (pong, error 등 직접 응답).
    pub fn send_to_connection(&self, connection_id: ConnectionId, message: &ServerMessage) -> RoomResult<()> {
        let handle = self
            .registry
            .get(connection_id)
            .ok_or_else(|| RoomError::NotFound(format!("연결을 찾을 수 없습니다: {}", connection_id)))?;

        let frame = message
            .to_frame()
            .map_err(|e| RoomError::Internal(e.to_string()))?;

        self.deliver(&handle, &frame)
    }

    /// 룸 종료 시 마지막 메시지를 모든 연결에 보내고 연결을 정리합니다.
    pub fn close_room_connections(&self, room_id: &str, final_message: &ServerMessage) -> usize {
        let handles = self.registry.snapshot(room_id);
        if let Ok(frame) = final_message.to_frame() {
            self.fan_out(&handles, &frame);
        }
        self.registry.close_room(room_id)
    }

    fn fan_out(&self, handles: &[ConnectionHandle], frame: &Arc<str>) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for handle in handles {
            match self.deliver(handle, frame) {
                Ok(()) => report.delivered += 1,
                Err(_) => report.failed += 1,
            }
        }
        report
    }

    /// 실패한 연결은 레지스트리에서 제거합니다.
    fn deliver(&self, handle: &ConnectionHandle, frame: &Arc<str>) -> RoomResult<()> {
        match handle.sender().try_send(Outbound::Frame(frame.clone())) {
            Ok(()) => Ok(()),
            Err(err) => {
                let reason = match err {
                    TrySendError::Full(_) => "send queue full",
                    TrySendError::Closed(_) => "connection closed",
                };
                tracing::warn!(
                    room_id = %handle.room_id,
                    wallet = %handle.wallet,
                    connection_id = handle.id,
                    reason,
                    "Delivery failed, dropping connection"
                );
                record_delivery_failure();
                self.registry.unregister(handle.id);
                Err(RoomError::Transport(format!(
                    "연결 {} 전달 실패: {}",
                    handle.id, reason
                )))
            }
        }
    }
}
