//! 룸 서비스.
//!
//! REST/WebSocket 핸들러가 사용하는 단일 진입점입니다. 룸 상태 저장소의 상태 변경 뒤에
//! 저장소 write-through, 주소 관찰 조정, 브로드캐스트를 순서대로 수행합니다.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::store::{CreateRoomParams, JoinOutcome, RoomState, RoomStore};
use crate::auth::{check_room_password, prepare_room_password};
use crate::metrics::record_rooms_reaped;
use crate::repository::{RoomRepository, SharedInfoRepository, TokenRepository};
use crate::subscription::SubscriptionManager;
use crate::websocket::{BroadcastService, DeliveryReport, MemberEventData, RoomUpdateData, ServerMessage};
use traderoom_core::{
    Member, Room, RoomError, RoomResult, RoomStats, RoomStatus, SharedInfo, TokenInfo, TradeEvent,
};

/// 룸 생성 요청.
#[derive(Debug, Clone, Default)]
pub struct NewRoom {
    pub creator_wallet: String,
    pub token_address: Option<String>,
    pub recycle_hours: Option<i64>,
    pub password: Option<String>,
}

/// 공유 정보 요청.
#[derive(Debug, Clone, Default)]
pub struct NewSharedInfo {
    pub url: String,
    pub info_type: String,
    pub metadata: Option<serde_json::Value>,
}

/// `getStatus` 응답.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room: Room,
    pub members: Vec<Member>,
    pub token: Option<TokenInfo>,
    pub stats: RoomStats,
    pub connection_count: usize,
}

/// 룸 서비스.
#[derive(Clone)]
pub struct RoomService {
    store: Arc<RoomStore>,
    broadcast: BroadcastService,
    subscriptions: Arc<SubscriptionManager>,
    room_repo: Arc<dyn RoomRepository>,
    shared_info_repo: Arc<dyn SharedInfoRepository>,
    token_repo: Arc<dyn TokenRepository>,
}

impl RoomService {
    pub fn new(
        store: Arc<RoomStore>,
        broadcast: BroadcastService,
        subscriptions: Arc<SubscriptionManager>,
        room_repo: Arc<dyn RoomRepository>,
        shared_info_repo: Arc<dyn SharedInfoRepository>,
        token_repo: Arc<dyn TokenRepository>,
    ) -> Self {
        Self {
            store,
            broadcast,
            subscriptions,
            room_repo,
            shared_info_repo,
            token_repo,
        }
    }

    pub fn store(&self) -> &Arc<RoomStore> {
        &self.store
    }

    pub fn broadcast(&self) -> &BroadcastService {
        &self.broadcast
    }

    /// 룸 생성.
    ///
    /// 토큰 주소가 있으면 주소 관찰을 시작합니다. 프로바이더 구독은 백그라운드에서
    /// 진행되므로 결과를 기다리지 않습니다.
    pub async fn create_room(&self, request: NewRoom) -> RoomResult<Room> {
        let password_hash = prepare_room_password(request.password.as_deref())?;
        let room = self.store.create(
            CreateRoomParams {
                creator_wallet: request.creator_wallet,
                token_address: request.token_address,
                recycle_hours: request.recycle_hours,
                password_hash,
            },
            Utc::now(),
        )?;

        self.persist_room(&room).await;
        if let Ok(state) = self.store.get_status(&room.id) {
            for member in &state.members {
                self.persist_member(member).await;
            }
        }

        if let Some(token) = room.token_address.as_deref() {
            self.subscriptions.watch_room(token, &room.id);
        }

        tracing::info!(
            room_id = %room.id,
            wallet = %room.creator_wallet,
            token = room.token_address.as_deref().unwrap_or("-"),
            "Room created"
        );
        Ok(room)
    }

    /// 룸 참여.
    pub async fn join_room(
        &self,
        room_id: &str,
        wallet: &str,
        password: Option<&str>,
    ) -> RoomResult<JoinOutcome> {
        let room = self.store.get_room(room_id)?;
        if room.is_closed() {
            return Err(RoomError::ClosedRoom(room_id.to_string()));
        }
        check_room_password(&room, password)?;

        let outcome = self.store.join(room_id, wallet, Utc::now())?;
        self.persist_room(&outcome.room).await;
        self.persist_member(&outcome.member).await;

        if outcome.newly_joined {
            tracing::info!(room_id = %room_id, wallet = %wallet, "Member joined");
            self.announce(
                room_id,
                &ServerMessage::MemberJoined(MemberEventData::from(&outcome.member)),
            );
        }
        self.announce_room_update(room_id);

        Ok(outcome)
    }

    /// 룸 퇴장. 실제로 비활성화된 경우에만 알림을 보냅니다.
    ///
    /// 퇴장한 지갑의 WebSocket 연결은 닫힙니다.
    pub async fn leave_room(&self, room_id: &str, wallet: &str) -> RoomResult<Option<Member>> {
        let left = self.store.leave(room_id, wallet, Utc::now())?;

        if let Some(member) = &left {
            self.persist_member(member).await;
            let closed = self.broadcast.registry().close_wallet(room_id, wallet);
            tracing::info!(room_id = %room_id, wallet = %wallet, connections = closed, "Member left");
            self.announce(room_id, &ServerMessage::MemberLeft(MemberEventData::from(member)));
            self.announce_room_update(room_id);
        }
        Ok(left)
    }

    /// 룸 종료 (생성자 전용).
    pub async fn close_room(&self, room_id: &str, requester: &str) -> RoomResult<Room> {
        let room = self.store.close(room_id, requester, Utc::now())?;
        self.finalize_close(&room).await;
        tracing::info!(room_id = %room_id, wallet = %requester, "Room closed");
        Ok(room)
    }

    /// 만료된 룸을 종료하고 정리합니다. 이번에 종료된 룸 수를 반환합니다.
    pub async fn reap_expired(&self) -> usize {
        self.reap_expired_at(Utc::now()).await
    }

    pub async fn reap_expired_at(&self, now: DateTime<Utc>) -> usize {
        let closed = self.store.reap(now);
        for room in &closed {
            tracing::info!(room_id = %room.id, recycle_hours = room.recycle_hours, "Room expired");
            self.finalize_close(room).await;
        }
        record_rooms_reaped(closed.len());
        closed.len()
    }

    /// 종료 후처리: 마지막 상태 알림, 연결 정리, 주소 관찰 해제.
    async fn finalize_close(&self, room: &Room) {
        self.persist_room(room).await;

        let final_update = ServerMessage::RoomUpdate(RoomUpdateData::new(room, Vec::new()));
        let dropped = self.broadcast.close_room_connections(&room.id, &final_update);
        tracing::debug!(room_id = %room.id, connections = dropped, "Room connections closed");

        if let Some(token) = room.token_address.as_deref() {
            self.subscriptions.unwatch_room(token, &room.id);
        }
    }

    /// 정보 공유. 열린 룸의 활성 멤버만 가능합니다.
    pub async fn share_info(
        &self,
        room_id: &str,
        wallet: &str,
        request: NewSharedInfo,
    ) -> RoomResult<SharedInfo> {
        let room = self.store.get_room(room_id)?;
        if room.is_closed() {
            return Err(RoomError::ClosedRoom(room_id.to_string()));
        }
        if !self.store.is_active_member(room_id, wallet) {
            return Err(RoomError::Forbidden(format!(
                "룸의 활성 멤버가 아닙니다: {}",
                wallet
            )));
        }

        let now = Utc::now();
        let info = SharedInfo::new(
            Uuid::new_v4().to_string(),
            room_id,
            wallet,
            request.url,
            request.info_type,
            request.metadata,
            now,
        )?;

        if let Err(e) = self.shared_info_repo.append(&info).await {
            tracing::warn!(room_id = %room_id, error = %e, "Failed to persist shared info");
        }
        self.store.touch(room_id, wallet, now)?;
        self.announce(room_id, &ServerMessage::SharedInfo(info.clone()));

        Ok(info)
    }

    /// 공유 정보 목록 (오래된 순, 최근 `limit`건).
    pub async fn list_shared_info(&self, room_id: &str, limit: usize) -> RoomResult<Vec<SharedInfo>> {
        self.store.get_room(room_id)?;
        self.shared_info_repo.list_by_room(room_id, limit).await
    }

    /// 룸 상태 스냅샷. 상태를 변경하지 않습니다.
    pub async fn get_status(&self, room_id: &str) -> RoomResult<RoomSnapshot> {
        let RoomState { room, members, stats } = self.store.get_status(room_id)?;

        let token = match room.token_address.as_deref() {
            Some(mint) => match self.token_repo.find_by_mint_address(mint).await {
                Ok(token) => token,
                Err(e) => {
                    tracing::warn!(room_id = %room_id, mint = %mint, error = %e, "Token lookup failed");
                    None
                }
            },
            None => None,
        };

        Ok(RoomSnapshot {
            connection_count: self.broadcast.registry().connection_count(room_id),
            room,
            members,
            token,
            stats,
        })
    }

    /// 룸 목록.
    pub fn list_rooms(&self, status: Option<RoomStatus>) -> Vec<Room> {
        self.store.list(status)
    }

    /// 멤버/룸 활동 시각 갱신.
    pub fn touch(&self, room_id: &str, wallet: &str) -> RoomResult<()> {
        self.store.touch(room_id, wallet, Utc::now())
    }

    /// 라우팅된 거래를 룸 집계에 반영하고 `trade_event`를 브로드캐스트합니다.
    pub fn publish_trade(&self, room_id: &str, event: &TradeEvent) -> RoomResult<DeliveryReport> {
        self.store.record_trade(room_id, event)?;
        self.broadcast
            .broadcast_to_room(room_id, &ServerMessage::TradeEvent(event.clone()))
    }

    fn announce_room_update(&self, room_id: &str) {
        if let Ok(state) = self.store.get_status(room_id) {
            let active = state.members.iter().map(|m| m.wallet_address.clone()).collect();
            self.announce(
                room_id,
                &ServerMessage::RoomUpdate(RoomUpdateData::new(&state.room, active)),
            );
        }
    }

    /// 알림 전달 실패는 룸 작업을 실패시키지 않습니다.
    fn announce(&self, room_id: &str, message: &ServerMessage) {
        if let Err(e) = self.broadcast.broadcast_to_room(room_id, message) {
            tracing::debug!(room_id = %room_id, kind = message.kind(), error = %e, "Announcement not delivered");
        }
    }

    async fn persist_room(&self, room: &Room) {
        if let Err(e) = self.room_repo.save_room(room).await {
            tracing::warn!(room_id = %room.id, error = %e, "Failed to persist room");
        }
    }

    async fn persist_member(&self, member: &Member) {
        if let Err(e) = self.room_repo.save_member(member).await {
            tracing::warn!(
                room_id = %member.room_id,
                wallet = %member.wallet_address,
                error = %e,
                "Failed to persist member"
            );
        }
    }
}
