//! 룸 상태 저장소.
//!
//! 룸/멤버 엔티티와 상태 머신의 유일한 소유자입니다. 룸별 엔트리는 `DashMap` 샤드
//! 잠금으로 보호되므로 서로 다른 룸에 대한 작업은 서로를 막지 않습니다.
//! I/O는 하지 않으며, 영속화와 알림은 [`super::RoomService`]가 담당합니다.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use traderoom_core::{Member, Room, RoomError, RoomResult, RoomStats, RoomStatus, TradeEvent};

/// 룸 생성 파라미터.
#[derive(Debug, Clone, Default)]
pub struct CreateRoomParams {
    pub creator_wallet: String,
    pub token_address: Option<String>,
    /// None이면 기본값 사용
    pub recycle_hours: Option<i64>,
    /// 이미 해싱된 비밀번호
    pub password_hash: Option<String>,
}

/// 참여 결과.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub room: Room,
    pub member: Member,
    /// 새로 활성화되었는지 여부 (이미 활성 멤버였다면 false)
    pub newly_joined: bool,
}

/// 읽기 전용 룸 상태 스냅샷.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub room: Room,
    pub members: Vec<Member>,
    pub stats: RoomStats,
}

#[derive(Debug)]
struct RoomEntry {
    room: Room,
    members: HashMap<String, Member>,
    stats: RoomStats,
}

impl RoomEntry {
    fn active_members(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self.members.values().filter(|m| m.active).cloned().collect();
        members.sort_by(|a, b| {
            a.join_time
                .cmp(&b.join_time)
                .then_with(|| a.wallet_address.cmp(&b.wallet_address))
        });
        members
    }

    fn is_active_member(&self, wallet: &str) -> bool {
        self.members.get(wallet).is_some_and(|m| m.active)
    }
}

/// 룸 상태 저장소.
#[derive(Debug)]
pub struct RoomStore {
    rooms: DashMap<String, RoomEntry>,
    default_recycle_hours: i64,
    quote_mint: String,
}

impl RoomStore {
    pub fn new(default_recycle_hours: i64, quote_mint: impl Into<String>) -> Self {
        Self {
            rooms: DashMap::new(),
            default_recycle_hours,
            quote_mint: quote_mint.into(),
        }
    }

    /// 룸 생성. `Creating`으로 만든 뒤 즉시 `Open`으로 전이하고 생성자를 첫 멤버로 등록합니다.
    pub fn create(&self, params: CreateRoomParams, now: DateTime<Utc>) -> RoomResult<Room> {
        let creator = params.creator_wallet.trim();
        if creator.is_empty() {
            return Err(RoomError::Validation("생성자 지갑 주소가 비어 있습니다".into()));
        }

        let token_address = params
            .token_address
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let mut room = Room::new(
            Uuid::new_v4().to_string(),
            creator,
            token_address,
            params.recycle_hours.unwrap_or(self.default_recycle_hours),
            params.password_hash,
            now,
        )?;
        room.open(now)?;
        room.add_member_wallet(creator);

        let mut members = HashMap::new();
        members.insert(creator.to_string(), Member::new(&room.id, creator, now));

        self.rooms.insert(
            room.id.clone(),
            RoomEntry {
                room: room.clone(),
                members,
                stats: RoomStats::default(),
            },
        );

        Ok(room)
    }

    /// 룸 참여. 이미 활성 멤버이면 활동 시각만 갱신합니다.
    ///
    /// 비밀번호 검증은 호출자가 [`RoomStore::get_room`]으로 해시를 얻어 먼저 수행합니다.
    pub fn join(&self, room_id: &str, wallet: &str, now: DateTime<Utc>) -> RoomResult<JoinOutcome> {
        let wallet = wallet.trim();
        if wallet.is_empty() {
            return Err(RoomError::Validation("지갑 주소가 비어 있습니다".into()));
        }

        let mut entry = self.entry_mut(room_id)?;
        if entry.room.is_closed() {
            return Err(RoomError::ClosedRoom(room_id.to_string()));
        }

        let (member, newly_joined) = match entry.members.get_mut(wallet) {
            Some(existing) => {
                let reactivated = existing.reactivate(now);
                (existing.clone(), reactivated)
            }
            None => {
                let member = Member::new(room_id, wallet, now);
                entry.members.insert(wallet.to_string(), member.clone());
                (member, true)
            }
        };

        entry.room.add_member_wallet(wallet);
        entry.room.touch(now);

        Ok(JoinOutcome {
            room: entry.room.clone(),
            member,
            newly_joined,
        })
    }

    /// 룸 퇴장. 실제로 비활성화된 경우에만 멤버를 반환합니다.
    pub fn leave(&self, room_id: &str, wallet: &str, now: DateTime<Utc>) -> RoomResult<Option<Member>> {
        let mut entry = self.entry_mut(room_id)?;

        let left = entry
            .members
            .get_mut(wallet)
            .and_then(|member| member.deactivate(now).then(|| member.clone()));

        if left.is_some() {
            entry.room.touch(now);
        }
        Ok(left)
    }

    /// 룸 종료. 생성자만 가능하며 종료는 최종 상태입니다.
    pub fn close(&self, room_id: &str, requester: &str, now: DateTime<Utc>) -> RoomResult<Room> {
        let mut entry = self.entry_mut(room_id)?;

        if entry.room.creator_wallet != requester {
            return Err(RoomError::Forbidden(format!(
                "룸 생성자만 종료할 수 있습니다: {}",
                room_id
            )));
        }

        Self::close_entry(&mut entry, now)?;
        Ok(entry.room.clone())
    }

    fn close_entry(entry: &mut RoomEntry, now: DateTime<Utc>) -> RoomResult<()> {
        entry.room.close(now)?;
        for member in entry.members.values_mut() {
            member.deactivate(now);
        }
        Ok(())
    }

    /// 재활용 시간이 지난 열린 룸을 종료하고, 종료된 지 재활용 시간이 지난 룸은 제거합니다.
    ///
    /// 이번 호출에서 종료된 룸 목록을 반환합니다.
    pub fn reap(&self, now: DateTime<Utc>) -> Vec<Room> {
        let mut closed = Vec::new();

        for mut entry in self.rooms.iter_mut() {
            if entry.room.status == RoomStatus::Open && entry.room.is_expired(now) {
                if Self::close_entry(&mut entry, now).is_ok() {
                    closed.push(entry.room.clone());
                }
            }
        }

        self.rooms.retain(|_, entry| match entry.room.closed_at {
            Some(closed_at) => now - closed_at <= Duration::hours(entry.room.recycle_hours),
            None => true,
        });

        closed
    }

    /// 룸 조회.
    pub fn get_room(&self, room_id: &str) -> RoomResult<Room> {
        self.rooms
            .get(room_id)
            .map(|entry| entry.room.clone())
            .ok_or_else(|| RoomError::NotFound(format!("룸을 찾을 수 없습니다: {}", room_id)))
    }

    /// 읽기 전용 상태 스냅샷. 상태를 변경하지 않습니다.
    pub fn get_status(&self, room_id: &str) -> RoomResult<RoomState> {
        let entry = self
            .rooms
            .get(room_id)
            .ok_or_else(|| RoomError::NotFound(format!("룸을 찾을 수 없습니다: {}", room_id)))?;

        Ok(RoomState {
            room: entry.room.clone(),
            members: entry.active_members(),
            stats: entry.stats.clone(),
        })
    }

    /// 활성 멤버 여부.
    pub fn is_active_member(&self, room_id: &str, wallet: &str) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|entry| entry.is_active_member(wallet))
    }

    /// 멤버와 룸의 활동 시각 갱신.
    pub fn touch(&self, room_id: &str, wallet: &str, now: DateTime<Utc>) -> RoomResult<()> {
        let mut entry = self.entry_mut(room_id)?;
        if entry.room.is_closed() {
            return Err(RoomError::ClosedRoom(room_id.to_string()));
        }
        if let Some(member) = entry.members.get_mut(wallet) {
            if member.active {
                member.last_active_time = now;
            }
        }
        entry.room.touch(now);
        Ok(())
    }

    /// 룸 목록 (최근 생성 순).
    pub fn list(&self, status: Option<RoomStatus>) -> Vec<Room> {
        let mut rooms: Vec<Room> = self
            .rooms
            .iter()
            .filter(|entry| status.map_or(true, |s| entry.room.status == s))
            .map(|entry| entry.room.clone())
            .collect();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        rooms
    }

    /// 라우팅된 거래를 룸 집계에 반영합니다.
    pub fn record_trade(&self, room_id: &str, event: &TradeEvent) -> RoomResult<()> {
        let mut entry = self.entry_mut(room_id)?;
        if entry.room.is_closed() {
            return Err(RoomError::ClosedRoom(room_id.to_string()));
        }
        let signer_is_member = entry.is_active_member(&event.signer);
        entry.stats.apply(event, &self.quote_mint, signer_is_member);
        Ok(())
    }

    /// 저장된 룸 수 (종료된 룸 포함).
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// 열린 룸 수.
    pub fn open_count(&self) -> usize {
        self.rooms
            .iter()
            .filter(|entry| entry.room.status == RoomStatus::Open)
            .count()
    }

    fn entry_mut(
        &self,
        room_id: &str,
    ) -> RoomResult<dashmap::mapref::one::RefMut<'_, String, RoomEntry>> {
        self.rooms
            .get_mut(room_id)
            .ok_or_else(|| RoomError::NotFound(format!("룸을 찾을 수 없습니다: {}", room_id)))
    }

    #[cfg(test)]
    pub(crate) fn set_last_active(&self, room_id: &str, at: DateTime<Utc>) {
        if let Some(mut entry) = self.rooms.get_mut(room_id) {
            entry.room.last_active_time = at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use traderoom_core::NATIVE_QUOTE_MINT;

    fn store() -> RoomStore {
        RoomStore::new(24, NATIVE_QUOTE_MINT)
    }

    fn create(store: &RoomStore, creator: &str) -> Room {
        store
            .create(
                CreateRoomParams {
                    creator_wallet: creator.into(),
                    token_address: Some("MintX".into()),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap()
    }

    #[test]
    fn test_create_opens_room_and_joins_creator() {
        let store = store();
        let room = create(&store, "creator");

        assert_eq!(room.status, RoomStatus::Open);
        assert_eq!(room.recycle_hours, 24);
        assert!(store.is_active_member(&room.id, "creator"));
    }

    #[test]
    fn test_create_rejects_non_positive_recycle_hours() {
        let result = store().create(
            CreateRoomParams {
                creator_wallet: "c".into(),
                recycle_hours: Some(0),
                ..Default::default()
            },
            Utc::now(),
        );
        assert!(matches!(result, Err(RoomError::Validation(_))));
    }

    #[test]
    fn test_join_is_idempotent() {
        let store = store();
        let room = create(&store, "creator");

        let first = store.join(&room.id, "wallet-a", Utc::now()).unwrap();
        assert!(first.newly_joined);

        let second = store.join(&room.id, "wallet-a", Utc::now()).unwrap();
        assert!(!second.newly_joined);

        let state = store.get_status(&room.id).unwrap();
        assert_eq!(state.members.len(), 2);
    }

    #[test]
    fn test_join_missing_room() {
        let result = store().join("nope", "wallet", Utc::now());
        assert!(matches!(result, Err(RoomError::NotFound(_))));
    }

    #[test]
    fn test_leave_is_noop_when_inactive() {
        let store = store();
        let room = create(&store, "creator");
        store.join(&room.id, "wallet-a", Utc::now()).unwrap();

        assert!(store.leave(&room.id, "wallet-a", Utc::now()).unwrap().is_some());
        assert!(store.leave(&room.id, "wallet-a", Utc::now()).unwrap().is_none());
        assert!(store.leave(&room.id, "stranger", Utc::now()).unwrap().is_none());
    }

    #[test]
    fn test_rejoin_reactivates() {
        let store = store();
        let room = create(&store, "creator");
        store.join(&room.id, "wallet-a", Utc::now()).unwrap();
        store.leave(&room.id, "wallet-a", Utc::now()).unwrap();

        let outcome = store.join(&room.id, "wallet-a", Utc::now()).unwrap();
        assert!(outcome.newly_joined);
        assert!(outcome.member.leave_time.is_none());
        assert_eq!(
            outcome.room.member_wallets.iter().filter(|w| *w == "wallet-a").count(),
            1
        );
    }

    #[test]
    fn test_close_requires_creator_and_is_terminal() {
        let store = store();
        let room = create(&store, "creator");

        assert!(matches!(
            store.close(&room.id, "intruder", Utc::now()),
            Err(RoomError::Forbidden(_))
        ));

        let closed = store.close(&room.id, "creator", Utc::now()).unwrap();
        assert_eq!(closed.status, RoomStatus::Closed);

        assert!(matches!(
            store.close(&room.id, "creator", Utc::now()),
            Err(RoomError::ClosedRoom(_))
        ));
        assert!(matches!(
            store.join(&room.id, "wallet-a", Utc::now()),
            Err(RoomError::ClosedRoom(_))
        ));
        assert!(store.get_status(&room.id).unwrap().members.is_empty());
    }

    #[test]
    fn test_reap_closes_expired_rooms() {
        let store = store();
        let room = store
            .create(
                CreateRoomParams {
                    creator_wallet: "creator".into(),
                    recycle_hours: Some(1),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap();
        let fresh = create(&store, "other");

        let now = Utc::now();
        store.set_last_active(&room.id, now - Duration::hours(2));

        let reaped = store.reap(now);
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].id, room.id);
        assert_eq!(store.get_room(&fresh.id).unwrap().status, RoomStatus::Open);
        assert!(matches!(
            store.join(&room.id, "wallet-a", now),
            Err(RoomError::ClosedRoom(_))
        ));

        // 종료 후 재활용 시간이 지나면 제거
        store.reap(now + Duration::hours(2));
        assert!(matches!(store.get_room(&room.id), Err(RoomError::NotFound(_))));
    }

    #[test]
    fn test_get_status_does_not_mutate() {
        let store = store();
        let room = create(&store, "creator");
        let before = store.get_room(&room.id).unwrap();
        let _ = store.get_status(&room.id).unwrap();
        let after = store.get_room(&room.id).unwrap();
        assert_eq!(before.last_active_time, after.last_active_time);
    }

    #[test]
    fn test_record_trade_updates_stats() {
        let store = store();
        let room = create(&store, "creator");
        let event = TradeEvent::builder("sig1", "creator")
            .input(NATIVE_QUOTE_MINT, dec!(3))
            .output("MintX", dec!(100))
            .build(NATIVE_QUOTE_MINT);

        store.record_trade(&room.id, &event).unwrap();
        let state = store.get_status(&room.id).unwrap();
        assert_eq!(state.stats.trade_count, 1);
        assert_eq!(state.stats.buy_volume, dec!(3));
        assert_eq!(state.stats.member_pnl.get("creator"), Some(&dec!(-3)));

        store.close(&room.id, "creator", Utc::now()).unwrap();
        assert!(matches!(
            store.record_trade(&room.id, &event),
            Err(RoomError::ClosedRoom(_))
        ));
    }

    #[test]
    fn test_list_filters_by_status() {
        let store = store();
        let a = create(&store, "a");
        create(&store, "b");
        store.close(&a.id, "a", Utc::now()).unwrap();

        assert_eq!(store.list(None).len(), 2);
        assert_eq!(store.list(Some(RoomStatus::Open)).len(), 1);
        assert_eq!(store.list(Some(RoomStatus::Closed))[0].id, a.id);
        assert_eq!(store.open_count(), 1);
    }
}
