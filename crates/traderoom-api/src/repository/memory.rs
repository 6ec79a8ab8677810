//! 인메모리 저장소 구현.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{RoomRepository, SharedInfoRepository, TokenRepository};
use traderoom_core::{Member, Room, RoomResult, SharedInfo, TokenInfo};

/// 인메모리 룸 저장소.
#[derive(Debug, Default)]
pub struct InMemoryRoomRepository {
    rooms: DashMap<String, Room>,
    members: DashMap<(String, String), Member>,
}

impl InMemoryRoomRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomRepository for InMemoryRoomRepository {
    async fn save_room(&self, room: &Room) -> RoomResult<()> {
        self.rooms.insert(room.id.clone(), room.clone());
        Ok(())
    }

    async fn find_room(&self, room_id: &str) -> RoomResult<Option<Room>> {
        Ok(self.rooms.get(room_id).map(|r| r.value().clone()))
    }

    async fn save_member(&self, member: &Member) -> RoomResult<()> {
        self.members.insert(
            (member.room_id.clone(), member.wallet_address.clone()),
            member.clone(),
        );
        Ok(())
    }

    async fn find_active_by_room(&self, room_id: &str) -> RoomResult<Vec<Member>> {
        let mut members: Vec<Member> = self
            .members
            .iter()
            .filter(|entry| entry.key().0 == room_id && entry.value().active)
            .map(|entry| entry.value().clone())
            .collect();
        members.sort_by(|a, b| a.join_time.cmp(&b.join_time));
        Ok(members)
    }
}

/// 인메모리 공유 정보 저장소.
#[derive(Debug, Default)]
pub struct InMemorySharedInfoRepository {
    by_room: DashMap<String, Vec<SharedInfo>>,
}

impl InMemorySharedInfoRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedInfoRepository for InMemorySharedInfoRepository {
    async fn append(&self, info: &SharedInfo) -> RoomResult<()> {
        self.by_room
            .entry(info.room_id.clone())
            .or_default()
            .push(info.clone());
        Ok(())
    }

    async fn list_by_room(&self, room_id: &str, limit: usize) -> RoomResult<Vec<SharedInfo>> {
        Ok(self
            .by_room
            .get(room_id)
            .map(|entries| {
                let skip = entries.len().saturating_sub(limit);
                entries.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default())
    }
}

/// 인메모리 토큰 저장소.
#[derive(Debug, Default)]
pub struct InMemoryTokenRepository {
    tokens: DashMap<String, TokenInfo>,
}

impl InMemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenRepository for InMemoryTokenRepository {
    async fn find_by_mint_address(&self, mint: &str) -> RoomResult<Option<TokenInfo>> {
        Ok(self.tokens.get(mint).map(|t| t.value().clone()))
    }

    async fn find_by_symbol(&self, symbol: &str) -> RoomResult<Vec<TokenInfo>> {
        Ok(self
            .tokens
            .iter()
            .filter(|entry| entry.value().symbol.eq_ignore_ascii_case(symbol))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn upsert(&self, token: &TokenInfo) -> RoomResult<()> {
        self.tokens
            .insert(token.mint_address.clone(), token.clone());
        Ok(())
    }
}
