//! 저장소 협력자 인터페이스.
//!
//! 룸 상태의 원본은 [`crate::rooms::RoomStore`]이고, 저장소는 write-through 대상입니다.
//! 저장 실패는 로그로 남기고 룸 작업 자체를 실패시키지 않습니다.

mod memory;

use async_trait::async_trait;

use traderoom_core::{Member, Room, RoomResult, SharedInfo, TokenInfo};

pub use memory::{InMemoryRoomRepository, InMemorySharedInfoRepository, InMemoryTokenRepository};

// =============================================================================
// Repository Traits
// =============================================================================

/// 룸/멤버 저장소.
#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// 룸 저장 (upsert)
    async fn save_room(&self, room: &Room) -> RoomResult<()>;

    /// ID로 룸 조회
    async fn find_room(&self, room_id: &str) -> RoomResult<Option<Room>>;

    /// 멤버 저장 (room_id, wallet 기준 upsert)
    async fn save_member(&self, member: &Member) -> RoomResult<()>;

    /// 룸의 활성 멤버 목록
    async fn find_active_by_room(&self, room_id: &str) -> RoomResult<Vec<Member>>;
}

/// 공유 정보 저장소 (룸별 append-only 로그).
#[async_trait]
pub trait SharedInfoRepository: Send + Sync {
    /// 공유 정보 추가
    async fn append(&self, info: &SharedInfo) -> RoomResult<()>;

    /// 룸의 공유 정보 목록 (오래된 순)
    async fn list_by_room(&self, room_id: &str, limit: usize) -> RoomResult<Vec<SharedInfo>>;
}

/// 토큰 메타데이터 저장소.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// 민트 주소로 조회
    async fn find_by_mint_address(&self, mint: &str) -> RoomResult<Option<TokenInfo>>;

    /// 심볼로 조회 (대소문자 무시, 여러 건 가능)
    async fn find_by_symbol(&self, symbol: &str) -> RoomResult<Vec<TokenInfo>>;

    /// 토큰 저장 (민트 주소 기준 upsert)
    async fn upsert(&self, token: &TokenInfo) -> RoomResult<()>;
}
