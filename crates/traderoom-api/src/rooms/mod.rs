//! 트레이드 룸.
//!
//! - [`RoomStore`]: 룸/멤버 상태 머신 (in-memory, 동시성 안전)
//! - [`RoomService`]: 저장소, 구독, 브로드캐스트를 조합한 진입점

pub mod service;
pub mod store;

pub use service::{NewRoom, NewSharedInfo, RoomService, RoomSnapshot};
pub use store::{CreateRoomParams, JoinOutcome, RoomState, RoomStore};
