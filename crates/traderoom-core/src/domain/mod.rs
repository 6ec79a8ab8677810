//! 트레이드 룸 도메인 모델.

pub mod ranking;
pub mod room;
pub mod shared_info;
pub mod token;
pub mod trade;

pub use ranking::{RankDimension, RankingSnapshot, SmartMoneyTransaction, Timeframe, TokenRanking};
pub use room::{Member, Room, RoomStats, RoomStatus};
pub use shared_info::SharedInfo;
pub use token::{compare_by_market_cap, resolve_symbol, TokenInfo};
pub use trade::{TradeEvent, TradeEventBuilder, TradeSide};
