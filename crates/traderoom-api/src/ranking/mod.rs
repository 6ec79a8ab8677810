//! 스마트 머니 랭킹.

mod aggregator;
mod smart_money;

pub use aggregator::{RankingAggregator, DEFAULT_RANK_LIMIT, MAX_RANK_LIMIT};
pub use smart_money::{SmartMoneyRegistry, TaggedWallet};
