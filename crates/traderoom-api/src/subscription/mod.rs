//! 관찰 주소 구독 관리.
//!
//! - [`SubscriptionManager`]: 주소 → 룸 인덱스, 참조 카운트, 재시도
//! - [`SubscriptionProvider`]: 프로바이더 구독 추상화
//! - [`LogsSubscriptionClient`]: `logsSubscribe` WebSocket 클라이언트

mod logs_client;
mod manager;
mod provider;

pub use logs_client::{LogsConnection, LogsSubscriptionClient};
pub use manager::{RetryPolicy, SubscriptionManager, WatchState};
pub use provider::{NoopProvider, SubscriptionProvider};
