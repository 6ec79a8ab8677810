//! 노드 프로바이더 구독 추상화.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

use traderoom_core::RoomResult;

/// 주소 단위 로그 구독을 제공하는 프로바이더.
///
/// 구현체는 응답으로 받은 숫자 구독 ID를 반환해야 합니다.
#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    /// 주소 구독. 성공 시 구독 ID 반환
    async fn subscribe(&self, address: &str) -> RoomResult<u64>;

    /// 구독 해제
    async fn unsubscribe(&self, subscription_id: u64) -> RoomResult<()>;
}

/// 프로바이더 WebSocket URL이 설정되지 않았을 때 사용하는 구현.
///
/// 실제 구독 없이 증가하는 ID만 발급합니다. 웹훅 수집만으로 운영할 때 사용합니다.
#[derive(Debug, Default)]
pub struct NoopProvider {
    next_id: AtomicU64,
}

impl NoopProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionProvider for NoopProvider {
    async fn subscribe(&self, address: &str) -> RoomResult<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(address = %address, subscription_id = id, "Noop subscribe");
        Ok(id)
    }

    async fn unsubscribe(&self, subscription_id: u64) -> RoomResult<()> {
        tracing::debug!(subscription_id, "Noop unsubscribe");
        Ok(())
    }
}
