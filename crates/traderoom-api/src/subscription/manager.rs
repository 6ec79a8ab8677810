//! 구독 관리자.
//!
//! 관찰 주소 → 관심 룸 집합을 유지하고, 참조 카운트가 0 → 1이 될 때 프로바이더 구독을,
//! 1 → 0이 될 때 구독 해제를 발행합니다. 프로바이더 호출은 항상 백그라운드 태스크에서
//! 실행되며 실패 시 지수 백오프로 재시도합니다. 룸 생성은 구독 결과를 기다리지 않습니다.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::provider::SubscriptionProvider;
use crate::metrics::{record_subscribe_failure, set_provider_subscriptions};
use traderoom_core::ProviderConfig;

/// 재시도 정책.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// `attempts`번째 실패 이후 대기 시간.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exp = attempts.saturating_sub(1).min(16);
        self.base
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

impl From<&ProviderConfig> for RetryPolicy {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            base: Duration::from_millis(config.retry_base_ms),
            max: Duration::from_millis(config.retry_max_ms.max(config.retry_base_ms)),
        }
    }
}

/// 프로바이더 구독 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// 구독 요청 진행 중
    InFlight,
    /// 구독 완료
    Active(u64),
    /// 실패 후 재시도 대기
    Pending { attempts: u32, next_attempt: Instant },
}

#[derive(Debug)]
struct WatchEntry {
    ref_count: usize,
    rooms: HashSet<String>,
    state: WatchState,
    /// 구독 요청 세대. 완료 시점에 세대가 바뀌었으면 결과를 폐기합니다.
    epoch: u64,
    attempts: u32,
}

/// 구독 관리자.
pub struct SubscriptionManager {
    watches: DashMap<String, WatchEntry>,
    by_subscription: DashMap<u64, String>,
    provider: Arc<dyn SubscriptionProvider>,
    retry: RetryPolicy,
    epochs: AtomicU64,
}

impl SubscriptionManager {
    pub fn new(provider: Arc<dyn SubscriptionProvider>, retry: RetryPolicy) -> Arc<Self> {
        Arc::new(Self {
            watches: DashMap::new(),
            by_subscription: DashMap::new(),
            provider,
            retry,
            epochs: AtomicU64::new(0),
        })
    }

    /// 주소 참조 카운트 증가. 첫 참조이면 구독 태스크를 시작하고 핸들을 반환합니다.
    pub fn ensure_watch(self: &Arc<Self>, address: &str) -> Option<JoinHandle<()>> {
        self.acquire(address, None)
    }

    /// 주소 참조 카운트 감소. 0이 되면 구독을 해제합니다.
    pub fn release_watch(self: &Arc<Self>, address: &str) -> Option<JoinHandle<()>> {
        self.release(address, None)
    }

    /// 룸을 주소의 관심 룸에 추가하고 참조를 획득합니다.
    ///
    /// 같은 룸이 이미 등록되어 있으면 참조 카운트를 늘리지 않습니다.
    pub fn watch_room(self: &Arc<Self>, address: &str, room_id: &str) -> Option<JoinHandle<()>> {
        self.acquire(address, Some(room_id))
    }

    /// 룸을 주소의 관심 룸에서 제거하고 참조를 해제합니다.
    pub fn unwatch_room(self: &Arc<Self>, address: &str, room_id: &str) -> Option<JoinHandle<()>> {
        self.release(address, Some(room_id))
    }

    fn acquire(self: &Arc<Self>, address: &str, room_id: Option<&str>) -> Option<JoinHandle<()>> {
        let epoch = {
            let mut entry = self
                .watches
                .entry(address.to_string())
                .or_insert_with(|| WatchEntry {
                    ref_count: 0,
                    rooms: HashSet::new(),
                    state: WatchState::Pending {
                        attempts: 0,
                        next_attempt: Instant::now(),
                    },
                    epoch: 0,
                    attempts: 0,
                });

            if let Some(room_id) = room_id {
                if !entry.rooms.insert(room_id.to_string()) {
                    return None;
                }
            }

            entry.ref_count += 1;
            if entry.ref_count != 1 {
                return None;
            }

            entry.epoch = self.epochs.fetch_add(1, Ordering::Relaxed) + 1;
            entry.state = WatchState::InFlight;
            entry.epoch
        };

        tracing::info!(address = %address, "Watching new address");
        Some(self.spawn_subscribe(address.to_string(), epoch))
    }

    fn release(self: &Arc<Self>, address: &str, room_id: Option<&str>) -> Option<JoinHandle<()>> {
        let removed = {
            let mut entry = self.watches.get_mut(address)?;
            if let Some(room_id) = room_id {
                if !entry.rooms.remove(room_id) {
                    return None;
                }
            }
            entry.ref_count = entry.ref_count.saturating_sub(1);
            entry.ref_count == 0
        };

        if !removed {
            return None;
        }

        let (_, entry) = self
            .watches
            .remove_if(address, |_, entry| entry.ref_count == 0)?;
        tracing::info!(address = %address, "Released address watch");

        match entry.state {
            WatchState::Active(subscription_id) => {
                self.by_subscription.remove(&subscription_id);
                self.publish_gauge();
                Some(self.spawn_unsubscribe(subscription_id))
            }
            // 진행 중인 구독은 완료 시점에 세대 불일치로 해제됩니다
            WatchState::InFlight | WatchState::Pending { .. } => None,
        }
    }

    fn spawn_subscribe(self: &Arc<Self>, address: String, epoch: u64) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let result = manager.provider.subscribe(&address).await;
            manager.complete_subscribe(&address, epoch, result).await;
        })
    }

    fn spawn_unsubscribe(self: &Arc<Self>, subscription_id: u64) -> JoinHandle<()> {
        let provider = Arc::clone(&self.provider);
        tokio::spawn(async move {
            if let Err(e) = provider.unsubscribe(subscription_id).await {
                tracing::warn!(subscription_id, error = %e, "Provider unsubscribe failed");
            }
        })
    }

    async fn complete_subscribe(
        &self,
        address: &str,
        epoch: u64,
        result: traderoom_core::RoomResult<u64>,
    ) {
        let stale_subscription = {
            match self.watches.get_mut(address) {
                Some(mut entry) if entry.epoch == epoch && entry.state == WatchState::InFlight => {
                    match result {
                        Ok(subscription_id) => {
                            entry.state = WatchState::Active(subscription_id);
                            entry.attempts = 0;
                            self.by_subscription
                                .insert(subscription_id, address.to_string());
                            tracing::info!(address = %address, subscription_id, "Provider subscription active");
                            None
                        }
                        Err(e) => {
                            entry.attempts += 1;
                            let delay = self.retry.backoff(entry.attempts);
                            entry.state = WatchState::Pending {
                                attempts: entry.attempts,
                                next_attempt: Instant::now() + delay,
                            };
                            record_subscribe_failure();
                            tracing::warn!(
                                address = %address,
                                attempts = entry.attempts,
                                retry_in_ms = delay.as_millis() as u64,
                                error = %e,
                                "Provider subscribe failed, will retry"
                            );
                            None
                        }
                    }
                }
                // 해제되었거나 새 세대가 시작된 경우 결과 폐기
                _ => result.ok(),
            }
        };

        if let Some(subscription_id) = stale_subscription {
            tracing::debug!(address = %address, subscription_id, "Discarding stale subscription");
            if let Err(e) = self.provider.unsubscribe(subscription_id).await {
                tracing::warn!(subscription_id, error = %e, "Provider unsubscribe failed");
            }
        }
        self.publish_gauge();
    }

    /// 재시도 시각이 지난 대기 중 구독을 다시 시도합니다.
    pub fn retry_pending(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let now = Instant::now();
        let due: Vec<(String, u64)> = self
            .watches
            .iter_mut()
            .filter_map(|mut entry| match entry.state {
                WatchState::Pending { next_attempt, .. } if next_attempt <= now && entry.ref_count > 0 => {
                    let epoch = self.epochs.fetch_add(1, Ordering::Relaxed) + 1;
                    entry.epoch = epoch;
                    entry.state = WatchState::InFlight;
                    Some((entry.key().clone(), epoch))
                }
                _ => None,
            })
            .collect();

        due.into_iter()
            .map(|(address, epoch)| {
                tracing::debug!(address = %address, "Retrying provider subscribe");
                self.spawn_subscribe(address, epoch)
            })
            .collect()
    }

    /// 프로바이더 재연결 후 모든 관찰 주소를 다시 구독합니다.
    ///
    /// 이전 구독 ID는 더 이상 유효하지 않으므로 폐기합니다.
    pub fn resubscribe_all(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        self.by_subscription.clear();
        let now = Instant::now();
        for mut entry in self.watches.iter_mut() {
            entry.attempts = 0;
            entry.epoch = self.epochs.fetch_add(1, Ordering::Relaxed) + 1;
            entry.state = WatchState::Pending {
                attempts: 0,
                next_attempt: now,
            };
        }
        self.publish_gauge();
        self.retry_pending()
    }

    /// 주소를 관찰 중인 룸 집합.
    pub fn rooms_watching(&self, address: &str) -> HashSet<String> {
        self.watches
            .get(address)
            .map(|entry| entry.rooms.clone())
            .unwrap_or_default()
    }

    /// 여러 주소를 관찰 중인 룸의 합집합.
    pub fn rooms_watching_any<'a, I>(&self, addresses: I) -> HashSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        addresses
            .into_iter()
            .flat_map(|address| self.rooms_watching(address))
            .collect()
    }

    /// 구독 ID로 관찰 주소 조회.
    pub fn address_for_subscription(&self, subscription_id: u64) -> Option<String> {
        self.by_subscription
            .get(&subscription_id)
            .map(|a| a.value().clone())
    }

    /// 주소의 구독 상태.
    pub fn state(&self, address: &str) -> Option<WatchState> {
        self.watches.get(address).map(|entry| entry.state)
    }

    /// 주소의 참조 카운트.
    pub fn ref_count(&self, address: &str) -> usize {
        self.watches.get(address).map(|e| e.ref_count).unwrap_or(0)
    }

    /// 관찰 중인 주소 수.
    pub fn watched_count(&self) -> usize {
        self.watches.len()
    }

    /// 활성 구독 수.
    pub fn active_count(&self) -> usize {
        self.by_subscription.len()
    }

    /// 재시도 대기 중인 주소 수.
    pub fn pending_count(&self) -> usize {
        self.watches
            .iter()
            .filter(|e| matches!(e.state, WatchState::Pending { .. }))
            .count()
    }

    fn publish_gauge(&self) {
        set_provider_subscriptions(self.by_subscription.len());
    }
}
