//! 주기적 정리 작업.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// 실행 중인 백그라운드 태스크 핸들.
pub struct BackgroundTasks {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundTasks {
    /// 실행 중인 태스크 이름.
    pub fn names(&self) -> Vec<&'static str> {
        self.handles.iter().map(|(name, _)| *name).collect()
    }

    /// 모든 태스크 종료 대기.
    pub async fn join(self) {
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(task = name, error = %e, "Background task panicked");
            }
        }
    }
}

/// `period`마다 `tick`을 실행합니다. 종료 토큰이 취소되면 반환합니다.
///
/// 첫 실행은 한 주기 후입니다. 밀린 tick은 건너뜁니다.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let period = period.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::debug!(task = name, period_ms = period.as_millis() as u64, "Background task started");

    loop {
        tokio::select! {
            _ = interval.tick() => tick().await,

            _ = shutdown.cancelled() => {
                tracing::info!(task = name, "Background task stopped");
                break;
            }
        }
    }
}

/// 설정된 주기로 모든 정리 작업을 시작합니다.
pub fn spawn_background_tasks(state: Arc<AppState>, shutdown: CancellationToken) -> BackgroundTasks {
    let config = state.config.clone();
    let mut handles = Vec::new();

    let reaper_state = state.clone();
    handles.push((
        "room_reaper",
        tokio::spawn(run_periodic(
            "room_reaper",
            Duration::from_secs(config.rooms.reaper_interval_secs),
            shutdown.clone(),
            move || {
                let state = reaper_state.clone();
                async move {
                    let closed = state.rooms.reap_expired().await;
                    if closed > 0 {
                        tracing::info!(closed, "Expired rooms reaped");
                    }
                }
            },
        )),
    ));

    let registry = state.registry.clone();
    let max_idle = config.websocket.max_idle();
    handles.push((
        "connection_pruner",
        tokio::spawn(run_periodic(
            "connection_pruner",
            Duration::from_secs(config.websocket.prune_interval_secs),
            shutdown.clone(),
            move || {
                let pruned = registry.prune_stale(max_idle);
                if !pruned.is_empty() {
                    tracing::info!(pruned = pruned.len(), "Stale connections pruned");
                }
                std::future::ready(())
            },
        )),
    ));

    let dedup = state.dedup.clone();
    handles.push((
        "dedup_sweeper",
        tokio::spawn(run_periodic(
            "dedup_sweeper",
            Duration::from_secs(config.ingest.dedup_sweep_secs),
            shutdown.clone(),
            move || {
                let evicted = dedup.evict_expired();
                tracing::debug!(evicted, remaining = dedup.len(), "Signature dedup swept");
                std::future::ready(())
            },
        )),
    ));

    if config.rate_limit.enabled {
        let rate_limit = state.rate_limit.clone();
        handles.push((
            "rate_limit_sweeper",
            tokio::spawn(run_periodic(
                "rate_limit_sweeper",
                Duration::from_secs(config.rate_limit.sweep_interval_secs),
                shutdown.clone(),
                move || {
                    let removed = rate_limit.limiter().sweep();
                    tracing::debug!(
                        removed,
                        tracked = rate_limit.limiter().tracked_clients(),
                        "Rate limit buckets swept"
                    );
                    std::future::ready(())
                },
            )),
        ));
    }

    let subscriptions = state.subscriptions.clone();
    handles.push((
        "subscription_retry",
        tokio::spawn(run_periodic(
            "subscription_retry",
            Duration::from_secs(config.provider.retry_interval_secs),
            shutdown,
            move || {
                let retried = subscriptions.retry_pending();
                if !retried.is_empty() {
                    tracing::debug!(count = retried.len(), "Pending subscriptions retried");
                }
                std::future::ready(())
            },
        )),
    ));

    tracing::info!(tasks = handles.len(), "Background tasks started");
    BackgroundTasks { handles }
}
