//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! AppState는 모든 API 핸들러에서 공유되는 상태를 관리합니다.
//! Arc로 래핑되어 여러 요청 간에 안전하게 공유됩니다.

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::ingest::{
    ingest_channel, IngestHandle, IngestJob, IngestPipeline, ProgramTable, SignatureDedup,
    TransactionFetcher, TransactionParser,
};
use crate::middleware::RateLimitState;
use crate::ranking::{RankingAggregator, SmartMoneyRegistry};
use crate::repository::{
    InMemoryRoomRepository, InMemorySharedInfoRepository, InMemoryTokenRepository, TokenRepository,
};
use crate::rooms::{RoomService, RoomStore};
use crate::subscription::{RetryPolicy, SubscriptionManager, SubscriptionProvider};
use crate::websocket::{BroadcastService, ConnectionRegistry};
use traderoom_core::AppConfig;

/// 애플리케이션 공유 상태.
///
/// Axum의 State extractor를 통해 핸들러에 주입됩니다.
#[derive(Clone)]
pub struct AppState {
    /// 로드된 설정
    pub config: Arc<AppConfig>,

    /// 룸 서비스 - 생성/참여/퇴장/종료, 공유 정보, 브로드캐스트
    pub rooms: RoomService,

    /// 라이브 WebSocket 연결
    pub registry: Arc<ConnectionRegistry>,

    /// 관찰 주소 구독
    pub subscriptions: Arc<SubscriptionManager>,

    /// 수집 큐 (웹훅 → 워커)
    pub ingest: IngestHandle,

    /// 시그니처 중복 제거 테이블
    pub dedup: Arc<SignatureDedup>,

    /// 스마트 머니 랭킹 집계
    pub ranking: Arc<RankingAggregator>,

    /// 스마트 머니 지갑 태그
    pub smart_money: Arc<SmartMoneyRegistry>,

    /// 토큰 메타데이터 저장소
    pub tokens: Arc<dyn TokenRepository>,

    /// Rate limit 상태 (미들웨어와 정리 작업이 공유)
    pub rate_limit: RateLimitState,

    /// Prometheus 핸들 (`/metrics` 렌더링용)
    pub metrics: Option<PrometheusHandle>,

    /// 서버 시작 시간
    pub started_at: chrono::DateTime<chrono::Utc>,

    /// API 버전
    pub version: String,
}

/// 상태와 함께 생성되는 수집 워커 구성 요소.
pub struct IngestWorker {
    pub pipeline: Arc<IngestPipeline>,
    pub queue: mpsc::Receiver<IngestJob>,
}

impl AppState {
    /// 설정으로 모든 구성 요소를 조립합니다.
    ///
    /// 저장소는 인메모리 구현을 사용합니다. 로그 알림 보강이 필요하면 `fetcher`를 넘깁니다.
    pub fn build(
        config: AppConfig,
        provider: Arc<dyn SubscriptionProvider>,
        fetcher: Option<Arc<dyn TransactionFetcher>>,
    ) -> (Self, IngestWorker) {
        let quote_mint = config.ingest.quote_mint.clone();

        let store = Arc::new(RoomStore::new(config.rooms.default_recycle_hours, quote_mint.clone()));
        let registry = Arc::new(ConnectionRegistry::new());
        let subscriptions = SubscriptionManager::new(provider, RetryPolicy::from(&config.provider));
        let tokens: Arc<dyn TokenRepository> = Arc::new(InMemoryTokenRepository::new());

        let rooms = RoomService::new(
            store.clone(),
            BroadcastService::new(store, registry.clone(), config.websocket.require_recipients),
            subscriptions.clone(),
            Arc::new(InMemoryRoomRepository::new()),
            Arc::new(InMemorySharedInfoRepository::new()),
            tokens.clone(),
        );

        let dedup = Arc::new(SignatureDedup::new(config.ingest.dedup_retention()));
        let ranking = Arc::new(RankingAggregator::new(quote_mint.clone()));
        let smart_money = Arc::new(SmartMoneyRegistry::from_config(&config.smart_money.wallets));

        let mut pipeline = IngestPipeline::new(
            TransactionParser::new(quote_mint, ProgramTable::default()),
            dedup.clone(),
            subscriptions.clone(),
            rooms.clone(),
            ranking.clone(),
            smart_money.clone(),
        )
        .with_enrich_concurrency(config.ingest.enrich_concurrency);
        if let Some(fetcher) = fetcher {
            pipeline = pipeline.with_fetcher(fetcher);
        }

        let (ingest, queue) = ingest_channel(config.ingest.queue_capacity);
        let rate_limit = RateLimitState::from_settings(&config.rate_limit);

        let state = Self {
            config: Arc::new(config),
            rooms,
            registry,
            subscriptions,
            ingest,
            dedup,
            ranking,
            smart_money,
            tokens,
            rate_limit,
            metrics: None,
            started_at: chrono::Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        let worker = IngestWorker {
            pipeline: Arc::new(pipeline),
            queue,
        };
        (state, worker)
    }

    /// Prometheus 핸들 설정.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// 서버 업타임 (초).
    pub fn uptime_secs(&self) -> i64 {
        (chrono::Utc::now() - self.started_at).num_seconds()
    }
}

/// 테스트용 AppState 생성.
///
/// 구독은 [`crate::subscription::NoopProvider`]를 사용하고 수집 워커는 버립니다.
#[cfg(any(test, feature = "test-utils"))]
pub fn create_test_state() -> AppState {
    create_test_state_with(AppConfig::default()).0
}

/// 설정을 지정해 테스트용 AppState와 수집 워커를 생성합니다.
#[cfg(any(test, feature = "test-utils"))]
pub fn create_test_state_with(config: AppConfig) -> (AppState, IngestWorker) {
    AppState::build(
        config,
        Arc::new(crate::subscription::NoopProvider::new()),
        None,
    )
}
