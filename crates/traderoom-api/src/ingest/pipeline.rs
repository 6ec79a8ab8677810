//! 트랜잭션 수집 파이프라인.
//!
//! 웹훅 핸들러와 프로바이더 클라이언트는 [`IngestHandle::submit`]으로 작업을 제한된 큐에
//! 넣기만 하고 즉시 응답합니다. 큐가 가득 차면 작업을 버리고 backpressure를 기록합니다.
//! 워커는 레코드마다 파싱 → 중복 제거 → 라우팅(브로드캐스트) → 랭킹 집계를 수행하며,
//! 레코드 하나의 실패는 같은 배치의 다른 레코드 처리에 영향을 주지 않습니다.
//!
//! 로그 알림의 트랜잭션 조회(RPC)는 워커 밖의 태스크에서 수행합니다. 동시 조회 수는
//! 세마포어로 제한되며, 한도를 넘는 알림은 backpressure로 버려집니다. 조회가 끝난
//! 트랜잭션은 워커로 돌아와 같은 경로(중복 제거 포함)로 처리됩니다.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::dedup::SignatureDedup;
use super::fetcher::TransactionFetcher;
use super::parser::TransactionParser;
use super::payload::{LogsNotification, MatchedTransaction, WebhookBatch};
use crate::metrics::{record_ingest, IngestOutcome};
use crate::ranking::{RankingAggregator, SmartMoneyRegistry};
use crate::rooms::RoomService;
use crate::subscription::SubscriptionManager;
use traderoom_core::{RoomResult, SmartMoneyTransaction, TradeEvent};

/// 수집 작업.
#[derive(Debug, Clone)]
pub enum IngestJob {
    /// 웹훅 배치
    Webhook(WebhookBatch),
    /// 프로바이더 로그 알림
    Logs(LogsNotification),
}

impl IngestJob {
    fn record_count(&self) -> usize {
        match self {
            IngestJob::Webhook(batch) => batch.matched_transactions.len(),
            IngestJob::Logs(_) => 1,
        }
    }
}

/// 작업 큐 송신 핸들.
#[derive(Debug, Clone)]
pub struct IngestHandle {
    tx: mpsc::Sender<IngestJob>,
}

impl IngestHandle {
    /// 작업을 큐에 넣습니다. 대기하지 않으며, 큐가 가득 차면 버리고 `false`.
    pub fn submit(&self, job: IngestJob) -> bool {
        let records = job.record_count();
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(records, "Ingest queue saturated, dropping job");
                for _ in 0..records {
                    record_ingest(IngestOutcome::DroppedBackpressure);
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(records, "Ingest worker stopped, dropping job");
                false
            }
        }
    }

    /// 큐에 대기 중인 작업 수.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// 제한된 작업 큐 생성.
pub fn ingest_channel(capacity: usize) -> (IngestHandle, mpsc::Receiver<IngestJob>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (IngestHandle { tx }, rx)
}

/// 기본 동시 보강 수.
pub const DEFAULT_ENRICH_CONCURRENCY: usize = 16;

type Enrichment = (LogsNotification, RoomResult<Option<MatchedTransaction>>);

/// 배치 처리 결과.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// 라우팅/집계까지 처리된 레코드
    pub processed: usize,
    /// 중복으로 버려진 레코드
    pub duplicates: usize,
    /// 파싱 실패 등으로 버려진 레코드
    pub dropped: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: IngestOutcome) {
        match outcome {
            IngestOutcome::Broadcast => self.processed += 1,
            IngestOutcome::Duplicate => self.duplicates += 1,
            IngestOutcome::ParseError | IngestOutcome::DroppedBackpressure => self.dropped += 1,
        }
    }
}

/// 수집 파이프라인.
pub struct IngestPipeline {
    parser: TransactionParser,
    dedup: Arc<SignatureDedup>,
    subscriptions: Arc<SubscriptionManager>,
    rooms: RoomService,
    ranking: Arc<RankingAggregator>,
    smart_money: Arc<SmartMoneyRegistry>,
    fetcher: Option<Arc<dyn TransactionFetcher>>,
    enrich_limit: Arc<Semaphore>,
}

impl IngestPipeline {
    pub fn new(
        parser: TransactionParser,
        dedup: Arc<SignatureDedup>,
        subscriptions: Arc<SubscriptionManager>,
        rooms: RoomService,
        ranking: Arc<RankingAggregator>,
        smart_money: Arc<SmartMoneyRegistry>,
    ) -> Self {
        Self {
            parser,
            dedup,
            subscriptions,
            rooms,
            ranking,
            smart_money,
            fetcher: None,
            enrich_limit: Arc::new(Semaphore::new(DEFAULT_ENRICH_CONCURRENCY)),
        }
    }

    /// 동시 보강 수 설정.
    pub fn with_enrich_concurrency(mut self, limit: usize) -> Self {
        self.enrich_limit = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    /// 로그 알림 보강용 조회기 설정.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn TransactionFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// 워커 루프. 큐가 닫히거나 종료 신호를 받으면 끝납니다.
    ///
    /// 로그 알림은 보강 태스크로 넘기고 바로 다음 작업을 받습니다.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<IngestJob>, shutdown: CancellationToken) {
        tracing::info!("Ingest worker started");
        let mut enrichments: JoinSet<Enrichment> = JoinSet::new();

        loop {
            tokio::select! {
                job = rx.recv() => match job {
                    Some(IngestJob::Logs(notification)) => {
                        self.spawn_enrichment(&mut enrichments, notification);
                    }
                    Some(job) => {
                        self.process(job).await;
                    }
                    None => break,
                },
                Some(done) = enrichments.join_next(), if !enrichments.is_empty() => match done {
                    Ok((notification, fetched)) => {
                        self.complete_logs(notification, fetched).await;
                    }
                    Err(e) => tracing::warn!(error = %e, "Enrichment task failed"),
                },
                _ = shutdown.cancelled() => break,
            }
        }

        enrichments.abort_all();
        tracing::info!("Ingest worker stopped");
    }

    /// 보강 태스크 시작. 동시 보강 한도를 넘으면 알림을 버립니다.
    fn spawn_enrichment(&self, enrichments: &mut JoinSet<Enrichment>, notification: LogsNotification) {
        let fetcher = match self.admit_logs(&notification) {
            Ok(fetcher) => fetcher,
            Err(_) => return,
        };

        let permit = match self.enrich_limit.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(signature = %notification.signature, "Enrichment saturated, dropping notification");
                record_ingest(IngestOutcome::DroppedBackpressure);
                return;
            }
        };

        enrichments.spawn(async move {
            let _permit = permit;
            let fetched = fetcher.fetch(&notification.signature).await;
            (notification, fetched)
        });
    }

    /// 작업 하나 처리.
    pub async fn process(&self, job: IngestJob) -> BatchReport {
        match job {
            IngestJob::Webhook(batch) => self.process_batch(&batch).await,
            IngestJob::Logs(notification) => {
                let mut report = BatchReport::default();
                report.record(self.process_logs(notification).await);
                report
            }
        }
    }

    /// 웹훅 배치 처리. 레코드 단위로 격리됩니다.
    pub async fn process_batch(&self, batch: &WebhookBatch) -> BatchReport {
        let mut report = BatchReport::default();
        for record in &batch.matched_transactions {
            let outcome = match self.parse_record(record, batch.block_time) {
                Ok(event) => self.process_event(event).await,
                Err(e) => {
                    let signature = record.get("signature").and_then(Value::as_str).unwrap_or("-");
                    tracing::debug!(signature = %signature, reason = %e, "Dropping unparsable record");
                    record_ingest(IngestOutcome::ParseError);
                    IngestOutcome::ParseError
                }
            };
            report.record(outcome);
        }

        tracing::debug!(
            records = batch.matched_transactions.len(),
            processed = report.processed,
            duplicates = report.duplicates,
            dropped = report.dropped,
            "Webhook batch processed"
        );
        report
    }

    fn parse_record(&self, record: &Value, batch_block_time: Option<i64>) -> RoomResult<TradeEvent> {
        let tx = MatchedTransaction::from_value(record)?;
        self.parser.parse(&tx, batch_block_time)
    }

    /// 로그 알림 처리. 서명만 있으므로 전체 트랜잭션을 조회해 보강합니다.
    ///
    /// 조회를 기다리는 동기 경로입니다. 워커 루프는 [`Self::run`]에서 조회를 분리합니다.
    pub async fn process_logs(&self, notification: LogsNotification) -> IngestOutcome {
        let fetcher = match self.admit_logs(&notification) {
            Ok(fetcher) => fetcher,
            Err(outcome) => return outcome,
        };
        let fetched = fetcher.fetch(&notification.signature).await;
        self.complete_logs(notification, fetched).await
    }

    /// 조회 전 확인: 실패한 트랜잭션, 이미 본 서명, 조회기 미설정.
    fn admit_logs(&self, notification: &LogsNotification) -> Result<Arc<dyn TransactionFetcher>, IngestOutcome> {
        let signature = notification.signature.as_str();

        if notification.is_failed() {
            tracing::debug!(signature = %signature, "Skipping failed transaction");
            return Err(self.drop_record(signature, "transaction failed on-chain"));
        }
        if self.dedup.is_seen(signature) {
            tracing::debug!(signature = %signature, "Duplicate signature");
            record_ingest(IngestOutcome::Duplicate);
            return Err(IngestOutcome::Duplicate);
        }
        self.fetcher
            .clone()
            .ok_or_else(|| self.drop_record(signature, "no rpc endpoint configured for enrichment"))
    }

    /// 조회 결과로 알림 처리를 마칩니다.
    async fn complete_logs(
        &self,
        notification: LogsNotification,
        fetched: RoomResult<Option<MatchedTransaction>>,
    ) -> IngestOutcome {
        let signature = notification.signature.as_str();

        let mut tx = match fetched {
            Ok(Some(tx)) => tx,
            Ok(None) => return self.drop_record(signature, "transaction not available"),
            Err(e) => {
                tracing::warn!(signature = %signature, error = %e, "Transaction enrichment failed");
                return self.drop_record(signature, "enrichment failed");
            }
        };

        tx.tracked_address = self
            .subscriptions
            .address_for_subscription(notification.subscription);
        if tx.log_messages.is_empty() {
            tx.log_messages = notification.logs;
        }
        if tx.slot == 0 {
            tx.slot = notification.slot;
        }

        match self.parser.parse(&tx, None) {
            Ok(event) => self.process_event(event).await,
            Err(e) => {
                tracing::debug!(signature = %signature, reason = %e, "Dropping unparsable notification");
                record_ingest(IngestOutcome::ParseError);
                IngestOutcome::ParseError
            }
        }
    }

    fn drop_record(&self, signature: &str, reason: &str) -> IngestOutcome {
        tracing::debug!(signature = %signature, reason, "Dropping record");
        record_ingest(IngestOutcome::ParseError);
        IngestOutcome::ParseError
    }

    /// 중복 제거 → 룸 라우팅 → 랭킹 집계.
    pub async fn process_event(&self, event: TradeEvent) -> IngestOutcome {
        if !self.dedup.check_and_mark(&event.signature) {
            tracing::debug!(signature = %event.signature, "Duplicate signature");
            record_ingest(IngestOutcome::Duplicate);
            return IngestOutcome::Duplicate;
        }

        let mut rooms: Vec<String> = self
            .subscriptions
            .rooms_watching_any(event.routing_keys())
            .into_iter()
            .collect();
        rooms.sort();

        for room_id in &rooms {
            match self.rooms.publish_trade(room_id, &event) {
                Ok(report) => tracing::debug!(
                    room_id = %room_id,
                    signature = %event.signature,
                    delivered = report.delivered,
                    "Trade routed"
                ),
                Err(e) => tracing::debug!(
                    room_id = %room_id,
                    signature = %event.signature,
                    reason = %e,
                    "Trade not routed"
                ),
            }
        }

        let tag = self.smart_money.tag(&event.signer);
        self.ranking
            .ingest(SmartMoneyTransaction::new(event, tag))
            .await;

        record_ingest(IngestOutcome::Broadcast);
        IngestOutcome::Broadcast
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ProgramTable;
    use crate::repository::{InMemoryRoomRepository, InMemorySharedInfoRepository, InMemoryTokenRepository};
    use crate::rooms::{NewRoom, RoomStore};
    use crate::subscription::{NoopProvider, RetryPolicy};
    use crate::websocket::{BroadcastService, ConnectionRegistry, Outbound};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use traderoom_core::{RankDimension, Timeframe, NATIVE_QUOTE_MINT};

    struct Fixture {
        pipeline: IngestPipeline,
        rooms: RoomService,
        registry: Arc<ConnectionRegistry>,
        ranking: Arc<RankingAggregator>,
        subscriptions: Arc<SubscriptionManager>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(RoomStore::new(24, NATIVE_QUOTE_MINT));
        let registry = Arc::new(ConnectionRegistry::new());
        let subscriptions = SubscriptionManager::new(Arc::new(NoopProvider::new()), RetryPolicy::default());
        let rooms = RoomService::new(
            store.clone(),
            BroadcastService::new(store, registry.clone(), false),
            subscriptions.clone(),
            Arc::new(InMemoryRoomRepository::new()),
            Arc::new(InMemorySharedInfoRepository::new()),
            Arc::new(InMemoryTokenRepository::new()),
        );
        let ranking = Arc::new(RankingAggregator::new(NATIVE_QUOTE_MINT));
        let pipeline = IngestPipeline::new(
            TransactionParser::new(NATIVE_QUOTE_MINT, ProgramTable::default()),
            Arc::new(SignatureDedup::new(Duration::from_secs(3600))),
            subscriptions.clone(),
            rooms.clone(),
            ranking.clone(),
            Arc::new(SmartMoneyRegistry::new()),
        );
        Fixture {
            pipeline,
            rooms,
            registry,
            ranking,
            subscriptions,
        }
    }

    fn buy_record(signature: &str, wallet: &str, mint: &str) -> Value {
        json!({
            "signature": signature,
            "slot": 1,
            "trackedAddress": mint,
            "accountKeys": [{"pubkey": wallet, "signer": true}],
            "matchedInstructions": [{"programId": "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8"}],
            "preBalances": [2_000_000_000u64],
            "postBalances": [1_000_000_000u64],
            "preTokenBalances": [],
            "postTokenBalances": [{
                "mint": mint,
                "owner": wallet,
                "uiTokenAmount": {"uiAmountString": "100"}
            }]
        })
    }

    #[tokio::test]
    async fn test_malformed_record_does_not_block_batch() {
        let f = fixture();
        let batch = WebhookBatch {
            block_time: Some(chrono::Utc::now().timestamp()),
            matched_transactions: vec![
                json!({"garbage": true}),
                buy_record("sig1", "walletA", "MintX"),
                json!({"signature": "sig2"}),
            ],
        };

        let report = f.pipeline.process_batch(&batch).await;
        assert_eq!(
            report,
            BatchReport {
                processed: 1,
                duplicates: 0,
                dropped: 2
            }
        );
    }

    #[tokio::test]
    async fn test_retried_batch_is_processed_once() {
        let f = fixture();
        let batch = WebhookBatch {
            block_time: Some(chrono::Utc::now().timestamp()),
            matched_transactions: vec![buy_record("sig1", "walletA", "MintX")],
        };

        f.pipeline.process_batch(&batch).await;
        let retry = f.pipeline.process_batch(&batch).await;
        assert_eq!(retry.duplicates, 1);

        let ranked = f.ranking.rank(Timeframe::OneHour, RankDimension::Count, 10).await;
        assert_eq!(ranked.rankings[0].transaction_count, 1);
    }

    #[tokio::test]
    async fn test_event_routed_to_watching_room() {
        let f = fixture();
        let room = f
            .rooms
            .create_room(NewRoom {
                creator_wallet: "creator".into(),
                token_address: Some("MintX".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(f.subscriptions.rooms_watching("MintX").contains(&room.id));

        let (tx, mut rx) = mpsc::channel(8);
        f.registry.register(&room.id, "creator", tx);

        let batch = WebhookBatch {
            block_time: Some(chrono::Utc::now().timestamp()),
            matched_transactions: vec![buy_record("sig1", "walletA", "MintX")],
        };
        f.pipeline.process_batch(&batch).await;

        match rx.try_recv() {
            Ok(Outbound::Frame(frame)) => {
                assert!(frame.contains("trade_event"));
                assert!(frame.contains("sig1"));
            }
            other => panic!("expected trade_event frame, got {:?}", other),
        }
    }

    struct StaticFetcher(MatchedTransaction);

    #[async_trait]
    impl TransactionFetcher for StaticFetcher {
        async fn fetch(&self, _signature: &str) -> RoomResult<Option<MatchedTransaction>> {
            Ok(Some(self.0.clone()))
        }
    }

    #[tokio::test]
    async fn test_logs_notification_enrichment() {
        let mut f = fixture();
        let mut record = MatchedTransaction::from_value(&buy_record("sigL", "walletA", "MintX")).unwrap();
        record.tracked_address = None;
        f.pipeline = f.pipeline.with_fetcher(Arc::new(StaticFetcher(record)));

        let notification = LogsNotification {
            subscription: 1,
            slot: 9,
            signature: "sigL".into(),
            logs: vec![],
            err: None,
        };
        assert_eq!(
            f.pipeline.process_logs(notification.clone()).await,
            IngestOutcome::Broadcast
        );
        assert_eq!(
            f.pipeline.process_logs(notification).await,
            IngestOutcome::Duplicate
        );

        let failed = LogsNotification {
            subscription: 1,
            slot: 9,
            signature: "sigF".into(),
            logs: vec![],
            err: Some(json!({"InstructionError": [0, "Custom"]})),
        };
        assert_eq!(f.pipeline.process_logs(failed).await, IngestOutcome::ParseError);
    }

    struct SlowFetcher {
        delay: Duration,
        records: Vec<MatchedTransaction>,
    }

    #[async_trait]
    impl TransactionFetcher for SlowFetcher {
        async fn fetch(&self, signature: &str) -> RoomResult<Option<MatchedTransaction>> {
            tokio::time::sleep(self.delay).await;
            Ok(self.records.iter().find(|r| r.signature == signature).cloned())
        }
    }

    fn notification(signature: &str) -> LogsNotification {
        LogsNotification {
            subscription: 1,
            slot: 1,
            signature: signature.into(),
            logs: vec![],
            err: None,
        }
    }

    async fn next_frame(rx: &mut mpsc::Receiver<Outbound>) -> String {
        match rx.recv().await {
            Some(Outbound::Frame(frame)) => frame.to_string(),
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_enrichment_does_not_delay_webhook() {
        let f = fixture();
        let room = f
            .rooms
            .create_room(NewRoom {
                creator_wallet: "creator".into(),
                token_address: Some("MintX".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        f.registry.register(&room.id, "creator", tx);

        let slow = MatchedTransaction::from_value(&buy_record("sigSlow", "walletB", "MintX")).unwrap();
        let pipeline = Arc::new(f.pipeline.with_fetcher(Arc::new(SlowFetcher {
            delay: Duration::from_secs(30),
            records: vec![slow],
        })));
        let (handle, queue) = ingest_channel(8);
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(pipeline.run(queue, shutdown.clone()));

        let start = tokio::time::Instant::now();
        assert!(handle.submit(IngestJob::Logs(notification("sigSlow"))));
        assert!(handle.submit(IngestJob::Webhook(WebhookBatch {
            block_time: Some(chrono::Utc::now().timestamp()),
            matched_transactions: vec![buy_record("sigFast", "walletA", "MintX")],
        })));

        let first = next_frame(&mut rx).await;
        assert!(first.contains("sigFast"));
        assert!(start.elapsed() < Duration::from_secs(1));

        let second = next_frame(&mut rx).await;
        assert!(second.contains("sigSlow"));
        assert!(start.elapsed() >= Duration::from_secs(30));

        shutdown.cancel();
        worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_enrichment_beyond_limit_is_dropped() {
        let f = fixture();
        let records = ["sigA", "sigB"]
            .iter()
            .map(|sig| MatchedTransaction::from_value(&buy_record(sig, "walletA", "MintX")).unwrap())
            .collect();
        let pipeline = Arc::new(
            f.pipeline
                .with_fetcher(Arc::new(SlowFetcher {
                    delay: Duration::from_secs(5),
                    records,
                }))
                .with_enrich_concurrency(1),
        );
        let (handle, queue) = ingest_channel(8);
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(pipeline.run(queue, shutdown.clone()));

        handle.submit(IngestJob::Logs(notification("sigA")));
        handle.submit(IngestJob::Logs(notification("sigB")));
        tokio::time::sleep(Duration::from_secs(10)).await;

        let ranked = f.ranking.rank(Timeframe::OneHour, RankDimension::Count, 10).await;
        assert_eq!(ranked.rankings.len(), 1);
        assert_eq!(ranked.rankings[0].transaction_count, 1);

        shutdown.cancel();
        worker.await.unwrap();
    }

    #[test]
    fn test_submit_drops_when_saturated() {
        let (handle, _rx) = ingest_channel(1);
        assert!(handle.submit(IngestJob::Webhook(WebhookBatch::default())));
        assert!(!handle.submit(IngestJob::Webhook(WebhookBatch::default())));
        assert_eq!(handle.queued(), 1);
    }
}
