//! 룸 생성 → 연결 → 웹훅 수집 → 종료까지의 통합 테스트.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use traderoom_api::ingest::IngestJob;
use traderoom_api::routes::create_api_router;
use traderoom_api::state::{AppState, IngestWorker};
use traderoom_api::subscription::NoopProvider;
use traderoom_api::websocket::Outbound;
use traderoom_core::{AppConfig, RankDimension, Timeframe};

const TOKEN: &str = "MintX";

struct Harness {
    app: Router,
    state: Arc<AppState>,
    worker: IngestWorker,
}

fn harness() -> Harness {
    let (state, worker) = AppState::build(AppConfig::default(), Arc::new(NoopProvider::new()), None);
    let state = Arc::new(state);
    let app = create_api_router().with_state(state.clone());
    Harness { app, state, worker }
}

async fn call(app: &Router, method: &str, uri: &str, body: Value) -> Value {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn swap_record(signature: &str, wallet: &str) -> Value {
    json!({
        "signature": signature,
        "slot": 42,
        "trackedAddress": TOKEN,
        "accountKeys": [{"pubkey": wallet, "signer": true}],
        "matchedInstructions": [{"programId": "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8"}],
        "preBalances": [3_000_000_000u64],
        "postBalances": [2_000_000_000u64],
        "preTokenBalances": [],
        "postTokenBalances": [{
            "mint": TOKEN,
            "owner": wallet,
            "uiTokenAmount": {"uiAmountString": "2500"}
        }]
    })
}

/// 계정 키 없이 추적 주소와 잔고만 담긴 프로바이더 레코드.
fn bare_record(signature: &str, wallet: &str) -> Value {
    json!({
        "slot": 43,
        "signature": signature,
        "trackedAddress": wallet,
        "matchedInstructions": [{"programId": "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8"}],
        "preBalances": [3_000_000_000u64],
        "postBalances": [2_000_000_000u64],
        "preTokenBalances": [],
        "postTokenBalances": [{
            "mint": TOKEN,
            "owner": wallet,
            "uiTokenAmount": {"uiAmountString": "2500"}
        }]
    })
}

/// 큐에 쌓인 수집 작업을 모두 처리합니다.
async fn drain(worker: &mut IngestWorker) {
    while let Ok(job) = worker.queue.try_recv() {
        worker.pipeline.process(job).await;
    }
}

fn frames(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(outbound) = rx.try_recv() {
        match outbound {
            Outbound::Frame(frame) => out.push(serde_json::from_str(&frame).unwrap()),
            Outbound::Close => out.push(json!({"type": "__close__"})),
        }
    }
    out
}

fn types(frames: &[Value]) -> Vec<&str> {
    frames.iter().filter_map(|f| f["type"].as_str()).collect()
}

async fn open_room(h: &Harness) -> String {
    let created = call(
        &h.app,
        "POST",
        "/api/v1/rooms",
        json!({"creatorWallet": "creator", "tokenAddress": TOKEN}),
    )
    .await;
    assert_eq!(created["success"], true, "{created}");
    created["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_webhook_trade_reaches_room_member() {
    let mut h = harness();
    let room_id = open_room(&h).await;
    assert!(h.state.subscriptions.rooms_watching(TOKEN).contains(&room_id));

    let (tx, mut rx) = mpsc::channel(32);
    h.state.registry.register(&room_id, "member", tx);

    let joined = call(
        &h.app,
        "POST",
        &format!("/api/v1/rooms/{}/join", room_id),
        json!({"wallet": "member"}),
    )
    .await;
    assert_eq!(joined["data"]["newlyJoined"], true);
    assert_eq!(types(&frames(&mut rx)), vec!["member_joined", "room_update"]);

    let ack = call(
        &h.app,
        "POST",
        "/api/v1/webhook",
        json!({"blockTime": chrono::Utc::now().timestamp(), "matchedTransactions": [swap_record("sigA", "trader")]}),
    )
    .await;
    assert_eq!(ack["data"]["queued"], true);
    drain(&mut h.worker).await;

    let received = frames(&mut rx);
    assert_eq!(types(&received), vec!["trade_event"]);
    let trade = &received[0]["data"];
    assert_eq!(trade["signature"], "sigA");
    assert_eq!(trade["signer"], "trader");

    let status = call(&h.app, "GET", &format!("/api/v1/rooms/{}", room_id), json!({})).await;
    assert_eq!(status["data"]["stats"]["tradeCount"], 1);
}

#[tokio::test]
async fn test_duplicate_batch_delivered_once() {
    let mut h = harness();
    let room_id = open_room(&h).await;

    let (tx, mut rx) = mpsc::channel(32);
    h.state.registry.register(&room_id, "creator", tx);

    let batch = json!({
        "blockTime": chrono::Utc::now().timestamp(),
        "matchedTransactions": [swap_record("sigDup", "trader")]
    });
    call(&h.app, "POST", "/api/v1/webhook", batch.clone()).await;
    drain(&mut h.worker).await;
    call(&h.app, "POST", "/api/v1/webhook", batch).await;
    drain(&mut h.worker).await;

    let trades: Vec<_> = frames(&mut rx)
        .into_iter()
        .filter(|f| f["type"] == "trade_event")
        .collect();
    assert_eq!(trades.len(), 1);

    let snapshot = h
        .state
        .ranking
        .rank(Timeframe::OneHour, RankDimension::Count, 10)
        .await;
    assert_eq!(snapshot.rankings.len(), 1);
    assert_eq!(snapshot.rankings[0].token_mint, TOKEN);
    assert_eq!(snapshot.rankings[0].transaction_count, 1);
}

#[tokio::test]
async fn test_close_sends_final_update_and_releases_watch() {
    let mut h = harness();
    let room_id = open_room(&h).await;

    let (tx, mut rx) = mpsc::channel(32);
    h.state.registry.register(&room_id, "creator", tx);

    let denied = call(
        &h.app,
        "POST",
        &format!("/api/v1/rooms/{}/close", room_id),
        json!({"wallet": "someone-else"}),
    )
    .await;
    assert_eq!(denied["code"], "FORBIDDEN");

    let closed = call(
        &h.app,
        "POST",
        &format!("/api/v1/rooms/{}/close", room_id),
        json!({"wallet": "creator"}),
    )
    .await;
    assert_eq!(closed["data"]["status"], "closed");

    let received = frames(&mut rx);
    assert_eq!(types(&received), vec!["room_update", "__close__"]);
    assert_eq!(received[0]["data"]["status"], "closed");

    assert_eq!(h.state.registry.connection_count(&room_id), 0);
    assert_eq!(h.state.subscriptions.ref_count(TOKEN), 0);
    assert!(h.state.subscriptions.rooms_watching(TOKEN).is_empty());

    // 종료된 룸으로는 라우팅되지 않는다
    call(
        &h.app,
        "POST",
        "/api/v1/webhook",
        json!({"matchedTransactions": [swap_record("sigLate", "trader")]}),
    )
    .await;
    drain(&mut h.worker).await;
    let status = call(&h.app, "GET", &format!("/api/v1/rooms/{}", room_id), json!({})).await;
    assert_eq!(status["data"]["room"]["status"], "closed");
    assert_eq!(status["data"]["stats"]["tradeCount"], 0);

    let rejoin = call(
        &h.app,
        "POST",
        &format!("/api/v1/rooms/{}/join", room_id),
        json!({"wallet": "creator"}),
    )
    .await;
    assert_eq!(rejoin["code"], "ROOM_CLOSED");
}

#[tokio::test]
async fn test_saturated_queue_still_acknowledges() {
    let mut config = AppConfig::default();
    config.ingest.queue_capacity = 1;
    let (state, worker) = AppState::build(config, Arc::new(NoopProvider::new()), None);
    let app = create_api_router().with_state(Arc::new(state));

    let batch = json!({"matchedTransactions": [swap_record("sig1", "trader")]});
    let first = call(&app, "POST", "/api/v1/webhook", batch.clone()).await;
    let second = call(&app, "POST", "/api/v1/webhook", batch).await;

    assert_eq!(first["data"]["queued"], true);
    assert_eq!(second["success"], true);
    assert_eq!(second["data"]["queued"], false);

    let mut queue = worker.queue;
    assert!(matches!(queue.try_recv(), Ok(IngestJob::Webhook(_))));
    assert!(queue.try_recv().is_err());
}

#[tokio::test]
async fn test_reaper_closes_idle_room() {
    let h = harness();
    let created = call(
        &h.app,
        "POST",
        "/api/v1/rooms",
        json!({"creatorWallet": "creator", "tokenAddress": TOKEN, "recycleHours": 1}),
    )
    .await;
    let room_id = created["data"]["id"].as_str().unwrap().to_string();

    assert_eq!(h.state.rooms.reap_expired().await, 0);

    let later = chrono::Utc::now() + chrono::Duration::hours(2);
    assert_eq!(h.state.rooms.reap_expired_at(later).await, 1);
    assert_eq!(h.state.subscriptions.ref_count(TOKEN), 0);

    let join = call(
        &h.app,
        "POST",
        &format!("/api/v1/rooms/{}/join", room_id),
        json!({"wallet": "late-wallet"}),
    )
    .await;
    assert_eq!(join["success"], false);
    assert_eq!(join["code"], "ROOM_CLOSED");
}

#[tokio::test]
async fn test_record_without_account_keys_is_routed_and_ranked() {
    let mut h = harness();
    let room_id = open_room(&h).await;

    let (tx, mut rx) = mpsc::channel(32);
    h.state.registry.register(&room_id, "creator", tx);

    let ack = call(
        &h.app,
        "POST",
        "/api/v1/webhook",
        json!({"blockTime": chrono::Utc::now().timestamp(), "matchedTransactions": [bare_record("sigBare", "WalletA")]}),
    )
    .await;
    assert_eq!(ack["data"]["queued"], true);

    let job = h.worker.queue.try_recv().unwrap();
    let report = h.worker.pipeline.process(job).await;
    assert_eq!(report.processed, 1);
    assert_eq!(report.dropped, 0);

    let received = frames(&mut rx);
    assert_eq!(types(&received), vec!["trade_event"]);
    assert_eq!(received[0]["data"]["signer"], "WalletA");

    let snapshot = h
        .state
        .ranking
        .rank(Timeframe::OneHour, RankDimension::Count, 10)
        .await;
    assert_eq!(snapshot.rankings.len(), 1);
    assert_eq!(snapshot.rankings[0].token_mint, TOKEN);
}
