//! 노드 프로바이더 로그 구독 클라이언트.
//!
//! 하나의 WebSocket 연결로 `logsSubscribe`/`logsUnsubscribe` JSON-RPC 요청을 보내고
//! 요청 ID로 응답을 매칭합니다. `logsNotification`은 수집 큐로 전달합니다.
//! 연결이 끊기면 지수 백오프로 재연결하고, 재연결 직후 구독 관리자에게 전체 재구독을
//! 요청합니다 (이전 구독 ID는 새 연결에서 무효).

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tokio_util::sync::CancellationToken;

use super::manager::{RetryPolicy, SubscriptionManager};
use super::provider::SubscriptionProvider;
use crate::ingest::{IngestHandle, IngestJob, LogsNotification};
use traderoom_core::{ProviderConfig, RoomError, RoomResult};

const COMMAND_BUFFER: usize = 256;

type RpcReply = Result<Value, String>;

/// 로그 구독 클라이언트 (구독 API 측).
pub struct LogsSubscriptionClient {
    commitment: String,
    encoding: String,
    request_timeout: Duration,
    commands: mpsc::Sender<String>,
    pending: DashMap<u64, oneshot::Sender<RpcReply>>,
    next_id: AtomicU64,
    connected: AtomicBool,
}

/// 연결 루프 (소켓 소유 측).
pub struct LogsConnection {
    client: Arc<LogsSubscriptionClient>,
    ws_url: String,
    retry: RetryPolicy,
    commands: mpsc::Receiver<String>,
}

impl LogsSubscriptionClient {
    /// 클라이언트와 연결 루프를 생성합니다. 연결 루프는 [`LogsConnection::run`]으로 실행합니다.
    pub fn new(config: &ProviderConfig, ws_url: impl Into<String>) -> (Arc<Self>, LogsConnection) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let client = Arc::new(Self {
            commitment: config.commitment.clone(),
            encoding: config.encoding.clone(),
            request_timeout: config.request_timeout(),
            commands: tx,
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(false),
        });
        let connection = LogsConnection {
            client: client.clone(),
            ws_url: ws_url.into(),
            retry: RetryPolicy::from(config),
            commands: rx,
        };
        (client, connection)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn request(&self, method: &str, params: Value) -> RoomResult<Value> {
        if !self.is_connected() {
            return Err(RoomError::Provider("프로바이더에 연결되어 있지 않습니다".into()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        })
        .to_string();

        if self.commands.send(frame).await.is_err() {
            self.pending.remove(&id);
            return Err(RoomError::Provider("연결 루프가 종료되었습니다".into()));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(message))) => Err(RoomError::Provider(format!("{} 실패: {}", method, message))),
            Ok(Err(_)) => Err(RoomError::Provider(format!("{} 응답 전 연결 종료", method))),
            Err(_) => {
                self.pending.remove(&id);
                Err(RoomError::Provider(format!("{} 응답 타임아웃", method)))
            }
        }
    }

    /// 수신 텍스트 프레임 처리: 요청 응답 매칭 또는 알림 전달.
    fn handle_text(&self, text: &str, ingest: &IngestHandle) {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping invalid provider frame");
                return;
            }
        };

        if let Some(id) = value.get("id").and_then(Value::as_u64) {
            if let Some((_, reply)) = self.pending.remove(&id) {
                let result = match value.get("error") {
                    Some(error) if !error.is_null() => Err(error.to_string()),
                    _ => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
                };
                let _ = reply.send(result);
            }
            return;
        }

        if let Some(notification) = LogsNotification::from_value(&value) {
            ingest.submit(IngestJob::Logs(notification));
        }
    }

    fn fail_pending(&self, reason: &str) {
        let ids: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, reply)) = self.pending.remove(&id) {
                let _ = reply.send(Err(reason.to_string()));
            }
        }
    }
}

#[async_trait]
impl SubscriptionProvider for LogsSubscriptionClient {
    async fn subscribe(&self, address: &str) -> RoomResult<u64> {
        let params = json!([
            { "mentions": [address] },
            { "commitment": self.commitment, "encoding": self.encoding }
        ]);
        let result = self.request("logsSubscribe", params).await?;
        result
            .as_u64()
            .ok_or_else(|| RoomError::Provider(format!("예상하지 못한 구독 응답: {}", result)))
    }

    async fn unsubscribe(&self, subscription_id: u64) -> RoomResult<()> {
        self.request("logsUnsubscribe", json!([subscription_id]))
            .await
            .map(|_| ())
    }
}

impl LogsConnection {
    /// 연결 루프. 종료 신호를 받을 때까지 재연결을 반복합니다.
    pub async fn run(
        mut self,
        ingest: IngestHandle,
        manager: Arc<SubscriptionManager>,
        shutdown: CancellationToken,
    ) {
        let mut backoff = self.retry.base;

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match connect_async(self.ws_url.as_str()).await {
                Ok((ws, _)) => {
                    tracing::info!(url = %self.ws_url, "Provider WebSocket connected");
                    backoff = self.retry.base;

                    // 끊긴 동안 쌓인 요청은 응답 대기자가 이미 실패 처리됨
                    while self.commands.try_recv().is_ok() {}
                    self.client.connected.store(true, Ordering::Release);
                    manager.resubscribe_all();

                    self.serve(ws, &ingest, &shutdown).await;

                    self.client.connected.store(false, Ordering::Release);
                    self.client.fail_pending("connection lost");
                    if shutdown.is_cancelled() {
                        break;
                    }
                    tracing::warn!(url = %self.ws_url, "Provider WebSocket disconnected");
                }
                Err(e) => {
                    tracing::warn!(url = %self.ws_url, error = %e, "Provider WebSocket connect failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown.cancelled() => break,
            }
            backoff = backoff.saturating_mul(2).min(self.retry.max);
        }

        tracing::info!("Provider client stopped");
    }

    async fn serve<S>(&mut self, ws: S, ingest: &IngestHandle, shutdown: &CancellationToken)
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
            + Unpin,
    {
        let (mut sink, mut stream) = ws.split();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                }
                command = self.commands.recv() => match command {
                    Some(frame) => {
                        if let Err(e) = sink.send(Message::Text(frame.into())).await {
                            tracing::warn!(error = %e, "Provider send failed");
                            return;
                        }
                    }
                    None => return,
                },
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => self.client.handle_text(text.as_str(), ingest),
                    Some(Ok(Message::Ping(payload))) => {
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::warn!(?frame, "Provider closed connection");
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Provider stream error");
                        return;
                    }
                    None => return,
                },
            }
        }
    }
}
