//! 트랜잭션 조회 (로그 알림 보강용).
//!
//! `logsNotification`에는 서명과 로그만 있으므로 `getTransaction`(jsonParsed)으로
//! 전체 트랜잭션을 받아 웹훅 레코드와 같은 [`MatchedTransaction`] 형태로 변환합니다.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::payload::{AccountKey, MatchedInstruction, MatchedTransaction, TokenBalance};
use traderoom_core::{ProviderConfig, RoomError, RoomResult};

const FETCH_ATTEMPTS: u32 = 3;
const FETCH_RETRY_DELAY: Duration = Duration::from_millis(250);

/// 서명으로 트랜잭션을 조회하는 협력자.
#[async_trait]
pub trait TransactionFetcher: Send + Sync {
    /// 조회 결과. 아직 조회되지 않거나 실패한 트랜잭션이면 `None`.
    async fn fetch(&self, signature: &str) -> RoomResult<Option<MatchedTransaction>>;
}

/// JSON-RPC `getTransaction` 기반 조회기.
pub struct RpcTransactionFetcher {
    client: reqwest::Client,
    rpc_url: String,
    commitment: String,
    request_id: AtomicU64,
}

impl RpcTransactionFetcher {
    pub fn new(config: &ProviderConfig, rpc_url: impl Into<String>) -> RoomResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RoomError::Internal(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
            commitment: config.commitment.clone(),
            request_id: AtomicU64::new(1),
        })
    }

    async fn fetch_once(&self, signature: &str) -> RoomResult<Option<MatchedTransaction>> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
            "method": "getTransaction",
            "params": [
                signature,
                {
                    "encoding": "jsonParsed",
                    "commitment": self.commitment,
                    "maxSupportedTransactionVersion": 0
                }
            ]
        });

        let response: RpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RoomError::Provider(format!("getTransaction 요청 실패: {}", e)))?
            .error_for_status()
            .map_err(|e| RoomError::Provider(format!("getTransaction 응답 상태 오류: {}", e)))?
            .json()
            .await
            .map_err(|e| RoomError::Parse(format!("getTransaction 응답 파싱 실패: {}", e)))?;

        if let Some(error) = response.error {
            return Err(RoomError::Provider(format!("getTransaction RPC 에러: {}", error)));
        }

        match response.result {
            Some(result) if !result.is_null() => {
                let tx = RpcTransaction::deserialize(&result)
                    .map_err(|e| RoomError::Parse(e.to_string()))?;
                Ok(tx.into_matched(signature))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl TransactionFetcher for RpcTransactionFetcher {
    async fn fetch(&self, signature: &str) -> RoomResult<Option<MatchedTransaction>> {
        let mut last_error = None;
        for attempt in 1..=FETCH_ATTEMPTS {
            match self.fetch_once(signature).await {
                Ok(Some(tx)) => return Ok(Some(tx)),
                Ok(None) => last_error = None,
                Err(e) => {
                    tracing::warn!(signature = %signature, attempt, error = %e, "Transaction fetch failed");
                    last_error = Some(e);
                }
            }
            if attempt < FETCH_ATTEMPTS {
                tokio::time::sleep(FETCH_RETRY_DELAY).await;
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransaction {
    #[serde(default)]
    slot: u64,
    #[serde(default)]
    block_time: Option<i64>,
    #[serde(default)]
    meta: Option<RpcMeta>,
    transaction: RpcTransactionBody,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcMeta {
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    pre_balances: Vec<u64>,
    #[serde(default)]
    post_balances: Vec<u64>,
    #[serde(default)]
    pre_token_balances: Vec<TokenBalance>,
    #[serde(default)]
    post_token_balances: Vec<TokenBalance>,
    #[serde(default)]
    log_messages: Option<Vec<String>>,
    #[serde(default)]
    inner_instructions: Option<Vec<RpcInnerInstructions>>,
}

#[derive(Deserialize)]
struct RpcInnerInstructions {
    #[serde(default)]
    instructions: Vec<RpcInstruction>,
}

#[derive(Deserialize)]
struct RpcTransactionBody {
    message: RpcMessage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcMessage {
    #[serde(default)]
    account_keys: Vec<AccountKey>,
    #[serde(default)]
    instructions: Vec<RpcInstruction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcInstruction {
    #[serde(default)]
    program_id: Option<String>,
}

impl RpcTransaction {
    /// 실패한 트랜잭션이거나 meta가 없으면 `None`.
    fn into_matched(self, signature: &str) -> Option<MatchedTransaction> {
        let meta = self.meta?;
        if meta.err.as_ref().is_some_and(|e| !e.is_null()) {
            return None;
        }

        let inner = meta
            .inner_instructions
            .unwrap_or_default()
            .into_iter()
            .flat_map(|group| group.instructions);
        let matched_instructions = self
            .transaction
            .message
            .instructions
            .into_iter()
            .chain(inner)
            .filter_map(|ix| ix.program_id)
            .map(|program_id| MatchedInstruction {
                program_id,
                accounts: Vec::new(),
            })
            .collect();

        Some(MatchedTransaction {
            signature: signature.to_string(),
            slot: self.slot,
            block_time: self.block_time,
            tracked_address: None,
            signer: None,
            account_keys: self.transaction.message.account_keys,
            matched_instructions,
            pre_balances: meta.pre_balances,
            post_balances: meta.post_balances,
            pre_token_balances: meta.pre_token_balances,
            post_token_balances: meta.post_token_balances,
            log_messages: meta.log_messages.unwrap_or_default(),
        })
    }
}
