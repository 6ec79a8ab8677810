//! 프로바이더 푸시 페이로드.
//!
//! 웹훅 배치는 레코드 단위로 격리해서 파싱해야 하므로 `matchedTransactions`를
//! 원시 JSON으로 받은 뒤 [`MatchedTransaction::from_value`]로 하나씩 변환합니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use traderoom_core::{RoomError, RoomResult};

/// 웹훅 배치.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookBatch {
    /// 배치 공통 블록 시각 (Unix 초)
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub matched_transactions: Vec<Value>,
}

/// 계정 키. 문자열 또는 `{pubkey, signer}` 객체.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountKey {
    Plain(String),
    Parsed {
        pubkey: String,
        #[serde(default)]
        signer: bool,
    },
}

impl AccountKey {
    pub fn pubkey(&self) -> &str {
        match self {
            AccountKey::Plain(key) => key,
            AccountKey::Parsed { pubkey, .. } => pubkey,
        }
    }

    pub fn is_signer(&self) -> bool {
        matches!(self, AccountKey::Parsed { signer: true, .. })
    }
}

/// 매칭된 명령.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedInstruction {
    pub program_id: String,
    #[serde(default)]
    pub accounts: Vec<String>,
}

/// 토큰 수량 표현.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiTokenAmount {
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub decimals: Option<u32>,
    #[serde(default)]
    pub ui_amount: Option<f64>,
    #[serde(default)]
    pub ui_amount_string: Option<String>,
}

impl UiTokenAmount {
    /// 소수 단위 수량. `uiAmountString` → `amount`/`decimals` → `uiAmount` 순으로 사용합니다.
    pub fn to_decimal(&self) -> Option<Decimal> {
        if let Some(text) = self.ui_amount_string.as_deref() {
            if let Ok(value) = Decimal::from_str(text) {
                return Some(value);
            }
        }

        if let (Some(raw), Some(decimals)) = (self.amount.as_deref(), self.decimals) {
            if decimals <= 28 {
                if let Ok(raw) = raw.parse::<i128>() {
                    return Decimal::try_from_i128_with_scale(raw, decimals).ok();
                }
            }
        }

        self.ui_amount.and_then(|v| Decimal::try_from(v).ok())
    }
}

/// 토큰 잔고 항목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    #[serde(default)]
    pub account_index: Option<usize>,
    pub mint: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub ui_token_amount: UiTokenAmount,
}

/// 추적 주소와 매칭된 트랜잭션 레코드.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedTransaction {
    pub signature: String,
    #[serde(default)]
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub tracked_address: Option<String>,
    /// 명시적 서명자 (없으면 계정 키에서 추론)
    #[serde(default)]
    pub signer: Option<String>,
    #[serde(default)]
    pub account_keys: Vec<AccountKey>,
    #[serde(default)]
    pub matched_instructions: Vec<MatchedInstruction>,
    #[serde(default)]
    pub pre_balances: Vec<u64>,
    #[serde(default)]
    pub post_balances: Vec<u64>,
    #[serde(default)]
    pub pre_token_balances: Vec<TokenBalance>,
    #[serde(default)]
    pub post_token_balances: Vec<TokenBalance>,
    #[serde(default)]
    pub log_messages: Vec<String>,
}

impl MatchedTransaction {
    /// 원시 레코드 변환. 실패 시 `Parse`.
    pub fn from_value(value: &Value) -> RoomResult<Self> {
        Self::deserialize(value).map_err(|e| RoomError::Parse(e.to_string()))
    }
}

/// `logsNotification` 본문.
#[derive(Debug, Clone, PartialEq)]
pub struct LogsNotification {
    pub subscription: u64,
    pub slot: u64,
    pub signature: String,
    pub logs: Vec<String>,
    /// 온체인 실행 에러 (성공 시 None)
    pub err: Option<Value>,
}

#[derive(Deserialize)]
struct NotificationEnvelope {
    method: String,
    params: NotificationParams,
}

#[derive(Deserialize)]
struct NotificationParams {
    result: NotificationResult,
    subscription: u64,
}

#[derive(Deserialize)]
struct NotificationResult {
    #[serde(default)]
    context: NotificationContext,
    value: NotificationValue,
}

#[derive(Default, Deserialize)]
struct NotificationContext {
    #[serde(default)]
    slot: u64,
}

#[derive(Deserialize)]
struct NotificationValue {
    signature: String,
    #[serde(default)]
    logs: Vec<String>,
    #[serde(default)]
    err: Option<Value>,
}

impl LogsNotification {
    /// JSON-RPC 알림 메시지 파싱. `logsNotification`이 아니면 `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let envelope = NotificationEnvelope::deserialize(value).ok()?;
        if envelope.method != "logsNotification" {
            return None;
        }
        let NotificationParams { result, subscription } = envelope.params;
        Some(Self {
            subscription,
            slot: result.context.slot,
            signature: result.value.signature,
            logs: result.value.logs,
            err: result.value.err.filter(|e| !e.is_null()),
        })
    }

    pub fn is_failed(&self) -> bool {
        self.err.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_ui_token_amount_precedence() {
        let amount = UiTokenAmount {
            amount: Some("1500000".into()),
            decimals: Some(6),
            ..Default::default()
        };
        assert_eq!(amount.to_decimal(), Some(dec!(1.5)));

        let amount = UiTokenAmount {
            ui_amount_string: Some("42.25".into()),
            amount: Some("1".into()),
            decimals: Some(0),
            ..Default::default()
        };
        assert_eq!(amount.to_decimal(), Some(dec!(42.25)));

        assert_eq!(UiTokenAmount::default().to_decimal(), None);
    }

    #[test]
    fn test_matched_transaction_accepts_mixed_account_keys() {
        let record = json!({
            "signature": "sig1",
            "slot": 10,
            "accountKeys": ["Fee", {"pubkey": "Signer", "signer": true}],
            "matchedInstructions": [{"programId": "Prog"}],
        });
        let tx = MatchedTransaction::from_value(&record).unwrap();
        assert_eq!(tx.account_keys.len(), 2);
        assert!(tx.account_keys[1].is_signer());
        assert_eq!(tx.matched_instructions[0].program_id, "Prog");

        assert!(matches!(
            MatchedTransaction::from_value(&json!({"slot": 1})),
            Err(RoomError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_logs_notification() {
        let message = json!({
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": {
                "result": {
                    "context": {"slot": 5208469},
                    "value": {"signature": "sigA", "err": null, "logs": ["Program X invoke [1]"]}
                },
                "subscription": 24040
            }
        });
        let notification = LogsNotification::from_value(&message).unwrap();
        assert_eq!(notification.subscription, 24040);
        assert_eq!(notification.slot, 5208469);
        assert!(!notification.is_failed());

        let ack = json!({"jsonrpc": "2.0", "result": 7, "id": 1});
        assert!(LogsNotification::from_value(&ack).is_none());
    }
}
