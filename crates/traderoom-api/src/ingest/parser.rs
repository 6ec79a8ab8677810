//! 트랜잭션 파서.
//!
//! 서명자 지갑의 잔고 변화(pre/post)를 비교하여 입력/출력 민트와 수량을 도출합니다.
//! 네이티브 견적 자산은 lamports 변화와 래핑 토큰 잔고 변화의 합으로 계산하고,
//! 토큰 민트 후보에서는 제외합니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::payload::{MatchedTransaction, TokenBalance};
use super::programs::ProgramTable;
use traderoom_core::{RoomError, RoomResult, TradeEvent};

const LAMPORTS_SCALE: u32 = 9;

/// 트랜잭션 파서.
#[derive(Debug, Clone)]
pub struct TransactionParser {
    quote_mint: String,
    programs: ProgramTable,
}

impl TransactionParser {
    pub fn new(quote_mint: impl Into<String>, programs: ProgramTable) -> Self {
        Self {
            quote_mint: quote_mint.into(),
            programs,
        }
    }

    pub fn quote_mint(&self) -> &str {
        &self.quote_mint
    }

    /// 레코드를 거래 이벤트로 변환합니다.
    ///
    /// `batch_block_time`은 레코드에 블록 시각이 없을 때 사용합니다.
    pub fn parse(&self, tx: &MatchedTransaction, batch_block_time: Option<i64>) -> RoomResult<TradeEvent> {
        if tx.signature.trim().is_empty() {
            return Err(RoomError::Parse("서명이 비어 있습니다".into()));
        }

        let (signer, signer_index) = self.resolve_signer(tx)?;
        let token_deltas = self.token_deltas(tx, &signer);
        let quote_delta = self.quote_delta(tx, &signer, signer_index);

        let (input, output) = self
            .infer_legs(&token_deltas, quote_delta)
            .ok_or_else(|| RoomError::Parse(format!("스왑을 식별할 수 없습니다: {}", tx.signature)))?;

        let (platform, program_id) = self.infer_platform(tx);
        let block_time = tx
            .block_time
            .or(batch_block_time)
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now);

        let mut builder = TradeEvent::builder(&tx.signature, signer)
            .slot(tx.slot)
            .block_time(block_time)
            .platform(platform, program_id)
            .input(input.0, input.1)
            .output(output.0, output.1);
        if let Some(tracked) = tx.tracked_address.as_deref().filter(|a| !a.is_empty()) {
            builder = builder.tracked_address(tracked);
        }

        Ok(builder.build(&self.quote_mint))
    }

    /// 명시적 서명자 → 서명 플래그가 있는 첫 계정 → 첫 계정(수수료 지불자) 순.
    ///
    /// 계정 키가 없는 웹훅 레코드는 토큰 잔고를 가진 추적 주소, 그다음 토큰 잔고의
    /// 첫 소유자를 서명자로 봅니다. 이때 lamports 변화는 0번(수수료 지불자)을 사용합니다.
    fn resolve_signer(&self, tx: &MatchedTransaction) -> RoomResult<(String, usize)> {
        if let Some(signer) = tx.signer.as_deref().filter(|s| !s.is_empty()) {
            let index = tx
                .account_keys
                .iter()
                .position(|k| k.pubkey() == signer)
                .unwrap_or(0);
            return Ok((signer.to_string(), index));
        }

        if let Some(index) = tx.account_keys.iter().position(|k| k.is_signer()) {
            return Ok((tx.account_keys[index].pubkey().to_string(), index));
        }

        if let Some(first) = tx.account_keys.first() {
            return Ok((first.pubkey().to_string(), 0));
        }

        let mut owners = tx
            .pre_token_balances
            .iter()
            .chain(&tx.post_token_balances)
            .filter_map(|b| b.owner.as_deref())
            .filter(|owner| !owner.is_empty());

        let tracked_owner = tx
            .tracked_address
            .as_deref()
            .filter(|tracked| owners.clone().any(|owner| owner == *tracked));

        tracked_owner
            .or_else(|| owners.next())
            .map(|owner| (owner.to_string(), 0))
            .ok_or_else(|| RoomError::Parse(format!("서명자를 찾을 수 없습니다: {}", tx.signature)))
    }

    /// 서명자 소유 토큰 잔고의 민트별 변화 (견적 자산 제외).
    fn token_deltas(&self, tx: &MatchedTransaction, signer: &str) -> BTreeMap<String, Decimal> {
        let mut deltas: BTreeMap<String, Decimal> = BTreeMap::new();
        let owned = |b: &&TokenBalance| b.owner.as_deref() == Some(signer) && b.mint != self.quote_mint;

        for balance in tx.pre_token_balances.iter().filter(owned) {
            if let Some(amount) = balance.ui_token_amount.to_decimal() {
                *deltas.entry(balance.mint.clone()).or_default() -= amount;
            }
        }
        for balance in tx.post_token_balances.iter().filter(owned) {
            if let Some(amount) = balance.ui_token_amount.to_decimal() {
                *deltas.entry(balance.mint.clone()).or_default() += amount;
            }
        }

        deltas.retain(|_, delta| !delta.is_zero());
        deltas
    }

    /// 서명자의 견적 자산 변화 (lamports + 래핑 토큰).
    fn quote_delta(&self, tx: &MatchedTransaction, signer: &str, signer_index: usize) -> Decimal {
        let lamports = match (tx.pre_balances.get(signer_index), tx.post_balances.get(signer_index)) {
            (Some(&pre), Some(&post)) => {
                Decimal::from_i128_with_scale(post as i128 - pre as i128, LAMPORTS_SCALE)
            }
            _ => Decimal::ZERO,
        };

        let wrapped = |balances: &[TokenBalance]| -> Decimal {
            balances
                .iter()
                .filter(|b| b.owner.as_deref() == Some(signer) && b.mint == self.quote_mint)
                .filter_map(|b| b.ui_token_amount.to_decimal())
                .sum()
        };

        lamports + wrapped(&tx.post_token_balances) - wrapped(&tx.pre_token_balances)
    }

    /// 입력/출력 (민트, 수량) 결정.
    ///
    /// 토큰 간 교환을 먼저 확인합니다. 수수료로 인한 견적 자산 감소는 매수로 보지 않습니다.
    fn infer_legs(
        &self,
        token_deltas: &BTreeMap<String, Decimal>,
        quote_delta: Decimal,
    ) -> Option<((String, Decimal), (String, Decimal))> {
        // 같은 크기면 BTreeMap 순서(민트 오름차순)의 첫 항목
        let dominant = |positive: bool| {
            token_deltas
                .iter()
                .filter(|(_, d)| if positive { d.is_sign_positive() } else { d.is_sign_negative() })
                .fold(None::<(&String, Decimal)>, |best, (mint, delta)| match best {
                    Some((_, amount)) if amount >= delta.abs() => best,
                    _ => Some((mint, delta.abs())),
                })
                .map(|(mint, amount)| (mint.clone(), amount))
        };

        let received = dominant(true);
        let spent = dominant(false);
        let quote = self.quote_mint.clone();

        match (spent, received) {
            (Some(spent), Some(received)) => Some((spent, received)),
            (None, Some(received)) if quote_delta.is_sign_negative() && !quote_delta.is_zero() => {
                Some(((quote, quote_delta.abs()), received))
            }
            (Some(spent), None) if quote_delta.is_sign_positive() && !quote_delta.is_zero() => {
                Some((spent, (quote, quote_delta)))
            }
            _ => None,
        }
    }

    /// 매칭된 명령 → 로그의 invoke 라인 순으로 알려진 프로그램을 찾습니다.
    ///
    /// 알려진 프로그램이 없으면 `unknown`과 첫 명령의 프로그램 ID를 사용합니다.
    fn infer_platform(&self, tx: &MatchedTransaction) -> (String, Option<String>) {
        let from_instructions = tx.matched_instructions.iter().map(|ix| ix.program_id.as_str());
        let from_logs = tx
            .log_messages
            .iter()
            .filter_map(|line| ProgramTable::program_from_log(line));

        for program_id in from_instructions.chain(from_logs) {
            if let Some(platform) = self.programs.lookup(program_id) {
                return (platform.to_string(), Some(program_id.to_string()));
            }
        }

        let fallback = tx
            .matched_instructions
            .first()
            .map(|ix| ix.program_id.clone());
        ("unknown".to_string(), fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::payload::{AccountKey, MatchedInstruction, UiTokenAmount};
    use rust_decimal_macros::dec;
    use traderoom_core::{TradeSide, NATIVE_QUOTE_MINT};

    fn balance(owner: &str, mint: &str, amount: &str) -> TokenBalance {
        TokenBalance {
            account_index: None,
            mint: mint.to_string(),
            owner: Some(owner.to_string()),
            ui_token_amount: UiTokenAmount {
                ui_amount_string: Some(amount.to_string()),
                ..Default::default()
            },
        }
    }

    fn parser() -> TransactionParser {
        TransactionParser::new(NATIVE_QUOTE_MINT, ProgramTable::default())
    }

    fn buy_tx() -> MatchedTransaction {
        MatchedTransaction {
            signature: "sig1".into(),
            slot: 100,
            block_time: Some(1_700_000_000),
            tracked_address: Some("MintX".into()),
            account_keys: vec![AccountKey::Parsed {
                pubkey: "walletA".into(),
                signer: true,
            }],
            matched_instructions: vec![MatchedInstruction {
                program_id: "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8".into(),
                accounts: vec![],
            }],
            pre_balances: vec![5_000_000_000],
            post_balances: vec![3_500_000_000],
            pre_token_balances: vec![balance("walletA", "MintX", "0")],
            post_token_balances: vec![balance("walletA", "MintX", "1000")],
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_buy() {
        let event = parser().parse(&buy_tx(), None).unwrap();

        assert_eq!(event.signer, "walletA");
        assert_eq!(event.side, TradeSide::Buy);
        assert_eq!(event.input_mint, NATIVE_QUOTE_MINT);
        assert_eq!(event.input_amount, dec!(1.5));
        assert_eq!(event.output_mint, "MintX");
        assert_eq!(event.output_amount, dec!(1000));
        assert_eq!(event.platform, "raydium");
        assert_eq!(event.tracked_address.as_deref(), Some("MintX"));
        assert_eq!(event.block_time.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_parse_sell_with_wrapped_quote() {
        let tx = MatchedTransaction {
            signature: "sig2".into(),
            signer: Some("walletA".into()),
            pre_token_balances: vec![
                balance("walletA", "MintX", "500"),
                balance("walletA", NATIVE_QUOTE_MINT, "0"),
            ],
            post_token_balances: vec![
                balance("walletA", "MintX", "100"),
                balance("walletA", NATIVE_QUOTE_MINT, "2.25"),
            ],
            ..Default::default()
        };

        let event = parser().parse(&tx, Some(1_700_000_100)).unwrap();
        assert_eq!(event.side, TradeSide::Sell);
        assert_eq!(event.input_mint, "MintX");
        assert_eq!(event.input_amount, dec!(400));
        assert_eq!(event.output_mint, NATIVE_QUOTE_MINT);
        assert_eq!(event.output_amount, dec!(2.25));
        assert_eq!(event.block_time.timestamp(), 1_700_000_100);
    }

    #[test]
    fn test_token_to_token_swap_ignores_fee() {
        let tx = MatchedTransaction {
            signature: "sig3".into(),
            signer: Some("walletA".into()),
            pre_balances: vec![1_000_000_000],
            post_balances: vec![999_995_000],
            pre_token_balances: vec![balance("walletA", "MintA", "10"), balance("walletA", "MintB", "0")],
            post_token_balances: vec![balance("walletA", "MintA", "0"), balance("walletA", "MintB", "7")],
            ..Default::default()
        };

        let event = parser().parse(&tx, None).unwrap();
        assert_eq!(event.side, TradeSide::Swap);
        assert_eq!(event.input_mint, "MintA");
        assert_eq!(event.output_mint, "MintB");
    }

    #[test]
    fn test_webhook_record_without_account_keys() {
        let record = serde_json::json!({
            "slot": 250,
            "signature": "sigW",
            "trackedAddress": "WalletA",
            "matchedInstructions": [{"programId": "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8"}],
            "preBalances": [3_000_000_000u64, 0],
            "postBalances": [2_000_000_000u64, 0],
            "preTokenBalances": [],
            "postTokenBalances": [
                {"mint": "MintX", "owner": "PoolVault", "uiTokenAmount": {"uiAmountString": "5000"}},
                {"mint": "MintX", "owner": "WalletA", "uiTokenAmount": {"uiAmountString": "42"}}
            ]
        });
        let tx = MatchedTransaction::from_value(&record).unwrap();

        let event = parser().parse(&tx, Some(1_700_000_000)).unwrap();
        assert_eq!(event.signer, "WalletA");
        assert_eq!(event.side, TradeSide::Buy);
        assert_eq!(event.input_mint, NATIVE_QUOTE_MINT);
        assert_eq!(event.input_amount, dec!(1));
        assert_eq!(event.output_amount, dec!(42));
        assert_eq!(event.platform, "raydium");
    }

    #[test]
    fn test_signer_falls_back_to_balance_owner() {
        let tx = MatchedTransaction {
            signature: "sigO".into(),
            tracked_address: Some("MintX".into()),
            pre_balances: vec![2_000_000_000],
            post_balances: vec![1_500_000_000],
            post_token_balances: vec![balance("walletB", "MintX", "10")],
            ..Default::default()
        };

        let event = parser().parse(&tx, None).unwrap();
        assert_eq!(event.signer, "walletB");
        assert_eq!(event.input_amount, dec!(0.5));
    }

    #[test]
    fn test_unknown_program_still_parses() {
        let mut tx = buy_tx();
        tx.matched_instructions = vec![MatchedInstruction {
            program_id: "SomeNewDex111".into(),
            accounts: vec![],
        }];

        let event = parser().parse(&tx, None).unwrap();
        assert_eq!(event.platform, "unknown");
        assert_eq!(event.program_id.as_deref(), Some("SomeNewDex111"));
    }

    #[test]
    fn test_platform_from_logs() {
        let mut tx = buy_tx();
        tx.matched_instructions.clear();
        tx.log_messages = vec![
            "Program ComputeBudget111111111111111111111111111111 invoke [1]".into(),
            "Program whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc invoke [1]".into(),
        ];

        let event = parser().parse(&tx, None).unwrap();
        assert_eq!(event.platform, "orca");
    }

    #[test]
    fn test_non_swap_is_parse_error() {
        let mut tx = buy_tx();
        tx.post_token_balances = tx.pre_token_balances.clone();
        assert!(matches!(parser().parse(&tx, None), Err(RoomError::Parse(_))));

        let empty = MatchedTransaction {
            signature: "sig4".into(),
            ..Default::default()
        };
        assert!(matches!(parser().parse(&empty, None), Err(RoomError::Parse(_))));
    }
}
