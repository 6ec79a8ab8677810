//! 정규화된 스왑 거래 이벤트.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 견적 자산(네이티브) 기준 거래 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// 견적 자산을 지불하고 토큰을 획득
    Buy,
    /// 토큰을 지불하고 견적 자산을 획득
    Sell,
    /// 토큰 간 스왑 (견적 자산 미포함)
    Swap,
}

impl TradeSide {
    /// 입출력 민트로 거래 방향을 판별합니다.
    pub fn classify(input_mint: &str, output_mint: &str, quote_mint: &str) -> Self {
        if input_mint == quote_mint && output_mint != quote_mint {
            TradeSide::Buy
        } else if output_mint == quote_mint && input_mint != quote_mint {
            TradeSide::Sell
        } else {
            TradeSide::Swap
        }
    }
}

/// 파싱이 끝난 스왑 이벤트.
///
/// 금액은 모두 UI 단위(소수점 적용)이며, 네이티브 잔고는 lamports / 1e9로 환산됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeEvent {
    /// 트랜잭션 시그니처 (중복 제거 키)
    pub signature: String,
    /// 슬롯 번호
    pub slot: u64,
    /// 블록 시각
    pub block_time: DateTime<Utc>,
    /// 플랫폼 이름 (알 수 없으면 "unknown")
    pub platform: String,
    /// 식별된 프로그램 ID
    pub program_id: Option<String>,
    /// 지불 민트
    pub input_mint: String,
    /// 지불 수량
    pub input_amount: Decimal,
    /// 수령 민트
    pub output_mint: String,
    /// 수령 수량
    pub output_amount: Decimal,
    /// 서명자 지갑
    pub signer: String,
    /// 이 트랜잭션이 관찰된 추적 주소
    pub tracked_address: Option<String>,
    /// 거래 방향
    pub side: TradeSide,
}

impl TradeEvent {
    /// 빌더 생성.
    pub fn builder(signature: impl Into<String>, signer: impl Into<String>) -> TradeEventBuilder {
        TradeEventBuilder::new(signature.into(), signer.into())
    }

    /// 견적 자산이 아닌 쪽의 토큰 민트.
    ///
    /// 토큰 간 스왑이면 수령 민트를 반환합니다.
    pub fn token_mint(&self, quote_mint: &str) -> &str {
        if self.output_mint != quote_mint {
            &self.output_mint
        } else {
            &self.input_mint
        }
    }

    /// 견적 자산 쪽 수량. 토큰 간 스왑이면 `None`.
    pub fn quote_amount(&self, quote_mint: &str) -> Option<Decimal> {
        if self.input_mint == quote_mint {
            Some(self.input_amount)
        } else if self.output_mint == quote_mint {
            Some(self.output_amount)
        } else {
            None
        }
    }

    /// 라우팅에 사용할 주소 목록 (추적 주소, 양쪽 민트, 서명자).
    pub fn routing_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::with_capacity(4);
        let candidates = [
            self.tracked_address.as_deref(),
            Some(self.input_mint.as_str()),
            Some(self.output_mint.as_str()),
            Some(self.signer.as_str()),
        ];
        for key in candidates.into_iter().flatten() {
            if !key.is_empty() && !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }
}

/// [`TradeEvent`] 빌더.
#[derive(Debug, Clone)]
pub struct TradeEventBuilder {
    signature: String,
    signer: String,
    slot: u64,
    block_time: DateTime<Utc>,
    platform: String,
    program_id: Option<String>,
    input_mint: String,
    input_amount: Decimal,
    output_mint: String,
    output_amount: Decimal,
    tracked_address: Option<String>,
}

impl TradeEventBuilder {
    fn new(signature: String, signer: String) -> Self {
        Self {
            signature,
            signer,
            slot: 0,
            block_time: Utc::now(),
            platform: "unknown".to_string(),
            program_id: None,
            input_mint: String::new(),
            input_amount: Decimal::ZERO,
            output_mint: String::new(),
            output_amount: Decimal::ZERO,
            tracked_address: None,
        }
    }

    pub fn slot(mut self, slot: u64) -> Self {
        self.slot = slot;
        self
    }

    pub fn block_time(mut self, block_time: DateTime<Utc>) -> Self {
        self.block_time = block_time;
        self
    }

    pub fn platform(mut self, platform: impl Into<String>, program_id: Option<String>) -> Self {
        self.platform = platform.into();
        self.program_id = program_id;
        self
    }

    pub fn input(mut self, mint: impl Into<String>, amount: Decimal) -> Self {
        self.input_mint = mint.into();
        self.input_amount = amount;
        self
    }

    pub fn output(mut self, mint: impl Into<String>, amount: Decimal) -> Self {
        self.output_mint = mint.into();
        self.output_amount = amount;
        self
    }

    pub fn tracked_address(mut self, address: impl Into<String>) -> Self {
        self.tracked_address = Some(address.into());
        self
    }

    /// 견적 자산 민트를 기준으로 거래 방향을 결정하여 이벤트를 생성합니다.
    pub fn build(self, quote_mint: &str) -> TradeEvent {
        let side = TradeSide::classify(&self.input_mint, &self.output_mint, quote_mint);
        TradeEvent {
            signature: self.signature,
            slot: self.slot,
            block_time: self.block_time,
            platform: self.platform,
            program_id: self.program_id,
            input_mint: self.input_mint,
            input_amount: self.input_amount,
            output_mint: self.output_mint,
            output_amount: self.output_amount,
            signer: self.signer,
            tracked_address: self.tracked_address,
            side,
        }
    }
}
