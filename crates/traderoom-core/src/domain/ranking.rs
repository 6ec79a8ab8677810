//! 스마트 머니 토큰 랭킹 도메인 타입.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::trade::TradeEvent;
use crate::error::RoomError;

/// 랭킹 집계 시간 범위.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    TwentyFourHours,
}

impl Timeframe {
    /// 지원하는 모든 시간 범위.
    pub const ALL: [Timeframe; 3] = [
        Timeframe::OneHour,
        Timeframe::SixHours,
        Timeframe::TwentyFourHours,
    ];

    /// 범위 길이.
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::OneHour => Duration::hours(1),
            Timeframe::SixHours => Duration::hours(6),
            Timeframe::TwentyFourHours => Duration::hours(24),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneHour => "1h",
            Timeframe::SixHours => "6h",
            Timeframe::TwentyFourHours => "24h",
        }
    }
}

impl std::str::FromStr for Timeframe {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(Timeframe::OneHour),
            "6h" => Ok(Timeframe::SixHours),
            "24h" => Ok(Timeframe::TwentyFourHours),
            other => Err(RoomError::Validation(format!(
                "지원하지 않는 timeframe: {} (1h, 6h, 24h)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 랭킹 정렬 기준.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankDimension {
    /// 거래 건수
    #[default]
    Count,
    /// 매수 유입 (견적 자산)
    Inflow,
    /// 매도 유출 (견적 자산)
    Outflow,
}

impl std::str::FromStr for RankDimension {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "count" => Ok(RankDimension::Count),
            "inflow" => Ok(RankDimension::Inflow),
            "outflow" => Ok(RankDimension::Outflow),
            other => Err(RoomError::Validation(format!(
                "지원하지 않는 랭킹 기준: {} (count, inflow, outflow)",
                other
            ))),
        }
    }
}

/// 스마트 머니 지갑이 수행한 거래.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartMoneyTransaction {
    #[serde(flatten)]
    pub trade: TradeEvent,
    /// 지갑 태그
    pub wallet_tag: Option<String>,
}

impl SmartMoneyTransaction {
    pub fn new(trade: TradeEvent, wallet_tag: Option<String>) -> Self {
        Self { trade, wallet_tag }
    }
}

/// 토큰별 랭킹 항목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRanking {
    pub token_mint: String,
    pub transaction_count: u64,
    pub buy_count: u64,
    pub sell_count: u64,
    /// 매수 시 지불한 견적 자산 합계
    pub buy_volume: Decimal,
    /// 매도 시 수령한 견적 자산 합계
    pub sell_volume: Decimal,
    pub unique_buyers: usize,
    pub unique_sellers: usize,
    /// 1부터 시작하는 순위
    pub rank: usize,
}

impl TokenRanking {
    /// 정렬 기준 값.
    pub fn metric(&self, dimension: RankDimension) -> Decimal {
        match dimension {
            RankDimension::Count => Decimal::from(self.transaction_count),
            RankDimension::Inflow => self.buy_volume,
            RankDimension::Outflow => self.sell_volume,
        }
    }
}

/// 특정 시점의 랭킹 결과.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingSnapshot {
    pub timeframe: Timeframe,
    pub dimension: RankDimension,
    pub as_of: DateTime<Utc>,
    pub rankings: Vec<TokenRanking>,
}
