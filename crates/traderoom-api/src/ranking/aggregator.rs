//! 스마트 머니 랭킹 집계기.
//!
//! 타임프레임별 슬라이딩 윈도우에 거래를 쌓고, 조회 시 윈도우를 복사한 뒤 토큰별로
//! 집계합니다. 윈도우 정리는 다음 수집 또는 조회 시점에 지연 수행합니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;

use traderoom_core::{
    RankDimension, RankingSnapshot, SmartMoneyTransaction, Timeframe, TokenRanking, TradeSide,
};

/// 랭킹 조회 기본 개수.
pub const DEFAULT_RANK_LIMIT: usize = 20;
/// 랭킹 조회 최대 개수.
pub const MAX_RANK_LIMIT: usize = 100;

type Window = VecDeque<SmartMoneyTransaction>;

/// 랭킹 집계기.
pub struct RankingAggregator {
    windows: HashMap<Timeframe, RwLock<Window>>,
    quote_mint: String,
}

impl RankingAggregator {
    pub fn new(quote_mint: impl Into<String>) -> Self {
        Self {
            windows: Timeframe::ALL
                .iter()
                .map(|tf| (*tf, RwLock::new(VecDeque::new())))
                .collect(),
            quote_mint: quote_mint.into(),
        }
    }

    /// 거래를 모든 타임프레임 윈도우에 추가합니다.
    pub async fn ingest(&self, tx: SmartMoneyTransaction) {
        self.ingest_at(tx, Utc::now()).await
    }

    pub async fn ingest_at(&self, tx: SmartMoneyTransaction, now: DateTime<Utc>) {
        for (timeframe, window) in &self.windows {
            let horizon = now - timeframe.duration();
            if tx.trade.block_time < horizon {
                continue;
            }
            let mut window = window.write().await;
            evict(&mut window, horizon);
            window.push_back(tx.clone());
        }
    }

    /// 타임프레임 랭킹.
    ///
    /// 요청 차원 내림차순, 동률이면 민트 주소 오름차순입니다.
    pub async fn rank(&self, timeframe: Timeframe, dimension: RankDimension, limit: usize) -> RankingSnapshot {
        self.rank_at(timeframe, dimension, limit, Utc::now()).await
    }

    pub async fn rank_at(
        &self,
        timeframe: Timeframe,
        dimension: RankDimension,
        limit: usize,
        now: DateTime<Utc>,
    ) -> RankingSnapshot {
        let horizon = now - timeframe.duration();
        let snapshot: Vec<SmartMoneyTransaction> = match self.windows.get(&timeframe) {
            Some(window) => {
                let mut window = window.write().await;
                evict(&mut window, horizon);
                window
                    .iter()
                    .filter(|tx| tx.trade.block_time >= horizon)
                    .cloned()
                    .collect()
            }
            None => Vec::new(),
        };

        let mut rankings = self.aggregate(&snapshot);
        rankings.sort_by(|a, b| {
            b.metric(dimension)
                .cmp(&a.metric(dimension))
                .then_with(|| a.token_mint.cmp(&b.token_mint))
        });
        rankings.truncate(limit.min(MAX_RANK_LIMIT));
        for (i, ranking) in rankings.iter_mut().enumerate() {
            ranking.rank = i + 1;
        }

        RankingSnapshot {
            timeframe,
            dimension,
            as_of: now,
            rankings,
        }
    }

    /// 윈도우에 남아 있는 거래 수.
    pub async fn window_len(&self, timeframe: Timeframe) -> usize {
        match self.windows.get(&timeframe) {
            Some(window) => window.read().await.len(),
            None => 0,
        }
    }

    fn aggregate(&self, transactions: &[SmartMoneyTransaction]) -> Vec<TokenRanking> {
        #[derive(Default)]
        struct Acc {
            transaction_count: u64,
            buy_count: u64,
            sell_count: u64,
            buy_volume: Decimal,
            sell_volume: Decimal,
            buyers: HashSet<String>,
            sellers: HashSet<String>,
        }

        let mut by_mint: HashMap<String, Acc> = HashMap::new();
        for tx in transactions {
            let trade = &tx.trade;
            let mint = trade.token_mint(&self.quote_mint);
            if mint == self.quote_mint || mint.is_empty() {
                continue;
            }

            let acc = by_mint.entry(mint.to_string()).or_default();
            acc.transaction_count += 1;
            let quote = trade.quote_amount(&self.quote_mint).unwrap_or_default();
            match trade.side {
                // 토큰 간 교환은 수령 토큰의 매수로 집계하되 견적 거래량은 없음
                TradeSide::Buy | TradeSide::Swap => {
                    acc.buy_count += 1;
                    acc.buy_volume += quote;
                    acc.buyers.insert(trade.signer.clone());
                }
                TradeSide::Sell => {
                    acc.sell_count += 1;
                    acc.sell_volume += quote;
                    acc.sellers.insert(trade.signer.clone());
                }
            }
        }

        by_mint
            .into_iter()
            .map(|(token_mint, acc)| TokenRanking {
                token_mint,
                transaction_count: acc.transaction_count,
                buy_count: acc.buy_count,
                sell_count: acc.sell_count,
                buy_volume: acc.buy_volume,
                sell_volume: acc.sell_volume,
                unique_buyers: acc.buyers.len(),
                unique_sellers: acc.sellers.len(),
                rank: 0,
            })
            .collect()
    }
}

fn evict(window: &mut Window, horizon: DateTime<Utc>) {
    while window
        .front()
        .is_some_and(|tx| tx.trade.block_time < horizon)
    {
        window.pop_front();
    }
}
