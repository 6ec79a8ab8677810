//! 토큰 메타데이터와 심볼 해석.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// 토큰 메타데이터.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub mint_address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: Option<u8>,
    /// 시가총액 (미확인 시 None)
    pub market_cap: Option<Decimal>,
}

impl TokenInfo {
    pub fn new(
        mint_address: impl Into<String>,
        symbol: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            mint_address: mint_address.into(),
            symbol: symbol.into(),
            name: name.into(),
            decimals: None,
            market_cap: None,
        }
    }

    pub fn with_market_cap(mut self, market_cap: Decimal) -> Self {
        self.market_cap = Some(market_cap);
        self
    }
}

/// 심볼 충돌 시 우선순위 비교.
///
/// 시가총액 내림차순, 시가총액이 없는 항목은 뒤로, 동률이면 민트 주소 오름차순.
pub fn compare_by_market_cap(a: &TokenInfo, b: &TokenInfo) -> Ordering {
    let by_cap = match (a.market_cap, b.market_cap) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_cap.then_with(|| a.mint_address.cmp(&b.mint_address))
}

/// 같은 심볼을 가진 후보들 중 하나를 결정적으로 선택합니다.
pub fn resolve_symbol<'a, I>(candidates: I) -> Option<&'a TokenInfo>
where
    I: IntoIterator<Item = &'a TokenInfo>,
{
    candidates
        .into_iter()
        .min_by(|a, b| compare_by_market_cap(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_highest_market_cap_wins() {
        let tokens = vec![
            TokenInfo::new("MintB", "BONK", "Bonk B").with_market_cap(dec!(100)),
            TokenInfo::new("MintA", "BONK", "Bonk A").with_market_cap(dec!(5000)),
            TokenInfo::new("MintC", "BONK", "Bonk C"),
        ];
        assert_eq!(resolve_symbol(&tokens).unwrap().mint_address, "MintA");
    }

    #[test]
    fn test_unknown_market_cap_sorts_last() {
        let tokens = vec![
            TokenInfo::new("Mint1", "X", "x"),
            TokenInfo::new("Mint2", "X", "x").with_market_cap(dec!(1)),
        ];
        assert_eq!(resolve_symbol(&tokens).unwrap().mint_address, "Mint2");
    }

    #[test]
    fn test_tie_broken_by_mint_address() {
        let tokens = vec![
            TokenInfo::new("Zed", "X", "x").with_market_cap(dec!(10)),
            TokenInfo::new("Abc", "X", "x").with_market_cap(dec!(10)),
        ];
        assert_eq!(resolve_symbol(&tokens).unwrap().mint_address, "Abc");

        let none: Vec<TokenInfo> = Vec::new();
        assert!(resolve_symbol(&none).is_none());
    }

    proptest! {
        #[test]
        fn prop_resolution_independent_of_order(
            caps in proptest::collection::vec(proptest::option::of(0u32..1000), 1..8)
        ) {
            let tokens: Vec<TokenInfo> = caps
                .iter()
                .enumerate()
                .map(|(i, cap)| {
                    let mut t = TokenInfo::new(format!("Mint{:02}", i), "SYM", "sym");
                    t.market_cap = cap.map(Decimal::from);
                    t
                })
                .collect();

            let forward = resolve_symbol(&tokens).map(|t| t.mint_address.clone());
            let mut reversed = tokens.clone();
            reversed.reverse();
            let backward = resolve_symbol(&reversed).map(|t| t.mint_address.clone());

            prop_assert_eq!(forward, backward);
        }
    }
}
