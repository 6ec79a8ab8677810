//! 스마트 머니 지갑 레지스트리.

use dashmap::DashMap;
use serde::Serialize;

use traderoom_core::SmartMoneyWallet;

/// 태그가 붙은 지갑.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggedWallet {
    pub address: String,
    pub tag: String,
}

/// 지갑 → 태그 매핑. 런타임에 추가/삭제할 수 있습니다.
#[derive(Debug, Default)]
pub struct SmartMoneyRegistry {
    wallets: DashMap<String, String>,
}

impl SmartMoneyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(wallets: &[SmartMoneyWallet]) -> Self {
        let registry = Self::new();
        for wallet in wallets {
            registry.insert(&wallet.address, &wallet.tag);
        }
        registry
    }

    /// 지갑 태그.
    pub fn tag(&self, wallet: &str) -> Option<String> {
        self.wallets.get(wallet).map(|t| t.value().clone())
    }

    /// 등록 또는 태그 변경. 이전 태그를 반환합니다.
    pub fn insert(&self, wallet: &str, tag: &str) -> Option<String> {
        self.wallets.insert(wallet.to_string(), tag.to_string())
    }

    pub fn remove(&self, wallet: &str) -> Option<String> {
        self.wallets.remove(wallet).map(|(_, tag)| tag)
    }

    /// 주소 오름차순 목록.
    pub fn list(&self) -> Vec<TaggedWallet> {
        let mut wallets: Vec<TaggedWallet> = self
            .wallets
            .iter()
            .map(|e| TaggedWallet {
                address: e.key().clone(),
                tag: e.value().clone(),
            })
            .collect();
        wallets.sort_by(|a, b| a.address.cmp(&b.address));
        wallets
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}
