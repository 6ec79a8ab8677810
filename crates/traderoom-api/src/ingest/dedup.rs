//! 서명 기반 중복 제거.
//!
//! 보존 기간 안에 이미 처리된 서명은 다시 처리하지 않습니다. 프로바이더의
//! 재전송(ack 실패 시 재시도)에 대한 at-most-once 보장입니다.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// 서명 중복 제거기.
#[derive(Debug)]
pub struct SignatureDedup {
    seen: DashMap<String, Instant>,
    retention: Duration,
}

impl SignatureDedup {
    pub fn new(retention: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            retention,
        }
    }

    /// 처음 보는 서명이면 기록하고 `true`, 보존 기간 내 중복이면 `false`.
    ///
    /// 확인과 기록이 같은 샤드 잠금 안에서 이루어지므로 동시 호출 중 하나만 `true`를 받습니다.
    pub fn check_and_mark(&self, signature: &str) -> bool {
        self.check_and_mark_at(signature, Instant::now())
    }

    pub fn check_and_mark_at(&self, signature: &str, now: Instant) -> bool {
        match self.seen.entry(signature.to_string()) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) < self.retention {
                    false
                } else {
                    entry.insert(now);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// 보존 기간 내에 처리된 서명인지 확인합니다 (기록하지 않음).
    pub fn is_seen(&self, signature: &str) -> bool {
        self.seen
            .get(signature)
            .is_some_and(|at| at.elapsed() < self.retention)
    }

    /// 보존 기간이 지난 서명 제거. 제거 수 반환.
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Instant::now())
    }

    pub fn evict_expired_at(&self, now: Instant) -> usize {
        let before = self.seen.len();
        self.seen
            .retain(|_, at| now.duration_since(*at) < self.retention);
        before.saturating_sub(self.seen.len())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
