//! 룸과 멤버 도메인 모델.
//!
//! 룸 상태는 `Creating → Open → Closed` 방향으로만 진행되며 되돌아가지 않습니다.
//! 멤버는 룸 ID만 역참조로 보유하고, 룸은 멤버 지갑 주소 목록만 소유합니다.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::trade::{TradeEvent, TradeSide};
use crate::error::{RoomError, RoomResult};

/// 룸 생명주기 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// 생성 중
    Creating,
    /// 열림 (참여/브로드캐스트 가능)
    Open,
    /// 종료 (최종 상태)
    Closed,
}

impl RoomStatus {
    /// 다음 상태로 전이 가능한지 확인합니다.
    pub fn can_transition_to(self, next: RoomStatus) -> bool {
        matches!(
            (self, next),
            (RoomStatus::Creating, RoomStatus::Open) | (RoomStatus::Open, RoomStatus::Closed)
        )
    }

    /// 문자열 표현.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Creating => "creating",
            RoomStatus::Open => "open",
            RoomStatus::Closed => "closed",
        }
    }
}

impl std::str::FromStr for RoomStatus {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "creating" => Ok(RoomStatus::Creating),
            "open" => Ok(RoomStatus::Open),
            "closed" => Ok(RoomStatus::Closed),
            other => Err(RoomError::Validation(format!("알 수 없는 룸 상태: {}", other))),
        }
    }
}

/// 트레이드 룸.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// 외부에 노출되는 룸 식별자
    pub id: String,
    /// 생성자 지갑 주소
    pub creator_wallet: String,
    /// 관찰 중인 토큰 민트 주소
    pub token_address: Option<String>,
    /// 비밀번호 PHC 해시 (직렬화하지 않음)
    #[serde(skip)]
    pub password_hash: Option<String>,
    /// 비밀번호 설정 여부
    pub has_password: bool,
    /// 비활성 후 재활용까지의 시간
    pub recycle_hours: i64,
    /// 생명주기 상태
    pub status: RoomStatus,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
    /// 마지막 활동 시각
    pub last_active_time: DateTime<Utc>,
    /// 종료 시각
    pub closed_at: Option<DateTime<Utc>>,
    /// 멤버 지갑 주소 목록 (활성/비활성 포함)
    pub member_wallets: Vec<String>,
}

impl Room {
    /// `Creating` 상태의 새 룸을 생성합니다.
    pub fn new(
        id: impl Into<String>,
        creator_wallet: impl Into<String>,
        token_address: Option<String>,
        recycle_hours: i64,
        password_hash: Option<String>,
        now: DateTime<Utc>,
    ) -> RoomResult<Self> {
        if recycle_hours <= 0 {
            return Err(RoomError::Validation(format!(
                "recycleHours는 0보다 커야 합니다: {}",
                recycle_hours
            )));
        }

        Ok(Self {
            id: id.into(),
            creator_wallet: creator_wallet.into(),
            token_address,
            has_password: password_hash.is_some(),
            password_hash,
            recycle_hours,
            status: RoomStatus::Creating,
            created_at: now,
            last_active_time: now,
            closed_at: None,
            member_wallets: Vec::new(),
        })
    }

    fn transition(&mut self, next: RoomStatus) -> RoomResult<()> {
        if self.status == RoomStatus::Closed {
            return Err(RoomError::ClosedRoom(self.id.clone()));
        }
        if !self.status.can_transition_to(next) {
            return Err(RoomError::Validation(format!(
                "룸 상태 전이 불가: {} → {}",
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        Ok(())
    }

    /// `Creating → Open` 전이.
    pub fn open(&mut self, now: DateTime<Utc>) -> RoomResult<()> {
        self.transition(RoomStatus::Open)?;
        self.last_active_time = now;
        Ok(())
    }

    /// `Open → Closed` 전이. 종료는 최종 상태입니다.
    pub fn close(&mut self, now: DateTime<Utc>) -> RoomResult<()> {
        self.transition(RoomStatus::Closed)?;
        self.closed_at = Some(now);
        Ok(())
    }

    /// 종료 여부.
    pub fn is_closed(&self) -> bool {
        self.status == RoomStatus::Closed
    }

    /// 활동 시각 갱신.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_active_time {
            self.last_active_time = now;
        }
    }

    /// 재활용 시간이 지났는지 확인합니다.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.last_active_time > Duration::hours(self.recycle_hours)
    }

    /// 멤버 지갑을 목록에 추가합니다 (중복 없음).
    pub fn add_member_wallet(&mut self, wallet: &str) {
        if !self.member_wallets.iter().any(|w| w == wallet) {
            self.member_wallets.push(wallet.to_string());
        }
    }
}

/// 룸 멤버.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// 소속 룸 ID (역참조)
    pub room_id: String,
    /// 지갑 주소
    pub wallet_address: String,
    /// 참여 시각
    pub join_time: DateTime<Utc>,
    /// 마지막 활동 시각
    pub last_active_time: DateTime<Utc>,
    /// 퇴장 시각
    pub leave_time: Option<DateTime<Utc>>,
    /// 활성 여부
    pub active: bool,
}

impl Member {
    /// 새 활성 멤버 생성.
    pub fn new(room_id: impl Into<String>, wallet: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            room_id: room_id.into(),
            wallet_address: wallet.into(),
            join_time: now,
            last_active_time: now,
            leave_time: None,
            active: true,
        }
    }

    /// 재참여. 이미 활성 상태였다면 `false`를 반환합니다.
    pub fn reactivate(&mut self, now: DateTime<Utc>) -> bool {
        self.last_active_time = now;
        if self.active {
            return false;
        }
        self.active = true;
        self.join_time = now;
        self.leave_time = None;
        true
    }

    /// 퇴장. 이미 비활성 상태였다면 `false`를 반환합니다.
    pub fn deactivate(&mut self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.leave_time = Some(now);
        self.last_active_time = now;
        true
    }
}

/// 룸 단위 거래 집계.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStats {
    /// 라우팅된 거래 수
    pub trade_count: u64,
    /// 매수 거래량 (견적 자산 기준)
    pub buy_volume: Decimal,
    /// 매도 거래량 (견적 자산 기준)
    pub sell_volume: Decimal,
    /// 마지막 거래 시각
    pub last_trade_time: Option<DateTime<Utc>>,
    /// 멤버별 실현 견적 자산 흐름 (수령 - 지출)
    pub member_pnl: HashMap<String, Decimal>,
}

impl RoomStats {
    /// 거래 이벤트를 집계에 반영합니다.
    ///
    /// `signer_is_member`가 참이면 서명자의 견적 자산 흐름을 PNL에 누적합니다.
    pub fn apply(&mut self, event: &TradeEvent, quote_mint: &str, signer_is_member: bool) {
        self.trade_count += 1;
        self.last_trade_time = Some(match self.last_trade_time {
            Some(prev) if prev > event.block_time => prev,
            _ => event.block_time,
        });

        let quote = event.quote_amount(quote_mint).unwrap_or_default();
        let flow = match event.side {
            TradeSide::Buy => {
                self.buy_volume += quote;
                -quote
            }
            TradeSide::Sell => {
                self.sell_volume += quote;
                quote
            }
            TradeSide::Swap => Decimal::ZERO,
        };

        if signer_is_member {
            *self.member_pnl.entry(event.signer.clone()).or_default() += flow;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn room(now: DateTime<Utc>) -> Room {
        Room::new("room-1", "creator", Some("MintX".into()), 1, None, now).unwrap()
    }

    #[test]
    fn test_room_lifecycle_only_advances() {
        let now = Utc::now();
        let mut r = room(now);
        assert_eq!(r.status, RoomStatus::Creating);

        r.open(now).unwrap();
        assert_eq!(r.status, RoomStatus::Open);
        assert!(r.open(now).is_err());

        r.close(now).unwrap();
        assert!(r.is_closed());
        assert!(matches!(r.open(now), Err(RoomError::ClosedRoom(_))));
        assert!(matches!(r.close(now), Err(RoomError::ClosedRoom(_))));
    }

    #[test]
    fn test_creating_cannot_close_directly() {
        let mut r = room(Utc::now());
        assert!(matches!(r.close(Utc::now()), Err(RoomError::Validation(_))));
    }

    #[test]
    fn test_recycle_hours_must_be_positive() {
        let result = Room::new("r", "c", None, 0, None, Utc::now());
        assert!(matches!(result, Err(RoomError::Validation(_))));
        assert!(Room::new("r", "c", None, -3, None, Utc::now()).is_err());
    }

    #[test]
    fn test_room_expiry() {
        let now = Utc::now();
        let mut r = room(now - Duration::hours(2));
        r.open(now - Duration::hours(2)).unwrap();
        assert!(r.is_expired(now));

        r.touch(now);
        assert!(!r.is_expired(now));
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let r = Room::new("r", "c", None, 24, Some("$argon2id$secret".into()), Utc::now()).unwrap();
        let json = serde_json::to_string(&r).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(json.contains(r#""hasPassword":true"#));
    }

    #[test]
    fn test_member_rejoin_reactivates() {
        let now = Utc::now();
        let mut m = Member::new("r", "wallet", now);
        assert!(!m.reactivate(now));

        assert!(m.deactivate(now));
        assert!(!m.deactivate(now));
        assert!(m.leave_time.is_some());

        assert!(m.reactivate(now));
        assert!(m.active);
        assert!(m.leave_time.is_none());
    }

    #[test]
    fn test_room_stats_apply() {
        use crate::config::NATIVE_QUOTE_MINT;

        let now = Utc::now();
        let buy = TradeEvent::builder("sig1", "wallet-a")
            .block_time(now)
            .input(NATIVE_QUOTE_MINT, dec!(2))
            .output("MintX", dec!(1000))
            .build(NATIVE_QUOTE_MINT);
        let sell = TradeEvent::builder("sig2", "wallet-a")
            .block_time(now)
            .input("MintX", dec!(500))
            .output(NATIVE_QUOTE_MINT, dec!(1.5))
            .build(NATIVE_QUOTE_MINT);

        let mut stats = RoomStats::default();
        stats.apply(&buy, NATIVE_QUOTE_MINT, true);
        stats.apply(&sell, NATIVE_QUOTE_MINT, true);

        assert_eq!(stats.trade_count, 2);
        assert_eq!(stats.buy_volume, dec!(2));
        assert_eq!(stats.sell_volume, dec!(1.5));
        assert_eq!(stats.member_pnl.get("wallet-a"), Some(&dec!(-0.5)));
    }
}
