//! # TradeRoom Core
//!
//! 트레이드 룸 시스템의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! - 룸/멤버 생명주기와 룸 단위 거래 집계
//! - 정규화된 스왑 거래 이벤트
//! - 스마트 머니 랭킹 타입
//! - 공유 정보와 토큰 메타데이터
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
