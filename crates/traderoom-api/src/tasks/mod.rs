//! 백그라운드 태스크 모듈.
//!
//! 서버 실행 중 주기적으로 실행되는 정리 작업을 정의합니다.
//! - 룸 만료 처리: recycle 시간이 지난 룸 종료
//! - 연결 정리: ping이 끊긴 WebSocket 연결 제거
//! - 시그니처 정리: 보존 기간이 지난 중복 제거 항목 삭제
//! - Rate limit 정리: 유휴 클라이언트 버킷 삭제
//! - 구독 재시도: 실패한 프로바이더 구독 재시도

mod housekeeping;

pub use housekeeping::{run_periodic, spawn_background_tasks, BackgroundTasks};
