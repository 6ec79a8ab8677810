//! 트레이드 룸 시스템의 에러 타입.
//!
//! 비즈니스 규칙 에러(Validation/NotFound/Auth/Forbidden/ClosedRoom)는 호출자에게
//! 구조화된 응답으로 전달되고, 파이프라인 내부 에러(Parse/Duplicate/Transport/Provider)는
//! 발생 지점에서 로그로 남긴 뒤 흡수됩니다.

use thiserror::Error;

/// 트레이드 룸 핵심 에러.
#[derive(Debug, Error)]
pub enum RoomError {
    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    Validation(String),

    /// 룸 또는 멤버를 찾을 수 없음
    #[error("찾을 수 없음: {0}")]
    NotFound(String),

    /// 비밀번호 불일치
    #[error("인증 실패: {0}")]
    Auth(String),

    /// 권한 없음 (생성자가 아닌 사용자의 관리 작업 등)
    #[error("권한 없음: {0}")]
    Forbidden(String),

    /// 종료된 룸에 대한 작업
    #[error("종료된 룸: {0}")]
    ClosedRoom(String),

    /// 트랜잭션 페이로드 파싱 실패
    #[error("파싱 에러: {0}")]
    Parse(String),

    /// 이미 처리된 시그니처
    #[error("중복 트랜잭션: {0}")]
    Duplicate(String),

    /// 소켓 쓰기 실패
    #[error("전송 에러: {0}")]
    Transport(String),

    /// 프로바이더 구독/해제 실패
    #[error("프로바이더 에러: {0}")]
    Provider(String),

    /// 내부 에러
    #[error("내부 에러: {0}")]
    Internal(String),
}

/// 트레이드 룸 작업을 위한 Result 타입.
pub type RoomResult<T> = Result<T, RoomError>;

impl RoomError {
    /// 응답 envelope에 실리는 에러 코드.
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::Validation(_) => "VALIDATION_ERROR",
            RoomError::NotFound(_) => "NOT_FOUND",
            RoomError::Auth(_) => "AUTH_ERROR",
            RoomError::Forbidden(_) => "FORBIDDEN",
            RoomError::ClosedRoom(_) => "ROOM_CLOSED",
            RoomError::Parse(_) => "PARSE_ERROR",
            RoomError::Duplicate(_) => "DUPLICATE",
            RoomError::Transport(_) => "TRANSPORT_ERROR",
            RoomError::Provider(_) => "PROVIDER_ERROR",
            RoomError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 호출자에게 그대로 노출되는 비즈니스 규칙 에러인지 확인합니다.
    pub fn is_surfaced(&self) -> bool {
        matches!(
            self,
            RoomError::Validation(_)
                | RoomError::NotFound(_)
                | RoomError::Auth(_)
                | RoomError::Forbidden(_)
                | RoomError::ClosedRoom(_)
        )
    }

    /// 재시도 가능한 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RoomError::Provider(_) | RoomError::Transport(_))
    }
}

impl From<serde_json::Error> for RoomError {
    fn from(err: serde_json::Error) -> Self {
        RoomError::Parse(err.to_string())
    }
}

impl From<config::ConfigError> for RoomError {
    fn from(err: config::ConfigError) -> Self {
        RoomError::Validation(format!("설정 로드 실패: {}", err))
    }
}
