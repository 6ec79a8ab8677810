//! 룸 비밀번호 해싱 유틸리티.
//!
//! Argon2id 기반 해싱 및 검증. 평문 비밀번호는 저장하지 않습니다.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use traderoom_core::{Room, RoomError, RoomResult};

/// 룸 비밀번호 최대 길이.
pub const MAX_PASSWORD_LEN: usize = 64;

/// 비밀번호 처리 에러.
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("비밀번호 해싱 실패")]
    HashingFailed,
    #[error("비밀번호 검증 실패")]
    VerificationFailed,
    #[error("잘못된 해시 형식")]
    InvalidHashFormat,
}

impl From<PasswordError> for RoomError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::VerificationFailed => RoomError::Auth("비밀번호가 일치하지 않습니다".into()),
            PasswordError::HashingFailed | PasswordError::InvalidHashFormat => {
                RoomError::Internal(err.to_string())
            }
        }
    }
}

/// 비밀번호 해싱.
///
/// PHC 형식의 해시 문자열(솔트 포함)을 반환합니다.
///
/// ```rust,ignore
/// let hash = hash_password("room-secret").unwrap();
/// // "$argon2id$v=19$m=19456,t=2,p=1$..."
/// ```
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| PasswordError::HashingFailed)?;

    Ok(hash.to_string())
}

/// 저장된 해시와 입력된 비밀번호를 비교합니다.
pub fn verify_password(password: &str, hash: &str) -> Result<(), PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| PasswordError::VerificationFailed)
}

/// 룸 생성 시 선택적 비밀번호를 검증하고 해싱합니다.
///
/// 빈 문자열은 비밀번호 없음으로 취급합니다.
pub fn prepare_room_password(password: Option<&str>) -> RoomResult<Option<String>> {
    match password {
        None => Ok(None),
        Some(p) if p.is_empty() => Ok(None),
        Some(p) if p.chars().count() > MAX_PASSWORD_LEN => Err(RoomError::Validation(format!(
            "비밀번호는 최대 {}자입니다",
            MAX_PASSWORD_LEN
        ))),
        Some(p) => Ok(Some(hash_password(p)?)),
    }
}

/// 참여 요청의 비밀번호를 룸 해시와 대조합니다.
///
/// 비밀번호가 없는 룸은 입력값과 관계없이 통과합니다.
pub fn check_room_password(room: &Room, password: Option<&str>) -> RoomResult<()> {
    let Some(hash) = room.password_hash.as_deref() else {
        return Ok(());
    };

    match password {
        Some(p) if !p.is_empty() => Ok(verify_password(p, hash)?),
        _ => Err(RoomError::Auth("비밀번호가 필요한 룸입니다".into())),
    }
}
