//! 룸 접근 인증.
//!
//! 비밀번호가 설정된 룸은 Argon2 PHC 해시만 보관하고, 참여 시 대조합니다.

mod password;

pub use password::{
    check_room_password, hash_password, prepare_room_password, verify_password, PasswordError,
    MAX_PASSWORD_LEN,
};
