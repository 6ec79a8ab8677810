//! 통합 API 응답 envelope.
//!
//! 모든 REST 엔드포인트는 비즈니스 결과와 관계없이 HTTP 200과 함께
//! `{success, message, data}` envelope를 반환합니다. 실패 여부는 `success` 플래그로
//! 판단하며, 실패 시 `code`에 [`RoomError::code`] 값이 실립니다.
//!
//! ```json
//! {
//!   "success": false,
//!   "message": "종료된 룸: 3f1c...",
//!   "code": "ROOM_CLOSED",
//!   "data": null,
//!   "timestamp": 1738300800
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::ValidationErrors;

use traderoom_core::{RoomError, RoomResult};

/// API 응답 envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// 성공 여부
    pub success: bool,
    /// 사람이 읽을 수 있는 메시지
    pub message: String,
    /// 응답 데이터 (실패 시 None)
    pub data: Option<T>,
    /// 에러 코드 (실패 시에만)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// 추가 에러 상세 정보
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// 응답 타임스탬프 (Unix timestamp)
    pub timestamp: i64,
}

impl<T> ApiResponse<T> {
    /// 성공 응답.
    pub fn ok(data: T) -> Self {
        Self::ok_with_message(data, "ok")
    }

    /// 메시지를 포함한 성공 응답.
    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            code: None,
            details: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// 도메인 에러로부터 실패 응답 생성.
    pub fn fail(error: RoomError) -> Self {
        if !error.is_surfaced() {
            tracing::warn!(code = error.code(), error = %error, "Non-business error surfaced to API");
        }
        Self::fail_with_code(error.code(), error.to_string())
    }

    /// 코드와 메시지로 실패 응답 생성.
    pub fn fail_with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            code: Some(code.into()),
            details: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// 요청 DTO 검증 실패 응답.
    pub fn invalid(errors: &ValidationErrors) -> Self {
        let mut response = Self::fail_with_code("VALIDATION_ERROR", "잘못된 요청 파라미터");
        response.details = serde_json::to_value(errors.field_errors()).ok();
        response
    }

    /// `RoomResult`를 envelope로 변환합니다.
    pub fn from_result(result: RoomResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::fail(err),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_ok_envelope() {
        let response = ApiResponse::ok(42);
        assert!(response.success);
        assert_eq!(response.data, Some(42));
        assert!(response.code.is_none());

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""success":true"#));
        assert!(!json.contains("code"));
    }

    #[test]
    fn test_fail_envelope_carries_code() {
        let response: ApiResponse<()> = ApiResponse::fail(RoomError::ClosedRoom("r1".into()));
        assert!(!response.success);
        assert_eq!(response.code.as_deref(), Some("ROOM_CLOSED"));
        assert!(response.data.is_none());
    }

    #[test]
    fn test_failure_is_still_http_200() {
        let response: ApiResponse<()> = ApiResponse::fail(RoomError::NotFound("room".into()));
        assert_eq!(response.into_response().status(), StatusCode::OK);
    }

    #[derive(Validate)]
    struct Probe {
        #[validate(length(min = 1))]
        wallet: String,
    }

    #[test]
    fn test_invalid_includes_field_details() {
        let errors = Probe {
            wallet: String::new(),
        }
        .validate()
        .unwrap_err();
        let response: ApiResponse<()> = ApiResponse::invalid(&errors);
        assert_eq!(response.code.as_deref(), Some("VALIDATION_ERROR"));
        let details = response.details.unwrap();
        assert!(details.get("wallet").is_some());
    }
}
