//! 룸 멤버가 공유한 정보 (링크, 차트 등).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RoomError, RoomResult};

/// 공유 정보 항목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedInfo {
    pub id: String,
    pub room_id: String,
    pub sharer_wallet: String,
    pub url: String,
    /// 정보 유형 (예: "chart", "tweet", "link")
    pub info_type: String,
    /// 자유 형식 메타데이터
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub shared_at: DateTime<Utc>,
}

impl SharedInfo {
    /// 새 공유 정보를 생성합니다. URL이 비어 있으면 거부합니다.
    pub fn new(
        id: impl Into<String>,
        room_id: impl Into<String>,
        sharer_wallet: impl Into<String>,
        url: impl Into<String>,
        info_type: impl Into<String>,
        metadata: Option<serde_json::Value>,
        shared_at: DateTime<Utc>,
    ) -> RoomResult<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(RoomError::Validation("공유 URL이 비어 있습니다".to_string()));
        }

        let info_type = info_type.into();
        Ok(Self {
            id: id.into(),
            room_id: room_id.into(),
            sharer_wallet: sharer_wallet.into(),
            url,
            info_type: if info_type.is_empty() {
                "link".to_string()
            } else {
                info_type
            },
            metadata,
            shared_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_url_rejected() {
        let result = SharedInfo::new("1", "r", "w", "  ", "chart", None, Utc::now());
        assert!(matches!(result, Err(RoomError::Validation(_))));
    }

    #[test]
    fn test_default_info_type() {
        let info = SharedInfo::new("1", "r", "w", "https://x.io", "", None, Utc::now()).unwrap();
        assert_eq!(info.info_type, "link");
    }
}
