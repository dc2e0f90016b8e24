//! 운영 실행 로그 (`etl_run_log`).
//!
//! 실행마다 한 행을 남깁니다. 기록 실패는 실행 결과를 바꾸지 않습니다.

use chrono::{DateTime, Utc};
use mart_core::RefreshState;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stats::RefreshStats;

/// 에러 메시지 컬럼 최대 길이 (문자 수).
pub const MAX_ERROR_MESSAGE_CHARS: usize = 1800;

/// 실행 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// 전체 재계산
    Full,
    /// 심볼/기간 부분 재계산
    Subset,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Subset => "subset",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `details` 컬럼 내용.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDetails {
    /// 실제로 실행된 모드
    pub effective_mode: RunMode,
    /// 부분 실행이 전체 실행으로 승격되었는지
    pub escalated: bool,
    /// 실패 직전에 도달한 상태
    pub last_state: RefreshState,
    pub stats: RefreshStats,
}

/// 실행 로그 한 행.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: Uuid,
    /// 요청된 모드
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// 종료 상태 (`DONE` 또는 `FAILED`)
    pub status: RefreshState,
    pub details: RunDetails,
    pub error_message: Option<String>,
}

impl RunRecord {
    /// `details`를 JSON 문자열로 직렬화합니다.
    pub fn details_json(&self) -> String {
        serde_json::to_string(&self.details).unwrap_or_else(|e| {
            tracing::warn!(run_id = %self.run_id, error = %e, "실행 로그 details 직렬화 실패");
            "{}".to_string()
        })
    }
}

/// 에러 메시지를 컬럼 길이에 맞게 자릅니다.
pub fn truncate_error(message: &str) -> String {
    message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_error_counts_chars() {
        let long = "가".repeat(MAX_ERROR_MESSAGE_CHARS + 10);
        let truncated = truncate_error(&long);
        assert_eq!(truncated.chars().count(), MAX_ERROR_MESSAGE_CHARS);
        assert_eq!(truncate_error("short"), "short");
    }

    #[test]
    fn test_details_json() {
        let record = RunRecord {
            run_id: Uuid::new_v4(),
            mode: RunMode::Subset,
            started_at: Utc::now(),
            ended_at: Utc::now(),
            status: RefreshState::Done,
            details: RunDetails {
                effective_mode: RunMode::Full,
                escalated: true,
                last_state: RefreshState::Done,
                stats: RefreshStats::new(),
            },
            error_message: None,
        };
        let json: serde_json::Value = serde_json::from_str(&record.details_json()).unwrap();
        assert_eq!(json["effective_mode"], "full");
        assert_eq!(json["escalated"], true);
        assert_eq!(json["last_state"], "DONE");
    }
}
