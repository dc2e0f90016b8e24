//! 가격 마트 도메인 에러 타입.
//!
//! 행 단위 스키마 에러는 호출자가 복구(거부 후 집계)하고,
//! 나머지 에러는 실행 전체를 중단시킵니다.

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::refresh_state::RefreshState;

/// 원시 행에서 누락/잘못된 필드.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaField {
    Symbol,
    Date,
    Open,
    High,
    Low,
    Close,
}

impl SchemaField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Symbol => "symbol",
            Self::Date => "date",
            Self::Open => "open",
            Self::High => "high",
            Self::Low => "low",
            Self::Close => "close",
        }
    }
}

impl std::fmt::Display for SchemaField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 차원에 존재하지 않는 팩트 키.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingMember {
    /// `dim_asset`에 없는 심볼
    Symbol(String),
    /// `dim_calendar`에 없는 날짜
    Date(NaiveDate),
}

impl std::fmt::Display for MissingMember {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Symbol(symbol) => write!(f, "symbol {} absent from asset dimension", symbol),
            Self::Date(date) => write!(f, "date {} absent from calendar dimension", date),
        }
    }
}

/// 마트 도메인 에러.
#[derive(Debug, Error)]
pub enum MartError {
    /// 원시 행의 필수 필드 누락 (행 단위, 복구 가능)
    #[error("input schema error at row {row}: missing {field}")]
    InputSchema { row: usize, field: SchemaField },

    /// 갓 재계산한 차원에 팩트 키가 없음 (코디네이터 순서 버그)
    #[error("dimension divergence ({count} rows): {first}")]
    DimensionDivergence { first: MissingMember, count: usize },

    /// 이동평균 윈도우 설정 오류
    #[error("invalid moving average windows: {0}")]
    InvalidWindow(String),

    /// 허용되지 않는 상태 전이
    #[error("invalid refresh transition: {from} -> {to}")]
    InvalidTransition { from: RefreshState, to: RefreshState },

    /// 설정 에러
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for MartError {
    fn from(err: config::ConfigError) -> Self {
        MartError::Config(err.to_string())
    }
}

/// 마트 도메인 Result 타입.
pub type MartResult<T> = Result<T, MartError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let schema = MartError::InputSchema {
            row: 3,
            field: SchemaField::Close,
        };
        assert_eq!(schema.to_string(), "input schema error at row 3: missing close");

        let divergence = MartError::DimensionDivergence {
            first: MissingMember::Symbol("MSFT".to_string()),
            count: 2,
        };
        assert!(divergence.to_string().contains("MSFT"));
    }
}
