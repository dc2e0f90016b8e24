//! 에러 타입 정의.

use mart_core::MartError;
use thiserror::Error;

/// 리프레시 작업 에러 타입
#[derive(Debug, Error)]
pub enum RefreshError {
    /// 데이터베이스 에러
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 스테이징 테이블 작성 또는 교체 실패
    #[error("publish error on {table}: {message}")]
    Publish { table: String, message: String },

    /// 설정 에러
    #[error("configuration error: {0}")]
    Config(String),

    /// 도메인 에러 (차원 불일치, 상태 전이 등)
    #[error(transparent)]
    Domain(#[from] MartError),
}

impl RefreshError {
    /// 테이블 이름과 원인으로 게시 에러를 만듭니다.
    pub fn publish(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Publish {
            table: table.into(),
            message: message.to_string(),
        }
    }
}

impl From<std::env::VarError> for RefreshError {
    fn from(err: std::env::VarError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, RefreshError>;
