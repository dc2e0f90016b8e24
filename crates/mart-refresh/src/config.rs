//! 실행 설정 모듈.
//!
//! 파이프라인 설정(`MartConfig`)은 TOML + `MART__` 환경변수에서,
//! 데이터베이스 URL은 `.env` 또는 `DATABASE_URL` 환경변수에서 읽습니다.

use mart_core::MartConfig;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::Path;
use std::time::Duration;

use crate::error::RefreshError;
use crate::Result;

/// 리프레시 작업 전체 설정
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// 데이터베이스 URL
    pub database_url: String,
    /// 파이프라인 설정
    pub mart: MartConfig,
}

impl RefreshConfig {
    /// `.env`, 설정 파일, 환경변수에서 설정 로드
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL").map_err(|_| {
            RefreshError::Config("DATABASE_URL 환경변수가 설정되지 않았습니다".to_string())
        })?;

        let mart = MartConfig::load(path)?;

        Ok(Self { database_url, mart })
    }

    /// 연결 풀 생성
    pub async fn connect(&self) -> Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.mart.database.max_connections)
            .acquire_timeout(Duration::from_secs(self.mart.database.acquire_timeout_secs))
            .connect(&self.database_url)
            .await?;

        tracing::info!(
            max_connections = self.mart.database.max_connections,
            "데이터베이스 연결 성공"
        );

        Ok(pool)
    }
}
