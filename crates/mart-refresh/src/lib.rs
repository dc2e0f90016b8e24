//! Batch refresh job for the daily price star schema.
//!
//! 원시 일봉 관측에서 스타 스키마를 다시 만드는 배치 작업입니다:
//! - 달력/자산 차원 재계산
//! - 팩트 테이블 정합 (전체 또는 심볼/기간 부분)
//! - 수익률과 이동평균 파생 테이블
//! - 스테이징 후 일괄 게시, 실행 로그 기록

pub mod config;
pub mod coordinator;
pub mod error;
pub mod reports;
pub mod run_log;
pub mod stats;
pub mod store;

pub use config::RefreshConfig;
pub use coordinator::{RefreshCoordinator, RefreshOutcome, RefreshScope, SubsetFilter};
pub use error::{RefreshError, Result};
pub use run_log::{RunMode, RunRecord};
pub use stats::RefreshStats;
pub use store::{FailurePoint, MartStore, MartTable, MemoryStore, PgMartStore};
