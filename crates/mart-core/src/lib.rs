//! # Mart Core
//!
//! 일별 가격 관측으로부터 대시보드용 스타 스키마를 만드는 도메인 계층입니다.
//!
//! - 원시 관측 정제와 행 단위 스키마 검증
//! - 거래일 캘린더 차원, 자산 차원(대리 키)
//! - 가격 쪽 기준 팩트 정합 (행 유실 없음)
//! - 심볼 파티션별 수익률/이동평균
//! - 리프레시 상태 머신, 게시 테이블 검사, 가격 요약
//! - 설정과 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
