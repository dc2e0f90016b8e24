//! 마트 테이블 저장소.
//!
//! 코디네이터는 이 트레이트만 알고, 각 단계 결과를 스테이징 테이블에 쓴 뒤
//! 모든 단계가 끝나면 한 번에 교체(commit)합니다. 실패하면 스테이징을 버리므로
//! 게시된 테이블은 실행 전 상태 그대로 남습니다.

pub mod memory;
pub mod postgres;

pub use memory::{FailurePoint, MemoryStore};
pub use postgres::PgMartStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use mart_core::{
    AssetDim, CalendarDim, EnrichedPrice, FactPrice, MovingAverageWindows, PublishedTables,
    RawObservation,
};

use crate::error::RefreshError;
use crate::run_log::RunRecord;
use crate::Result;

/// 스테이징 대상 테이블.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MartTable {
    DimAsset,
    DimCalendar,
    FactPrices,
    FactPricesEnriched,
}

impl MartTable {
    pub const ALL: [MartTable; 4] = [
        MartTable::DimAsset,
        MartTable::DimCalendar,
        MartTable::FactPrices,
        MartTable::FactPricesEnriched,
    ];

    /// 기본 테이블 이름
    pub fn default_name(&self) -> &'static str {
        match self {
            Self::DimAsset => "dim_asset",
            Self::DimCalendar => "dim_calendar",
            Self::FactPrices => "fact_prices",
            Self::FactPricesEnriched => "fact_prices_enriched",
        }
    }
}

/// 마트 저장소 인터페이스
#[async_trait]
pub trait MartStore: Send + Sync {
    /// 원시 관측 전체를 결정적인 순서로 읽습니다.
    async fn load_observations(&self) -> Result<Vec<RawObservation>>;

    /// 현재 게시된 자산 차원. 아직 게시된 적이 없으면 `None`.
    async fn load_assets(&self) -> Result<Option<AssetDim>>;

    /// 게시된 파생 테이블의 이동평균 컬럼 (`ma_7d`, …). 게시된 적이 없으면 `None`.
    async fn published_ma_columns(&self) -> Result<Option<Vec<String>>>;

    /// 현재 게시된 네 테이블 전체.
    async fn load_published(&self) -> Result<PublishedTables>;

    /// 한 심볼의 파생 시계열 (날짜 오름차순, 양 끝 포함).
    async fn load_enriched_series(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<EnrichedPrice>>;

    /// 이전 실행이 남긴 스테이징을 정리합니다.
    async fn prepare(&self) -> Result<()>;

    async fn stage_calendar(&self, calendar: &CalendarDim) -> Result<usize>;

    async fn stage_assets(&self, assets: &AssetDim) -> Result<usize>;

    async fn stage_facts(&self, facts: &[FactPrice]) -> Result<usize>;

    /// 파생 행을 `windows` 컬럼 구성으로 스테이징합니다.
    async fn stage_enriched(
        &self,
        rows: &[EnrichedPrice],
        windows: &MovingAverageWindows,
    ) -> Result<usize>;

    /// 스테이징된 모든 테이블을 한 트랜잭션으로 게시합니다.
    async fn commit_staged(&self) -> Result<()>;

    /// 스테이징된 테이블을 버립니다.
    async fn discard_staged(&self) -> Result<()>;

    /// 실행 로그 한 행 기록.
    async fn record_run(&self, record: &RunRecord) -> Result<()>;
}

/// 모든 파생 행이 윈도우 수만큼 이동평균을 갖는지 확인합니다.
pub(crate) fn ensure_ma_width(
    table: &str,
    rows: &[EnrichedPrice],
    windows: &MovingAverageWindows,
) -> Result<()> {
    match rows
        .iter()
        .find(|r| r.moving_averages.len() != windows.len())
    {
        Some(row) => Err(RefreshError::publish(
            table,
            format!(
                "{} {}: {} moving averages, expected {}",
                row.symbol,
                row.date,
                row.moving_averages.len(),
                windows.len()
            ),
        )),
        None => Ok(()),
    }
}
