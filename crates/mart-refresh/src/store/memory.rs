//! 인메모리 마트 저장소.
//!
//! `--dry-run`과 테스트에서 사용합니다. 지정한 단계에서 실패를 주입할 수 있습니다.

use async_trait::async_trait;
use chrono::NaiveDate;
use mart_core::{
    AssetDim, AssetRow, CalendarDay, CalendarDim, EnrichedPrice, FactPrice, MovingAverageWindows,
    PublishedTables, RawObservation,
};
use tokio::sync::RwLock;

use super::{ensure_ma_width, MartStore, MartTable};
use crate::error::RefreshError;
use crate::run_log::RunRecord;
use crate::Result;

/// 실패 주입 지점
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    /// 해당 테이블 스테이징 시 실패
    Stage(MartTable),
    /// 게시(교체) 시 실패
    Commit,
    /// 실행 로그 기록 시 실패
    RunLog,
}

#[derive(Debug, Clone, Default)]
struct TableSet {
    calendar: Option<Vec<CalendarDay>>,
    assets: Option<Vec<AssetRow>>,
    facts: Option<Vec<FactPrice>>,
    enriched: Option<Vec<EnrichedPrice>>,
    ma_columns: Option<Vec<String>>,
}

impl TableSet {
    fn is_empty(&self) -> bool {
        self.calendar.is_none()
            && self.assets.is_none()
            && self.facts.is_none()
            && self.enriched.is_none()
    }

    fn snapshot(&self) -> PublishedTables {
        PublishedTables {
            calendar: self.calendar.clone().unwrap_or_default(),
            assets: self.assets.clone().unwrap_or_default(),
            facts: self.facts.clone().unwrap_or_default(),
            enriched: self.enriched.clone().unwrap_or_default(),
        }
    }
}

/// 인메모리 저장소
#[derive(Debug, Default)]
pub struct MemoryStore {
    raw: RwLock<Vec<RawObservation>>,
    published: RwLock<TableSet>,
    staged: RwLock<TableSet>,
    runs: RwLock<Vec<RunRecord>>,
    failure: RwLock<Option<FailurePoint>>,
}

impl MemoryStore {
    /// 원시 관측으로 저장소 생성
    pub fn new(raw: Vec<RawObservation>) -> Self {
        Self {
            raw: RwLock::new(raw),
            ..Default::default()
        }
    }

    /// 게시된 자산 차원을 미리 채웁니다.
    pub fn with_assets(mut self, assets: &AssetDim) -> Self {
        self.published.get_mut().assets = Some(assets.rows());
        self
    }

    /// 게시된 네 테이블과 파생 테이블의 이동평균 컬럼을 미리 채웁니다.
    pub fn with_published(
        mut self,
        tables: PublishedTables,
        ma_columns: Option<Vec<String>>,
    ) -> Self {
        *self.published.get_mut() = TableSet {
            calendar: Some(tables.calendar),
            assets: Some(tables.assets),
            facts: Some(tables.facts),
            enriched: Some(tables.enriched),
            ma_columns,
        };
        self
    }

    /// 원시 관측 교체 (다음 실행 입력)
    pub async fn set_raw(&self, raw: Vec<RawObservation>) {
        *self.raw.write().await = raw;
    }

    /// 실패 주입 지점 설정 (`None`이면 해제)
    pub async fn fail_at(&self, point: Option<FailurePoint>) {
        *self.failure.write().await = point;
    }

    /// 게시된 테이블 스냅샷
    pub async fn published(&self) -> PublishedTables {
        self.published.read().await.snapshot()
    }

    /// 스테이징이 남아있는지
    pub async fn has_staged(&self) -> bool {
        !self.staged.read().await.is_empty()
    }

    /// 기록된 실행 로그
    pub async fn runs(&self) -> Vec<RunRecord> {
        self.runs.read().await.clone()
    }

    async fn check_failure(&self, point: FailurePoint) -> Result<()> {
        if *self.failure.read().await == Some(point) {
            let table = match point {
                FailurePoint::Stage(table) => table.default_name(),
                FailurePoint::Commit => "commit",
                FailurePoint::RunLog => "etl_run_log",
            };
            return Err(RefreshError::publish(table, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl MartStore for MemoryStore {
    async fn load_observations(&self) -> Result<Vec<RawObservation>> {
        Ok(self.raw.read().await.clone())
    }

    async fn load_assets(&self) -> Result<Option<AssetDim>> {
        Ok(self
            .published
            .read()
            .await
            .assets
            .clone()
            .map(AssetDim::from_rows))
    }

    async fn published_ma_columns(&self) -> Result<Option<Vec<String>>> {
        Ok(self.published.read().await.ma_columns.clone())
    }

    async fn load_published(&self) -> Result<PublishedTables> {
        Ok(self.published.read().await.snapshot())
    }

    async fn load_enriched_series(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<EnrichedPrice>> {
        let published = self.published.read().await;
        let mut rows: Vec<EnrichedPrice> = published
            .enriched
            .iter()
            .flatten()
            .filter(|r| r.symbol == symbol)
            .filter(|r| from.map_or(true, |f| r.date >= f))
            .filter(|r| to.map_or(true, |t| r.date <= t))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.date);
        Ok(rows)
    }

    async fn prepare(&self) -> Result<()> {
        *self.staged.write().await = TableSet::default();
        Ok(())
    }

    async fn stage_calendar(&self, calendar: &CalendarDim) -> Result<usize> {
        self.check_failure(FailurePoint::Stage(MartTable::DimCalendar))
            .await?;
        let days: Vec<CalendarDay> = calendar.days().cloned().collect();
        let count = days.len();
        self.staged.write().await.calendar = Some(days);
        Ok(count)
    }

    async fn stage_assets(&self, assets: &AssetDim) -> Result<usize> {
        self.check_failure(FailurePoint::Stage(MartTable::DimAsset))
            .await?;
        let rows = assets.rows();
        let count = rows.len();
        self.staged.write().await.assets = Some(rows);
        Ok(count)
    }

    async fn stage_facts(&self, facts: &[FactPrice]) -> Result<usize> {
        self.check_failure(FailurePoint::Stage(MartTable::FactPrices))
            .await?;
        self.staged.write().await.facts = Some(facts.to_vec());
        Ok(facts.len())
    }

    async fn stage_enriched(
        &self,
        rows: &[EnrichedPrice],
        windows: &MovingAverageWindows,
    ) -> Result<usize> {
        let table = MartTable::FactPricesEnriched;
        self.check_failure(FailurePoint::Stage(table)).await?;
        ensure_ma_width(table.default_name(), rows, windows)?;

        let mut staged = self.staged.write().await;
        staged.enriched = Some(rows.to_vec());
        staged.ma_columns = Some(windows.column_names());
        Ok(rows.len())
    }

    async fn commit_staged(&self) -> Result<()> {
        self.check_failure(FailurePoint::Commit).await?;

        let mut staged = self.staged.write().await;
        let mut published = self.published.write().await;
        let next = std::mem::take(&mut *staged);

        if let Some(calendar) = next.calendar {
            published.calendar = Some(calendar);
        }
        if let Some(assets) = next.assets {
            published.assets = Some(assets);
        }
        if let Some(facts) = next.facts {
            published.facts = Some(facts);
        }
        if let Some(enriched) = next.enriched {
            published.enriched = Some(enriched);
            published.ma_columns = next.ma_columns;
        }
        Ok(())
    }

    async fn discard_staged(&self) -> Result<()> {
        *self.staged.write().await = TableSet::default();
        Ok(())
    }

    async fn record_run(&self, record: &RunRecord) -> Result<()> {
        self.check_failure(FailurePoint::RunLog).await?;
        self.runs.write().await.push(record.clone());
        Ok(())
    }
}
