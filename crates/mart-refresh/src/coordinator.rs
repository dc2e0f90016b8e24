//! 리프레시 코디네이터.
//!
//! `PENDING → DIMENSIONS_REFRESHED → FACTS_REBUILT → ENRICHED → DONE` 순서로
//! 단계를 실행합니다. 차원은 항상 원시 관측 전체에서 먼저 다시 계산되므로
//! 팩트 정합은 이번 실행의 차원만 봅니다. 모든 결과는 스테이징에 쓰이고
//! `ENRICHED` 이후 한 번에 게시되며, 실패하면 스테이징을 버립니다.

use chrono::{NaiveDate, Utc};
use mart_core::{
    enrich, reconcile, stage_observations, AssetDim, AssetKeyPolicy, CalendarDim, EnrichedPrice,
    FactPrice, MartConfig, MartError, MissingMember, MovingAverageWindows, OrphanPolicy,
    RefreshState, StagedObservation,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::run_log::{truncate_error, RunDetails, RunMode, RunRecord};
use crate::stats::RefreshStats;
use crate::store::MartStore;
use crate::Result;

/// 부분 리프레시 대상.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubsetFilter {
    /// 대상 심볼 (없으면 전체 심볼)
    pub symbols: Option<BTreeSet<String>>,
    /// 시작일 (포함)
    pub from: Option<NaiveDate>,
    /// 종료일 (포함)
    pub to: Option<NaiveDate>,
}

impl SubsetFilter {
    /// 심볼은 정제 규칙과 같게 trim + 대문자로 정규화합니다.
    pub fn new(symbols: Option<Vec<String>>, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        let symbols = symbols
            .map(|list| {
                list.iter()
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect::<BTreeSet<_>>()
            })
            .filter(|set| !set.is_empty());

        Self { symbols, from, to }
    }

    /// 쉼표로 구분된 심볼 목록 파싱 (예: "AAPL,msft")
    pub fn parse_symbols(csv: &str) -> Vec<String> {
        csv.split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn covers_symbol(&self, symbol: &str) -> bool {
        self.symbols.as_ref().map_or(true, |set| set.contains(symbol))
    }

    pub fn covers_date(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }

    /// 팩트 재계산 대상인지.
    pub fn matches(&self, symbol: &str, date: NaiveDate) -> bool {
        self.covers_symbol(symbol) && self.covers_date(date)
    }

    /// 파생 지표 재계산 대상인지. 이동평균과 직전 종가가 앞으로 전파되므로
    /// `to` 이후도 포함합니다.
    pub fn enrichment_covers(&self, symbol: &str, date: NaiveDate) -> bool {
        self.covers_symbol(symbol) && self.from.map_or(true, |from| date >= from)
    }
}

/// 부분 리프레시 실행 계획.
///
/// 필터 범위에 더해, 차원에는 들어가지만 게시된 팩트에 없는 키(새 심볼, 새 날짜)를
/// 함께 다시 만듭니다. 이런 키가 있는 심볼은 가장 이른 누락 날짜부터 파생 지표를
/// 다시 계산합니다.
#[derive(Debug)]
struct SubsetPlan<'a> {
    filter: &'a SubsetFilter,
    /// 게시된 팩트 키
    published: BTreeSet<(&'a str, NaiveDate)>,
    /// 필터 밖 누락 키가 있는 심볼별 가장 이른 누락 날짜
    backfill: BTreeMap<String, NaiveDate>,
    backfill_rows: usize,
}

impl<'a> SubsetPlan<'a> {
    fn new(filter: &'a SubsetFilter, rows: &[StagedObservation], published: &'a [FactPrice]) -> Self {
        let mut plan = Self {
            filter,
            published: published
                .iter()
                .map(|f| (f.symbol.as_str(), f.date))
                .collect(),
            backfill: BTreeMap::new(),
            backfill_rows: 0,
        };

        let mut missing = BTreeSet::new();
        for row in rows {
            if filter.matches(&row.symbol, row.date)
                || plan.published.contains(&(row.symbol.as_str(), row.date))
            {
                continue;
            }
            missing.insert((row.symbol.as_str(), row.date));
            plan.backfill
                .entry(row.symbol.clone())
                .and_modify(|first| *first = (*first).min(row.date))
                .or_insert(row.date);
        }
        plan.backfill_rows = missing.len();
        plan
    }

    /// 이번 실행에서 팩트를 새로 만드는 키인지.
    fn rebuilds(&self, symbol: &str, date: NaiveDate) -> bool {
        self.filter.matches(symbol, date) || !self.published.contains(&(symbol, date))
    }

    fn covers_symbol(&self, symbol: &str) -> bool {
        self.filter.covers_symbol(symbol) || self.backfill.contains_key(symbol)
    }

    fn enrichment_covers(&self, symbol: &str, date: NaiveDate) -> bool {
        self.filter.enrichment_covers(symbol, date)
            || self.backfill.get(symbol).map_or(false, |first| date >= *first)
    }
}

/// 리프레시 범위.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshScope {
    Full,
    Subset(SubsetFilter),
}

impl RefreshScope {
    pub fn mode(&self) -> RunMode {
        match self {
            Self::Full => RunMode::Full,
            Self::Subset(_) => RunMode::Subset,
        }
    }
}

/// 실행 결과.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub run_id: Uuid,
    pub requested: RunMode,
    pub effective: RunMode,
    pub escalated: bool,
    /// 종료 상태 (`DONE` 또는 `FAILED`)
    pub state: RefreshState,
    /// 실패 직전에 도달한 상태
    pub last_state: RefreshState,
    pub stats: RefreshStats,
    pub error: Option<String>,
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        self.state == RefreshState::Done
    }
}

/// 실행 중 누적되는 진행 상황.
#[derive(Debug)]
struct Progress {
    state: RefreshState,
    effective: RunMode,
    escalated: bool,
    stats: RefreshStats,
}

impl Progress {
    fn advance(&mut self, next: RefreshState) -> Result<()> {
        self.state = self.state.transition(next)?;
        tracing::info!(state = %self.state, "상태 전이");
        Ok(())
    }
}

/// 리프레시 코디네이터
pub struct RefreshCoordinator<S: MartStore> {
    store: Arc<S>,
    windows: MovingAverageWindows,
    key_policy: AssetKeyPolicy,
    orphan_policy: OrphanPolicy,
}

impl<S: MartStore> RefreshCoordinator<S> {
    pub fn new(store: Arc<S>, config: &MartConfig) -> Result<Self> {
        Ok(Self {
            store,
            windows: config.enrichment.windows()?,
            key_policy: config.assets.key_policy,
            orphan_policy: config.reconcile.orphan_policy,
        })
    }

    /// 리프레시 한 번을 끝까지 실행합니다.
    ///
    /// 실패도 결과로 돌려주며, 실패 시 게시된 테이블은 바뀌지 않습니다.
    pub async fn run(&self, scope: RefreshScope) -> RefreshOutcome {
        let run_id = Uuid::new_v4();
        let requested = scope.mode();
        let span = mart_core::refresh_span!(run_id, requested);

        async move {
            let started_at = Utc::now();
            let started = Instant::now();
            let mut progress = Progress {
                state: RefreshState::Pending,
                effective: requested,
                escalated: false,
                stats: RefreshStats::new(),
            };

            tracing::info!("리프레시 시작");
            let result = self.execute(&scope, &mut progress).await;
            progress.stats.elapsed = started.elapsed();

            let last_state = progress.state;
            let error = match result {
                Ok(()) => {
                    progress.stats.log_summary(progress.effective.as_str());
                    None
                }
                Err(e) => {
                    tracing::error!(error = %e, state = %last_state, "리프레시 실패");
                    if let Err(discard_err) = self.store.discard_staged().await {
                        tracing::error!(error = %discard_err, "스테이징 정리 실패");
                    }
                    progress.state = RefreshState::Failed;
                    Some(truncate_error(&e.to_string()))
                }
            };

            let record = RunRecord {
                run_id,
                mode: requested,
                started_at,
                ended_at: Utc::now(),
                status: progress.state,
                details: RunDetails {
                    effective_mode: progress.effective,
                    escalated: progress.escalated,
                    last_state,
                    stats: progress.stats.clone(),
                },
                error_message: error.clone(),
            };
            if let Err(e) = self.store.record_run(&record).await {
                tracing::warn!(error = %e, "실행 로그 기록 실패");
            }

            RefreshOutcome {
                run_id,
                requested,
                effective: progress.effective,
                escalated: progress.escalated,
                state: progress.state,
                last_state,
                stats: progress.stats,
                error,
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, scope: &RefreshScope, progress: &mut Progress) -> Result<()> {
        self.store.prepare().await?;

        // 정제
        let raw = self.store.load_observations().await?;
        let staging = stage_observations(&raw);
        progress.stats.raw_rows = raw.len();
        progress.stats.rejected_rows = staging.rejected_count();
        if staging.rejected_count() > 0 {
            tracing::info!(rejected = staging.rejected_count(), "필수 필드 누락 행 거부");
        }
        if staging.rows.is_empty() {
            tracing::warn!(raw_rows = raw.len(), "정제 후 입력이 비어있음, 빈 테이블을 게시합니다");
        }
        let rows = staging.rows;

        // 차원
        let previous = self.store.load_assets().await?;
        let derivation = AssetDim::derive(&rows, previous.as_ref(), self.key_policy);
        let calendar = CalendarDim::derive(&rows);

        let mut subset = match scope {
            RefreshScope::Full => None,
            RefreshScope::Subset(filter) => Some(filter),
        };
        if subset.is_some() {
            let reason = if previous.is_none() {
                Some("게시된 자산 차원 없음")
            } else if !derivation.ids_stable() {
                Some("기존 심볼의 asset_id 변경")
            } else if !self.published_windows_match().await? {
                Some("이동평균 윈도우 변경")
            } else {
                None
            };
            if let Some(reason) = reason {
                tracing::warn!(
                    reason,
                    reassigned = derivation.reassigned.len(),
                    "부분 리프레시를 전체 리프레시로 승격"
                );
                subset = None;
                progress.escalated = true;
                progress.effective = RunMode::Full;
            }
        }

        progress.stats.calendar_days = self.store.stage_calendar(&calendar).await?;
        progress.stats.assets = self.store.stage_assets(&derivation.dim).await?;
        progress.stats.new_assets = derivation.new_symbols.len();
        progress.advance(RefreshState::DimensionsRefreshed)?;

        // 팩트
        let published = match subset {
            Some(_) => Some(self.store.load_published().await?),
            None => None,
        };

        let (facts, plan) = match (subset, &published) {
            (Some(filter), Some(published)) => {
                let plan = SubsetPlan::new(filter, &rows, &published.facts);
                if plan.backfill_rows > 0 {
                    tracing::warn!(
                        rows = plan.backfill_rows,
                        symbols = plan.backfill.len(),
                        "필터 밖의 누락 키를 함께 재계산"
                    );
                }
                progress.stats.backfilled_rows = plan.backfill_rows;

                let in_scope: Vec<StagedObservation> = rows
                    .iter()
                    .filter(|o| plan.rebuilds(&o.symbol, o.date))
                    .cloned()
                    .collect();
                let fresh = reconcile(&in_scope, &calendar, &derivation.dim, self.orphan_policy)?;
                progress.stats.duplicates_dropped = fresh.duplicates_dropped;
                progress.stats.facts_rebuilt = fresh.facts.len();

                let (kept, kept_orphans) = carry_forward_facts(
                    &published.facts,
                    filter,
                    &calendar,
                    &derivation.dim,
                    self.orphan_policy,
                )?;
                progress.stats.orphan_rows = fresh.orphans.len() + kept_orphans;
                let facts = merge_facts(kept, fresh.facts);
                (facts, Some(plan))
            }
            _ => {
                let outcome = reconcile(&rows, &calendar, &derivation.dim, self.orphan_policy)?;
                progress.stats.duplicates_dropped = outcome.duplicates_dropped;
                progress.stats.facts_rebuilt = outcome.facts.len();
                progress.stats.orphan_rows = outcome.orphans.len();
                (outcome.facts, None)
            }
        };

        progress.stats.fact_rows = self.store.stage_facts(&facts).await?;
        progress.advance(RefreshState::FactsRebuilt)?;

        // 파생 지표
        let enriched = match (&plan, &published) {
            (Some(plan), Some(published)) => {
                let affected: Vec<FactPrice> = facts
                    .iter()
                    .filter(|f| plan.covers_symbol(&f.symbol))
                    .cloned()
                    .collect();
                let fresh: Vec<EnrichedPrice> = enrich(&affected, &self.windows)
                    .into_iter()
                    .filter(|r| plan.enrichment_covers(&r.symbol, r.date))
                    .collect();
                progress.stats.enriched_rebuilt = fresh.len();

                let kept: Vec<EnrichedPrice> = published
                    .enriched
                    .iter()
                    .filter(|r| !plan.enrichment_covers(&r.symbol, r.date))
                    .cloned()
                    .collect();
                merge_enriched(kept, fresh)
            }
            _ => {
                let rows = enrich(&facts, &self.windows);
                progress.stats.enriched_rebuilt = rows.len();
                rows
            }
        };

        progress.stats.enriched_rows = self
            .store
            .stage_enriched(&enriched, &self.windows)
            .await?;
        progress.advance(RefreshState::Enriched)?;

        // 게시
        self.store.commit_staged().await?;
        progress.advance(RefreshState::Done)?;
        Ok(())
    }

    /// 게시된 파생 테이블의 이동평균 컬럼이 현재 설정과 같은지.
    async fn published_windows_match(&self) -> Result<bool> {
        Ok(match self.store.published_ma_columns().await? {
            Some(columns) => columns == self.windows.column_names(),
            None => true,
        })
    }
}

/// 부분 리프레시에서 필터 밖의 기존 팩트를 이번 실행의 차원에 맞춰 유지합니다.
///
/// 반환값은 `(유지된 행, null 키로 유지된 행 수)`.
fn carry_forward_facts(
    published: &[FactPrice],
    filter: &SubsetFilter,
    calendar: &CalendarDim,
    assets: &AssetDim,
    policy: OrphanPolicy,
) -> std::result::Result<(Vec<FactPrice>, usize), MartError> {
    let mut kept = Vec::new();
    let mut orphans = Vec::new();

    for fact in published.iter().filter(|f| !filter.matches(&f.symbol, f.date)) {
        let mut fact = fact.clone();
        if !calendar.contains(&fact.date) {
            orphans.push(MissingMember::Date(fact.date));
        }
        let asset_id = assets.id_of(&fact.symbol);
        if asset_id.is_none() {
            orphans.push(MissingMember::Symbol(fact.symbol.clone()));
        }
        fact.asset_id = asset_id;
        kept.push(fact);
    }

    if policy == OrphanPolicy::Fail {
        if let Some(first) = orphans.first() {
            return Err(MartError::DimensionDivergence {
                first: first.clone(),
                count: orphans.len(),
            });
        }
    }

    Ok((kept, orphans.len()))
}

fn merge_facts(mut kept: Vec<FactPrice>, fresh: Vec<FactPrice>) -> Vec<FactPrice> {
    kept.extend(fresh);
    kept.sort_by(|a, b| a.key().cmp(&b.key()));
    kept
}

fn merge_enriched(mut kept: Vec<EnrichedPrice>, fresh: Vec<EnrichedPrice>) -> Vec<EnrichedPrice> {
    kept.extend(fresh);
    kept.sort_by(|a, b| a.key().cmp(&b.key()));
    kept
}
