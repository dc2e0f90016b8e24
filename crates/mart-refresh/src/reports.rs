//! 게시 테이블 점검과 심볼 요약.

use chrono::NaiveDate;
use mart_core::{run_checks, summarize, CheckViolation, PriceSummary};

use crate::store::MartStore;
use crate::Result;

/// 게시된 테이블의 정합성을 검사합니다. 위반이 없으면 빈 목록입니다.
pub async fn check_published<S: MartStore + ?Sized>(store: &S) -> Result<Vec<CheckViolation>> {
    let tables = store.load_published().await?;
    let violations = run_checks(&tables);

    if violations.is_empty() {
        tracing::info!(
            calendar = tables.calendar.len(),
            assets = tables.assets.len(),
            facts = tables.facts.len(),
            enriched = tables.enriched.len(),
            "게시 테이블 점검 통과"
        );
    } else {
        for violation in &violations {
            tracing::warn!(%violation, "정합성 위반");
        }
        tracing::error!(violations = violations.len(), "게시 테이블 점검 실패");
    }

    Ok(violations)
}

/// 한 심볼의 구간 요약. 데이터가 없으면 `None`.
pub async fn summarize_symbol<S: MartStore + ?Sized>(
    store: &S,
    symbol: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Option<PriceSummary>> {
    let symbol = symbol.trim().to_uppercase();
    let series = store.load_enriched_series(&symbol, from, to).await?;
    tracing::debug!(symbol = %symbol, rows = series.len(), "파생 시계열 로드");
    Ok(summarize(&series))
}
