//! 팩트 정합 (fact_prices).
//!
//! 정제 행을 (symbol, date)당 한 행으로 중복 제거한 뒤 캘린더/자산 차원과
//! 가격 쪽 기준으로 left join 합니다. 차원은 행을 **장식**할 뿐, 어떤 가격 행도
//! 걸러내지 않습니다. 차원에 없는 키는 [`OrphanPolicy`]에 따라 실행을 실패시키거나
//! null asset_id로 남깁니다. 조용히 버리는 경로는 없습니다.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use super::asset::AssetDim;
use super::calendar::CalendarDim;
use crate::error::{MartError, MartResult, MissingMember};
use crate::types::StagedObservation;

/// 차원에 없는 키를 만났을 때의 처리.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// `DimensionDivergence`로 실행 실패
    #[default]
    Fail,
    /// 행을 유지하고 asset_id를 null로 남김
    Flag,
}

/// fact_prices 한 행.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactPrice {
    pub date: NaiveDate,
    /// 자산 차원에 없는 심볼이면 `None` (Flag 정책)
    pub asset_id: Option<i32>,
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

impl FactPrice {
    /// 파티션 내 정렬 키.
    pub fn key(&self) -> (&str, NaiveDate) {
        (&self.symbol, self.date)
    }
}

/// 중복 제거 결과.
#[derive(Debug, Default)]
pub struct Deduplicated {
    /// (symbol, date) 오름차순
    pub rows: Vec<StagedObservation>,
    /// 버려진 중복 행 수
    pub dropped: usize,
}

/// (symbol, date)당 한 행만 남깁니다.
///
/// 가장 최근 `load_ts`가 이기고(null은 가장 오래된 것으로 취급), 같으면 사전순으로
/// 앞선 `source`가 이깁니다. 그래도 같으면 입력 순서상 먼저 나온 행을 유지합니다.
pub fn deduplicate(rows: &[StagedObservation]) -> Deduplicated {
    let mut winners: BTreeMap<(&str, NaiveDate), &StagedObservation> = BTreeMap::new();
    let mut dropped = 0;

    for row in rows {
        match winners.entry((row.symbol.as_str(), row.date)) {
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
            Entry::Occupied(mut slot) => {
                dropped += 1;
                if supersedes(row, slot.get()) {
                    slot.insert(row);
                }
            }
        }
    }

    Deduplicated {
        rows: winners.into_values().cloned().collect(),
        dropped,
    }
}

fn supersedes(candidate: &StagedObservation, current: &StagedObservation) -> bool {
    match candidate.load_ts.cmp(&current.load_ts) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => candidate.source < current.source,
    }
}

/// 정합 결과.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// (symbol, date) 오름차순
    pub facts: Vec<FactPrice>,
    /// 버려진 중복 행 수
    pub duplicates_dropped: usize,
    /// 차원에 없던 키 (Flag 정책에서만 비어있지 않음)
    pub orphans: Vec<MissingMember>,
}

/// 정제 행을 차원과 정합해 팩트 행을 만듭니다.
///
/// 출력 행 수는 항상 중복 제거 후 행 수와 같습니다.
pub fn reconcile(
    rows: &[StagedObservation],
    calendar: &CalendarDim,
    assets: &AssetDim,
    policy: OrphanPolicy,
) -> MartResult<ReconcileOutcome> {
    let deduped = deduplicate(rows);
    let mut orphans = Vec::new();
    let mut facts = Vec::with_capacity(deduped.rows.len());

    for row in deduped.rows {
        if !calendar.contains(&row.date) {
            orphans.push(MissingMember::Date(row.date));
        }
        let asset_id = assets.id_of(&row.symbol);
        if asset_id.is_none() {
            orphans.push(MissingMember::Symbol(row.symbol.clone()));
        }

        facts.push(FactPrice {
            date: row.date,
            asset_id,
            symbol: row.symbol,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }

    if policy == OrphanPolicy::Fail {
        if let Some(first) = orphans.first() {
            return Err(MartError::DimensionDivergence {
                first: first.clone(),
                count: orphans.len(),
            });
        }
    }

    if !orphans.is_empty() {
        tracing::warn!(orphans = orphans.len(), "차원에 없는 팩트 키를 null로 유지");
    }

    Ok(ReconcileOutcome {
        facts,
        duplicates_dropped: deduped.dropped,
        orphans,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asset::AssetKeyPolicy;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn obs(symbol: &str, date: &str, source: &str, close: Decimal, ts: Option<i64>) -> StagedObservation {
        StagedObservation {
            symbol: symbol.to_string(),
            date: date.parse().unwrap(),
            source: source.to_string(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100,
            load_ts: ts.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
        }
    }

    fn dims(rows: &[StagedObservation]) -> (CalendarDim, AssetDim) {
        (
            CalendarDim::derive(rows),
            AssetDim::derive(rows, None, AssetKeyPolicy::Preserve).dim,
        )
    }

    #[test]
    fn test_dedup_prefers_latest_load_ts() {
        let rows = vec![
            obs("AAPL", "2024-01-02", "yahoo", dec!(100), Some(10)),
            obs("AAPL", "2024-01-02", "vendor", dec!(101), Some(20)),
            obs("AAPL", "2024-01-02", "manual", dec!(102), None),
        ];
        let deduped = deduplicate(&rows);
        assert_eq!(deduped.rows.len(), 1);
        assert_eq!(deduped.dropped, 2);
        assert_eq!(deduped.rows[0].close, dec!(101));
    }

    #[test]
    fn test_dedup_tie_breaks_by_source_then_input_order() {
        let rows = vec![
            obs("AAPL", "2024-01-02", "yahoo", dec!(100), Some(10)),
            obs("AAPL", "2024-01-02", "alpha", dec!(101), Some(10)),
            obs("AAPL", "2024-01-02", "alpha", dec!(102), Some(10)),
        ];
        let deduped = deduplicate(&rows);
        assert_eq!(deduped.rows[0].close, dec!(101));
    }

    #[test]
    fn test_reconcile_keeps_every_deduplicated_row() {
        let rows = vec![
            obs("MSFT", "2024-01-03", "y", dec!(10), Some(1)),
            obs("AAPL", "2024-01-02", "y", dec!(1), Some(1)),
            obs("AAPL", "2024-01-03", "y", dec!(2), Some(1)),
            obs("AAPL", "2024-01-03", "y", dec!(3), Some(2)),
        ];
        let (calendar, assets) = dims(&rows);

        let outcome = reconcile(&rows, &calendar, &assets, OrphanPolicy::Fail).unwrap();
        assert_eq!(outcome.facts.len(), 3);
        assert_eq!(outcome.duplicates_dropped, 1);
        assert!(outcome.orphans.is_empty());

        let keys: Vec<_> = outcome
            .facts
            .iter()
            .map(|f| (f.symbol.as_str(), f.date.to_string(), f.asset_id))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("AAPL", "2024-01-02".to_string(), Some(1)),
                ("AAPL", "2024-01-03".to_string(), Some(1)),
                ("MSFT", "2024-01-03".to_string(), Some(2)),
            ]
        );
        assert_eq!(outcome.facts[1].close, dec!(3));
    }

    #[test]
    fn test_stale_dimension_fails_loudly() {
        let rows = vec![
            obs("AAPL", "2024-01-02", "y", dec!(1), None),
            obs("MSFT", "2024-01-03", "y", dec!(2), None),
        ];
        // 첫 행만 본 stale 차원
        let (calendar, assets) = dims(&rows[..1]);

        let err = reconcile(&rows, &calendar, &assets, OrphanPolicy::Fail).unwrap_err();
        match err {
            MartError::DimensionDivergence { first, count } => {
                assert_eq!(first, MissingMember::Date("2024-01-03".parse().unwrap()));
                assert_eq!(count, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stale_dimension_flags_rows_without_dropping() {
        let rows = vec![
            obs("AAPL", "2024-01-02", "y", dec!(1), None),
            obs("MSFT", "2024-01-03", "y", dec!(2), None),
        ];
        let (calendar, assets) = dims(&rows[..1]);

        let outcome = reconcile(&rows, &calendar, &assets, OrphanPolicy::Flag).unwrap();
        assert_eq!(outcome.facts.len(), 2);
        assert_eq!(outcome.facts[1].asset_id, None);
        assert_eq!(outcome.orphans.len(), 2);
    }
}
