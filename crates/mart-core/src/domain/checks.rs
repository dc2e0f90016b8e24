//! 게시된 테이블 정합성 검사.
//!
//! 리프레시 이후 서빙 테이블이 지켜야 할 불변식을 확인합니다:
//! 차원 키 유일성, 팩트 → 차원 참조 무결성, 팩트와 파생 테이블의 1:1 대응.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

use super::asset::AssetRow;
use super::calendar::CalendarDay;
use super::enrichment::EnrichedPrice;
use super::fact::FactPrice;

/// 게시된 네 테이블의 스냅샷.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishedTables {
    pub calendar: Vec<CalendarDay>,
    pub assets: Vec<AssetRow>,
    pub facts: Vec<FactPrice>,
    pub enriched: Vec<EnrichedPrice>,
}

/// 위반 사항.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckViolation {
    DuplicateCalendarDate { date: NaiveDate },
    InconsistentCalendarDay { date: NaiveDate },
    DuplicateAssetId { asset_id: i32 },
    DuplicateAssetSymbol { symbol: String },
    NonPositiveAssetId { symbol: String, asset_id: i32 },
    DuplicateFactKey { symbol: String, date: NaiveDate },
    FactDateNotInCalendar { symbol: String, date: NaiveDate },
    FactMissingAssetId { symbol: String, date: NaiveDate },
    FactAssetMismatch { symbol: String, date: NaiveDate, asset_id: i32 },
    EnrichedRowCount { facts: usize, enriched: usize },
    EnrichedKeyMissing { symbol: String, date: NaiveDate },
    EnrichedKeyUnexpected { symbol: String, date: NaiveDate },
}

impl std::fmt::Display for CheckViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateCalendarDate { date } => write!(f, "dim_calendar: duplicate date {}", date),
            Self::InconsistentCalendarDay { date } => {
                write!(f, "dim_calendar: attributes disagree with date {}", date)
            }
            Self::DuplicateAssetId { asset_id } => write!(f, "dim_asset: duplicate asset_id {}", asset_id),
            Self::DuplicateAssetSymbol { symbol } => write!(f, "dim_asset: duplicate symbol {}", symbol),
            Self::NonPositiveAssetId { symbol, asset_id } => {
                write!(f, "dim_asset: non-positive asset_id {} for {}", asset_id, symbol)
            }
            Self::DuplicateFactKey { symbol, date } => {
                write!(f, "fact_prices: duplicate key ({}, {})", symbol, date)
            }
            Self::FactDateNotInCalendar { symbol, date } => {
                write!(f, "fact_prices: ({}, {}) date absent from dim_calendar", symbol, date)
            }
            Self::FactMissingAssetId { symbol, date } => {
                write!(f, "fact_prices: ({}, {}) has null asset_id", symbol, date)
            }
            Self::FactAssetMismatch {
                symbol,
                date,
                asset_id,
            } => write!(
                f,
                "fact_prices: ({}, {}) asset_id {} does not map to symbol in dim_asset",
                symbol, date, asset_id
            ),
            Self::EnrichedRowCount { facts, enriched } => write!(
                f,
                "fact_prices_enriched: {} rows for {} fact rows",
                enriched, facts
            ),
            Self::EnrichedKeyMissing { symbol, date } => {
                write!(f, "fact_prices_enriched: missing ({}, {})", symbol, date)
            }
            Self::EnrichedKeyUnexpected { symbol, date } => {
                write!(f, "fact_prices_enriched: ({}, {}) has no fact row", symbol, date)
            }
        }
    }
}

/// 모든 검사를 실행합니다. 위반이 없으면 빈 목록입니다.
pub fn run_checks(tables: &PublishedTables) -> Vec<CheckViolation> {
    let mut violations = Vec::new();
    check_calendar(&tables.calendar, &mut violations);
    check_assets(&tables.assets, &mut violations);
    check_facts(tables, &mut violations);
    check_enriched(&tables.facts, &tables.enriched, &mut violations);
    violations
}

fn check_calendar(calendar: &[CalendarDay], out: &mut Vec<CheckViolation>) {
    let mut seen = HashSet::new();
    for day in calendar {
        if !seen.insert(day.date) {
            out.push(CheckViolation::DuplicateCalendarDate { date: day.date });
        }
        if !day.is_consistent() {
            out.push(CheckViolation::InconsistentCalendarDay { date: day.date });
        }
    }
}

fn check_assets(assets: &[AssetRow], out: &mut Vec<CheckViolation>) {
    let mut ids = HashSet::new();
    let mut symbols = HashSet::new();
    for row in assets {
        if !ids.insert(row.asset_id) {
            out.push(CheckViolation::DuplicateAssetId {
                asset_id: row.asset_id,
            });
        }
        if !symbols.insert(row.symbol.as_str()) {
            out.push(CheckViolation::DuplicateAssetSymbol {
                symbol: row.symbol.clone(),
            });
        }
        if row.asset_id <= 0 {
            out.push(CheckViolation::NonPositiveAssetId {
                symbol: row.symbol.clone(),
                asset_id: row.asset_id,
            });
        }
    }
}

fn check_facts(tables: &PublishedTables, out: &mut Vec<CheckViolation>) {
    let dates: HashSet<NaiveDate> = tables.calendar.iter().map(|d| d.date).collect();
    let symbol_by_id: HashMap<i32, &str> = tables
        .assets
        .iter()
        .map(|a| (a.asset_id, a.symbol.as_str()))
        .collect();

    let mut keys = HashSet::new();
    for fact in &tables.facts {
        let symbol = fact.symbol.clone();
        if !keys.insert(fact.key()) {
            out.push(CheckViolation::DuplicateFactKey {
                symbol: symbol.clone(),
                date: fact.date,
            });
        }
        if !dates.contains(&fact.date) {
            out.push(CheckViolation::FactDateNotInCalendar {
                symbol: symbol.clone(),
                date: fact.date,
            });
        }
        match fact.asset_id {
            None => out.push(CheckViolation::FactMissingAssetId {
                symbol,
                date: fact.date,
            }),
            Some(asset_id) if symbol_by_id.get(&asset_id) != Some(&fact.symbol.as_str()) => {
                out.push(CheckViolation::FactAssetMismatch {
                    symbol,
                    date: fact.date,
                    asset_id,
                })
            }
            Some(_) => {}
        }
    }
}

fn check_enriched(facts: &[FactPrice], enriched: &[EnrichedPrice], out: &mut Vec<CheckViolation>) {
    if facts.len() != enriched.len() {
        out.push(CheckViolation::EnrichedRowCount {
            facts: facts.len(),
            enriched: enriched.len(),
        });
    }

    let fact_keys: BTreeSet<(&str, NaiveDate)> = facts.iter().map(FactPrice::key).collect();
    let enriched_keys: BTreeSet<(&str, NaiveDate)> =
        enriched.iter().map(EnrichedPrice::key).collect();

    for (symbol, date) in fact_keys.difference(&enriched_keys) {
        out.push(CheckViolation::EnrichedKeyMissing {
            symbol: symbol.to_string(),
            date: *date,
        });
    }
    for (symbol, date) in enriched_keys.difference(&fact_keys) {
        out.push(CheckViolation::EnrichedKeyUnexpected {
            symbol: symbol.to_string(),
            date: *date,
        });
    }
}
