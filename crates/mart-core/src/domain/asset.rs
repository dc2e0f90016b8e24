//! 자산 차원과 대리 키(asset_id) 부여.
//!
//! 키는 심볼 집합의 결정적 함수입니다. 정책은 두 가지입니다:
//!
//! - [`AssetKeyPolicy::Preserve`] (기본): 이전에 게시된 심볼은 기존 id를 유지하고,
//!   처음 보는 심볼만 사전순으로 `max(기존 id) + 1`부터 번호를 받습니다.
//! - [`AssetKeyPolicy::Rank`]: 매 실행마다 사전순 순위(1부터)를 새로 부여합니다.
//!   기존 심볼보다 앞에 정렬되는 심볼이 추가되면 기존 id가 바뀝니다.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::StagedObservation;

/// 대리 키 부여 정책.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKeyPolicy {
    #[default]
    Preserve,
    Rank,
}

/// 자산 차원 한 행.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRow {
    pub asset_id: i32,
    pub symbol: String,
}

/// 자산 차원 (심볼 → asset_id).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetDim {
    ids: BTreeMap<String, i32>,
}

/// 자산 차원 계산 결과.
#[derive(Debug, Clone, Default)]
pub struct AssetDerivation {
    pub dim: AssetDim,
    /// 이전 차원에 없던 심볼
    pub new_symbols: Vec<String>,
    /// 이전과 다른 id를 받은 기존 심볼
    pub reassigned: Vec<String>,
}

impl AssetDerivation {
    pub fn ids_stable(&self) -> bool {
        self.reassigned.is_empty()
    }
}

impl AssetDim {
    /// 정제된 관측 전체에서 자산 차원을 계산합니다.
    ///
    /// `previous`는 현재 게시된 차원이며, 정책이 `Preserve`일 때 기존 id를 유지하는 데 쓰입니다.
    pub fn derive(
        observations: &[StagedObservation],
        previous: Option<&AssetDim>,
        policy: AssetKeyPolicy,
    ) -> AssetDerivation {
        let symbols: BTreeSet<&str> = observations.iter().map(|o| o.symbol.as_str()).collect();

        let ids: BTreeMap<String, i32> = match (policy, previous) {
            (AssetKeyPolicy::Preserve, Some(prev)) => {
                let mut next_id = prev.max_id() + 1;
                symbols
                    .iter()
                    .map(|&symbol| {
                        let id = prev.id_of(symbol).unwrap_or_else(|| {
                            let id = next_id;
                            next_id += 1;
                            id
                        });
                        (symbol.to_string(), id)
                    })
                    .collect()
            }
            _ => symbols
                .iter()
                .zip(1..)
                .map(|(&symbol, id)| (symbol.to_string(), id))
                .collect(),
        };

        let dim = AssetDim { ids };
        let (new_symbols, reassigned) = match previous {
            Some(prev) => dim.diff(prev),
            None => (dim.ids.keys().cloned().collect(), Vec::new()),
        };

        AssetDerivation {
            dim,
            new_symbols,
            reassigned,
        }
    }

    /// 이미 게시된 행으로부터 구성합니다.
    pub fn from_rows(rows: impl IntoIterator<Item = AssetRow>) -> Self {
        Self {
            ids: rows.into_iter().map(|r| (r.symbol, r.asset_id)).collect(),
        }
    }

    pub fn id_of(&self, symbol: &str) -> Option<i32> {
        self.ids.get(symbol).copied()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.ids.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn max_id(&self) -> i32 {
        self.ids.values().copied().max().unwrap_or(0)
    }

    /// asset_id 오름차순 행 목록.
    pub fn rows(&self) -> Vec<AssetRow> {
        let mut rows: Vec<AssetRow> = self
            .ids
            .iter()
            .map(|(symbol, &asset_id)| AssetRow {
                asset_id,
                symbol: symbol.clone(),
            })
            .collect();
        rows.sort_by_key(|r| r.asset_id);
        rows
    }

    /// `(새 심볼, id가 바뀐 기존 심볼)`
    fn diff(&self, previous: &AssetDim) -> (Vec<String>, Vec<String>) {
        let mut new_symbols = Vec::new();
        let mut reassigned = Vec::new();
        for (symbol, id) in &self.ids {
            match previous.id_of(symbol) {
                None => new_symbols.push(symbol.clone()),
                Some(prev_id) if prev_id != *id => reassigned.push(symbol.clone()),
                Some(_) => {}
            }
        }
        (new_symbols, reassigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn observations(symbols: &[&str]) -> Vec<StagedObservation> {
        symbols
            .iter()
            .map(|s| StagedObservation {
                symbol: s.to_string(),
                date: "2024-01-02".parse().unwrap(),
                source: "test".to_string(),
                open: dec!(1),
                high: dec!(1),
                low: dec!(1),
                close: dec!(1),
                volume: 0,
                load_ts: None,
            })
            .collect()
    }

    fn ids(dim: &AssetDim) -> Vec<(String, i32)> {
        dim.rows().into_iter().map(|r| (r.symbol, r.asset_id)).collect()
    }

    #[test]
    fn test_dense_lexicographic_ids() {
        let derived = AssetDim::derive(
            &observations(&["NVDA", "AAPL", "MSFT", "AAPL"]),
            None,
            AssetKeyPolicy::Preserve,
        );
        assert_eq!(
            ids(&derived.dim),
            vec![
                ("AAPL".to_string(), 1),
                ("MSFT".to_string(), 2),
                ("NVDA".to_string(), 3)
            ]
        );
        assert_eq!(derived.new_symbols.len(), 3);
        assert!(derived.ids_stable());
    }

    #[test]
    fn test_rerun_is_deterministic() {
        let rows = observations(&["MSFT", "AAPL", "NVDA"]);
        for policy in [AssetKeyPolicy::Preserve, AssetKeyPolicy::Rank] {
            let first = AssetDim::derive(&rows, None, policy).dim;
            let second = AssetDim::derive(&rows, Some(&first), policy);
            assert_eq!(first, second.dim);
            assert!(second.new_symbols.is_empty());
            assert!(second.ids_stable());
        }
    }

    #[test]
    fn test_preserve_keeps_existing_ids_when_earlier_symbol_added() {
        let previous =
            AssetDim::derive(&observations(&["MSFT", "NVDA"]), None, AssetKeyPolicy::Preserve).dim;

        let derived = AssetDim::derive(
            &observations(&["AAPL", "MSFT", "NVDA"]),
            Some(&previous),
            AssetKeyPolicy::Preserve,
        );
        assert_eq!(derived.dim.id_of("MSFT"), Some(1));
        assert_eq!(derived.dim.id_of("NVDA"), Some(2));
        assert_eq!(derived.dim.id_of("AAPL"), Some(3));
        assert_eq!(derived.new_symbols, vec!["AAPL".to_string()]);
        assert!(derived.ids_stable());
    }

    #[test]
    fn test_rank_reassigns_when_earlier_symbol_added() {
        let previous =
            AssetDim::derive(&observations(&["MSFT", "NVDA"]), None, AssetKeyPolicy::Rank).dim;

        let derived = AssetDim::derive(
            &observations(&["AAPL", "MSFT", "NVDA"]),
            Some(&previous),
            AssetKeyPolicy::Rank,
        );
        assert_eq!(derived.dim.id_of("AAPL"), Some(1));
        assert_eq!(derived.dim.id_of("MSFT"), Some(2));
        assert_eq!(
            derived.reassigned,
            vec!["MSFT".to_string(), "NVDA".to_string()]
        );
        assert!(!derived.ids_stable());
    }

    #[test]
    fn test_preserve_does_not_reuse_ids_of_lower_symbols() {
        // 게시된 차원이 일부 심볼만 가진 상태 (stale)
        let previous = AssetDim::from_rows(vec![
            AssetRow {
                asset_id: 1,
                symbol: "AAPL".to_string(),
            },
            AssetRow {
                asset_id: 4,
                symbol: "TSLA".to_string(),
            },
        ]);

        let derived = AssetDim::derive(
            &observations(&["AAPL", "GOOG", "TSLA"]),
            Some(&previous),
            AssetKeyPolicy::Preserve,
        );
        assert_eq!(derived.dim.id_of("GOOG"), Some(5));
        assert_eq!(derived.dim.len(), 3);
    }
}
