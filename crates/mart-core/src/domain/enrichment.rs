//! 파생 시계열 지표 (fact_prices_enriched).
//!
//! 심볼별 파티션을 날짜 오름차순으로 한 번 훑으며 계산합니다:
//!
//! - `prev_close`: 같은 파티션의 직전 행 종가 (파티션 첫 행은 null)
//! - `daily_return_pct`: `(close - prev_close) / prev_close * 100`
//!   (`prev_close`가 null이거나 정확히 0이면 null)
//! - 이동평균: 현재 행과 최대 W-1개의 직전 행 종가의 산술평균.
//!   파티션 초반에는 가용한 행만으로 평균을 냅니다 (null 아님).
//!
//! 파티션마다 최근 종가를 담은 작은 링 버퍼와 윈도우별 누적합만 유지하므로
//! 전체 이력 길이와 무관하게 행당 O(윈도우 수) 입니다. `Decimal` 누적합은
//! 빼기/더하기에서 오차가 쌓이지 않습니다.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::fact::FactPrice;
use crate::error::{MartError, MartResult};

/// 파생 지표 소수 자릿수.
pub const ENRICHED_SCALE: u32 = 8;

/// 검증된 이동평균 윈도우 길이 목록.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovingAverageWindows(Vec<usize>);

impl MovingAverageWindows {
    /// 비어있지 않고, 모두 양수이며, 중복이 없어야 합니다.
    pub fn new(windows: Vec<usize>) -> MartResult<Self> {
        if windows.is_empty() {
            return Err(MartError::InvalidWindow(
                "at least one window is required".to_string(),
            ));
        }
        if windows.contains(&0) {
            return Err(MartError::InvalidWindow("window length must be > 0".to_string()));
        }
        let mut sorted = windows.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != windows.len() {
            return Err(MartError::InvalidWindow(format!(
                "duplicate window length in {:?}",
                windows
            )));
        }
        Ok(Self(windows))
    }

    pub fn lengths(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn max(&self) -> usize {
        self.0.iter().copied().max().unwrap_or(0)
    }

    /// 출력 컬럼 이름 (`ma_7d`, `ma_30d`, …), 설정 순서 유지.
    pub fn column_names(&self) -> Vec<String> {
        self.0.iter().map(|w| format!("ma_{}d", w)).collect()
    }
}

/// fact_prices_enriched 한 행.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedPrice {
    pub date: NaiveDate,
    pub asset_id: Option<i32>,
    pub symbol: String,
    pub close: Decimal,
    pub prev_close: Option<Decimal>,
    pub daily_return_pct: Option<Decimal>,
    /// 윈도우 설정 순서와 같은 순서의 이동평균
    pub moving_averages: Vec<Decimal>,
}

impl EnrichedPrice {
    pub fn key(&self) -> (&str, NaiveDate) {
        (&self.symbol, self.date)
    }
}

/// 파티션 하나의 이동 상태.
#[derive(Debug)]
struct RollingWindow {
    /// 최근 `max(W)`개 종가 (오래된 것부터)
    closes: VecDeque<Decimal>,
    /// 윈도우별 누적합
    sums: Vec<Decimal>,
    capacity: usize,
}

impl RollingWindow {
    fn new(windows: &MovingAverageWindows) -> Self {
        Self {
            closes: VecDeque::with_capacity(windows.max()),
            sums: vec![Decimal::ZERO; windows.len()],
            capacity: windows.max(),
        }
    }

    fn reset(&mut self) {
        self.closes.clear();
        self.sums.iter_mut().for_each(|s| *s = Decimal::ZERO);
    }

    fn last(&self) -> Option<Decimal> {
        self.closes.back().copied()
    }

    /// 종가를 추가하고 윈도우별 평균을 반환합니다.
    fn push(&mut self, close: Decimal, windows: &MovingAverageWindows) -> Vec<Decimal> {
        let seen = self.closes.len();
        let mut averages = Vec::with_capacity(windows.len());

        for (sum, &window) in self.sums.iter_mut().zip(windows.lengths()) {
            *sum += close;
            if seen >= window {
                // 윈도우 밖으로 밀려나는 종가
                *sum -= self.closes[seen - window];
            }
            let count = (seen + 1).min(window);
            averages.push((*sum / Decimal::from(count)).round_dp(ENRICHED_SCALE));
        }

        self.closes.push_back(close);
        if self.closes.len() > self.capacity {
            self.closes.pop_front();
        }

        averages
    }
}

/// 일간 수익률 (%). 직전 종가가 정확히 0이면 계산하지 않습니다.
pub fn daily_return_pct(close: Decimal, prev_close: Option<Decimal>) -> Option<Decimal> {
    let prev = prev_close.filter(|p| !p.is_zero())?;
    let pct = (close - prev).checked_mul(Decimal::ONE_HUNDRED)?.checked_div(prev)?;
    Some(pct.round_dp(ENRICHED_SCALE))
}

/// 팩트 행 전체에 파생 지표를 계산합니다.
///
/// 입력 순서와 무관하게 (symbol, date) 오름차순으로 반환하며 행 수는 입력과 같습니다.
pub fn enrich(facts: &[FactPrice], windows: &MovingAverageWindows) -> Vec<EnrichedPrice> {
    let mut ordered: Vec<&FactPrice> = facts.iter().collect();
    ordered.sort_by(|a, b| a.key().cmp(&b.key()));

    let mut state = RollingWindow::new(windows);
    let mut current: Option<&str> = None;
    let mut enriched = Vec::with_capacity(ordered.len());

    for fact in ordered {
        if current != Some(fact.symbol.as_str()) {
            state.reset();
            current = Some(fact.symbol.as_str());
        }

        let prev_close = state.last();
        let moving_averages = state.push(fact.close, windows);

        enriched.push(EnrichedPrice {
            date: fact.date,
            asset_id: fact.asset_id,
            symbol: fact.symbol.clone(),
            close: fact.close,
            prev_close,
            daily_return_pct: daily_return_pct(fact.close, prev_close),
            moving_averages,
        });
    }

    enriched
}
