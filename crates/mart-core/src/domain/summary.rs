//! 심볼별 가격 요약과 위험 지표.
//!
//! 서빙 계층이 파생 테이블에서 구간을 잘라 보여주는 지표를 같은 규칙으로 계산합니다.
//! 위험 지표는 연율화 기준 252 거래일, 무위험 수익률 0을 가정합니다.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use super::enrichment::EnrichedPrice;

/// 연간 거래일 수.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// 일간 수익률 기반 위험 지표. 수익률이 2개 미만이면 모두 `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RiskMetrics {
    /// 연율화 변동성 (소수, 0.2 = 20%)
    pub annualized_volatility: Option<f64>,
    /// 연율화 샤프 비율 (표준편차가 0이면 없음)
    pub sharpe_ratio: Option<f64>,
    /// 최대 낙폭 (음수 소수)
    pub max_drawdown: Option<f64>,
}

/// 구간 가격 요약.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSummary {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub observations: usize,
    pub start_close: Decimal,
    pub end_close: Decimal,
    /// `(end / start - 1) * 100`, 시작 종가가 0이면 없음
    pub performance_pct: Option<Decimal>,
    pub highest_close: Decimal,
    pub lowest_close: Decimal,
    pub risk: RiskMetrics,
}

/// 날짜 오름차순으로 정렬된 단일 심볼 구간을 요약합니다. 빈 구간이면 `None`.
pub fn summarize(rows: &[EnrichedPrice]) -> Option<PriceSummary> {
    let first = rows.first()?;
    let last = rows.last()?;

    let highest_close = rows.iter().map(|r| r.close).max()?;
    let lowest_close = rows.iter().map(|r| r.close).min()?;

    let performance_pct = if first.close.is_zero() {
        None
    } else {
        Some(((last.close / first.close - Decimal::ONE) * Decimal::ONE_HUNDRED).round_dp(4))
    };

    let returns: Vec<f64> = rows
        .iter()
        .filter_map(|r| r.daily_return_pct)
        .filter_map(|pct| pct.to_f64())
        .map(|pct| pct / 100.0)
        .collect();

    Some(PriceSummary {
        symbol: first.symbol.clone(),
        start_date: first.date,
        end_date: last.date,
        observations: rows.len(),
        start_close: first.close,
        end_close: last.close,
        performance_pct,
        highest_close,
        lowest_close,
        risk: risk_metrics(&returns),
    })
}

/// 소수 단위 일간 수익률에서 위험 지표를 계산합니다.
pub fn risk_metrics(returns: &[f64]) -> RiskMetrics {
    if returns.len() < 2 {
        return RiskMetrics::default();
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    // 표본 표준편차 (n - 1)
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let daily_vol = variance.sqrt();
    let annualizer = TRADING_DAYS_PER_YEAR.sqrt();

    let sharpe_ratio = if daily_vol > 0.0 {
        Some(mean / daily_vol * annualizer)
    } else {
        None
    };

    RiskMetrics {
        annualized_volatility: Some(daily_vol * annualizer),
        sharpe_ratio,
        max_drawdown: Some(max_drawdown(returns)),
    }
}

/// 누적 자산 지수의 최대 낙폭. 고점은 첫 수익률 적용 후 값부터 추적합니다.
fn max_drawdown(returns: &[f64]) -> f64 {
    let mut wealth = 1.0;
    let mut peak = f64::NEG_INFINITY;
    let mut worst: f64 = 0.0;

    for r in returns {
        wealth *= 1.0 + r;
        peak = peak.max(wealth);
        worst = worst.min(wealth / peak - 1.0);
    }

    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::enrichment::{enrich, MovingAverageWindows};
    use crate::domain::fact::FactPrice;
    use rust_decimal_macros::dec;

    fn series(closes: &[Decimal]) -> Vec<EnrichedPrice> {
        let facts: Vec<FactPrice> = closes
            .iter()
            .enumerate()
            .map(|(i, c)| FactPrice {
                date: NaiveDate::from_ymd_opt(2024, 1, 1 + i as u32).unwrap(),
                asset_id: Some(1),
                symbol: "AAPL".to_string(),
                open: *c,
                high: *c,
                low: *c,
                close: *c,
                volume: 0,
            })
            .collect();
        enrich(&facts, &MovingAverageWindows::new(vec![7]).unwrap())
    }

    #[test]
    fn test_empty_series() {
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn test_price_kpis() {
        let summary = summarize(&series(&[dec!(100), dec!(110), dec!(99), dec!(120)])).unwrap();
        assert_eq!(summary.observations, 4);
        assert_eq!(summary.start_close, dec!(100));
        assert_eq!(summary.end_close, dec!(120));
        assert_eq!(summary.performance_pct, Some(dec!(20)));
        assert_eq!(summary.highest_close, dec!(120));
        assert_eq!(summary.lowest_close, dec!(99));
        assert_eq!(summary.end_date.to_string(), "2024-01-04");
    }

    #[test]
    fn test_single_return_has_no_risk_metrics() {
        let summary = summarize(&series(&[dec!(100), dec!(110)])).unwrap();
        assert_eq!(summary.risk, RiskMetrics::default());
    }

    #[test]
    fn test_max_drawdown() {
        // 100 → 110 → 99 → 120: 고점 110 대비 -10%
        let metrics = risk_metrics(&[0.10, -0.10, 120.0 / 99.0 - 1.0]);
        let dd = metrics.max_drawdown.unwrap();
        assert!((dd - (-0.10)).abs() < 1e-12);
        assert!(metrics.annualized_volatility.unwrap() > 0.0);
    }

    #[test]
    fn test_flat_returns_have_no_sharpe() {
        let metrics = risk_metrics(&[0.25, 0.25, 0.25]);
        assert_eq!(metrics.sharpe_ratio, None);
        assert_eq!(metrics.annualized_volatility, Some(0.0));
        assert_eq!(metrics.max_drawdown, Some(0.0));
    }
}
