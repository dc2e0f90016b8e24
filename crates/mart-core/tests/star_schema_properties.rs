//! 스타 스키마 파생 단계의 통합 속성 테스트
//!
//! 정제 → 차원 → 팩트 → 파생 지표 전체 경로에서 행 유실이 없고
//! 심볼 파티션이 서로 섞이지 않는지 검증합니다.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use mart_core::{
    enrich, reconcile, stage_observations, AssetDim, AssetKeyPolicy, CalendarDim,
    MovingAverageWindows, OrphanPolicy, RawObservation, StagedObservation,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;

fn raw(symbol: &str, date: NaiveDate, close: Decimal, load_secs: i64) -> RawObservation {
    RawObservation {
        symbol: Some(symbol.to_string()),
        date: Some(date),
        source: Some("yahoo".to_string()),
        open: Some(close),
        high: Some(close),
        low: Some(close),
        close: Some(close),
        volume: Some(1_000),
        load_ts: Utc.timestamp_opt(load_secs, 0).single(),
    }
}

fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(offset)
}

fn pipeline(
    staged: &[StagedObservation],
    windows: &[usize],
) -> (usize, usize, Vec<mart_core::EnrichedPrice>) {
    let calendar = CalendarDim::derive(staged);
    let assets = AssetDim::derive(staged, None, AssetKeyPolicy::Preserve).dim;
    let outcome = reconcile(staged, &calendar, &assets, OrphanPolicy::Fail).unwrap();
    let windows = MovingAverageWindows::new(windows.to_vec()).unwrap();
    let enriched = enrich(&outcome.facts, &windows);
    (calendar.len(), outcome.facts.len(), enriched)
}

#[test]
fn test_spec_scenario_returns_and_moving_average() {
    let rows = vec![
        raw("AAPL", day(0), dec!(100), 1),
        raw("AAPL", day(1), dec!(110), 1),
        raw("AAPL", day(2), dec!(99), 1),
    ];
    let staged = stage_observations(&rows).rows;
    let (_, facts, enriched) = pipeline(&staged, &[2, 30]);

    assert_eq!(facts, 3);
    let returns: Vec<_> = enriched.iter().map(|r| r.daily_return_pct).collect();
    assert_eq!(returns, vec![None, Some(dec!(10.0)), Some(dec!(-10.0))]);
    let ma2: Vec<_> = enriched.iter().map(|r| r.moving_averages[0]).collect();
    assert_eq!(ma2, vec![dec!(100), dec!(105), dec!(104.5)]);
    // 30일 윈도우는 부분 윈도우 평균
    assert_eq!(enriched[2].moving_averages[1], dec!(103));
}

#[test]
fn test_duplicates_and_rejected_rows_do_not_inflate_facts() {
    let mut rows = vec![
        raw("AAPL", day(0), dec!(100), 1),
        raw("AAPL", day(0), dec!(101), 5),
        raw("MSFT", day(1), dec!(300), 1),
    ];
    rows.push(RawObservation {
        symbol: None,
        ..raw("AAPL", day(3), dec!(1), 1)
    });
    rows.push(RawObservation {
        date: None,
        ..raw("AAPL", day(4), dec!(1), 1)
    });

    let staging = stage_observations(&rows);
    assert_eq!(staging.rejected_count(), 2);

    let (calendar_days, facts, enriched) = pipeline(&staging.rows, &[7, 30]);
    assert_eq!(calendar_days, 2);
    assert_eq!(facts, 2);
    assert_eq!(enriched.len(), 2);
    assert_eq!(enriched[0].close, dec!(101));
}

#[test]
fn test_stale_dimensions_recovered_by_full_recompute() {
    // 50개 심볼 × 4일, stale 차원은 절반의 심볼/날짜만 알고 있음
    let symbols: Vec<String> = (0..50).map(|i| format!("S{:02}", i)).collect();
    let rows: Vec<RawObservation> = symbols
        .iter()
        .flat_map(|s| (0..4).map(move |d| raw(s, day(d), dec!(10) + Decimal::from(d), 1)))
        .collect();
    let staged = stage_observations(&rows).rows;

    let stale: Vec<StagedObservation> = staged
        .iter()
        .filter(|o| o.symbol < "S25".to_string() && o.date < day(2))
        .cloned()
        .collect();
    let stale_calendar = CalendarDim::derive(&stale);
    let stale_assets = AssetDim::derive(&stale, None, AssetKeyPolicy::Preserve).dim;

    // stale 차원으로는 실패(조용히 버리지 않음)
    assert!(reconcile(&staged, &stale_calendar, &stale_assets, OrphanPolicy::Fail).is_err());

    // 새로 계산한 차원은 모든 행을 살림
    let calendar = CalendarDim::derive(&staged);
    let assets = AssetDim::derive(&staged, Some(&stale_assets), AssetKeyPolicy::Preserve);
    assert_eq!(assets.new_symbols.len(), 25);
    assert!(assets.ids_stable());

    let outcome = reconcile(&staged, &calendar, &assets.dim, OrphanPolicy::Fail).unwrap();
    assert_eq!(outcome.facts.len(), 200);
}

fn observations_strategy() -> impl Strategy<Value = Vec<(u8, i64, u32, i64)>> {
    // (심볼 인덱스, 날짜 오프셋, 종가, 적재 시각)
    prop::collection::vec((0u8..4, 0i64..40, 0u32..10_000, 0i64..3), 0..120)
}

proptest! {
    #[test]
    fn prop_no_data_loss_and_one_to_one(rows in observations_strategy()) {
        let raw_rows: Vec<RawObservation> = rows
            .iter()
            .map(|(s, d, c, ts)| raw(&format!("SYM{}", s), day(*d), Decimal::from(*c), *ts))
            .collect();
        let staged = stage_observations(&raw_rows).rows;

        let distinct_pairs: BTreeSet<(String, NaiveDate)> =
            staged.iter().map(|o| (o.symbol.clone(), o.date)).collect();
        let distinct_dates: BTreeSet<NaiveDate> = staged.iter().map(|o| o.date).collect();

        let (calendar_days, facts, enriched) = pipeline(&staged, &[3, 7]);
        prop_assert_eq!(calendar_days, distinct_dates.len());
        prop_assert_eq!(facts, distinct_pairs.len());
        prop_assert_eq!(enriched.len(), facts);
    }

    #[test]
    fn prop_partitions_are_isolated(rows in observations_strategy()) {
        // SYM0만 남긴 결과와 전체에서 SYM0 부분이 같아야 함; 다른 심볼은 극단값
        let raw_rows: Vec<RawObservation> = rows
            .iter()
            .map(|(s, d, c, ts)| {
                let close = if *s == 0 {
                    Decimal::from(*c)
                } else {
                    Decimal::from(*c) * dec!(1000000)
                };
                raw(&format!("SYM{}", s), day(*d), close, *ts)
            })
            .collect();
        let staged = stage_observations(&raw_rows).rows;
        let only_a: Vec<StagedObservation> =
            staged.iter().filter(|o| o.symbol == "SYM0").cloned().collect();

        let (_, _, mixed) = pipeline(&staged, &[2, 5]);
        let (_, _, alone) = pipeline(&only_a, &[2, 5]);

        let mixed_a: Vec<_> = mixed.into_iter().filter(|r| r.symbol == "SYM0").collect();
        prop_assert_eq!(mixed_a.len(), alone.len());
        for (m, a) in mixed_a.iter().zip(alone.iter()) {
            prop_assert_eq!(m.date, a.date);
            prop_assert_eq!(m.prev_close, a.prev_close);
            prop_assert_eq!(m.daily_return_pct, a.daily_return_pct);
            prop_assert_eq!(&m.moving_averages, &a.moving_averages);
        }
    }
}
