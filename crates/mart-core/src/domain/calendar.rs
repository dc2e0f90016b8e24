//! 거래일 캘린더 차원.
//!
//! 원시 관측에 등장한 날짜의 집합입니다. 연속 달력이 아니며(주말/휴일 없음),
//! 어떤 심볼이든 거래가 있었던 날짜만 포함합니다.
//!
//! 매 실행마다 전체 입력으로부터 다시 계산합니다. 부분 날짜 집합을 병합하는
//! 증분 갱신은 범위를 줄여 이후 팩트 행을 고아로 만들 수 있으므로 지원하지 않습니다.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::StagedObservation;

/// 캘린더 차원 한 행.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub year: i32,
    pub month: i32,
    pub day: i32,
    /// ISO 요일 (월=1 … 일=7)
    pub day_of_week: i32,
    /// ISO 주차
    pub week: i32,
}

impl CalendarDay {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            date,
            year: date.year(),
            month: date.month() as i32,
            day: date.day() as i32,
            day_of_week: date.weekday().number_from_monday() as i32,
            week: date.iso_week().week() as i32,
        }
    }

    /// 파생 속성이 날짜와 일치하는지 확인합니다.
    pub fn is_consistent(&self) -> bool {
        *self == Self::from_date(self.date)
    }
}

/// 캘린더 차원 (날짜 오름차순, 중복 없음).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarDim {
    days: BTreeMap<NaiveDate, CalendarDay>,
}

impl CalendarDim {
    /// 정제된 관측 전체에서 캘린더를 계산합니다.
    pub fn derive(observations: &[StagedObservation]) -> Self {
        let days = observations
            .iter()
            .map(|obs| (obs.date, CalendarDay::from_date(obs.date)))
            .collect();
        Self { days }
    }

    /// 이미 게시된 행으로부터 구성합니다. 같은 날짜는 마지막 행이 남습니다.
    pub fn from_days(days: impl IntoIterator<Item = CalendarDay>) -> Self {
        Self {
            days: days.into_iter().map(|d| (d.date, d)).collect(),
        }
    }

    pub fn contains(&self, date: &NaiveDate) -> bool {
        self.days.contains_key(date)
    }

    pub fn get(&self, date: &NaiveDate) -> Option<&CalendarDay> {
        self.days.get(date)
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// `(min, max)` 날짜 범위.
    pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.days.keys().next()?;
        let last = self.days.keys().next_back()?;
        Some((*first, *last))
    }

    pub fn days(&self) -> impl Iterator<Item = &CalendarDay> {
        self.days.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn obs(symbol: &str, date: &str) -> StagedObservation {
        StagedObservation {
            symbol: symbol.to_string(),
            date: date.parse().unwrap(),
            source: "test".to_string(),
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close: dec!(1),
            volume: 0,
            load_ts: None,
        }
    }

    #[test]
    fn test_calendar_attributes() {
        // 2024-01-01은 월요일, ISO 1주차
        let day = CalendarDay::from_date("2024-01-01".parse().unwrap());
        assert_eq!(day.year, 2024);
        assert_eq!(day.month, 1);
        assert_eq!(day.day, 1);
        assert_eq!(day.day_of_week, 1);
        assert_eq!(day.week, 1);

        // 2023-01-01은 일요일, ISO 기준 2022년 52주차
        let day = CalendarDay::from_date("2023-01-01".parse().unwrap());
        assert_eq!(day.day_of_week, 7);
        assert_eq!(day.week, 52);
        assert!(day.is_consistent());
    }

    #[test]
    fn test_derive_distinct_dates_across_symbols() {
        let rows = vec![
            obs("AAPL", "2024-01-03"),
            obs("MSFT", "2024-01-03"),
            obs("AAPL", "2024-01-02"),
            obs("MSFT", "2024-01-05"),
            obs("AAPL", "2024-01-02"),
        ];

        let calendar = CalendarDim::derive(&rows);
        assert_eq!(calendar.len(), 3);
        assert_eq!(
            calendar.bounds(),
            Some(("2024-01-02".parse().unwrap(), "2024-01-05".parse().unwrap()))
        );
        // 연속 달력이 아님: 2024-01-04는 거래가 없었음
        assert!(!calendar.contains(&"2024-01-04".parse().unwrap()));

        let dates: Vec<_> = calendar.days().map(|d| d.date.to_string()).collect();
        assert_eq!(dates, vec!["2024-01-02", "2024-01-03", "2024-01-05"]);
    }

    #[test]
    fn test_empty_input_yields_empty_calendar() {
        let calendar = CalendarDim::derive(&[]);
        assert!(calendar.is_empty());
        assert_eq!(calendar.bounds(), None);
    }
}
