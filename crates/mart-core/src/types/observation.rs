//! 원시 가격 관측과 정제(staging) 단계.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{MartError, MartResult, SchemaField};

/// 소스 컬럼이 없을 때 사용하는 값.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// 원시 관측 저장소에서 읽은 행 (모든 컬럼 nullable).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub symbol: Option<String>,
    pub date: Option<NaiveDate>,
    pub source: Option<String>,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub volume: Option<i64>,
    pub load_ts: Option<DateTime<Utc>>,
}

/// 필수 필드가 모두 채워진 정제 행.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedObservation {
    pub symbol: String,
    pub date: NaiveDate,
    pub source: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
    pub load_ts: Option<DateTime<Utc>>,
}

impl RawObservation {
    /// 단일 행 정제.
    ///
    /// 심볼은 공백 제거 후 대문자로 정규화하며, 빈 심볼은 null로 취급합니다.
    /// `row`는 에러 보고용 입력 위치입니다.
    pub fn stage(&self, row: usize) -> MartResult<StagedObservation> {
        let missing = |field| MartError::InputSchema { row, field };

        let symbol = self
            .symbol
            .as_deref()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| missing(SchemaField::Symbol))?;
        let date = self.date.ok_or_else(|| missing(SchemaField::Date))?;
        let open = self.open.ok_or_else(|| missing(SchemaField::Open))?;
        let high = self.high.ok_or_else(|| missing(SchemaField::High))?;
        let low = self.low.ok_or_else(|| missing(SchemaField::Low))?;
        let close = self.close.ok_or_else(|| missing(SchemaField::Close))?;

        let source = self
            .source
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_SOURCE)
            .to_string();

        Ok(StagedObservation {
            symbol,
            date,
            source,
            open,
            high,
            low,
            close,
            volume: self.volume.unwrap_or(0),
            load_ts: self.load_ts,
        })
    }
}

/// 정제 결과.
#[derive(Debug, Default)]
pub struct StagingOutcome {
    /// 통과한 행 (입력 순서 유지)
    pub rows: Vec<StagedObservation>,
    /// 거부된 행의 스키마 에러
    pub rejected: Vec<MartError>,
}

impl StagingOutcome {
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}

/// 원시 행 전체를 정제합니다.
///
/// 스키마 에러는 행 단위로 복구됩니다: 해당 행만 거부되고 나머지는 계속 처리됩니다.
pub fn stage_observations(raw: &[RawObservation]) -> StagingOutcome {
    let mut outcome = StagingOutcome::default();

    for (row, obs) in raw.iter().enumerate() {
        match obs.stage(row) {
            Ok(staged) => outcome.rows.push(staged),
            Err(e) => {
                tracing::debug!(error = %e, "원시 행 거부");
                outcome.rejected.push(e);
            }
        }
    }

    outcome
}
