//! 리프레시 실행 통계.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 리프레시 단계별 행 수 통계
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshStats {
    /// 원시 관측 행 수
    pub raw_rows: usize,
    /// 필수 필드 누락으로 거부된 행 수
    pub rejected_rows: usize,
    /// 중복 제거로 버려진 행 수
    pub duplicates_dropped: usize,
    /// 달력 차원 행 수
    pub calendar_days: usize,
    /// 자산 차원 행 수
    pub assets: usize,
    /// 새로 id를 받은 심볼 수
    pub new_assets: usize,
    /// 게시 대상 팩트 행 수
    pub fact_rows: usize,
    /// 이번 실행에서 새로 만든 팩트 행 수 (부분 실행이면 필터 범위만)
    pub facts_rebuilt: usize,
    /// 부분 실행에서 필터 밖이지만 게시된 팩트에 없어 함께 만든 키 수
    pub backfilled_rows: usize,
    /// null 키로 유지된 팩트 행 수
    pub orphan_rows: usize,
    /// 게시 대상 파생 행 수
    pub enriched_rows: usize,
    /// 이번 실행에서 새로 계산한 파생 행 수
    pub enriched_rebuilt: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RefreshStats {
    /// 새 통계 객체 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 정제 후 남은 행 비율 (%)
    pub fn acceptance_rate(&self) -> f64 {
        if self.raw_rows == 0 {
            0.0
        } else {
            ((self.raw_rows - self.rejected_rows) as f64 / self.raw_rows as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            raw_rows = self.raw_rows,
            rejected_rows = self.rejected_rows,
            duplicates_dropped = self.duplicates_dropped,
            calendar_days = self.calendar_days,
            assets = self.assets,
            new_assets = self.new_assets,
            fact_rows = self.fact_rows,
            facts_rebuilt = self.facts_rebuilt,
            backfilled_rows = self.backfilled_rows,
            orphan_rows = self.orphan_rows,
            enriched_rows = self.enriched_rows,
            enriched_rebuilt = self.enriched_rebuilt,
            acceptance_rate = format!("{:.1}%", self.acceptance_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "리프레시 완료"
        );
    }
}
