//! 스타 스키마 도메인 로직.
//!
//! 각 단계는 전체 입력에 대한 순수 함수입니다. 저장/게시는 `mart-refresh`가 담당합니다.

pub mod asset;
pub mod calendar;
pub mod checks;
pub mod enrichment;
pub mod fact;
pub mod refresh_state;
pub mod summary;

pub use asset::{AssetDerivation, AssetDim, AssetKeyPolicy, AssetRow};
pub use calendar::{CalendarDay, CalendarDim};
pub use checks::{run_checks, CheckViolation, PublishedTables};
pub use enrichment::{enrich, EnrichedPrice, MovingAverageWindows, ENRICHED_SCALE};
pub use fact::{deduplicate, reconcile, Deduplicated, FactPrice, OrphanPolicy, ReconcileOutcome};
pub use refresh_state::RefreshState;
pub use summary::{risk_metrics, summarize, PriceSummary, RiskMetrics};
