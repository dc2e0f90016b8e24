//! 리프레시 실행 상태 머신.
//!
//! `PENDING → DIMENSIONS_REFRESHED → FACTS_REBUILT → ENRICHED → DONE`
//!
//! 어떤 상태도 건너뛸 수 없고, `FAILED`는 종료 상태가 아닌 모든 상태에서 도달 가능합니다.

use serde::{Deserialize, Serialize};

use crate::error::{MartError, MartResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefreshState {
    Pending,
    DimensionsRefreshed,
    FactsRebuilt,
    Enriched,
    Done,
    Failed,
}

impl RefreshState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::DimensionsRefreshed => "DIMENSIONS_REFRESHED",
            Self::FactsRebuilt => "FACTS_REBUILT",
            Self::Enriched => "ENRICHED",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// 정상 경로의 다음 상태.
    pub fn successor(&self) -> Option<RefreshState> {
        match self {
            Self::Pending => Some(Self::DimensionsRefreshed),
            Self::DimensionsRefreshed => Some(Self::FactsRebuilt),
            Self::FactsRebuilt => Some(Self::Enriched),
            Self::Enriched => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub fn can_transition_to(&self, next: RefreshState) -> bool {
        match next {
            Self::Failed => !self.is_terminal(),
            _ => self.successor() == Some(next),
        }
    }

    /// 상태 전이. 허용되지 않으면 `InvalidTransition`.
    pub fn transition(self, next: RefreshState) -> MartResult<RefreshState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(MartError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for RefreshState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RefreshState {
    type Err = MartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "DIMENSIONS_REFRESHED" => Ok(Self::DimensionsRefreshed),
            "FACTS_REBUILT" => Ok(Self::FactsRebuilt),
            "ENRICHED" => Ok(Self::Enriched),
            "DONE" => Ok(Self::Done),
            "FAILED" => Ok(Self::Failed),
            _ => Err(MartError::Config(format!("unknown refresh state: {}", s))),
        }
    }
}
