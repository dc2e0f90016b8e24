//! 입력 관측 타입.

pub mod observation;

pub use observation::{
    stage_observations, RawObservation, StagedObservation, StagingOutcome, UNKNOWN_SOURCE,
};
