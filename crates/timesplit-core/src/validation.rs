// crates/timesplit-core/src/validation.rs

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{DatasetMetadata, PartitionRequest, Window};

/// First rule a range request broke. The display text is the reason shown to
/// the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RangeViolation {
    #[error("train window starts after it ends")]
    TrainInverted,

    #[error("test window starts after it ends")]
    TestInverted,

    #[error("simulation window starts after it ends")]
    SimulationInverted,

    #[error("test must start after train ends")]
    TestNotAfterTrain,

    #[error("simulation must start after test ends")]
    SimulationNotAfterTest,

    #[error("date range outside dataset bounds")]
    OutsideDataset,
}

/// `(ok, reason)` view of a validation, with an empty reason on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub ok: bool,
    pub reason: String,
}

impl From<Result<(), RangeViolation>> for ValidationOutcome {
    fn from(result: Result<(), RangeViolation>) -> Self {
        match result {
            Ok(()) => ValidationOutcome {
                ok: true,
                reason: String::new(),
            },
            Err(violation) => ValidationOutcome {
                ok: false,
                reason: violation.to_string(),
            },
        }
    }
}

/// Checks window ordering and containment, first failure wins:
/// each window is ordered, test starts strictly after train ends, simulation
/// starts strictly after test ends, and the whole span lies inside the
/// dataset's timestamps. Gaps between windows are allowed.
pub fn validate(
    request: &PartitionRequest,
    metadata: &DatasetMetadata,
) -> Result<(), RangeViolation> {
    debug!(
        train_end = %request.train_end,
        test_start = %request.test_start,
        test_end = %request.test_end,
        sim_start = %request.sim_start,
        dataset_start = %metadata.start_timestamp,
        dataset_end = %metadata.end_timestamp,
        "validating range request"
    );

    let result = check(request, metadata);
    if let Err(violation) = &result {
        warn!(reason = %violation, "range request rejected");
    }
    result
}

fn check(request: &PartitionRequest, metadata: &DatasetMetadata) -> Result<(), RangeViolation> {
    for window in Window::ALL {
        if !request.window(window).is_ordered() {
            return Err(match window {
                Window::Train => RangeViolation::TrainInverted,
                Window::Test => RangeViolation::TestInverted,
                Window::Simulate => RangeViolation::SimulationInverted,
            });
        }
    }

    if request.train_end >= request.test_start {
        return Err(RangeViolation::TestNotAfterTrain);
    }
    if request.test_end >= request.sim_start {
        return Err(RangeViolation::SimulationNotAfterTest);
    }

    if request.train_start < metadata.start_timestamp || request.sim_end > metadata.end_timestamp {
        return Err(RangeViolation::OutsideDataset);
    }

    Ok(())
}
