//! Maps a job signal onto the activity that carries it out.
//!
//! Classification is a pure function of the instance input and the
//! signal, so it yields the same answer every time a job is replayed.

use crate::activity::ActivityInput;
use crate::error::ClassificationError;
use crate::signal::{JobAction, JobInput, JobSignal};

/// Classify `signal` for the instance identified by `input`.
///
/// A missing spec on activate or update is forwarded as an empty spec.
///
/// # Errors
///
/// Returns [`ClassificationError::UnsupportedAction`] for any action other
/// than activate, deactivate or update.
pub fn classify(
    input: &JobInput,
    signal: &JobSignal,
) -> Result<ActivityInput, ClassificationError> {
    let cluster_id = input.cluster_id;
    let feature_name = input.feature_name.clone();

    match &signal.action {
        JobAction::Activate => Ok(ActivityInput::Activate {
            cluster_id,
            feature_name,
            spec: signal.spec.clone().unwrap_or_default(),
        }),
        JobAction::Deactivate => Ok(ActivityInput::Deactivate {
            cluster_id,
            feature_name,
        }),
        JobAction::Update => Ok(ActivityInput::Update {
            cluster_id,
            feature_name,
            spec: signal.spec.clone().unwrap_or_default(),
        }),
        JobAction::Unsupported(action) => Err(ClassificationError::UnsupportedAction {
            action: action.clone(),
        }),
    }
}
