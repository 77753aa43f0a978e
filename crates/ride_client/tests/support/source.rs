use std::collections::VecDeque;
use std::sync::Mutex;

use ride_client::location::{PositionError, PositionRequest, PositionSource};
use ride_core::position::PositionSample;
use ride_core::test_helpers::sample_with_accuracy;

/// One scripted answer from the device.
#[derive(Debug, Clone)]
pub enum Step {
    Fix(PositionSample),
    Fail(PositionError),
    /// Never answers; the engine's per-attempt timeout must fire.
    Hang,
}

/// Position source that replays a script and records every request.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<PositionRequest>>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fixes at the test pickup with the given accuracies, in order.
    pub fn accuracies(accuracies: &[f64]) -> Self {
        Self::new(
            accuracies
                .iter()
                .map(|accuracy| Step::Fix(sample_with_accuracy(*accuracy)))
                .collect(),
        )
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }

    pub fn requests(&self) -> Vec<PositionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl PositionSource for ScriptedSource {
    async fn request_position(
        &self,
        request: PositionRequest,
    ) -> Result<PositionSample, PositionError> {
        self.requests.lock().expect("requests lock").push(request);
        let step = self.steps.lock().expect("steps lock").pop_front();
        match step {
            Some(Step::Fix(sample)) => Ok(sample),
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Hang) => std::future::pending().await,
            None => Err(PositionError::PositionUnavailable("script exhausted".into())),
        }
    }
}
