use std::time::Instant;

use crate::error::HarvestError;
use crate::queue::{HarvestObject, ObjectState};

/// Capability shared by the gather, fetch and import stages.
pub trait Stage {
    type Input;
    type Output;

    fn name(&self) -> &'static str;
    fn run(&self, input: Self::Input) -> Result<Self::Output, HarvestError>;
}

/// Runs a stage and logs how long it took.
pub fn run_stage<S: Stage>(stage: &S, input: S::Input) -> Result<S::Output, HarvestError> {
    let start = Instant::now();
    let result = stage.run(input);
    tracing::debug!(
        stage = stage.name(),
        latency_ms = start.elapsed().as_millis() as u64,
        ok = result.is_ok(),
        "stage finished"
    );
    result
}

/// Every record is complete after gather, so fetching only advances the object state.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchStage;

impl Stage for FetchStage {
    type Input = HarvestObject;
    type Output = HarvestObject;

    fn name(&self) -> &'static str {
        "fetch"
    }

    fn run(&self, mut object: HarvestObject) -> Result<HarvestObject, HarvestError> {
        if object.content.trim().is_empty() {
            return Err(HarvestError::InvalidObject {
                id: object.id,
                message: "empty content".to_string(),
            });
        }
        object.advance(ObjectState::Fetched);
        tracing::debug!(guid = %object.guid, "fetched");
        Ok(object)
    }
}
