//! Durable step execution.
//!
//! [`DurableSteps`] is the engine's [`StepRunner`]. For every named step it
//! first consults the [`StepStore`]; a committed output is replayed without
//! running the work again. Otherwise the work runs, transient failures are
//! retried with exponential back-off, and the output is committed under
//! `(run id, step name)`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use nodes::step::{StepRunner, StepWork};
use nodes::{NodeError, NodeResult};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ExecutorConfig;
use crate::store::StoreError;

/// Checkpoint storage for step outputs.
#[async_trait]
pub trait StepStore: Send + Sync {
    async fn load(&self, run_id: Uuid, step: &str) -> Result<Option<Value>, StoreError>;

    /// Commit `output`. Saving the same step twice keeps the first output.
    async fn save(&self, run_id: Uuid, step: &str, output: &Value) -> Result<(), StoreError>;
}

/// Step checkpoints held in memory.
#[derive(Debug, Default)]
pub struct MemoryStepStore {
    steps: RwLock<HashMap<(Uuid, String), Value>>,
}

impl MemoryStepStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the steps committed for `run_id`, sorted.
    pub fn committed(&self, run_id: Uuid) -> Vec<String> {
        let steps = self.steps.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = steps
            .keys()
            .filter(|(id, _)| *id == run_id)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.steps.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StepStore for MemoryStepStore {
    async fn load(&self, run_id: Uuid, step: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .steps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(run_id, step.to_string()))
            .cloned())
    }

    async fn save(&self, run_id: Uuid, step: &str, output: &Value) -> Result<(), StoreError> {
        self.steps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((run_id, step.to_string()))
            .or_insert_with(|| output.clone());
        Ok(())
    }
}

/// [`StepRunner`] bound to one run, backed by a [`StepStore`].
pub struct DurableSteps {
    store: Arc<dyn StepStore>,
    run_id: Uuid,
    config: ExecutorConfig,
}

impl DurableSteps {
    pub fn new(store: Arc<dyn StepStore>, run_id: Uuid, config: ExecutorConfig) -> Self {
        Self { store, run_id, config }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    async fn attempt(&self, name: &str, work: &StepWork<'_>) -> NodeResult<Value> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match work().await {
                Ok(output) => return Ok(output),
                Err(err) if err.is_retryable() && attempts <= self.config.max_retries => {
                    let delay = self.config.backoff(attempts);
                    warn!(
                        run_id = %self.run_id,
                        step = name,
                        attempt = attempts,
                        max_retries = self.config.max_retries,
                        ?delay,
                        error = %err,
                        "step failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_retryable() => {
                    return Err(NodeError::RetriesExhausted {
                        step: name.to_string(),
                        attempts,
                        message: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl StepRunner for DurableSteps {
    async fn run(&self, name: &str, work: StepWork<'_>) -> NodeResult<Value> {
        match self.store.load(self.run_id, name).await {
            Ok(Some(output)) => {
                debug!(run_id = %self.run_id, step = name, "step already committed, replaying output");
                return Ok(output);
            }
            Ok(None) => {}
            Err(err) => {
                return Err(NodeError::transient(format!(
                    "step store unavailable while loading '{name}': {err}"
                )));
            }
        }

        let output = self.attempt(name, &work).await?;

        if let Err(err) = self.store.save(self.run_id, name, &output).await {
            warn!(run_id = %self.run_id, step = name, error = %err, "failed to checkpoint step output");
        }
        Ok(output)
    }
}
