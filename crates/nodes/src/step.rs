//! The durable unit-of-work contract.
//!
//! Executors wrap every side effect in a named step. The runner behind the
//! trait decides what "durable" means: the engine's implementation
//! checkpoints each step's output by `(run id, step name)` and retries
//! transient failures, so a resumed run skips steps that already committed.
//!
//! Step names must be reproducible across retries of the same logical step:
//! never derive them from timestamps, random ids or other runtime noise.

use std::future::Future;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{NodeError, NodeResult};

/// One attempt of a step's work.
pub type StepFuture<'a> = BoxFuture<'a, NodeResult<Value>>;

/// Factory producing a fresh attempt each time it is called.
pub type StepWork<'a> = Box<dyn Fn() -> StepFuture<'a> + Send + Sync + 'a>;

/// Runs named units of work on behalf of one run.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Run `work` under `name`, or return the output it committed earlier.
    async fn run(&self, name: &str, work: StepWork<'_>) -> NodeResult<Value>;
}

/// Typed wrapper over [`StepRunner::run`].
///
/// The output is checkpointed as JSON, so it must round-trip through serde.
pub async fn run_step<T, F, Fut>(runner: &dyn StepRunner, name: &str, work: F) -> NodeResult<T>
where
    T: Serialize + DeserializeOwned + Send,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = NodeResult<T>> + Send,
{
    let work = &work;
    let value = runner
        .run(
            name,
            Box::new(move || {
                async move {
                    let output = work().await?;
                    serde_json::to_value(output).map_err(|e| {
                        NodeError::fatal(format!("step '{name}' output is not serialisable: {e}"))
                    })
                }
                .boxed()
            }),
        )
        .await?;

    serde_json::from_value(value).map_err(|e| {
        NodeError::fatal(format!("step '{name}' checkpoint has an unexpected shape: {e}"))
    })
}

/// Prefixes every step name with a fixed scope, e.g. the node id.
///
/// Two nodes of the same type run identically-named steps; scoping keeps
/// their checkpoints apart within one run.
pub struct ScopedSteps<'a> {
    inner: &'a dyn StepRunner,
    scope: &'a str,
}

impl<'a> ScopedSteps<'a> {
    pub fn new(inner: &'a dyn StepRunner, scope: &'a str) -> Self {
        Self { inner, scope }
    }

    pub fn qualify(&self, name: &str) -> String {
        format!("{}/{}", self.scope, name)
    }
}

#[async_trait]
impl StepRunner for ScopedSteps<'_> {
    async fn run(&self, name: &str, work: StepWork<'_>) -> NodeResult<Value> {
        self.inner.run(&self.qualify(name), work).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingSteps;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Out {
        text: String,
    }

    #[tokio::test]
    async fn run_step_round_trips_typed_output() {
        let steps = RecordingSteps::new();
        let out: Out = run_step(&steps, "generate", || async {
            Ok(Out { text: "hi".into() })
        })
        .await
        .unwrap();

        assert_eq!(out, Out { text: "hi".into() });
        assert_eq!(steps.names(), vec!["generate"]);
    }

    #[tokio::test]
    async fn run_step_propagates_work_errors() {
        let steps = RecordingSteps::new();
        let result: NodeResult<Out> =
            run_step(&steps, "boom", || async { Err(NodeError::fatal("nope")) }).await;
        assert_eq!(result, Err(NodeError::fatal("nope")));
    }

    #[tokio::test]
    async fn scoped_steps_prefix_names() {
        let steps = RecordingSteps::new();
        let scoped = ScopedSteps::new(&steps, "node-1");
        let _: u32 = run_step(&scoped, "http-request", || async { Ok(7) }).await.unwrap();
        assert_eq!(steps.names(), vec!["node-1/http-request"]);
    }
}
