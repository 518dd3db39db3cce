//! Fluent builder for constructing a [`Simulator`].

use std::sync::Arc;

use qs_core::SimConfig;
use qs_run::RunModel;

use crate::split::{resolve_thread_count, split_allowed, thread_split};
use crate::{SimError, SimResult, Simulator};

/// Fluent builder for [`Simulator`].
///
/// # Optional inputs (have defaults)
///
/// | Method          | Default                   |
/// |-----------------|---------------------------|
/// | `.seed(s)`      | `config.seed`             |
/// | `.threads(n)`   | `config.num_threads`      |
///
/// # Example
///
/// ```rust,ignore
/// let mut sim = SimBuilder::new(SimConfig::default(), Arc::new(model))
///     .threads(4)
///     .build()?;
/// let stats = sim.run(&mut NoopObserver)?;
/// ```
pub struct SimBuilder {
    config: SimConfig,
    model:  Arc<RunModel>,
}

impl SimBuilder {
    pub fn new(config: SimConfig, model: Arc<RunModel>) -> Self {
        Self { config, model }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Use at most `n` worker threads.
    pub fn threads(mut self, n: usize) -> Self {
        self.config.num_threads = Some(n);
        self
    }

    /// Validate the model, resolve the thread count and plan the work of
    /// every thread.
    pub fn build(self) -> SimResult<Simulator> {
        let model = self.model;
        model.validate()?;

        if model.repeat_count == 0 {
            return Err(SimError::Config("repeat count must be at least 1".into()));
        }
        let termination = &model.termination;
        if termination.client_count == 0
            && termination.time_secs.is_none()
            && termination.condition.is_none()
            && termination.confidence.is_none()
        {
            return Err(SimError::Config(
                "the model needs a client count, a time, a condition or a confidence rule to end".into(),
            ));
        }
        if let Some(t) = termination.time_secs
            && !(t > 0.0 && t.is_finite())
        {
            return Err(SimError::Config(format!("termination time {t} must be positive")));
        }

        let threads = resolve_thread_count(self.config.thread_count(), &model);
        let allow_split = split_allowed(&model);
        let splits = (0..threads)
            .map(|nr| thread_split(nr, threads, model.repeat_count, allow_split))
            .collect();

        Ok(Simulator::new(self.config, model, splits))
    }
}
