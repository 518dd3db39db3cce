//! Expressions, distributions, and the evaluation context.
//!
//! The model compiler (outside this workspace) turns user formulas into
//! [`Expression`] trait objects bound to a fixed variable-name list, and
//! distribution definitions into [`Distribution`] trait objects.  The core only
//! evaluates them.
//!
//! Runtime evaluation failures never abort the caller.  They are pushed into
//! the [`EvalCtx::calc_errors`] sink together with their origin, and the caller
//! continues with a default value.  `SimulationData` drains the sink and
//! decides whether the run must stop.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::{SimRng, SimTime, StationId};

// ── CalcError ─────────────────────────────────────────────────────────────────

/// A failed expression evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("variable index {0} out of range")]
    UnknownVariable(usize),

    #[error("result is not a finite number")]
    NotFinite,

    #[error("{0}")]
    Failed(String),
}

/// Where a calculation error happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalcOrigin {
    Station(StationId),
    Resource(String),
    Transporter(String),
    Model,
}

impl fmt::Display for CalcOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalcOrigin::Station(id) => write!(f, "station {}", id.0),
            CalcOrigin::Resource(name) => write!(f, "resource \"{name}\""),
            CalcOrigin::Transporter(name) => write!(f, "transporter \"{name}\""),
            CalcOrigin::Model => f.write_str("model"),
        }
    }
}

/// A calculation error together with its origin and the expression text.
#[derive(Debug, Clone, PartialEq)]
pub struct CalcFailure {
    pub origin:     CalcOrigin,
    pub expression: String,
    pub error:      CalcError,
}

impl fmt::Display for CalcFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "calculation error at {}: cannot evaluate \"{}\" ({})",
            self.origin, self.expression, self.error
        )
    }
}

// ── Expression ────────────────────────────────────────────────────────────────

/// A compiled formula evaluated against the current variable values.
pub trait Expression: Send + Sync + fmt::Debug {
    fn eval(&self, vars: &[f64]) -> Result<f64, CalcError>;

    /// The source text, used in error messages.
    fn text(&self) -> &str;

    /// `Some(v)` if the expression does not depend on any variable.
    /// Callers may cache the value.
    fn constant_value(&self) -> Option<f64> {
        None
    }
}

/// A constant number.
#[derive(Debug, Clone)]
pub struct Constant {
    value: f64,
    text:  String,
}

impl Constant {
    pub fn new(value: f64) -> Self {
        Self { value, text: value.to_string() }
    }
}

impl Expression for Constant {
    fn eval(&self, _vars: &[f64]) -> Result<f64, CalcError> {
        Ok(self.value)
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn constant_value(&self) -> Option<f64> {
        Some(self.value)
    }
}

/// Reads one variable by index.
#[derive(Debug, Clone)]
pub struct Variable {
    index: usize,
    name:  String,
}

impl Variable {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self { index, name: name.into() }
    }
}

impl Expression for Variable {
    fn eval(&self, vars: &[f64]) -> Result<f64, CalcError> {
        vars.get(self.index).copied().ok_or(CalcError::UnknownVariable(self.index))
    }

    fn text(&self) -> &str {
        &self.name
    }
}

type ExprFn = dyn Fn(&[f64]) -> Result<f64, CalcError> + Send + Sync;

/// An expression backed by a closure.  This is the form the model compiler
/// hands over for arbitrary formulas.
pub struct FnExpression {
    text: String,
    f:    Box<ExprFn>,
}

impl FnExpression {
    pub fn new<F>(text: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[f64]) -> Result<f64, CalcError> + Send + Sync + 'static,
    {
        Self { text: text.into(), f: Box::new(f) }
    }
}

impl fmt::Debug for FnExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnExpression").field("text", &self.text).finish_non_exhaustive()
    }
}

impl Expression for FnExpression {
    fn eval(&self, vars: &[f64]) -> Result<f64, CalcError> {
        let value = (self.f)(vars)?;
        if !value.is_finite() {
            return Err(CalcError::NotFinite);
        }
        Ok(value)
    }

    fn text(&self) -> &str {
        &self.text
    }
}

// ── Distribution ──────────────────────────────────────────────────────────────

/// A probability distribution sampled with the owning thread's RNG.
pub trait Distribution: Send + Sync + fmt::Debug {
    fn sample(&self, rng: &mut SimRng) -> f64;
    fn mean(&self) -> f64;
}

/// Always returns the same value.
#[derive(Debug, Clone, Copy)]
pub struct Deterministic(pub f64);

impl Distribution for Deterministic {
    fn sample(&self, _rng: &mut SimRng) -> f64 {
        self.0
    }

    fn mean(&self) -> f64 {
        self.0
    }
}

/// Exponential distribution, sampled by inversion.
#[derive(Debug, Clone, Copy)]
pub struct Exponential {
    pub mean: f64,
}

impl Distribution for Exponential {
    fn sample(&self, rng: &mut SimRng) -> f64 {
        // 1 - u lies in (0, 1], so ln never sees zero.
        let u = 1.0 - rng.next_f64();
        -self.mean * u.ln()
    }

    fn mean(&self) -> f64 {
        self.mean
    }
}

/// Continuous uniform distribution on `[low, high)`.
#[derive(Debug, Clone, Copy)]
pub struct Uniform {
    pub low:  f64,
    pub high: f64,
}

impl Distribution for Uniform {
    fn sample(&self, rng: &mut SimRng) -> f64 {
        self.low + (self.high - self.low) * rng.next_f64()
    }

    fn mean(&self) -> f64 {
        (self.low + self.high) / 2.0
    }
}

// ── TimeSource ────────────────────────────────────────────────────────────────

/// A duration given either by a distribution or by an expression, in seconds.
#[derive(Clone, Debug)]
pub enum TimeSource {
    Distribution(Arc<dyn Distribution>),
    Expression(Arc<dyn Expression>),
}

impl TimeSource {
    /// A fixed duration of `secs` seconds.
    pub fn fixed(secs: f64) -> Self {
        TimeSource::Distribution(Arc::new(Deterministic(secs)))
    }

    /// Draw one duration.  Negative values are clamped to zero.
    pub fn sample(&self, rng: &mut SimRng, vars: &[f64]) -> Result<f64, CalcError> {
        let value = match self {
            TimeSource::Distribution(d) => d.sample(rng),
            TimeSource::Expression(e) => e.eval(vars)?,
        };
        Ok(value.max(0.0))
    }

    /// Text shown in error messages.
    pub fn describe(&self) -> String {
        match self {
            TimeSource::Distribution(d) => format!("{d:?}"),
            TimeSource::Expression(e) => e.text().to_owned(),
        }
    }
}

// ── EvalCtx ───────────────────────────────────────────────────────────────────

/// Everything a subsystem needs to evaluate model quantities at the current
/// instant.  Built by `SimulationData` from disjoint field borrows.
pub struct EvalCtx<'a> {
    pub now:         SimTime,
    pub warm_up:     bool,
    pub rng:         &'a mut SimRng,
    pub variables:   &'a [f64],
    pub calc_errors: &'a mut Vec<CalcFailure>,
}

impl EvalCtx<'_> {
    /// Evaluate `expr`, recording a failure and returning `default` on error.
    pub fn eval_or(&mut self, expr: &dyn Expression, origin: &CalcOrigin, default: f64) -> f64 {
        match expr.eval(self.variables) {
            Ok(v) => v,
            Err(error) => {
                self.report(origin, expr.text().to_owned(), error);
                default
            }
        }
    }

    /// Evaluate `expr` over the variables with `extra` appended as one more
    /// variable (e.g. the injected travel distance).
    pub fn eval_with_extra(
        &mut self,
        expr:    &dyn Expression,
        extra:   f64,
        buffer:  &mut Vec<f64>,
        origin:  &CalcOrigin,
        default: f64,
    ) -> f64 {
        buffer.clear();
        buffer.extend_from_slice(self.variables);
        buffer.push(extra);
        match expr.eval(buffer) {
            Ok(v) => v,
            Err(error) => {
                self.report(origin, expr.text().to_owned(), error);
                default
            }
        }
    }

    /// Sample a duration in seconds, recording a failure and returning 0 on error.
    pub fn sample_secs(&mut self, source: &TimeSource, origin: &CalcOrigin) -> f64 {
        match source.sample(self.rng, self.variables) {
            Ok(v) => v,
            Err(error) => {
                self.report(origin, source.describe(), error);
                0.0
            }
        }
    }

    pub fn report(&mut self, origin: &CalcOrigin, expression: String, error: CalcError) {
        self.calc_errors.push(CalcFailure { origin: origin.clone(), expression, error });
    }
}
