//! Context expressions used by rule candidates.
//!
//! Expressions see a single variable, `ctx`, a string-to-string map describing the
//! request. Eligibility expressions must produce a bool and decision expressions a
//! string. Compiled programs are cached per slot, keyed by source text.

mod ast;
mod engine;
mod parser;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

pub use engine::{ContextExpressionEngine, Declaration, ValueType};

/// Request attributes exposed to expressions as `ctx`.
pub type EvalContext = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<Value>),
    Map(EvalContext),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::String(_) => ValueKind::String,
            Self::List(_) => ValueKind::List,
            Self::Map(_) => ValueKind::Map,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Int,
    String,
    List,
    Map,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::String => "string",
            Self::List => "list",
            Self::Map => "map",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    #[error("expression is blank")]
    Blank,
    #[error("expression environment could not be built: {0}")]
    Environment(String),
    #[error("expression failed to compile: {0}")]
    Compile(String),
    #[error("expression produces {found}, expected {expected}")]
    OutputType {
        expected: ValueKind,
        found: ValueKind,
    },
    #[error("expression evaluation failed: {0}")]
    Evaluation(String),
}

/// A checked expression ready to run against many contexts.
pub trait Program: Send + Sync {
    fn eval(&self, ctx: &EvalContext) -> Result<Value, ExpressionError>;
}

/// Compiles source text into a [`Program`] producing `output`.
pub trait ExpressionEngine: Send + Sync {
    fn compile(&self, source: &str, output: ValueKind)
        -> Result<Arc<dyn Program>, ExpressionError>;
}

/// The two expression positions of a rule candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionSlot {
    Eligibility,
    Decision,
}

impl ExpressionSlot {
    pub fn output(&self) -> ValueKind {
        match self {
            Self::Eligibility => ValueKind::Bool,
            Self::Decision => ValueKind::String,
        }
    }
}

/// Runs slot expressions through an injected engine with one program cache per slot.
pub struct ExpressionEvaluator {
    engine: Arc<dyn ExpressionEngine>,
    eligibility: DashMap<String, Arc<dyn Program>>,
    decision: DashMap<String, Arc<dyn Program>>,
}

impl ExpressionEvaluator {
    pub fn new(engine: Arc<dyn ExpressionEngine>) -> Self {
        Self {
            engine,
            eligibility: DashMap::new(),
            decision: DashMap::new(),
        }
    }

    pub fn eligible(&self, source: &str, ctx: &EvalContext) -> Result<bool, ExpressionError> {
        match self.evaluate(ExpressionSlot::Eligibility, source, ctx)? {
            Value::Bool(eligible) => Ok(eligible),
            other => Err(ExpressionError::OutputType {
                expected: ValueKind::Bool,
                found: other.kind(),
            }),
        }
    }

    pub fn decide(&self, source: &str, ctx: &EvalContext) -> Result<String, ExpressionError> {
        match self.evaluate(ExpressionSlot::Decision, source, ctx)? {
            Value::String(decision) => Ok(decision),
            other => Err(ExpressionError::OutputType {
                expected: ValueKind::String,
                found: other.kind(),
            }),
        }
    }

    pub fn cached_programs(&self, slot: ExpressionSlot) -> usize {
        self.cache(slot).len()
    }

    fn evaluate(
        &self,
        slot: ExpressionSlot,
        source: &str,
        ctx: &EvalContext,
    ) -> Result<Value, ExpressionError> {
        if source.trim().is_empty() {
            return Err(ExpressionError::Blank);
        }
        self.program(slot, source)?.eval(ctx)
    }

    fn program(
        &self,
        slot: ExpressionSlot,
        source: &str,
    ) -> Result<Arc<dyn Program>, ExpressionError> {
        let cache = self.cache(slot);
        if let Some(program) = cache.get(source) {
            return Ok(Arc::clone(program.value()));
        }

        // Concurrent first use may compile twice; the first insert wins.
        let compiled = self.engine.compile(source, slot.output())?;
        debug!(?slot, "compiled expression program");
        let program = cache
            .entry(source.to_string())
            .or_insert(compiled)
            .value()
            .clone();
        Ok(program)
    }

    fn cache(&self, slot: ExpressionSlot) -> &DashMap<String, Arc<dyn Program>> {
        match slot {
            ExpressionSlot::Eligibility => &self.eligibility,
            ExpressionSlot::Decision => &self.decision,
        }
    }
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new(Arc::new(ContextExpressionEngine::default()))
    }
}
