//! Apply-spec engine: patch expressions evaluated against a request before
//! it is sent.
//!
//! Specs run strictly in list order. Each one is evaluated against the
//! request as left by the previous spec, so a later spec can read a header
//! an earlier one set. When a spec fails, edits from the specs before it
//! stay applied; nothing is rolled back.

pub mod eval;
pub mod lexer;
pub mod parser;
pub mod patch;
pub mod query;

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use crate::models::{ApplySpec, Environment, Request, SourcePos};

pub use eval::Scope;
pub use patch::PatchResult;

/// Internal error with a byte offset into the expression text
#[derive(Clone, Debug, PartialEq)]
pub struct Fault {
    pub message: String,
    pub offset: usize,
}

impl Fault {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Fault {
            message: message.into(),
            offset,
        }
    }

    /// Translate the offset into a document position, given where the
    /// expression text starts
    fn locate(self, text: &str, base: SourcePos) -> ExprError {
        let before = &text[..self.offset.min(text.len())];
        let newlines = before.matches('\n').count();
        let column = match before.rfind('\n') {
            Some(nl) => before[nl + 1..].chars().count() + 1,
            None => base.column + before.chars().count(),
        };
        ExprError {
            message: self.message,
            pos: SourcePos::new(base.line + newlines, column),
        }
    }
}

/// Expression error positioned in the request document
#[derive(Clone, Debug, PartialEq, Error)]
#[error("{message} at line {}, column {}", .pos.line, .pos.column)]
pub struct ExprError {
    pub message: String,
    pub pos: SourcePos,
}

#[derive(Clone, Debug, PartialEq, Error)]
#[error("apply #{}: {source}", .index + 1)]
pub struct ApplyError {
    /// Zero-based index of the failing spec
    pub index: usize,
    pub source: ExprError,
}

impl ApplyError {
    pub fn pos(&self) -> SourcePos {
        self.source.pos
    }
}

/// Parse and evaluate a standalone expression (assertions, `when` conditions)
pub fn evaluate_expression(text: &str, pos: SourcePos, scope: &Scope<'_>) -> Result<Value, ExprError> {
    parser::parse(text)
        .and_then(|expr| eval::evaluate(&expr, scope))
        .map_err(|fault| fault.locate(text, pos))
}

/// Parse and evaluate one spec against the current request state
pub fn evaluate_spec(
    spec: &ApplySpec,
    request: &Request,
    shared: &HashMap<String, String>,
    env: Option<&Environment>,
) -> Result<PatchResult, ExprError> {
    let scope = Scope::new(shared).with_request(request).with_env(env);
    parser::parse(&spec.expression)
        .and_then(|expr| PatchResult::evaluate(&expr, &scope))
        .map_err(|fault| fault.locate(&spec.expression, spec.pos))
}

/// Apply `specs` to `request` in order, merging variable edits into `shared`
pub fn apply(
    request: &mut Request,
    specs: &[ApplySpec],
    shared: &mut HashMap<String, String>,
    env: Option<&Environment>,
) -> Result<(), ApplyError> {
    for (index, spec) in specs.iter().enumerate() {
        let patch = evaluate_spec(spec, request, shared, env)
            .map_err(|source| ApplyError { index, source })?;
        tracing::debug!(index, line = spec.pos.line, "applying patch");
        patch.apply_to(request, shared);
    }
    Ok(())
}

/// Apply the request's own spec list
pub fn apply_request_specs(
    request: &mut Request,
    shared: &mut HashMap<String, String>,
    env: Option<&Environment>,
) -> Result<(), ApplyError> {
    let specs = request.apply.clone();
    apply(request, &specs, shared, env)
}
