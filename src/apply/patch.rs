//! Structured patch produced by evaluating one apply expression

use std::collections::HashMap;

use serde_json::Value;

use super::eval::{evaluate, to_text, Scope};
use super::parser::{Expr, ExprKind};
use super::query::edit_query;
use super::Fault;
use crate::models::{HttpMethod, Request, RequestBody};

/// Edit to a named entry: `Some(values)` sets, `None` deletes
pub type Edit = (String, Option<Vec<String>>);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatchResult {
    pub method: Option<String>,
    pub url: Option<String>,
    pub headers: Vec<Edit>,
    pub query: Vec<Edit>,
    pub body: Option<Option<String>>,
    pub vars: Vec<(String, Option<String>)>,
}

impl PatchResult {
    /// Evaluate every field of a top-level object expression against `scope`.
    /// All fields observe the same (pre-patch) state.
    pub fn evaluate(expr: &Expr, scope: &Scope<'_>) -> Result<PatchResult, Fault> {
        let ExprKind::Object(fields) = &expr.kind else {
            return Err(Fault::new("apply expression must be an object", expr.offset));
        };

        let mut patch = PatchResult::default();
        for (field, value_expr) in fields {
            let at = value_expr.offset;
            let value = evaluate(value_expr, scope)?;
            match field.as_str() {
                "method" => patch.method = scalar(&value, "method", at)?.map(|m| m.to_uppercase()),
                "url" => patch.url = scalar(&value, "url", at)?,
                "headers" => patch.headers = edits(&value, "headers", at)?,
                "query" => patch.query = edits(&value, "query", at)?,
                "body" => {
                    patch.body = Some(match value {
                        Value::Null => None,
                        Value::String(text) => Some(text),
                        // Structured bodies are sent as JSON
                        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
                        other => Some(to_text(&other)),
                    })
                }
                "vars" => {
                    patch.vars = edits(&value, "vars", at)?
                        .into_iter()
                        .map(|(name, values)| (name, values.map(|v| v.join(","))))
                        .collect()
                }
                other => {
                    return Err(Fault::new(
                        format!(
                            "unknown field `{}` (expected method, url, headers, query, body or vars)",
                            other
                        ),
                        at,
                    ));
                }
            }
        }
        Ok(patch)
    }

    /// Apply the patch to the request and the shared variable map
    pub fn apply_to(&self, request: &mut Request, shared: &mut HashMap<String, String>) {
        if let Some(method) = &self.method {
            request.method = HttpMethod::parse(method);
        }
        if let Some(url) = &self.url {
            request.url = url.clone();
        }
        if !self.query.is_empty() {
            request.url = edit_query(&request.url, &self.query);
        }
        for (name, edit) in &self.headers {
            match edit {
                Some(values) => request.headers.set(name, values.clone()),
                None => {
                    request.headers.remove(name);
                }
            }
        }
        if let Some(body) = &self.body {
            request.body = match body {
                Some(text) => RequestBody::Text(text.clone()),
                None => RequestBody::Empty,
            };
        }
        for (name, value) in &self.vars {
            match value {
                Some(value) => {
                    request.set_var(name, value.clone());
                    shared.insert(name.clone(), value.clone());
                }
                None => {
                    request.remove_var(name);
                    shared.remove(name);
                }
            }
        }
    }
}

fn scalar(value: &Value, field: &str, at: usize) -> Result<Option<String>, Fault> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(_) | Value::Bool(_) => Ok(Some(to_text(value))),
        _ => Err(Fault::new(format!("`{}` must be a string", field), at)),
    }
}

fn edits(value: &Value, field: &str, at: usize) -> Result<Vec<Edit>, Fault> {
    let Value::Object(map) = value else {
        return Err(Fault::new(format!("`{}` must be an object", field), at));
    };
    map.iter()
        .map(|(name, entry)| -> Result<Edit, Fault> {
            let edit = match entry {
                Value::Null => None,
                Value::Array(items) => Some(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::Array(_) | Value::Object(_) => Err(Fault::new(
                                format!("`{}.{}` values must be scalars", field, name),
                                at,
                            )),
                            other => Ok(to_text(other)),
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                Value::Object(_) => {
                    return Err(Fault::new(
                        format!("`{}.{}` must be a scalar, array or null", field, name),
                        at,
                    ));
                }
                other => Some(vec![to_text(other)]),
            };
            Ok((name.clone(), edit))
        })
        .collect()
}
