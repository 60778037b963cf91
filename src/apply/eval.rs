//! Expression evaluation against the in-progress request, variables,
//! environment and (for assertions) the response

use std::collections::HashMap;

use base64::Engine;
use serde_json::{Map, Value};

use super::parser::{number, BinaryOp, Expr, ExprKind};
use super::query::query_values;
use super::Fault;
use crate::models::{Environment, Request, TransportResponse};

/// Everything an expression may read
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub request: Option<&'a Request>,
    pub vars: &'a HashMap<String, String>,
    pub env: Option<&'a Environment>,
    pub response: Option<&'a TransportResponse>,
}

impl<'a> Scope<'a> {
    pub fn new(vars: &'a HashMap<String, String>) -> Self {
        Scope {
            request: None,
            vars,
            env: None,
            response: None,
        }
    }

    pub fn with_request(mut self, request: &'a Request) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_env(mut self, env: Option<&'a Environment>) -> Self {
        self.env = env;
        self
    }

    pub fn with_response(mut self, response: &'a TransportResponse) -> Self {
        self.response = Some(response);
        self
    }

    /// Variable lookup: request-scoped first, then shared
    pub fn var(&self, name: &str) -> Option<&'a str> {
        self.request
            .and_then(|r| r.var(name))
            .or_else(|| self.vars.get(name).map(String::as_str))
    }

    pub fn env_var(&self, name: &str) -> Option<&'a str> {
        self.env.and_then(|e| e.get(name)).map(String::as_str)
    }

    fn header(&self, name: &str) -> Option<&'a str> {
        self.request.and_then(|r| r.headers.get(name))
    }

    fn root(&self, name: &str) -> Option<Value> {
        match name {
            "request" => Some(self.request.map(request_value).unwrap_or(Value::Null)),
            "response" => Some(self.response.map(response_value).unwrap_or(Value::Null)),
            "vars" => {
                let mut merged: Map<String, Value> = self
                    .vars
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                if let Some(request) = self.request {
                    for var in &request.vars {
                        merged.insert(var.name.clone(), Value::String(var.value.clone()));
                    }
                }
                Some(Value::Object(merged))
            }
            "env" => Some(Value::Object(
                self.env
                    .map(|e| {
                        e.variables
                            .iter()
                            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                            .collect()
                    })
                    .unwrap_or_default(),
            )),
            "environment" => Some(
                self.env
                    .map(|e| Value::String(e.name.clone()))
                    .unwrap_or(Value::Null),
            ),
            _ => None,
        }
    }
}

fn request_value(request: &Request) -> Value {
    let mut headers = Map::new();
    for header in request.headers.enabled() {
        let values = request.headers.get_all(&header.key);
        let value = if values.len() == 1 {
            Value::String(values[0].to_string())
        } else {
            Value::Array(values.into_iter().map(|v| Value::String(v.to_string())).collect())
        };
        headers.insert(header.key.clone(), value);
    }

    let mut query = Map::new();
    for (key, value) in query_values(&request.url) {
        match query.get_mut(&key) {
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                query.insert(key, Value::String(value));
            }
        }
    }

    serde_json::json!({
        "name": request.name,
        "method": request.method.as_str(),
        "url": request.url,
        "body": request.body.text().unwrap_or_default(),
        "headers": headers,
        "query": query,
    })
}

fn response_value(response: &TransportResponse) -> Value {
    let headers: Map<String, Value> = response
        .payload
        .headers()
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    let body = response.payload.body();
    let status = match response.payload.http_status() {
        Some(status) => Value::from(status),
        None => Value::Null,
    };
    serde_json::json!({
        "status": status,
        "ok": response.payload.is_success(),
        "headers": headers,
        "body": body,
        "json": serde_json::from_str::<Value>(body).unwrap_or(Value::Null),
        "duration_ms": response.duration_ms,
    })
}

pub fn evaluate(expr: &Expr, scope: &Scope<'_>) -> Result<Value, Fault> {
    match &expr.kind {
        ExprKind::Literal(value) => Ok(value.clone()),
        ExprKind::Ident(name) => scope
            .root(name)
            .ok_or_else(|| Fault::new(format!("unknown identifier `{}`", name), expr.offset)),
        ExprKind::Member(target, field) => {
            let target = evaluate(target, scope)?;
            Ok(lookup(&target, field))
        }
        ExprKind::Index(target, index) => {
            let target = evaluate(target, scope)?;
            let index = evaluate(index, scope)?;
            match (&target, &index) {
                (Value::Array(items), Value::Number(n)) => Ok(n
                    .as_u64()
                    .and_then(|i| items.get(i as usize))
                    .cloned()
                    .unwrap_or(Value::Null)),
                (_, Value::String(key)) => Ok(lookup(&target, key)),
                (Value::Null, _) => Ok(Value::Null),
                _ => Err(Fault::new("index must be a string or number", index_offset(expr))),
            }
        }
        ExprKind::Call(name, args) => {
            let values = args
                .iter()
                .map(|arg| evaluate(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, &values, scope).map_err(|message| Fault::new(message, expr.offset))
        }
        ExprKind::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|item| evaluate(item, scope))
                .collect::<Result<_, _>>()?,
        )),
        ExprKind::Object(fields) => {
            let mut map = Map::new();
            for (key, value) in fields {
                map.insert(key.clone(), evaluate(value, scope)?);
            }
            Ok(Value::Object(map))
        }
        ExprKind::Not(inner) => Ok(Value::Bool(!truthy(&evaluate(inner, scope)?))),
        ExprKind::Binary(op, left, right) => {
            let left = evaluate(left, scope)?;
            match op {
                BinaryOp::And if !truthy(&left) => return Ok(Value::Bool(false)),
                BinaryOp::Or if truthy(&left) => return Ok(Value::Bool(true)),
                BinaryOp::Coalesce if !left.is_null() => return Ok(left),
                _ => {}
            }
            let right = evaluate(right, scope)?;
            Ok(match op {
                BinaryOp::Add => add(&left, &right),
                BinaryOp::Eq => Value::Bool(values_equal(&left, &right)),
                BinaryOp::NotEq => Value::Bool(!values_equal(&left, &right)),
                BinaryOp::And | BinaryOp::Or => Value::Bool(truthy(&right)),
                BinaryOp::Coalesce => right,
            })
        }
    }
}

fn index_offset(expr: &Expr) -> usize {
    match &expr.kind {
        ExprKind::Index(_, index) => index.offset,
        _ => expr.offset,
    }
}

/// Object field lookup; falls back to a case-insensitive match so header
/// names resolve regardless of spelling
fn lookup(target: &Value, key: &str) -> Value {
    match target {
        Value::Object(map) => map
            .get(key)
            .or_else(|| {
                map.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .cloned()
            .unwrap_or(Value::Null),
        Value::Array(items) if key == "length" => Value::from(items.len()),
        _ => Value::Null,
    }
}

fn call(name: &str, args: &[Value], scope: &Scope<'_>) -> Result<Value, String> {
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(format!("{}() takes {} argument(s), got {}", name, n, args.len()))
        }
    };
    let opt_str = |v: Option<&str>| v.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null);

    match name {
        "header" => {
            arity(1)?;
            Ok(opt_str(scope.header(&to_text(&args[0]))))
        }
        "query" => {
            arity(1)?;
            let key = to_text(&args[0]);
            let url = scope.request.map(|r| r.url.as_str()).unwrap_or_default();
            Ok(opt_str(
                query_values(url)
                    .into_iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| v)
                    .as_deref(),
            ))
        }
        "var" => {
            arity(1)?;
            Ok(opt_str(scope.var(&to_text(&args[0]))))
        }
        "upper" => {
            arity(1)?;
            Ok(Value::String(to_text(&args[0]).to_uppercase()))
        }
        "lower" => {
            arity(1)?;
            Ok(Value::String(to_text(&args[0]).to_lowercase()))
        }
        "trim" => {
            arity(1)?;
            Ok(Value::String(to_text(&args[0]).trim().to_string()))
        }
        "base64" => {
            arity(1)?;
            Ok(Value::String(
                base64::engine::general_purpose::STANDARD.encode(to_text(&args[0])),
            ))
        }
        "len" => {
            arity(1)?;
            let len = match &args[0] {
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                Value::Null => 0,
                other => to_text(other).chars().count(),
            };
            Ok(Value::from(len))
        }
        "default" => {
            arity(2)?;
            let empty = match &args[0] {
                Value::Null => true,
                Value::String(s) => s.is_empty(),
                _ => false,
            };
            Ok(if empty { args[1].clone() } else { args[0].clone() })
        }
        "concat" => Ok(Value::String(args.iter().map(to_text).collect())),
        "contains" => {
            arity(2)?;
            Ok(Value::Bool(match &args[0] {
                Value::Array(items) => items.iter().any(|i| values_equal(i, &args[1])),
                other => to_text(other).contains(&to_text(&args[1])),
            }))
        }
        _ => Err(format!("unknown function `{}`", name)),
    }
}

/// String rendering used for concatenation and header/query values
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn add(left: &Value, right: &Value) -> Value {
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        return number(a + b);
    }
    Value::String(format!("{}{}", to_text(left), to_text(right)))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.trim().parse::<f64>().ok() == n.as_f64()
        }
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::parser::parse;
    use crate::models::{HttpMethod, HttpResponse, ResponsePayload};

    fn eval_with(src: &str, scope: &Scope<'_>) -> Value {
        evaluate(&parse(src).unwrap(), scope).unwrap()
    }

    #[test]
    fn test_request_references() {
        let mut request = Request::new(HttpMethod::GET, "https://x/?a=1&a=2");
        request.headers.append("X-Token", "abc");
        let vars = HashMap::new();
        let scope = Scope::new(&vars).with_request(&request);
        assert_eq!(eval_with(r#"request.headers["x-token"]"#, &scope), "abc");
        assert_eq!(eval_with("header('X-TOKEN') + '-sig'", &scope), "abc-sig");
        assert_eq!(eval_with("request.query.a", &scope), serde_json::json!(["1", "2"]));
        assert_eq!(eval_with("query('a')", &scope), "1");
        assert_eq!(eval_with("request.method", &scope), "GET");
    }

    #[test]
    fn test_vars_prefer_request_scope() {
        let mut request = Request::default();
        request.set_var("id", "local");
        let mut vars = HashMap::new();
        vars.insert("id".to_string(), "shared".to_string());
        vars.insert("other".to_string(), "o".to_string());
        let scope = Scope::new(&vars).with_request(&request);
        assert_eq!(eval_with("vars.id", &scope), "local");
        assert_eq!(eval_with("var('other')", &scope), "o");
        assert_eq!(eval_with("vars.missing ?? 'fallback'", &scope), "fallback");
    }

    #[test]
    fn test_env_context() {
        let env = Environment::new("stage").with("host", "stage.example");
        let vars = HashMap::new();
        let scope = Scope::new(&vars).with_env(Some(&env));
        assert_eq!(eval_with("env.host", &scope), "stage.example");
        assert_eq!(eval_with("environment == 'stage'", &scope), true);
    }

    #[test]
    fn test_response_status_comparison() {
        let response = TransportResponse {
            payload: ResponsePayload::Http(HttpResponse {
                status: 201,
                reason: "Created".into(),
                headers: vec![("Content-Type".into(), "application/json".into())],
                body: r#"{"id": 7}"#.into(),
            }),
            timeline: None,
            duration_ms: 12,
        };
        let vars = HashMap::new();
        let scope = Scope::new(&vars).with_response(&response);
        assert_eq!(eval_with("response.status == 201", &scope), true);
        assert_eq!(eval_with("response.json.id == 7", &scope), true);
        assert_eq!(eval_with("response.headers['content-type']", &scope), "application/json");
    }

    #[test]
    fn test_unknown_function_reports_offset() {
        let vars = HashMap::new();
        let scope = Scope::new(&vars);
        let err = evaluate(&parse("'a' + nope(1)").unwrap(), &scope).unwrap_err();
        assert_eq!(err.offset, 6);
        assert!(err.message.contains("nope"));
    }

    #[test]
    fn test_number_addition_and_concat() {
        let vars = HashMap::new();
        let scope = Scope::new(&vars);
        assert_eq!(eval_with("1 + 2", &scope), 3);
        assert_eq!(eval_with("'v' + 2", &scope), "v2");
        assert_eq!(eval_with("base64('a:b')", &scope), "YTpi");
    }
}
