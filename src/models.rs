use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// HTTP Method enum
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
    HEAD,
    OPTIONS,
    Other(String),
}

impl HttpMethod {
    /// Parse a method name, normalizing to upper case
    pub fn parse(s: &str) -> HttpMethod {
        match s.trim().to_uppercase().as_str() {
            "GET" => HttpMethod::GET,
            "POST" => HttpMethod::POST,
            "PUT" => HttpMethod::PUT,
            "PATCH" => HttpMethod::PATCH,
            "DELETE" => HttpMethod::DELETE,
            "HEAD" => HttpMethod::HEAD,
            "OPTIONS" => HttpMethod::OPTIONS,
            other => HttpMethod::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
            HttpMethod::Other(name) => name,
        }
    }
}

impl From<String> for HttpMethod {
    fn from(s: String) -> Self {
        HttpMethod::parse(&s)
    }
}

impl From<HttpMethod> for String {
    fn from(method: HttpMethod) -> Self {
        method.as_str().to_string()
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication type
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub enum AuthType {
    #[default]
    None,
    Bearer(String),
    Basic {
        username: String,
        password: String,
    },
}

fn enabled_default() -> bool {
    true
}

/// HTTP Header
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Header {
            key: key.into(),
            value: value.into(),
            enabled: true,
        }
    }

    fn is(&self, name: &str) -> bool {
        self.key.eq_ignore_ascii_case(name)
    }
}

/// Ordered, multi-valued header list with case-insensitive lookups
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<Header>);

impl Headers {
    pub fn new() -> Self {
        Headers(Vec::new())
    }

    /// First enabled value for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|h| h.enabled && h.is(name))
            .map(|h| h.value.as_str())
    }

    /// Every enabled value for `name`, in order
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|h| h.enabled && h.is(name))
            .map(|h| h.value.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|h| h.is(name))
    }

    /// Replace all values of `name`. The new values take the slot of the
    /// first existing entry, or go to the end.
    pub fn set(&mut self, name: &str, values: Vec<String>) {
        let slot = self.0.iter().position(|h| h.is(name));
        self.0.retain(|h| !h.is(name));
        let fresh = values.into_iter().map(|v| Header::new(name, v));
        match slot {
            Some(at) => {
                let tail = self.0.split_off(at);
                self.0.extend(fresh);
                self.0.extend(tail);
            }
            None => self.0.extend(fresh),
        }
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(Header::new(name, value));
    }

    /// Remove every entry for `name`; returns whether anything was removed
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|h| !h.is(name));
        before != self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Header> {
        self.0.iter_mut()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Header> {
        self.0.iter().filter(|h| h.enabled)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Header>> for Headers {
    fn from(headers: Vec<Header>) -> Self {
        Headers(headers)
    }
}

/// Request body: inline text or a reference to a file, never both
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestBody {
    #[default]
    Empty,
    Text(String),
    File(PathBuf),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        match self {
            RequestBody::Empty => true,
            RequestBody::Text(text) => text.is_empty(),
            RequestBody::File(_) => false,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            RequestBody::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn file(&self) -> Option<&Path> {
        match self {
            RequestBody::File(path) => Some(path),
            _ => None,
        }
    }
}

/// Request-scoped variable
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub secret: bool,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Variable {
            name: name.into(),
            value: value.into(),
            secret: false,
        }
    }
}

/// 1-based position of an expression inside the request document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePos {
    pub line: usize,
    pub column: usize,
}

impl Default for SourcePos {
    fn default() -> Self {
        SourcePos { line: 1, column: 1 }
    }
}

impl SourcePos {
    pub fn new(line: usize, column: usize) -> Self {
        SourcePos { line, column }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A patch expression applied to the request before it is sent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApplySpec {
    pub expression: String,
    #[serde(default)]
    pub pos: SourcePos,
}

impl ApplySpec {
    pub fn new(expression: impl Into<String>) -> Self {
        ApplySpec {
            expression: expression.into(),
            pos: SourcePos::default(),
        }
    }

    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.pos = SourcePos::new(line, column);
        self
    }
}

/// A named assertion evaluated against the response
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestSpec {
    pub name: String,
    pub expression: String,
    #[serde(default)]
    pub pos: SourcePos,
}

/// gRPC call target
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GrpcTarget {
    pub service: String,
    pub method: String,
    #[serde(default)]
    pub message: String,
}

/// A single HTTP or gRPC request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Request {
    pub name: String,
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: RequestBody,
    pub auth: AuthType,
    pub vars: Vec<Variable>,
    pub apply: Vec<ApplySpec>,
    pub tests: Vec<TestSpec>,
    pub grpc: Option<GrpcTarget>,
}

impl Default for Request {
    fn default() -> Self {
        use crate::constants::DEFAULT_HTTP_URL;
        Request {
            name: String::from("New Request"),
            method: HttpMethod::GET,
            url: String::from(DEFAULT_HTTP_URL),
            headers: Headers::from(vec![Header::new("Accept", "application/json")]),
            body: RequestBody::Empty,
            auth: AuthType::None,
            vars: Vec::new(),
            apply: Vec::new(),
            tests: Vec::new(),
            grpc: None,
        }
    }
}

impl Request {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Request {
            method,
            url: url.into(),
            headers: Headers::new(),
            ..Request::default()
        }
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value.as_str())
    }

    /// Insert or update a request-scoped variable
    pub fn set_var(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.vars.iter_mut().find(|v| v.name == name) {
            Some(existing) => existing.value = value,
            None => self.vars.push(Variable::new(name, value)),
        }
    }

    pub fn remove_var(&mut self, name: &str) {
        self.vars.retain(|v| v.name != name);
    }

    pub fn is_grpc(&self) -> bool {
        self.grpc.is_some()
    }
}

/// A collection of requests
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    pub requests: Vec<Request>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Collection {
            name: name.into(),
            requests: Vec::new(),
        }
    }

    pub fn find(&self, name: &str) -> Option<&Request> {
        self.requests.iter().find(|r| r.name == name)
    }
}

/// Environment variables
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    pub variables: HashMap<String, String>,
}

impl Environment {
    pub fn new(name: impl Into<String>) -> Self {
        Environment {
            name: name.into(),
            variables: HashMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.variables.get(key)
    }
}

/// Completed HTTP exchange
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// Completed gRPC call
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GrpcResponse {
    pub code: i32,
    pub status_message: String,
    pub metadata: Vec<(String, String)>,
    pub message: String,
}

/// Response payload: HTTP or gRPC, never both
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ResponsePayload {
    Http(HttpResponse),
    Grpc(GrpcResponse),
}

impl ResponsePayload {
    /// Short status text, e.g. `200 OK` or `gRPC 5 NOT_FOUND`
    pub fn status_text(&self) -> String {
        match self {
            ResponsePayload::Http(resp) if resp.reason.is_empty() => resp.status.to_string(),
            ResponsePayload::Http(resp) => format!("{} {}", resp.status, resp.reason),
            ResponsePayload::Grpc(resp) => format!("gRPC {} {}", resp.code, resp.status_message),
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            ResponsePayload::Http(resp) => resp.status < 400,
            ResponsePayload::Grpc(resp) => resp.code == 0,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            ResponsePayload::Http(resp) => &resp.body,
            ResponsePayload::Grpc(resp) => &resp.message,
        }
    }

    pub fn headers(&self) -> &[(String, String)] {
        match self {
            ResponsePayload::Http(resp) => &resp.headers,
            ResponsePayload::Grpc(resp) => &resp.metadata,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            ResponsePayload::Http(resp) => Some(resp.status),
            ResponsePayload::Grpc(_) => None,
        }
    }
}

/// One phase of a network trace
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelinePhase {
    pub name: String,
    pub offset_ms: u64,
    pub duration_ms: u64,
}

/// Network timeline recorded by the transport
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub phases: Vec<TimelinePhase>,
}

impl Timeline {
    pub fn push(&mut self, name: impl Into<String>, offset_ms: u64, duration_ms: u64) {
        self.phases.push(TimelinePhase {
            name: name.into(),
            offset_ms,
            duration_ms,
        });
    }

    pub fn total_ms(&self) -> u64 {
        self.phases
            .iter()
            .map(|p| p.offset_ms + p.duration_ms)
            .max()
            .unwrap_or(0)
    }
}

/// What the transport hands back for one send
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransportResponse {
    pub payload: ResponsePayload,
    pub timeline: Option<Timeline>,
    pub duration_ms: u64,
}

/// Result of one assertion
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub message: Option<String>,
}

/// How one execution ended. Cancellation is its own outcome, not an error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    Completed(TransportResponse),
    Failed(String),
    Canceled,
}

impl Outcome {
    pub fn response(&self) -> Option<&TransportResponse> {
        match self {
            Outcome::Completed(resp) => Some(resp),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        match self {
            Outcome::Completed(resp) => !resp.payload.is_success(),
            Outcome::Failed(_) => true,
            Outcome::Canceled => false,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.response().map(|r| r.duration_ms).unwrap_or(0)
    }
}
