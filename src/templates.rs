//! Template placeholder resolution
//!
//! `{{name}}` looks up a variable (request scope, then shared, then the
//! active environment). `{{= expr }}` evaluates an expression. Anything
//! that cannot be resolved stays in the text verbatim.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

use crate::apply::{eval, parser, Scope};
use crate::models::{AuthType, Request, RequestBody};

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{\{(.*?)\}\}").unwrap())
}

/// Byte ranges of every `{{...}}` placeholder in `text`
pub fn placeholder_spans(text: &str) -> Vec<Range<usize>> {
    placeholder_regex()
        .find_iter(text)
        .map(|m| m.range())
        .collect()
}

/// Resolve placeholders in `text` using `scope`
pub fn resolve(text: &str, scope: &Scope<'_>) -> String {
    placeholder_regex()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let inner = caps[1].trim();
            let resolved = match inner.strip_prefix('=') {
                Some(expr) => parser::parse(expr)
                    .ok()
                    .and_then(|e| eval::evaluate(&e, scope).ok())
                    .filter(|v| !v.is_null())
                    .map(|v| eval::to_text(&v)),
                None => scope
                    .var(inner)
                    .or_else(|| scope.env_var(inner))
                    .map(str::to_string),
            };
            resolved.unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Produce the request that actually goes on the wire: URL, header values,
/// body text and auth credentials resolved.
pub fn resolve_request(request: &Request, scope: &Scope<'_>) -> Request {
    let mut resolved = request.clone();
    resolved.url = resolve(&request.url, scope);
    for header in resolved.headers.iter_mut() {
        header.value = resolve(&header.value, scope);
    }
    if let RequestBody::Text(text) = &request.body {
        resolved.body = RequestBody::Text(resolve(text, scope));
    }
    resolved.auth = match &request.auth {
        AuthType::Bearer(token) => AuthType::Bearer(resolve(token, scope)),
        AuthType::Basic { username, password } => AuthType::Basic {
            username: resolve(username, scope),
            password: resolve(password, scope),
        },
        AuthType::None => AuthType::None,
    };
    if let Some(grpc) = resolved.grpc.as_mut() {
        grpc.message = resolve(&grpc.message, scope);
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Environment, HttpMethod};
    use std::collections::HashMap;

    #[test]
    fn test_resolve_precedence_and_unresolved() {
        let mut request = Request::new(HttpMethod::GET, "");
        request.set_var("id", "42");
        let mut vars = HashMap::new();
        vars.insert("id".to_string(), "shared".to_string());
        vars.insert("token".to_string(), "t0k".to_string());
        let env = Environment::new("dev").with("host", "dev.local");
        let scope = Scope::new(&vars).with_request(&request).with_env(Some(&env));

        assert_eq!(
            resolve("https://{{host}}/u/{{id}}?t={{token}}&m={{missing}}", &scope),
            "https://dev.local/u/42?t=t0k&m={{missing}}"
        );
    }

    #[test]
    fn test_resolve_expression_placeholder() {
        let vars = HashMap::from([("name".to_string(), "ada".to_string())]);
        let scope = Scope::new(&vars);
        assert_eq!(resolve("hi {{= upper(vars.name) }}", &scope), "hi ADA");
        assert_eq!(resolve("{{= broken( }}", &scope), "{{= broken( }}");
    }

    #[test]
    fn test_spans() {
        let spans = placeholder_spans("a{{b}}c{{= d }}");
        assert_eq!(spans, vec![1..6, 7..15]);
    }
}
