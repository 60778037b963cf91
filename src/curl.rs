use crate::models::{AuthType, Request, RequestBody};

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "'\\''"))
}

/// Format request as cURL command
///
/// Secret request variables never appear here because the request is
/// rendered as resolved text, not with its variable table.
pub fn to_curl(request: &Request) -> String {
    if let Some(grpc) = &request.grpc {
        let mut parts = vec!["grpcurl".to_string()];
        for header in request.headers.enabled() {
            parts.push(format!("-H {}", quote(&format!("{}: {}", header.key, header.value))));
        }
        if !grpc.message.is_empty() {
            parts.push(format!("-d {}", quote(&grpc.message)));
        }
        parts.push(quote(&request.url));
        parts.push(format!("{}/{}", grpc.service, grpc.method));
        return parts.join(" \\\n  ");
    }

    let mut parts = vec!["curl".to_string()];

    // Method
    if request.method.as_str() != "GET" {
        parts.push(format!("-X {}", request.method.as_str()));
    }

    // URL
    parts.push(quote(&request.url));

    // Headers
    for header in request.headers.enabled() {
        parts.push(format!("-H {}", quote(&format!("{}: {}", header.key, header.value))));
    }

    // Auth
    match &request.auth {
        AuthType::Bearer(token) => {
            parts.push(format!("-H {}", quote(&format!("Authorization: Bearer {}", token))));
        }
        AuthType::Basic { username, password } => {
            parts.push(format!("-u {}", quote(&format!("{}:{}", username, password))));
        }
        AuthType::None => {}
    }

    // Body
    match &request.body {
        RequestBody::Text(text) if !text.is_empty() => parts.push(format!("-d {}", quote(text))),
        RequestBody::File(path) => parts.push(format!("--data-binary {}", quote(&format!("@{}", path.display())))),
        _ => {}
    }

    parts.join(" \\\n  ")
}
