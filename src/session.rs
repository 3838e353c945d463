use axum::http::HeaderMap;

pub const BEARER_PREFIX: &str = "Bearer ";

/// Opaque access token presented in the `Authorization` header.
#[derive(Clone, Debug)]
pub struct BearerToken {
    pub token: String,
}

impl BearerToken {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers
            .get(axum::http::header::AUTHORIZATION)?
            .to_str()
            .ok()?
            .trim();

        let token = value.strip_prefix(BEARER_PREFIX)?.trim();
        if token.is_empty() {
            return None;
        }
        Some(Self {
            token: token.to_string(),
        })
    }
}
