use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use tracing::warn;

/// Shared secret the host presents on every command delivery.
#[derive(Clone)]
pub struct CommandToken(Arc<str>);

impl CommandToken {
    pub fn new(token: &str) -> Self {
        Self(Arc::from(token))
    }

    /// Compares digests so the time taken doesn't depend on where the
    /// presented token first differs.
    fn matches(&self, presented: &str) -> bool {
        Sha256::digest(self.0.as_bytes()) == Sha256::digest(presented.as_bytes())
    }
}

/// Reject command deliveries that don't carry `Authorization: Bearer <token>`.
pub async fn require_command_token(
    State(token): State<CommandToken>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !token.matches(presented) {
        warn!("Rejected command delivery with a bad token");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_comparison() {
        let token = CommandToken::new("s3cret");
        assert!(token.matches("s3cret"));
        assert!(!token.matches("s3cre"));
        assert!(!token.matches(""));
    }
}
