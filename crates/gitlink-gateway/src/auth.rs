use jsonwebtoken::{DecodingKey, Validation, decode};

use gitlink_types::api::Claims;

/// Validate an event-socket JWT and return the platform user ID it names.
pub fn verify_token(secret: &str, token: &str) -> Option<String> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;

    Some(token_data.claims.sub).filter(|sub| !sub.is_empty())
}
