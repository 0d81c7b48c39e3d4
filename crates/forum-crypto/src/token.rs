use anyhow::Result;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use forum_types::api::{Claims, Role};

/// Sign a session token for `username`.
pub fn create_token(
    secret: &str,
    subject: Uuid,
    username: &str,
    role: Role,
    session_id: Uuid,
    ttl: chrono::Duration,
) -> Result<String> {
    let claims = Claims {
        sub: subject,
        username: username.to_string(),
        role,
        sid: session_id,
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Verify signature and expiry, returning the claims.
pub fn decode_token(secret: &str, token: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}
