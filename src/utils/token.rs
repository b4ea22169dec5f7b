use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

const OAUTH_STATE_PURPOSE: &str = "calendar_connect";
const OAUTH_STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Serialize, Deserialize)]
struct OAuthState {
    sub: Uuid,
    purpose: String,
    exp: usize,
}

/// Short-lived signed `state` for the calendar authorization round trip;
/// binds the callback to the user who started it.
pub fn issue_oauth_state(user_id: Uuid, secret: &str) -> Result<String> {
    let claims = OAuthState {
        sub: user_id,
        purpose: OAUTH_STATE_PURPOSE.to_string(),
        exp: (Utc::now() + Duration::minutes(OAUTH_STATE_TTL_MINUTES)).timestamp() as usize,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| Error::Internal(format!("failed to sign oauth state: {}", e)))
}

pub fn verify_oauth_state(state: &str, secret: &str) -> Result<Uuid> {
    let data = decode::<OAuthState>(
        state,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|_| Error::BadRequest("Invalid or expired OAuth state".into()))?;
    if data.claims.purpose != OAUTH_STATE_PURPOSE {
        return Err(Error::BadRequest("Invalid OAuth state".into()));
    }
    Ok(data.claims.sub)
}
