//! Opaque access tokens shared with the identity service.
//!
//! The identity service writes `lounge:at:{token}` into the shared key-value
//! store at sign-in; this service only resolves tokens into identities.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::kv::KeyValueStore;
use crate::error::ApiError;

/// Default lifetime of an access token (1 hour).
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Identity stored alongside an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenData {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Generate an opaque random token with the given prefix.
fn generate_opaque_token(prefix: &str, bytes: usize) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use rand::Rng;
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(&mut buf[..]);
    format!("{}_{}", prefix, URL_SAFE_NO_PAD.encode(&buf))
}

/// Mint a token in the identity service's format.
///
/// Production tokens are issued by the identity service; this service never
/// calls this itself. It exists so integration tests and local tooling can
/// sign a user in against the same store.
pub fn generate_access_token() -> String {
    generate_opaque_token(lounge_common::id::prefix::ACCESS_TOKEN, 32)
}

fn token_key(token: &str) -> String {
    format!("lounge:at:{token}")
}

/// Write the record the identity service writes at sign-in. Like
/// [`generate_access_token`], only tests and local tooling call this.
pub async fn store_access_token(
    kv: &dyn KeyValueStore,
    token: &str,
    data: &AccessTokenData,
    ttl: Duration,
) -> Result<(), ApiError> {
    let value = serde_json::to_string(data)?;
    kv.set_ex(&token_key(token), &value, ttl).await
}

pub async fn lookup_access_token(
    kv: &dyn KeyValueStore,
    token: &str,
) -> Result<Option<AccessTokenData>, ApiError> {
    match kv.get(&token_key(token)).await? {
        Some(v) => {
            let data: AccessTokenData =
                serde_json::from_str(&v).map_err(|_| ApiError::internal("corrupt token data"))?;
            Ok(Some(data))
        }
        None => Ok(None),
    }
}
