use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::error::{ ChatError, ChatResult };
use crate::models::user::UserId;
use crate::store::{ LocalStore, TOKEN_KEY };

#[derive(Deserialize)]
struct Claims {
    id: UserId,
}

/// The signed-in user's credential and the id decoded from it.
///
/// The token is only decoded, never verified: the server does that on every
/// request. Holding a `Session` is what lets a conversation view mount.
#[derive(Clone, Debug)]
pub struct Session {
    token: String,
    user_id: UserId,
}

impl Session {
    pub fn from_token(token: &str) -> ChatResult<Self> {
        let token = token.trim();
        let payload = token
            .split('.')
            .nth(1)
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| ChatError::Credential("token is not a JWT".into()))?;

        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).map_err(|e|
            ChatError::Credential(format!("payload is not base64url: {}", e))
        )?;
        let claims: Claims = serde_json
            ::from_slice(&bytes)
            .map_err(|e| ChatError::Credential(format!("payload has no usable id: {}", e)))?;

        Ok(Self {
            token: token.to_string(),
            user_id: claims.id,
        })
    }

    pub fn load(store: &dyn LocalStore) -> ChatResult<Self> {
        let token = store
            .get(TOKEN_KEY)
            .ok_or_else(|| ChatError::Credential("no stored token".into()))?;
        Self::from_token(&token)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }
}

#[cfg(test)]
pub(crate) fn test_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}
