//! Session tokens issued by the upstream SSO: HS256 JWTs carried in an
//! HTTP-only cookie or a bearer header.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::storage::models::UserProfile;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub avatar: Option<String>,
    /// Visibility group shared with other users
    #[serde(default)]
    pub group: Option<String>,
    /// Expiration timestamp
    pub exp: usize,
}

impl Claims {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.sub.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            avatar: self.avatar.clone(),
            group_id: self.group.clone(),
        }
    }
}

pub fn sign(secret: &str, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn verify(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}
