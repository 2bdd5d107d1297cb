use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use pulse_types::api::Claims;

/// Verifies identity tokens issued by the auth layer (HS256 JWTs).
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    pub fn verify(&self, token: &str) -> Option<Claims> {
        match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!("Rejected identity token: {}", e);
                None
            }
        }
    }

    /// Resolve a connection-time identity claim. Missing, empty and
    /// `"undefined"` claims are anonymous, as are tokens that fail to verify.
    pub fn verify_claim(&self, claim: Option<&str>) -> Option<Claims> {
        match claim.map(str::trim) {
            None | Some("") | Some("undefined") => None,
            Some(token) => self.verify(token),
        }
    }
}
