use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::RelayError;

/// Claims carried by the bearer tokens the REST API issues. The relay reuses
/// them unchanged: HS256 over the shared `JWT_SECRET`, expiry checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthClaims {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    pub email: String,
    #[serde(rename = "userType")]
    pub user_type: String,
    pub exp: usize,
}

#[derive(Clone)]
pub struct JwtVerifier {
    decoding: DecodingKey,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthClaims, RelayError> {
        let data = decode::<AuthClaims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|err| {
                debug!(%err, "token rejected");
                RelayError::AuthInvalid
            })?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, user_id: Uuid, exp: i64) -> String {
        let claims = AuthClaims {
            user_id,
            email: "a@example.com".into(),
            user_type: "homeowner".into(),
            exp: exp as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn accepts_valid_token() {
        let verifier = JwtVerifier::new("sekrit");
        let user_id = Uuid::now_v7();
        let exp = crate::db::now_ms() / 1000 + 3600;
        let claims = verifier.verify(&token("sekrit", user_id, exp)).unwrap();
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.user_type, "homeowner");
    }

    #[test]
    fn rejects_wrong_secret_and_expiry() {
        let verifier = JwtVerifier::new("sekrit");
        let user_id = Uuid::now_v7();
        let future = crate::db::now_ms() / 1000 + 3600;
        let past = crate::db::now_ms() / 1000 - 3600;
        assert!(matches!(
            verifier.verify(&token("other", user_id, future)),
            Err(RelayError::AuthInvalid)
        ));
        assert!(matches!(
            verifier.verify(&token("sekrit", user_id, past)),
            Err(RelayError::AuthInvalid)
        ));
        assert!(matches!(
            verifier.verify("not-a-token"),
            Err(RelayError::AuthInvalid)
        ));
    }
}
