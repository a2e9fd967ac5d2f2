use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::Subject;
use crate::errors::AppError;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub exp_hours: i64,
}

impl JwtConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        let exp_hours = std::env::var("JWT_EXP_HOURS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(24))
            .map_err(|_| AppError::configuration("JWT_EXP_HOURS must be a valid integer"))?;

        Ok(Self {
            secret: Arc::new(secret.into_bytes()),
            exp_hours,
        })
    }

    pub fn encode(&self, user_id: Uuid, admin: bool) -> Result<String, AppError> {
        use chrono::{Duration, Utc};

        let now = Utc::now();
        let exp = now + Duration::hours(self.exp_hours);

        let claims = Claims {
            sub: user_id,
            admin,
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| AppError::token(err.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|err| AppError::token(err.to_string()))
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub admin: bool,
    pub exp: usize,
    pub iat: usize,
}

impl Claims {
    pub fn subject(&self) -> Subject {
        if self.admin {
            Subject::admin(self.sub)
        } else {
            Subject::user(self.sub)
        }
    }
}

/// The subject of the current request. Requests without an `Authorization`
/// header are anonymous; a header with a bad token is rejected.
#[derive(Debug, Clone)]
pub struct SessionSubject(pub Subject);

#[async_trait]
impl FromRequestParts<AppState> for SessionSubject {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
            return Ok(SessionSubject(Subject::anonymous()));
        };

        let token = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::unauthorized("malformed Authorization header"))?;

        let claims = state.jwt.decode(token)?;

        Ok(SessionSubject(claims.subject()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JwtConfig {
        JwtConfig {
            secret: Arc::new(b"test-secret".to_vec()),
            exp_hours: 1,
        }
    }

    #[test]
    fn admin_claim_becomes_admin_subject() {
        let jwt = config();
        let user_id = Uuid::new_v4();

        let token = jwt.encode(user_id, true).expect("encode");
        let claims = jwt.decode(&token).expect("decode");
        assert_eq!(claims.subject(), Subject::admin(user_id));

        let token = jwt.encode(user_id, false).expect("encode");
        assert_eq!(jwt.decode(&token).expect("decode").subject(), Subject::user(user_id));
    }

    #[test]
    fn tokens_from_other_secrets_are_rejected() {
        let other = JwtConfig {
            secret: Arc::new(b"other-secret".to_vec()),
            exp_hours: 1,
        };
        let token = other.encode(Uuid::new_v4(), false).expect("encode");
        assert!(matches!(config().decode(&token), Err(AppError::Token(_))));
    }
}
