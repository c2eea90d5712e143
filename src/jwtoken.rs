use chrono::{DateTime, Days, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, TokenData,
    Validation,
};
use serde::{Deserialize, Serialize};

use crate::models::{participant::Participant, session::Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Participant id for students, session id for the teacher.
    pub sub: String,
    pub session_id: String,
    pub name: String,
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    pub fn teacher(session: &Session, now: DateTime<Utc>) -> Result<Self, jsonwebtoken::errors::Error> {
        Ok(Claims {
            sub: session.id.clone(),
            session_id: session.id.clone(),
            name: session.teacher_name.clone(),
            role: Role::Teacher,
            exp: expiration(now)?,
        })
    }

    pub fn student(participant: &Participant, now: DateTime<Utc>) -> Result<Self, jsonwebtoken::errors::Error> {
        Ok(Claims {
            sub: participant.id.clone(),
            session_id: participant.session_id.clone(),
            name: participant.participant_name.clone(),
            role: Role::Student,
            exp: expiration(now)?,
        })
    }
}

fn expiration(now: DateTime<Utc>) -> Result<usize, jsonwebtoken::errors::Error> {
    let expiration = now
        .checked_add_days(Days::new(1))
        .ok_or_else(|| jsonwebtoken::errors::Error::from(ErrorKind::ExpiredSignature))?;
    Ok(expiration.timestamp() as usize)
}

/// HS256 keys built once from the configured secret.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenKeys {
    pub fn from_secret(secret: &str) -> Self {
        TokenKeys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn generate_token(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::default(), claims, &self.encoding)
    }

    /// Checks the signature, then `exp` against `now` from the same clock that issued the token.
    pub fn decode_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenData<Claims>, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        if (data.claims.exp as i64) <= now.timestamp() {
            return Err(ErrorKind::ExpiredSignature.into());
        }
        Ok(data)
    }
}
