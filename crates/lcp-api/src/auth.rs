use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Basic},
};
use tracing::{debug, warn};

use crate::ApiError;

/// Administrative credentials: one `user:argon2-phc-hash` per line.
#[derive(Debug, Default)]
pub struct PasswordFile {
    users: HashMap<String, String>,
}

impl PasswordFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).with_context(|| format!("reading password file {}", path.display()))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut users = HashMap::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (user, hash) = line
                .split_once(':')
                .with_context(|| format!("line {}: expected user:hash", n + 1))?;
            PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("line {}: {}", n + 1, e))?;
            users.insert(user.to_string(), hash.to_string());
        }
        Ok(Self { users })
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn verify(&self, user: &str, password: &str) -> bool {
        let Some(stored) = self.users.get(user) else {
            return false;
        };
        let Ok(hash) = PasswordHash::new(stored) else {
            return false;
        };
        Argon2::default().verify_password(password.as_bytes(), &hash).is_ok()
    }
}

/// Reject requests without valid HTTP Basic credentials.
pub async fn require_basic(
    State(passwords): State<Arc<PasswordFile>>,
    credentials: Option<TypedHeader<Authorization<Basic>>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(TypedHeader(Authorization(basic))) = credentials else {
        debug!(path = %req.uri().path(), "Missing credentials");
        return Err(ApiError::unauthorized());
    };

    if !passwords.verify(basic.username(), basic.password()) {
        warn!(user = basic.username(), path = %req.uri().path(), "Rejected credentials");
        return Err(ApiError::unauthorized());
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use argon2::PasswordHasher;
    use argon2::password_hash::{SaltString, rand_core::OsRng};

    pub(crate) fn password_file(user: &str, password: &str) -> PasswordFile {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default().hash_password(password.as_bytes(), &salt).unwrap();
        PasswordFile::parse(&format!("# admins\n{}:{}\n", user, hash)).unwrap()
    }

    #[test]
    fn verifies_known_users_only() {
        let file = password_file("admin", "hunter22");
        assert!(file.verify("admin", "hunter22"));
        assert!(!file.verify("admin", "hunter2"));
        assert!(!file.verify("root", "hunter22"));
    }

    #[test]
    fn malformed_lines_are_errors() {
        assert!(PasswordFile::parse("admin").is_err());
        assert!(PasswordFile::parse("admin:plaintext").is_err());
        assert!(PasswordFile::parse("\n\n").unwrap().is_empty());
    }
}
