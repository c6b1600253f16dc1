//! User registration, login, and session tokens.
//!
//! Users live in SQLite with salted SHA-256 password hashes. Session tokens
//! are HMAC-SHA256-signed expiring claims in the form
//! `base64(claims_json).hex(signature)`; the secret and TTL come from
//! `[auth]` in the config. Nothing here touches the generation path.

use anyhow::{anyhow, bail, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use crate::config::AuthConfig;
use crate::models::{User, UserRecord};

type HmacSha256 = Hmac<Sha256>;

/// Signed claims carried inside a session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id.
    pub sub: String,
    pub username: String,
    /// Expiry as a unix timestamp.
    pub exp: i64,
}

/// A freshly issued session token.
#[derive(Debug, Serialize)]
pub struct SessionToken {
    pub token: String,
    pub expires_at: i64,
}

/// Create a user. Fails with "username already taken" on conflict.
pub async fn register(pool: &SqlitePool, username: &str, password: &str) -> Result<UserRecord> {
    let username = username.trim();
    if username.is_empty() {
        bail!("username must not be empty");
    }
    if password.len() < 8 {
        bail!("password must be at least 8 characters");
    }

    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        username: username.to_string(),
        password_hash: hash_password(password, &new_salt()),
        created_at: Utc::now().timestamp(),
    };

    let inserted = sqlx::query(
        "INSERT INTO users (id, username, password_hash, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(user.created_at)
    .execute(pool)
    .await;

    match inserted {
        Ok(_) => Ok(user.into()),
        Err(e) if e.to_string().contains("UNIQUE") => bail!("username already taken"),
        Err(e) => Err(e.into()),
    }
}

/// Verify credentials and issue a session token.
pub async fn login(
    pool: &SqlitePool,
    config: &AuthConfig,
    username: &str,
    password: &str,
) -> Result<SessionToken> {
    let user = find_user(pool, username.trim())
        .await?
        .ok_or_else(|| anyhow!("invalid credentials"))?;

    if !verify_password(password, &user.password_hash) {
        bail!("invalid credentials");
    }

    issue_token(config, &user)
}

/// Resolve a bearer token back to its user.
pub async fn authenticate(
    pool: &SqlitePool,
    config: &AuthConfig,
    token: &str,
) -> Result<UserRecord> {
    let claims = verify_token(config, token)?;
    let user = find_user(pool, &claims.username)
        .await?
        .ok_or_else(|| anyhow!("invalid token"))?;
    Ok(user.into())
}

async fn find_user(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        "SELECT id, username, password_hash, created_at FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| User {
        id: row.get("id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
    }))
}

// ─── Passwords ───────────────────────────────────────────────────────────────

fn new_salt() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Stored form is `salt$hex(sha256(salt:password))`.
fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{}${}", salt, hex::encode(hasher.finalize()))
}

fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, _)) => hash_password(password, salt) == stored,
        None => false,
    }
}

// ─── Tokens ──────────────────────────────────────────────────────────────────

pub fn issue_token(config: &AuthConfig, user: &User) -> Result<SessionToken> {
    let expires_at = Utc::now().timestamp() + config.token_ttl_hours * 3600;
    let claims = TokenClaims {
        sub: user.id.clone(),
        username: user.username.clone(),
        exp: expires_at,
    };

    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
    let signature = hex::encode(hmac_sha256(config.secret.as_bytes(), payload.as_bytes()));

    Ok(SessionToken {
        token: format!("{}.{}", payload, signature),
        expires_at,
    })
}

pub fn verify_token(config: &AuthConfig, token: &str) -> Result<TokenClaims> {
    let (payload, signature) = token.split_once('.').ok_or_else(|| anyhow!("invalid token"))?;

    let expected = hex::decode(signature).map_err(|_| anyhow!("invalid token"))?;
    let mut mac = HmacSha256::new_from_slice(config.secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| anyhow!("invalid token"))?;

    let claims: TokenClaims = serde_json::from_slice(
        &URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| anyhow!("invalid token"))?,
    )
    .map_err(|_| anyhow!("invalid token"))?;

    if claims.exp < Utc::now().timestamp() {
        bail!("token expired");
    }

    Ok(claims)
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;

    async fn test_pool() -> SqlitePool {
        // One connection: each in-memory SQLite connection is its own database.
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        pool
    }

    fn test_config() -> AuthConfig {
        AuthConfig {
            secret: "test-secret".to_string(),
            token_ttl_hours: 1,
        }
    }

    #[tokio::test]
    async fn register_login_roundtrip() {
        let pool = test_pool().await;
        let config = test_config();

        let record = register(&pool, "alice", "correct horse").await.unwrap();
        assert_eq!(record.username, "alice");

        let session = login(&pool, &config, "alice", "correct horse").await.unwrap();
        let profile = authenticate(&pool, &config, &session.token).await.unwrap();
        assert_eq!(profile.username, "alice");
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let pool = test_pool().await;
        let config = test_config();

        register(&pool, "bob", "password123").await.unwrap();
        let err = login(&pool, &config, "bob", "password456").await.unwrap_err();
        assert!(err.to_string().contains("invalid credentials"));
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let pool = test_pool().await;

        register(&pool, "carol", "password123").await.unwrap();
        let err = register(&pool, "carol", "password456").await.unwrap_err();
        assert!(err.to_string().contains("already taken"));
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let pool = test_pool().await;
        assert!(register(&pool, "dave", "short").await.is_err());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let config = test_config();
        let user = User {
            id: "u1".to_string(),
            username: "eve".to_string(),
            password_hash: String::new(),
            created_at: 0,
        };

        let session = issue_token(&config, &user).unwrap();
        assert!(verify_token(&config, &session.token).is_ok());

        let mut forged = session.token.clone();
        forged.truncate(forged.len() - 2);
        forged.push_str("00");
        assert!(verify_token(&config, &forged).is_err());

        let other = AuthConfig {
            secret: "another-secret".to_string(),
            ..test_config()
        };
        assert!(verify_token(&other, &session.token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = AuthConfig {
            token_ttl_hours: -1,
            ..test_config()
        };
        let user = User {
            id: "u2".to_string(),
            username: "frank".to_string(),
            password_hash: String::new(),
            created_at: 0,
        };

        let session = issue_token(&config, &user).unwrap();
        let err = verify_token(&config, &session.token).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn password_hashes_are_salted() {
        let a = hash_password("same-password", &new_salt());
        let b = hash_password("same-password", &new_salt());
        assert_ne!(a, b);
        assert!(verify_password("same-password", &a));
        assert!(verify_password("same-password", &b));
        assert!(!verify_password("other-password", &a));
    }
}
