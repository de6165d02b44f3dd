//! Account and session database

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::debug;

/// A registered user account
#[derive(Debug, Clone)]
pub struct AccountRecord {
    /// Stable user id, used as the ownership field of practices
    pub user_id: String,
    /// Login email, lowercased
    pub email: String,
    /// When the account was created
    pub created_at: DateTime<Utc>,
}

/// A bearer-token session
#[derive(Debug, Clone)]
pub struct SessionRecord {
    /// Opaque bearer token
    pub token: String,
    /// Account the session belongs to
    pub user_id: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session was last used
    pub last_seen: DateTime<Utc>,
}

/// SQLite database for accounts and sessions
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                user_id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES accounts(user_id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                last_seen TEXT NOT NULL
            );",
        )
        .context("Failed to create tables")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an account; returns `None` if the email is already registered
    pub fn create_account(&self, email: &str, password: &str) -> Result<Option<AccountRecord>> {
        let email = normalize_email(email);
        let user_id = uuid::Uuid::new_v4().simple().to_string();
        let password_hash = hash_password(password)?;
        let now = Utc::now();

        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT INTO accounts (user_id, email, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, email, password_hash, now.to_rfc3339()],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                debug!(email = %email, "Email already registered");
                return Ok(None);
            }
            Err(e) => return Err(e).context("Failed to insert account"),
        }

        debug!(user_id = %user_id, email = %email, "Account created");
        Ok(Some(AccountRecord {
            user_id,
            email,
            created_at: now,
        }))
    }

    /// Check an email and password; returns the account on success
    pub fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<AccountRecord>> {
        let email = normalize_email(email);

        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT user_id, password_hash, created_at FROM accounts WHERE email = ?1",
                [&email],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query account")?;
        drop(conn);

        let Some((user_id, password_hash, created_at)) = row else {
            return Ok(None);
        };
        if !verify_password(&password_hash, password)? {
            debug!(email = %email, "Password mismatch");
            return Ok(None);
        }

        Ok(Some(AccountRecord {
            user_id,
            email,
            created_at: parse_time(&created_at).context("Failed to parse created_at")?,
        }))
    }

    /// Start a session for an account
    pub fn create_session(&self, user_id: &str) -> Result<SessionRecord> {
        let token = hex::encode(rand::random::<[u8; 32]>());
        let now = Utc::now();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, last_seen) VALUES (?1, ?2, ?3, ?3)",
            params![token, user_id, now.to_rfc3339()],
        )
        .context("Failed to insert session")?;

        debug!(user_id, "Session created");
        Ok(SessionRecord {
            token,
            user_id: user_id.to_string(),
            created_at: now,
            last_seen: now,
        })
    }

    /// Resolve a bearer token to its user id.
    ///
    /// Sessions idle for longer than `ttl` are deleted and resolve to `None`.
    /// A live session has its `last_seen` refreshed.
    pub fn resolve_session(&self, token: &str, ttl: Duration) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT user_id, last_seen FROM sessions WHERE token = ?1",
                [token],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .context("Failed to query session")?;

        let Some((user_id, last_seen)) = row else {
            return Ok(None);
        };

        let now = Utc::now();
        let last_seen = parse_time(&last_seen).context("Failed to parse last_seen")?;
        if now - last_seen > ttl {
            conn.execute("DELETE FROM sessions WHERE token = ?1", [token])
                .context("Failed to delete expired session")?;
            debug!(user_id = %user_id, "Session expired");
            return Ok(None);
        }

        conn.execute(
            "UPDATE sessions SET last_seen = ?1 WHERE token = ?2",
            params![now.to_rfc3339(), token],
        )
        .context("Failed to update session")?;

        Ok(Some(user_id))
    }

    /// End a session; returns whether it existed
    pub fn revoke_session(&self, token: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM sessions WHERE token = ?1", [token])
            .context("Failed to delete session")?;

        debug!(removed = rows > 0, "Session revocation attempted");
        Ok(rows > 0)
    }

    /// Delete every session idle for longer than `ttl`
    pub fn purge_expired_sessions(&self, ttl: Duration) -> Result<usize> {
        let cutoff = (Utc::now() - ttl).to_rfc3339();

        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM sessions WHERE last_seen < ?1", [&cutoff])
            .context("Failed to purge sessions")?;
        Ok(rows)
    }

    /// Look up the account behind a user id
    pub fn get_account(&self, user_id: &str) -> Result<Option<AccountRecord>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT email, created_at FROM accounts WHERE user_id = ?1",
                [user_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .context("Failed to query account")?;

        row.map(|(email, created_at)| {
            Ok(AccountRecord {
                user_id: user_id.to_string(),
                email,
                created_at: parse_time(&created_at).context("Failed to parse created_at")?,
            })
        })
        .transpose()
    }
}

/// Argon2id PHC string for a password, with a fresh random salt
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("Failed to hash password: {e}"))
}

/// Check a password against a stored PHC string in constant time
fn verify_password(stored: &str, password: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| anyhow!("Stored hash is invalid: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}
