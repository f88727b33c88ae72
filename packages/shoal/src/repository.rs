//! Sqlite-backed storage: user accounts and contact-form submissions.

use anyhow::{Context, Result};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{info, warn};

use shoal_auth::{PermissionSet, hash_password, verify_password};

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

/// A stored account, minus the password hash.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAccount {
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub permissions: PermissionSet,
}

impl Database {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .with_context(|| format!("failed to connect to database: {url}"))?;

        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

        ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Single-connection in-memory database for tests.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn create_user(
        &self,
        username: &str,
        display_name: &str,
        email: &str,
        password: &str,
        permissions: &PermissionSet,
    ) -> Result<()> {
        let hash = hash_password(password)?;
        sqlx::query(
            "INSERT INTO users (username, display_name, email, password_hash, permissions, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(username)
        .bind(display_name)
        .bind(email)
        .bind(hash)
        .bind(serde_json::to_string(permissions)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Look up a user by username.
    pub async fn get_user(&self, username: &str) -> Result<Option<UserAccount>> {
        let row = sqlx::query(
            "SELECT username, display_name, email, permissions FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.map(account_from_row).transpose()
    }

    /// Verify a password against the stored argon2 hash.  Returns the
    /// account on success, `None` for unknown user or wrong password.
    pub async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserAccount>> {
        let row = sqlx::query(
            "SELECT username, display_name, email, permissions, password_hash
             FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else { return Ok(None) };
        let hash: String = row.try_get("password_hash")?;
        if !verify_password(password, &hash)? {
            return Ok(None);
        }
        Ok(Some(account_from_row(row)?))
    }

    pub async fn count_users(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    /// First-run bootstrap: create an admin account with every permission
    /// and a generated password, printed once to the log.
    pub async fn seed_admin(&self, permissions: &PermissionSet) -> Result<()> {
        if self.count_users().await? > 0 {
            return Ok(());
        }
        let password = uuid::Uuid::new_v4().simple().to_string();
        self.create_user("admin", "Administrator", "", &password, permissions)
            .await?;
        warn!("created initial admin account; password: {password}");
        info!("change the admin password after first login");
        Ok(())
    }

    pub async fn record_contact(&self, name: &str, email: &str, message: &str) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO contact_messages (name, email, message, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(email)
        .bind(message)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}

fn account_from_row(row: sqlx::sqlite::SqliteRow) -> Result<UserAccount> {
    let permissions: String = row.try_get("permissions")?;
    Ok(UserAccount {
        username: row.try_get("username")?,
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        permissions: serde_json::from_str(&permissions)
            .with_context(|| "stored permission set is corrupt")?,
    })
}

async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            username TEXT PRIMARY KEY,
            display_name TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            password_hash TEXT NOT NULL,
            permissions TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS contact_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            message TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}
