pub mod models;
pub mod queries;

use std::str::FromStr;

use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use uuid::Uuid;

use crate::routes::auth::hash_password;

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.foreign_keys(true);

        // An in-memory database lives and dies with its connection, so keep exactly one open
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            // Ensure the data directory exists
            if let Some(path) = url.strip_prefix("sqlite:") {
                let path = path.trim_start_matches("//");
                let path = path.split('?').next().unwrap_or(path);
                if let Some(parent) = std::path::Path::new(path).parent() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Creates the configured administrator account, or promotes it if it already exists.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> anyhow::Result<()> {
        let email = email.trim().to_lowercase();

        let existing = sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;

        let now = Utc::now().to_rfc3339();

        match existing {
            Some(id) => {
                sqlx::query("UPDATE users SET role = 'admin', updated_at = ? WHERE id = ?")
                    .bind(&now)
                    .bind(&id)
                    .execute(&self.pool)
                    .await?;
                tracing::info!(%email, "existing account promoted to admin");
            }
            None => {
                let password_hash =
                    hash_password(password).map_err(|e| anyhow::anyhow!(e.to_string()))?;
                sqlx::query(
                    "INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, ?, 'admin', ?, ?)",
                )
                .bind(Uuid::new_v4().to_string())
                .bind("Administrator")
                .bind(&email)
                .bind(&password_hash)
                .bind(&now)
                .bind(&now)
                .execute(&self.pool)
                .await?;
                tracing::info!(%email, "admin account created");
            }
        }

        Ok(())
    }
}
