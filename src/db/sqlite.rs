use crate::db::models::{AnswerMode, DbAnswer, DbCredential};
use crate::db::schema::SQLITE_INIT;
use crate::error::AutoreplyError;
use crate::ml_oauth::credentials::MlCredential;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub type SqlitePool = Pool<Sqlite>;

/// Token Store and Answer Store on a shared SQLite pool.
///
/// The pool is the only state shared between concurrent requests; every
/// method is a self-contained statement (or transaction) on it.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database and apply the schema.
    pub async fn connect(
        database_url: &str,
        connect_timeout: Duration,
    ) -> Result<Self, AutoreplyError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .acquire_timeout(connect_timeout)
            .connect_with(connect_opts)
            .await?;

        let storage = Self::new(pool);
        storage.init_schema().await?;
        info!("Storage initialized");
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), AutoreplyError> {
        // sqlx::query runs a single statement, so split the script
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Upsert the account's shop row and its credential. Returns the shop id.
    ///
    /// `refresh_token` is only overwritten when the new credential carries one.
    pub async fn upsert_credential(&self, cred: &MlCredential) -> Result<i64, AutoreplyError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let shop_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO shops (ml_user_id, created_at, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(ml_user_id) DO UPDATE SET
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(cred.account_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO ml_tokens (
                shop_id, ml_user_id, access_token, refresh_token, expires_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(ml_user_id) DO UPDATE SET
                shop_id = excluded.shop_id,
                access_token = excluded.access_token,
                refresh_token = COALESCE(excluded.refresh_token, ml_tokens.refresh_token),
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(shop_id)
        .bind(cred.account_id)
        .bind(&cred.access_token)
        .bind(cred.refresh_token.as_deref())
        .bind(cred.expires_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(account_id = cred.account_id, shop_id, "credential upserted");
        Ok(shop_id)
    }

    pub async fn get_credential(
        &self,
        account_id: i64,
    ) -> Result<Option<DbCredential>, AutoreplyError> {
        let row = sqlx::query(
            r#"SELECT ml_user_id, access_token, refresh_token, expires_at, updated_at
               FROM ml_tokens WHERE ml_user_id = ?"#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_credential).transpose()
    }

    /// Insert or overwrite the answer for `question_id`.
    pub async fn upsert_answer(&self, answer: &DbAnswer) -> Result<(), AutoreplyError> {
        sqlx::query(
            r#"
            INSERT INTO answers (question_id, ml_user_id, final_text, mode, answered_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(question_id) DO UPDATE SET
                ml_user_id = excluded.ml_user_id,
                final_text = excluded.final_text,
                mode = excluded.mode,
                answered_at = excluded.answered_at
            "#,
        )
        .bind(answer.question_id)
        .bind(answer.ml_user_id)
        .bind(&answer.final_text)
        .bind(answer.mode.as_str())
        .bind(answer.answered_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_answer(&self, question_id: i64) -> Result<Option<DbAnswer>, AutoreplyError> {
        let row = sqlx::query(
            r#"SELECT question_id, ml_user_id, final_text, mode, answered_at
               FROM answers WHERE question_id = ?"#,
        )
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_answer).transpose()
    }

    fn row_to_credential(row: SqliteRow) -> Result<DbCredential, AutoreplyError> {
        let ml_user_id: i64 = row.try_get("ml_user_id")?;
        let access_token: String = row.try_get("access_token")?;
        let refresh_token: Option<String> = row.try_get("refresh_token")?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        Ok(DbCredential {
            ml_user_id,
            access_token,
            refresh_token,
            expires_at,
            updated_at,
        })
    }

    fn row_to_answer(row: SqliteRow) -> Result<DbAnswer, AutoreplyError> {
        let question_id: i64 = row.try_get("question_id")?;
        let ml_user_id: i64 = row.try_get("ml_user_id")?;
        let final_text: String = row.try_get("final_text")?;
        let mode_str: String = row.try_get("mode")?;
        let answered_at: DateTime<Utc> = row.try_get("answered_at")?;

        let mode = AnswerMode::from_str(&mode_str).map_err(|e| sqlx::Error::Decode(e.into()))?;

        Ok(DbAnswer {
            question_id,
            ml_user_id,
            final_text,
            mode,
            answered_at,
        })
    }
}
