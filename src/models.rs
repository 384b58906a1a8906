use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, SqliteConnection};

use crate::{database::Database, errors::AppError, log_and_wrap_custom_internal};

/// How the account came to exist. `External` accounts were imported from a
/// previous platform and carry the old username until they are activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i32)]
pub enum UserKind {
    Normal = 0,
    External = 1,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub pk: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_editor: bool,
    pub kind: UserKind,
    pub external_username: Option<String>,
    pub created_at: NaiveDateTime,
}

impl User {
    pub async fn find_by_pk(pk: i64, database: &Database) -> Result<Option<Self>, AppError> {
        sqlx::query_as("SELECT * FROM users WHERE pk = $1;")
            .bind(pk)
            .fetch_optional(database.get_connection())
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
    }

    pub async fn find_by_email(email: &str, database: &Database) -> Result<Option<Self>, AppError> {
        sqlx::query_as("SELECT * FROM users WHERE email = $1;")
            .bind(email)
            .fetch_optional(database.get_connection())
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
    }

    pub async fn create(
        username: &str,
        email: &str,
        password: &str,
        is_staff: bool,
        tx: &mut SqliteConnection,
    ) -> Result<Self, AppError> {
        let pk = sqlx::query(
            "INSERT INTO users (username, email, password, is_active, is_staff) VALUES ($1, $2, $3, 1, $4);",
        )
        .bind(username)
        .bind(email)
        .bind(password)
        .bind(is_staff)
        .execute(&mut *tx)
        .await
        .map_err(|e| log_and_wrap_custom_internal!(e))
        .map(|q| q.last_insert_rowid())?;

        Self::get_by_pk(pk, tx).await
    }

    pub async fn create_external(
        external_username: &str,
        tx: &mut SqliteConnection,
    ) -> Result<Self, AppError> {
        let pk = sqlx::query(
            "INSERT INTO users (username, kind, external_username) VALUES ($1, $2, $3);",
        )
        .bind(external_username)
        .bind(UserKind::External)
        .bind(external_username)
        .execute(&mut *tx)
        .await
        .map_err(|e| log_and_wrap_custom_internal!(e))
        .map(|q| q.last_insert_rowid())?;

        Self::get_by_pk(pk, tx).await
    }

    /// Finds the user attached to `email` or creates an inactive placeholder
    /// record. The boolean reports whether a new record was created.
    pub async fn get_or_create_by_email(
        email: &str,
        tx: &mut SqliteConnection,
    ) -> Result<(Self, bool), AppError> {
        let existing: Option<Self> = sqlx::query_as("SELECT * FROM users WHERE email = $1;")
            .bind(email)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))?;
        if let Some(user) = existing {
            return Ok((user, false));
        }

        let pk = sqlx::query("INSERT INTO users (email) VALUES ($1);")
            .bind(email)
            .execute(&mut *tx)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
            .map(|q| q.last_insert_rowid())?;

        Ok((Self::get_by_pk(pk, tx).await?, true))
    }

    /// Resets the record to the invited state: the given email, a placeholder
    /// username, inactive, with the requested editor flag.
    pub async fn prepare_for_invite(
        mut self,
        email: &str,
        is_editor: bool,
        tx: &mut SqliteConnection,
    ) -> Result<Self, AppError> {
        let username = format!("user-{}", self.pk);
        sqlx::query(
            "UPDATE users SET email = $1, username = $2, is_editor = $3, is_active = 0 WHERE pk = $4;",
        )
        .bind(email)
        .bind(&username)
        .bind(is_editor)
        .bind(self.pk)
        .execute(tx)
        .await
        .map_err(|e| log_and_wrap_custom_internal!(e))?;

        self.email = email.to_owned();
        self.username = username;
        self.is_editor = is_editor;
        self.is_active = false;
        Ok(self)
    }

    /// Completes the handshake: final username, password hash, active. An
    /// `External` account becomes a `Normal` one; its old username stays in
    /// `external_username` for reference.
    pub async fn activate(
        mut self,
        username: &str,
        password: &str,
        tx: &mut SqliteConnection,
    ) -> Result<Self, AppError> {
        sqlx::query(
            "UPDATE users SET username = $1, password = $2, is_active = 1, kind = $3 WHERE pk = $4;",
        )
        .bind(username)
        .bind(password)
        .bind(UserKind::Normal)
        .bind(self.pk)
        .execute(tx)
        .await
        .map_err(|e| log_and_wrap_custom_internal!(e))?;

        self.username = username.to_owned();
        self.password = password.to_owned();
        self.is_active = true;
        self.kind = UserKind::Normal;
        Ok(self)
    }

    async fn get_by_pk(pk: i64, tx: &mut SqliteConnection) -> Result<Self, AppError> {
        sqlx::query_as("SELECT * FROM users WHERE pk = $1;")
            .bind(pk)
            .fetch_one(tx)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn stub_database() -> Database {
        let path = std::env::temp_dir().join(format!("vestibule-models-{}.sqlite", uuid::Uuid::now_v7()));
        let database = Database::new(path.to_str().unwrap());
        database.run_migrations().await;
        database
    }

    #[tokio::test]
    async fn test_get_or_create_by_email_creates_a_placeholder_once() {
        let database = stub_database().await;
        let mut tx = database.start_transaction().await.unwrap();

        let (user, created) = User::get_or_create_by_email("new@example.com", &mut tx)
            .await
            .unwrap();
        assert!(created);
        assert!(!user.is_active);
        assert_eq!(user.email, "new@example.com");

        let (again, created) = User::get_or_create_by_email("new@example.com", &mut tx)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.pk, user.pk);
    }

    #[tokio::test]
    async fn test_prepare_for_invite_resets_the_record() {
        let database = stub_database().await;
        let mut tx = database.start_transaction().await.unwrap();

        let (user, _) = User::get_or_create_by_email("invited@example.com", &mut tx)
            .await
            .unwrap();
        let user = user
            .prepare_for_invite("invited@example.com", true, &mut tx)
            .await
            .unwrap();

        assert_eq!(user.username, format!("user-{}", user.pk));
        assert!(user.is_editor);
        assert!(!user.is_active);
    }

    #[tokio::test]
    async fn test_activate_normalizes_an_external_account() {
        let database = stub_database().await;
        let mut tx = database.start_transaction().await.unwrap();

        let user = User::create_external("old-name", &mut tx).await.unwrap();
        assert_eq!(user.kind, UserKind::External);
        assert!(!user.is_active);

        let user = user.activate("old-name", "hash", &mut tx).await.unwrap();
        tx.commit().await.unwrap();

        assert!(user.is_active);
        assert_eq!(user.kind, UserKind::Normal);
        assert_eq!(user.external_username.as_deref(), Some("old-name"));

        let reloaded = User::find_by_pk(user.pk, &database).await.unwrap().unwrap();
        assert!(reloaded.is_active);
        assert_eq!(reloaded.kind, UserKind::Normal);
    }
}
