use chrono::{DateTime, Days, NaiveDateTime};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use sqlx::{migrate::Migrator, sqlite::SqliteConnectOptions, SqlitePool};
use std::{
    str::FromStr,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{errors::AppError, log_and_wrap_custom_internal, models::User};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug)]
pub struct Session(Arc<RwLock<UserSession>>);

impl Session {
    pub async fn is_authenticated(&self) -> bool {
        self.0.read().await.user_pk.is_some()
    }

    pub async fn is_staff(&self) -> bool {
        let storage = self.0.read().await;
        storage.user_pk.is_some() && storage.is_staff
    }

    pub async fn user_pk(&self) -> Option<i64> {
        self.0.read().await.user_pk
    }

    pub async fn id(&self) -> String {
        self.0.read().await.session_id.to_owned()
    }

    pub async fn csrf_token(&self) -> String {
        self.0.read().await.csrf_token.to_owned()
    }
}

#[derive(Clone, Debug)]
pub struct Sessions(SqlitePool);

impl Sessions {
    pub fn new(sessions_db: &str) -> Self {
        let database_config = SqliteConnectOptions::from_str(sessions_db)
            .expect("Cannot connect to database")
            .create_if_missing(true);

        Self(SqlitePool::connect_lazy_with(database_config))
    }

    pub async fn run_migrations(&self) {
        Migrator::new(std::path::Path::new("./migrations/sessions"))
            .await
            .expect("Where are the migrations?")
            .run(&self.0)
            .await
            .expect("Migrations failed");
    }

    fn get_connection(&self) -> &SqlitePool {
        &self.0
    }

    pub async fn find_session(&self, session_id: &str) -> Result<Option<Session>, AppError> {
        UserSession::from_session_id(session_id, self.get_connection())
            .await
            .map(|s| s.map(|s| Session(Arc::new(RwLock::new(s)))))
    }

    pub async fn create_session(
        &self,
        user: Option<&User>,
        session_expiration: u64,
        secret: &str,
    ) -> Result<Session, AppError> {
        let mut session = UserSession::new(user, session_expiration);
        session.update_csrf_token(secret);
        session.save(self.get_connection()).await?;
        Ok(Session(Arc::new(RwLock::new(session))))
    }

    /// Logs `user` in on top of the current anonymous session. The session id
    /// is rotated so the pre-login cookie value never identifies the user.
    pub async fn rotate_for_user(
        &self,
        session: &Session,
        user: &User,
        secret: &str,
    ) -> Result<(), AppError> {
        session
            .0
            .write()
            .await
            .new_session_id()
            .update_user(user)
            .update_csrf_token(secret)
            .save(self.get_connection())
            .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize, sqlx::FromRow, Clone)]
struct UserSession {
    session_id: String,
    user_pk: Option<i64>,
    is_staff: bool,
    last_accessed: NaiveDateTime,
    expiration: NaiveDateTime,
    csrf_token: String,
}

impl UserSession {
    fn new(user: Option<&User>, session_expiration: u64) -> Self {
        let today = now_utc();
        let expiration = today + Days::new(session_expiration);
        Self {
            session_id: Uuid::now_v7().to_string(),
            user_pk: user.map(|u| u.pk),
            is_staff: user.map(|u| u.is_staff).unwrap_or(false),
            last_accessed: today,
            expiration,
            csrf_token: String::new(),
        }
    }

    fn get_token_data(&self) -> String {
        format!("{}-{}", self.session_id, self.last_accessed)
    }

    fn new_session_id(&mut self) -> &mut Self {
        self.session_id = Uuid::now_v7().to_string();
        self
    }

    fn update_user(&mut self, user: &User) -> &mut Self {
        self.user_pk = Some(user.pk);
        self.is_staff = user.is_staff;
        self
    }

    fn update_csrf_token(&mut self, secret: &str) -> &mut Self {
        self.csrf_token = generate_token(secret, &self.get_token_data());
        self
    }

    async fn from_session_id(
        session_id: &str,
        conn: &SqlitePool,
    ) -> Result<Option<Self>, AppError> {
        sqlx::query_as("SELECT * FROM web_sessions WHERE session_id = $1 AND expiration > $2;")
            .bind(session_id)
            .bind(now_utc())
            .fetch_optional(conn)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
    }

    async fn save(&self, conn: &SqlitePool) -> Result<i64, AppError> {
        sqlx::query(
            "INSERT INTO web_sessions (session_id, user_pk, is_staff, last_accessed, expiration, csrf_token) VALUES ($1, $2, $3, $4, $5, $6);",
        )
        .bind(&self.session_id)
        .bind(self.user_pk)
        .bind(self.is_staff)
        .bind(self.last_accessed)
        .bind(self.expiration)
        .bind(&self.csrf_token)
        .execute(conn)
        .await
        .map_err(|e| log_and_wrap_custom_internal!(e))
        .map(|r| r.last_insert_rowid())
    }
}

fn now_utc() -> NaiveDateTime {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs() as i64;
    DateTime::from_timestamp(now, 0)
        .expect("invalid unix timestamp")
        .naive_utc()
}

fn generate_token(secret: &str, data: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data.as_bytes());

    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_sessions() -> Sessions {
        let path = std::env::temp_dir().join(format!("vestibule-sessions-{}.sqlite", Uuid::now_v7()));
        Sessions::new(path.to_str().unwrap())
    }

    fn fake_user(pk: i64, is_staff: bool) -> User {
        User {
            pk,
            username: format!("user-{pk}"),
            email: format!("user-{pk}@example.com"),
            password: String::new(),
            is_active: true,
            is_staff,
            is_editor: false,
            kind: crate::models::UserKind::Normal,
            external_username: None,
            created_at: now_utc(),
        }
    }

    #[tokio::test]
    async fn test_anonymous_session_round_trip() {
        let sessions = stub_sessions();
        sessions.run_migrations().await;

        let session = sessions.create_session(None, 30, "secret").await.unwrap();
        assert!(!session.is_authenticated().await);
        assert!(!session.is_staff().await);

        let found = sessions.find_session(&session.id().await).await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_rotate_for_user_changes_the_session_id_and_logs_in() {
        let sessions = stub_sessions();
        sessions.run_migrations().await;

        let session = sessions.create_session(None, 30, "secret").await.unwrap();
        let anonymous_id = session.id().await;

        let user = fake_user(7, true);
        sessions
            .rotate_for_user(&session, &user, "secret")
            .await
            .unwrap();

        assert_ne!(session.id().await, anonymous_id);
        assert_eq!(session.user_pk().await, Some(7));
        assert!(session.is_staff().await);

        let found = sessions.find_session(&session.id().await).await.unwrap();
        assert!(found.unwrap().is_authenticated().await);
    }

    #[tokio::test]
    async fn test_unknown_session_id_is_not_found() {
        let sessions = stub_sessions();
        sessions.run_migrations().await;

        assert!(sessions.find_session("nope").await.unwrap().is_none());
    }
}
