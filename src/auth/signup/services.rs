use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::response::Redirect;

use crate::{
    auth::tokens::decode_uid,
    errors::AppError,
    log_and_wrap_custom_internal,
    models::{User, UserKind},
    sessions::Session,
    state::WebsiteState,
};

use super::infrastructure::Invitation;
use super::routes::{CreateAccountForm, InviteForm};

/// What happened to an invitation request. The two failure outcomes are
/// user-visible form errors, not server errors.
#[derive(Debug, PartialEq, Eq)]
pub enum InviteOutcome {
    Invited,
    EmailTaken,
    BadHeader,
}

/// Invites `input.email`, either as a brand new account or, when `target` is
/// given, by attaching the email to that existing record. The user row is
/// committed before the email goes out, so a failed send never loses the
/// invited state.
pub async fn invite(
    state: &WebsiteState,
    target: Option<i64>,
    input: &InviteForm,
) -> Result<InviteOutcome, AppError> {
    let database = state.database();

    let mut tx = database.start_transaction().await?;
    let (user, created) = match target {
        Some(pk) => {
            let user = User::find_by_pk(pk, database)
                .await?
                .ok_or(AppError::DoesNotExist)?;
            let created = user.email.is_empty();
            (user, created)
        }
        None => User::get_or_create_by_email(&input.email, &mut tx).await?,
    };
    if !created {
        return Ok(InviteOutcome::EmailTaken);
    }
    let user = user
        .prepare_for_invite(&input.email, input.is_editor, &mut tx)
        .await?;
    tx.commit()
        .await
        .map_err(|e| log_and_wrap_custom_internal!(e))?;

    let invitation = Invitation::new(&user, state.tokens());
    match invitation.send(state.config(), state.mailer()).await {
        Ok(()) => Ok(InviteOutcome::Invited),
        Err(AppError::EmailAddress(e)) => {
            tracing::warn!("invitation email for {} rejected: {e}", user.pk);
            Ok(InviteOutcome::BadHeader)
        }
        Err(AppError::EmailContent(e)) => {
            tracing::warn!("invitation email for {} rejected: {e}", user.pk);
            Ok(InviteOutcome::BadHeader)
        }
        Err(e) => Err(e),
    }
}

/// Resolves the user an activation link points at. Undecodable ids and
/// unknown pks both come back as `None`; only infrastructure failures error.
pub async fn resolve_user(state: &WebsiteState, uidb64: &str) -> Result<Option<User>, AppError> {
    let Some(pk) = decode_uid(uidb64) else {
        return Ok(None);
    };
    User::find_by_pk(pk, state.database()).await
}

/// Completes the activation handshake for a token-checked user: credentials
/// are stored, the account flips to active (consuming every outstanding
/// token), and the current session is logged in as the new user.
pub async fn activate(
    state: &WebsiteState,
    session: &Session,
    user: User,
    input: &CreateAccountForm,
) -> Result<Redirect, AppError> {
    let username = match user.kind {
        UserKind::External => user
            .external_username
            .clone()
            .unwrap_or_else(|| input.username.clone()),
        UserKind::Normal => input.username.clone(),
    };
    let password = hash_password(&input.password)?;

    let mut tx = state.database().start_transaction().await?;
    let user = user.activate(&username, &password, &mut tx).await?;
    tx.commit()
        .await
        .map_err(|e| log_and_wrap_custom_internal!(e))?;

    state
        .sessions()
        .rotate_for_user(session, &user, &state.config().session_key)
        .await?;

    Ok(Redirect::to(&state.config().login_redirect_to))
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(AppError::ErrorHashingPassword)?
        .to_string())
}

pub fn verify_password(raw_password: &str, db_password: &str) -> Result<(), AppError> {
    let parsed_hash = PasswordHash::new(db_password).map_err(AppError::ErrorHashingPassword)?;
    Argon2::default()
        .verify_password(raw_password.as_bytes(), &parsed_hash)
        .map_err(AppError::WrongPassword)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert_ne!(hash, "correct horse battery staple");
        assert!(verify_password("correct horse battery staple", &hash).is_ok());
        assert!(verify_password("wrong", &hash).is_err());
    }
}
