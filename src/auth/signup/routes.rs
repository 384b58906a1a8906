use askama::Template;
use axum::{
    extract::{Path, State},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Extension, Form, Router,
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    errors::AppError,
    models::{User, UserKind},
    sessions::Session,
    state::WebsiteState,
};

use super::middlewares::{sessions_middleware, staff_required_middleware};
use super::services::{self, InviteOutcome};

pub fn routes(state: WebsiteState) -> Router<WebsiteState> {
    let admin = Router::new()
        .route("/admin/invite", get(invite_form).post(post_invite))
        .route(
            "/admin/invite/{pk}",
            get(invite_form_for).post(post_invite_for),
        )
        .layer(middleware::from_fn(staff_required_middleware));

    Router::new()
        .merge(admin)
        .route(
            "/activate/{uidb64}/{token}",
            get(activate_form).post(post_activate),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            sessions_middleware,
        ))
        .with_state(state)
}

#[derive(Debug, Deserialize, Validate)]
pub struct InviteForm {
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    pub is_editor: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAccountForm {
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    #[validate(length(min = 8))]
    pub password: String,
}

#[derive(Template)]
#[template(path = "admin/invite.html")]
struct InviteTemplate {
    title: String,
    email: String,
    error: Option<String>,
}

impl InviteTemplate {
    fn empty() -> Self {
        Self {
            title: "Invite a user".into(),
            email: String::new(),
            error: None,
        }
    }

    fn for_user(user: &User) -> Self {
        let name = user
            .external_username
            .clone()
            .unwrap_or_else(|| user.username.clone());
        Self {
            title: format!("Activate user {name}"),
            email: user.email.clone(),
            error: None,
        }
    }

    fn with_error(email: &str, message: &str) -> Self {
        Self {
            title: "Invite a user".into(),
            email: email.to_owned(),
            error: Some(message.to_owned()),
        }
    }
}

#[derive(Template)]
#[template(path = "auth/activate.html")]
struct ActivateTemplate {
    title: String,
    predef_username: Option<String>,
    error: Option<String>,
}

impl ActivateTemplate {
    fn for_user(user: &User, error: Option<String>) -> Self {
        match user.kind {
            UserKind::External => Self {
                title: "Recover your account".into(),
                predef_username: user.external_username.clone(),
                error,
            },
            UserKind::Normal => Self {
                title: "Create your account".into(),
                predef_username: None,
                error,
            },
        }
    }
}

async fn invite_form() -> Result<Html<String>, AppError> {
    template_to_response(&InviteTemplate::empty())
}

async fn invite_form_for(
    State(state): State<WebsiteState>,
    Path(pk): Path<i64>,
) -> Result<Html<String>, AppError> {
    let user = User::find_by_pk(pk, state.database())
        .await?
        .ok_or(AppError::DoesNotExist)?;
    template_to_response(&InviteTemplate::for_user(&user))
}

async fn post_invite(
    State(state): State<WebsiteState>,
    Form(input): Form<InviteForm>,
) -> Result<Response, AppError> {
    handle_invite(&state, None, input).await
}

async fn post_invite_for(
    State(state): State<WebsiteState>,
    Path(pk): Path<i64>,
    Form(input): Form<InviteForm>,
) -> Result<Response, AppError> {
    handle_invite(&state, Some(pk), input).await
}

async fn handle_invite(
    state: &WebsiteState,
    target: Option<i64>,
    input: InviteForm,
) -> Result<Response, AppError> {
    if input.validate().is_err() {
        let template = InviteTemplate::with_error(&input.email, "Enter a valid email address.");
        return template_to_response(&template).map(IntoResponse::into_response);
    }

    match services::invite(state, target, &input).await? {
        InviteOutcome::Invited => {
            Ok(Redirect::to(&state.config().invite_redirect_to).into_response())
        }
        InviteOutcome::EmailTaken => {
            let template = InviteTemplate::with_error(
                &input.email,
                "This email is already attached to a member.",
            );
            template_to_response(&template).map(IntoResponse::into_response)
        }
        InviteOutcome::BadHeader => {
            let template = InviteTemplate::with_error(
                &input.email,
                "The invitation email has an invalid header and was not sent.",
            );
            template_to_response(&template).map(IntoResponse::into_response)
        }
    }
}

async fn activate_form(
    State(state): State<WebsiteState>,
    Path((uidb64, token)): Path<(String, String)>,
) -> Result<Html<String>, AppError> {
    let user = checked_user(&state, &uidb64, &token).await?;
    template_to_response(&ActivateTemplate::for_user(&user, None))
}

async fn post_activate(
    State(state): State<WebsiteState>,
    Extension(session): Extension<Session>,
    Path((uidb64, token)): Path<(String, String)>,
    Form(input): Form<CreateAccountForm>,
) -> Result<Response, AppError> {
    let user = checked_user(&state, &uidb64, &token).await?;

    if input.validate().is_err() {
        let template = ActivateTemplate::for_user(
            &user,
            Some("Pick a username and a password of at least 8 characters.".to_owned()),
        );
        return template_to_response(&template).map(IntoResponse::into_response);
    }

    services::activate(&state, &session, user, &input)
        .await
        .map(IntoResponse::into_response)
}

/// Resolves and token-checks the user behind an activation link. Every
/// failure collapses into `InvalidToken` so the response never reveals
/// whether the id or the token was at fault.
async fn checked_user(
    state: &WebsiteState,
    uidb64: &str,
    token: &str,
) -> Result<User, AppError> {
    let user = services::resolve_user(state, uidb64).await?;
    if !state.tokens().check(user.as_ref(), token) {
        return Err(AppError::InvalidToken);
    }
    user.ok_or(AppError::InvalidToken)
}

fn template_to_response<T: Template>(template: &T) -> Result<Html<String>, AppError> {
    template
        .render()
        .map(Html)
        .map_err(AppError::TemplateError)
}
