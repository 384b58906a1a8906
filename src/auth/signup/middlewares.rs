use axum::{
    extract::{Request, State},
    http::{header::SET_COOKIE, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Extension,
};
use axum_extra::{headers::Cookie, TypedHeader};
use cookie::{time::Duration, SameSite};
use hyper::HeaderMap;

use crate::{
    config::WebsiteConfig, errors::AppError, log_and_wrap_custom_internal, sessions::Session,
    state::WebsiteState,
};

/// Resolves the cookie-backed session (creating an anonymous one on first
/// contact), exposes it as an extension and re-sets the cookies on the way
/// out so a rotation performed by a handler reaches the browser.
pub async fn sessions_middleware(
    State(state): State<WebsiteState>,
    cookie: Option<TypedHeader<Cookie>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let sessions = state.sessions();
    let config = state.config();

    let current_session = match cookie
        .as_ref()
        .and_then(|c| c.get(&config.session_cookie_name))
    {
        Some(session_id) => sessions.find_session(session_id).await?,
        None => None,
    };
    let session = match current_session {
        Some(session) => session,
        None => {
            sessions
                .create_session(
                    None,
                    config.session_expiration as u64,
                    &config.session_key,
                )
                .await?
        }
    };

    request.extensions_mut().insert(session.clone());

    let mut resp = next.run(request).await;

    set_session_cookies(resp.headers_mut(), &session, config).await?;

    Ok(resp)
}

/// Gates the invitation admin: anonymous or non-staff sessions are bounced
/// to the login page with a `next` parameter.
pub async fn staff_required_middleware(
    Extension(session): Extension<Session>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if session.is_staff().await {
        return Ok(next.run(request).await);
    }
    let next_url = format!("/?next={}", request.uri());
    Ok(Redirect::to(&next_url).into_response())
}

pub async fn set_session_cookies(
    headers: &mut HeaderMap<HeaderValue>,
    session: &Session,
    config: &WebsiteConfig,
) -> Result<(), AppError> {
    let cookie = cookie::Cookie::build((&config.csrf_cookie_name, session.csrf_token().await))
        .domain(config.domain())
        .path("/")
        .max_age(Duration::days(config.session_expiration))
        .secure(true)
        .http_only(false)
        .same_site(SameSite::Lax)
        .build();

    headers.append(
        SET_COOKIE,
        HeaderValue::from_bytes(cookie.encoded().to_string().as_bytes())
            .map_err(|e| log_and_wrap_custom_internal!(e))?,
    );

    let cookie = cookie::Cookie::build((&config.session_cookie_name, session.id().await))
        .domain(config.domain())
        .path("/")
        .max_age(Duration::days(config.session_expiration))
        .secure(true)
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    headers.append(
        SET_COOKIE,
        HeaderValue::from_bytes(cookie.encoded().to_string().as_bytes())
            .map_err(|e| log_and_wrap_custom_internal!(e))?,
    );

    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static("frame-ancestors 'none'"),
    );
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));

    Ok(())
}
