use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

#[derive(Debug)]
pub enum AppError {
    DoesNotExist,
    InvalidToken,
    ErrorHashingPassword(argon2::password_hash::Error),
    WrongPassword(argon2::password_hash::Error),
    EmailAddress(lettre::address::AddressError),
    EmailContent(lettre::error::Error),
    TemplateError(askama::Error),
    CustomInternal(String),
}

impl AppError {
    pub fn custom_internal(message: &str) -> Self {
        Self::CustomInternal(message.to_owned())
    }

    pub fn get_status_code_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::DoesNotExist => (StatusCode::NOT_FOUND, "Not found".into()),
            // Every token failure collapses into the same response. Callers
            // must not learn whether it was malformed, expired or consumed.
            Self::InvalidToken => (StatusCode::BAD_REQUEST, "Invalid user token".into()),
            Self::WrongPassword(_) => (StatusCode::UNAUTHORIZED, "Wrong credentials".into()),
            Self::EmailAddress(_) | Self::EmailContent(_) => {
                (StatusCode::BAD_REQUEST, "Invalid email header".into())
            }
            Self::ErrorHashingPassword(_) | Self::TemplateError(_) | Self::CustomInternal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something went wrong".into(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.get_status_code_and_message();
        (status, Html(message)).into_response()
    }
}

#[macro_export]
macro_rules! log_and_wrap_custom_internal {
    ($e:expr) => {{
        tracing::error!("{:?}", $e);
        $crate::errors::AppError::custom_internal(&$e.to_string())
    }};
}
