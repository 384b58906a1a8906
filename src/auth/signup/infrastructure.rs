use askama::Template;
use lettre::Message;

use crate::{
    auth::tokens::{encode_uid, ActivationTokens},
    config::WebsiteConfig,
    errors::AppError,
    mailing::Mailer,
    models::User,
};

#[derive(Template)]
#[template(path = "mails/invite_email.txt")]
struct InviteEmailTemplate<'a> {
    site_name: &'a str,
    protocol: &'a str,
    domain: String,
    uid: &'a str,
    token: &'a str,
}

/// The activation link material for one invited user: the encoded pk and a
/// freshly issued token.
#[derive(Debug)]
pub struct Invitation {
    recipient: String,
    uid: String,
    token: String,
}

impl Invitation {
    pub fn new(user: &User, tokens: &ActivationTokens) -> Self {
        Self {
            recipient: user.email.clone(),
            uid: encode_uid(user.pk),
            token: tokens.issue(user),
        }
    }

    pub fn activation_path(&self) -> String {
        format!("/activate/{}/{}", self.uid, self.token)
    }

    /// Builds the invitation email. Address and header failures come back as
    /// `EmailAddress`/`EmailContent` so callers can surface them to the
    /// inviter instead of crashing the request.
    pub fn build_message(&self, config: &WebsiteConfig) -> Result<Message, AppError> {
        let body = InviteEmailTemplate {
            site_name: &config.site_name,
            protocol: config.scheme(),
            domain: config.host(),
            uid: &self.uid,
            token: &self.token,
        }
        .render()
        .map_err(AppError::TemplateError)?;

        Message::builder()
            .from(
                config
                    .email_default_sender
                    .parse()
                    .map_err(AppError::EmailAddress)?,
            )
            .to(self.recipient.parse().map_err(AppError::EmailAddress)?)
            .subject(format!("Invitation to {}", config.site_name))
            .body(body)
            .map_err(AppError::EmailContent)
    }

    pub async fn send(&self, config: &WebsiteConfig, mailer: &Mailer) -> Result<(), AppError> {
        mailer.send(&self.build_message(config)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserKind;

    fn fake_user(pk: i64, email: &str) -> User {
        User {
            pk,
            username: format!("user-{pk}"),
            email: email.to_owned(),
            password: String::new(),
            is_active: false,
            is_staff: false,
            is_editor: false,
            kind: UserKind::Normal,
            external_username: None,
            created_at: chrono::DateTime::from_timestamp(0, 0).unwrap().naive_utc(),
        }
    }

    #[test]
    fn test_message_contains_the_activation_link() {
        let config = WebsiteConfig::stub();
        let tokens = ActivationTokens::new(&config);
        let invitation = Invitation::new(&fake_user(3, "new@example.com"), &tokens);

        let message = invitation.build_message(&config).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains(&invitation.activation_path()));
        assert!(raw.contains("http://localhost:8000/activate/"));
    }

    #[test]
    fn test_bad_recipient_is_reported_not_panicked() {
        let config = WebsiteConfig::stub();
        let tokens = ActivationTokens::new(&config);
        let invitation = Invitation::new(&fake_user(3, "not an address"), &tokens);

        assert!(matches!(
            invitation.build_message(&config),
            Err(AppError::EmailAddress(_))
        ));
    }
}
