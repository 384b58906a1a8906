use std::sync::Arc;

use lettre::{
    transport::{
        smtp::{authentication::Credentials, client::Tls},
        stub::AsyncStubTransport,
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::{
    config::{Env, SharedConfig},
    errors::AppError,
    log_and_wrap_custom_internal,
};

#[derive(Clone, Debug)]
pub enum Mailer {
    Smtp(Arc<AsyncSmtpTransport<Tokio1Executor>>),
    Stub(AsyncStubTransport),
}

impl Mailer {
    pub fn new(config: &SharedConfig) -> Self {
        match config.env {
            Env::Test => Self::stub(),
            Env::Development => {
                let mailer: AsyncSmtpTransport<Tokio1Executor> =
                    AsyncSmtpTransport::<Tokio1Executor>::relay("0.0.0.0")
                        .expect("Something went wrong with the smtp transport for the Mailer")
                        .port(1025)
                        .tls(Tls::None)
                        .build();
                Self::Smtp(Arc::new(mailer))
            }
            Env::Production => {
                let creds =
                    Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());
                let mailer: AsyncSmtpTransport<Tokio1Executor> =
                    AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_relay)
                        .expect("Something went wrong with the smtp transport for the Mailer")
                        .credentials(creds)
                        .build();
                Self::Smtp(Arc::new(mailer))
            }
        }
    }

    pub fn stub() -> Self {
        Self::Stub(AsyncStubTransport::new_ok())
    }

    pub async fn send(&self, message: &Message) -> Result<(), AppError> {
        let raw = message.formatted();
        let envelope = message.envelope();
        match self {
            Self::Smtp(transport) => transport
                .send_raw(envelope, &raw)
                .await
                .map(|_| ())
                .map_err(|e| log_and_wrap_custom_internal!(e)),
            Self::Stub(transport) => transport
                .send_raw(envelope, &raw)
                .await
                .map(|_| ())
                .map_err(|e| log_and_wrap_custom_internal!(e)),
        }
    }

    /// Raw copies of every message accepted by the stub transport. Empty for
    /// the smtp variants.
    pub async fn sent_messages(&self) -> Vec<String> {
        match self {
            Self::Smtp(_) => Vec::new(),
            Self::Stub(transport) => transport
                .messages()
                .await
                .into_iter()
                .map(|(_envelope, raw)| raw)
                .collect(),
        }
    }
}
