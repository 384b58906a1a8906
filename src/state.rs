use axum::extract::FromRef;

use crate::{
    auth::tokens::ActivationTokens,
    config::{SharedConfig, WebsiteConfig},
    database::Database,
    mailing::Mailer,
    sessions::Sessions,
};

#[derive(Clone, Debug)]
pub struct SharedState {
    mailer: Mailer,
    database: Database,
}

impl SharedState {
    pub fn new(config: &SharedConfig) -> Self {
        Self {
            mailer: Mailer::new(config),
            database: Database::new(&config.database_url),
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn mailer(&self) -> &Mailer {
        &self.mailer
    }
}

#[derive(Clone, FromRef, Debug)]
pub struct WebsiteState {
    secrets: WebsiteConfig,
    shared: SharedState,
    sessions: Sessions,
    tokens: ActivationTokens,
}

impl WebsiteState {
    pub fn new(secrets: WebsiteConfig, shared: SharedState) -> Self {
        Self {
            sessions: Sessions::new(&secrets.sessions_db),
            tokens: ActivationTokens::new(&secrets),
            shared,
            secrets,
        }
    }

    pub fn config(&self) -> &WebsiteConfig {
        &self.secrets
    }

    pub fn database(&self) -> &Database {
        &self.shared.database
    }

    pub fn mailer(&self) -> &Mailer {
        &self.shared.mailer
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    pub fn tokens(&self) -> &ActivationTokens {
        &self.tokens
    }
}

impl FromRef<WebsiteState> for Database {
    fn from_ref(app_state: &WebsiteState) -> Database {
        app_state.shared.database.clone()
    }
}
