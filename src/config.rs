use menva::FromEnv;
use std::{net::Ipv4Addr, str::FromStr};
use tracing_subscriber::EnvFilter;

const DEFAULT_TOKEN_MAX_AGE: i64 = 60 * 60 * 24 * 3;

#[derive(Debug, Clone)]
pub enum Env {
    Development,
    Production,
    Test,
}

impl FromStr for Env {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" => Ok(Env::Development),
            "production" => Ok(Env::Production),
            "test" => Ok(Env::Test),
            _ => Err(format!("Invalid value for enum Env: {}", s)),
        }
    }
}

#[derive(Debug, Clone, FromEnv)]
pub struct SharedConfig {
    pub env: Env,
    pub database_url: String,
    pub smtp_username: String,
    pub smtp_password: String,
    pub smtp_relay: String,
}

impl SharedConfig {
    pub fn stub() -> Self {
        Self {
            env: Env::Test,
            database_url: "./test.sqlite".to_owned(),
            smtp_username: "smtp_username".to_owned(),
            smtp_password: "smtp_password".to_owned(),
            smtp_relay: "smtp_relay".to_owned(),
        }
    }

    pub fn init_tracing(self) -> Self {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        match self.env {
            Env::Production => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
            _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
        };
        self
    }
}

#[derive(Debug, Clone, FromEnv)]
pub struct WebsiteConfig {
    ip: Ipv4Addr,
    port: u16,
    domain: String,
    pub site_name: String,
    pub secret_key: String,
    pub activation_token_max_age: i64,
    pub session_key: String,
    pub sessions_db: String,
    pub session_cookie_name: String,
    pub csrf_cookie_name: String,
    pub session_expiration: i64,
    pub login_redirect_to: String,
    pub invite_redirect_to: String,
    pub email_default_sender: String,
}

impl WebsiteConfig {
    pub fn stub() -> Self {
        Self {
            ip: Ipv4Addr::new(0, 0, 0, 0),
            port: 8000,
            domain: "localhost".into(),
            site_name: "Vestibule".into(),
            secret_key: "secret_key".into(),
            activation_token_max_age: DEFAULT_TOKEN_MAX_AGE,
            session_key: "session_key".into(),
            sessions_db: "./test-sessions.sqlite".into(),
            session_cookie_name: "session_id".into(),
            csrf_cookie_name: "csrf_token".into(),
            session_expiration: 30,
            login_redirect_to: "/profile".into(),
            invite_redirect_to: "/admin".into(),
            email_default_sender: "no-reply@example.com".to_owned(),
        }
    }

    pub fn socket_addr(&self) -> (Ipv4Addr, u16) {
        (self.ip, self.port)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    fn is_local(&self) -> bool {
        self.domain.starts_with("localhost")
            || self.domain.starts_with("127.0.0.1")
            || self.domain.starts_with("0.0.0.0")
    }

    pub fn scheme(&self) -> &'static str {
        if self.is_local() {
            "http"
        } else {
            "https"
        }
    }

    pub fn host(&self) -> String {
        if self.is_local() {
            format!("{}:{}", self.domain, self.port)
        } else {
            self.domain.clone()
        }
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}://{}{}", self.scheme(), self.host(), path)
    }

    pub fn token_max_age(&self) -> i64 {
        if self.activation_token_max_age <= 0 {
            DEFAULT_TOKEN_MAX_AGE
        } else {
            self.activation_token_max_age
        }
    }

    pub fn check_production_secrets(&self, env: &Env) {
        if matches!(env, Env::Production)
            && (self.secret_key.is_empty() || self.secret_key == "secret_key")
        {
            panic!("The token signing key must be set to a real secret in production");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_local_domain_uses_http_and_port() {
        let config = WebsiteConfig::stub();
        assert_eq!(
            config.build_url("/activate/abc/def"),
            "http://localhost:8000/activate/abc/def"
        );
    }

    #[test]
    fn test_build_url_public_domain_uses_https() {
        let mut config = WebsiteConfig::stub();
        config.domain = "example.com".into();
        assert_eq!(config.build_url("/admin"), "https://example.com/admin");
    }

    #[test]
    fn test_token_max_age_falls_back_to_default() {
        let mut config = WebsiteConfig::stub();
        config.activation_token_max_age = 0;
        assert_eq!(config.token_max_age(), 60 * 60 * 24 * 3);
        config.activation_token_max_age = 120;
        assert_eq!(config.token_max_age(), 120);
    }

    #[test]
    #[should_panic]
    fn test_stub_secret_key_is_rejected_in_production() {
        WebsiteConfig::stub().check_production_secrets(&Env::Production);
    }

    #[test]
    fn test_stub_secret_key_is_accepted_outside_production() {
        WebsiteConfig::stub().check_production_secrets(&Env::Test);
    }
}
