use axum::Router;
use std::net::SocketAddr;
use tokio::{net::TcpListener, signal};

use crate::{
    config::{SharedConfig, WebsiteConfig},
    state::{SharedState, WebsiteState},
};

use super::get_router;

/// The website runner: configuration from the environment, migrations, the
/// composed router, a TCP listener with graceful shutdown.
pub struct WebsiteService {
    shared_config: SharedConfig,
    config: WebsiteConfig,
    router_factory: fn(WebsiteState) -> Router<WebsiteState>,
    router: Option<Router>,
}

impl WebsiteService {
    pub fn from_env(
        env_prefix: &str,
        router_factory: fn(WebsiteState) -> Router<WebsiteState>,
    ) -> Self {
        Self {
            shared_config: SharedConfig::from_env_with_prefix("SHARED_").init_tracing(),
            config: WebsiteConfig::from_env_with_prefix(env_prefix),
            router_factory,
            router: None,
        }
    }

    pub async fn set_up(&mut self) -> WebsiteState {
        self.config
            .check_production_secrets(&self.shared_config.env);

        let shared = SharedState::new(&self.shared_config);
        let state = WebsiteState::new(self.config.clone(), shared);
        state.database().run_migrations().await;
        state.sessions().run_migrations().await;

        let routes = (self.router_factory)(state.clone());
        self.router = Some(get_router(state.clone(), routes));
        state
    }

    pub fn router(&self) -> Option<&Router> {
        self.router.as_ref()
    }

    pub async fn run(self) -> Result<(), std::io::Error> {
        let addr = self.config.socket_addr();
        tracing::info!("listening on {}", self.config.build_url(""));
        let listener = TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            self.router
                .expect("set_up must run before run")
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
    }
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("shutdown gracefully from ctrl-c");
        },
        _ = terminate => {
            tracing::info!("shutdown gracefully from signal");
        },
    }
}
