use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    config::{SharedConfig, WebsiteConfig},
    state::{SharedState, WebsiteState},
};

use super::get_router;

/// An in-process website wired to throwaway sqlite files and the stub
/// mailer, for driving the real router from tests.
pub struct StubWebsite {
    state: WebsiteState,
    router: Router,
}

impl StubWebsite {
    pub async fn new(router_factory: fn(WebsiteState) -> Router<WebsiteState>) -> Self {
        let run_id = Uuid::now_v7();
        let mut shared_config = SharedConfig::stub();
        shared_config.database_url = stub_db_path("principal", &run_id);
        let mut config = WebsiteConfig::stub();
        config.sessions_db = stub_db_path("sessions", &run_id);

        let shared = SharedState::new(&shared_config);
        let state = WebsiteState::new(config, shared);
        state.database().run_migrations().await;
        state.sessions().run_migrations().await;

        let router = get_router(state.clone(), router_factory(state.clone()));
        Self { state, router }
    }

    pub fn state(&self) -> &WebsiteState {
        &self.state
    }

    pub async fn request(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }

    pub async fn read_body(response: Response<Body>) -> String {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }
}

fn stub_db_path(name: &str, run_id: &Uuid) -> String {
    std::env::temp_dir()
        .join(format!("vestibule-{run_id}-{name}.sqlite"))
        .to_string_lossy()
        .into_owned()
}
