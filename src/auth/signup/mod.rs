mod infrastructure;
mod middlewares;
mod routes;
mod services;

pub use infrastructure::Invitation;
pub use middlewares::{sessions_middleware, set_session_cookies, staff_required_middleware};
pub use routes::{routes, CreateAccountForm, InviteForm};
pub use services::{hash_password, verify_password, InviteOutcome};
