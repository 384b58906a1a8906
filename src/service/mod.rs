mod router;
mod services;
mod testing;

pub use router::get_router;
pub use services::{shutdown_signal, WebsiteService};
pub use testing::StubWebsite;
