pub mod app;
pub mod error;
pub mod handlers;
pub mod processor;
pub mod rate_limiter;
pub mod schema;
pub mod state;

pub use app::build_app;
pub use app::build_router;
pub use app::build_router_with_limiter;
