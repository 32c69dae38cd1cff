mod api;
mod health;
mod ws;

pub use api::api_router;
pub use health::health_router;
pub use ws::ws_router;
