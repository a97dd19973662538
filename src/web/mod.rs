pub mod api;
pub mod reply;
pub mod server;

pub use api::{routes, AppContext};
pub use server::WebServer;
