//! Gateway server and HTTP surface

pub mod router;
mod server;

pub use router::{AppState, create_router};
pub use server::Gateway;
