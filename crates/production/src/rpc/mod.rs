//! HTTP ingress for attestation submission and status queries.

mod handlers;
mod routes;
mod server;
mod types;

pub use handlers::IngressState;
pub use routes::create_router;
pub use server::{IngressServer, IngressServerConfig, IngressServerError};
pub use types::*;
