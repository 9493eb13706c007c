mod auth;
mod middleware;
mod protocol;
mod routes;
mod server;
mod state;

pub use protocol::ChatRequest;
pub use server::{router, GatewayServer};
pub use state::{AppState, Engine};
