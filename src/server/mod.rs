pub mod client;
pub mod port;
pub mod supervisor;

pub use client::{ApiClient, ApiError, SessionClient, SessionInfo};
pub use port::{find_free_port, is_port_available};
pub use supervisor::{ServerState, ServerSupervisor};
