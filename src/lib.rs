pub mod bridge;
pub mod context;
pub mod logger;
pub mod observer;
pub mod server;
pub mod settings;
pub mod util;
pub mod vault;
pub mod workflow;
pub mod workspace;
