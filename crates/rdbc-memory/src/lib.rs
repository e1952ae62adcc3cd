pub mod auth;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod executor;
pub mod factory;
pub mod planner;

pub use auth::{AuthManager, UserContext};
pub use catalog::{Database, Store};
pub use config::MemoryConfig;
pub use connection::{ConnState, MemoryConnection};
pub use factory::MemoryConnectionFactory;
