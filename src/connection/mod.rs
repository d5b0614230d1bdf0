pub mod builder;
pub mod config;
pub mod manager;
pub mod state;

pub use builder::ConnectionManagerBuilder;
pub use config::ConnectionConfig;
pub use manager::{ConnectionManager, EventReceiver};
pub use state::{ReadyState, Transition};
