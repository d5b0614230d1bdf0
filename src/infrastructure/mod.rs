// Infrastructure module - timers, background tasks and external collaborators
pub mod backoff;
pub mod credentials;
pub mod heartbeat;
pub mod http;
pub mod task_manager;

pub use backoff::BackoffPolicy;
pub use credentials::{CredentialInjector, CredentialSource, CredentialStatus};
pub use heartbeat::{Beat, HeartbeatScheduler, HeartbeatTarget};
pub use http::HttpEventHistory;
pub use task_manager::TaskSlot;
