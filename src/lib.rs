pub mod attachment;
pub mod audio;
pub mod config;
pub mod credentials;
pub mod error;
pub mod history;
pub mod host;
pub mod provider;
pub mod registry;
pub mod segment;
pub mod session;
mod telemetry;
pub mod worker;

pub use error::ChatError;
pub use host::{Earcon, HostServices};
pub use session::{Session, SessionId, SessionRegistry};
pub use telemetry::init_tracing;
