pub mod config;
pub mod correlation;
pub mod error;
pub mod logging;
pub mod reconciler;
pub mod repl;
pub mod session;
pub mod transport;

pub use config::{load_config, ClientConfig, ConfigFlags};
pub use correlation::{Correlator, CorrelatorConfig, Dispatch, UnsolicitedMessages};
pub use error::{ClientError, ConfigError, TransportError};
pub use reconciler::{FocusedFunction, FunctionArtifacts, Reconciler, SessionState, TerminalLog};
pub use session::Session;
pub use transport::{ReadyState, TransportHandle, TransportLink};
