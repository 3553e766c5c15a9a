//! The `/gitlab` slash command: parsing, the per-action state machine, the
//! collaborators it drives and the HTTP surface the host calls into.

pub mod command;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod host;
pub mod middleware;
pub mod subscriptions;

pub use command::{Command, SettingsChange, TRIGGER, parse};
pub use dispatcher::{CommandDispatcher, DispatcherConfig};
pub use error::CommandError;
pub use handlers::{AppState, AppStateInner, router};
pub use host::{GatewayHost, Host};
pub use middleware::CommandToken;
pub use subscriptions::{KvSubscriptions, SubscriptionError, SubscriptionManager};
