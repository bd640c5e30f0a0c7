pub mod controller;
pub mod dispatch;
pub mod session;
pub mod update;

pub use controller::Controller;
pub use dispatch::{route, Intent, PluginRegistry};
pub use session::{Phase, Session, SessionStats};
pub use update::{UpdateManager, UpdateReport, UpdateSource};
