pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod models;

pub use config::Config;
pub use coordinator::{Coordinator, CoordinatorMetrics};
pub use error::{Error, Result};
pub use models::{ClientEvent, ServerEvent};
