pub mod config;
pub mod error;
pub mod state;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{OmniError, Result};
pub use state::{ConversationState, Route, StateUpdate, FINISH};
pub use types::*;
