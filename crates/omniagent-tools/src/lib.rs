pub mod builtin;
pub mod http;
pub mod registry;
pub mod toolset;

pub use http::ApiClient;
pub use registry::ToolRegistry;
pub use toolset::{ToolCapabilities, ToolsetBuilder};
