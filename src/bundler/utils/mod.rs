//! Shared helpers: filesystem, downloads, external commands and templates.

pub mod fs;
pub mod http;
pub mod process;
pub mod template;

pub use process::{LogObserver, OutputObserver, ToolCommand};
