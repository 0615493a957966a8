//! CLI command implementations.

pub mod config;
pub mod simulate;
pub mod window;

pub use config::show_config;
pub use simulate::{simulate, SimulateOptions};
pub use window::{resolve_window, WindowOptions};
