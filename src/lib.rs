// Export modules for use in tests and the CLI
pub mod document;
pub mod geometry;
pub mod headless;
pub mod host;
pub mod input;
pub mod layout;
pub mod panic_handler;
pub mod render;
pub mod search;
pub mod settings;
pub mod view_state;
pub mod viewer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use document::{DocumentError, DocumentHandle};
pub use headless::HeadlessHost;
pub use host::{SlotImage, Status, ViewportHost};
pub use settings::Settings;
pub use viewer::{Viewer, ViewerError, ViewerStats};
