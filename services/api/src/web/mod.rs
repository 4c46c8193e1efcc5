pub mod protocol;
pub mod rest;
pub mod state;
pub mod sync;
pub mod ws_handler;

// Re-export the main WebSocket handler to make it easily accessible
// to the binary that will build the web server router.
pub use rest::{get_data_handler, summary_handler, test_archive_handler, update_data_handler};
pub use ws_handler::ws_handler;
