//! Output modes for the CLI commands.

pub mod reason;
pub mod stream;

pub use reason::spawn_reason_renderer_task;
pub use stream::print_stream;
