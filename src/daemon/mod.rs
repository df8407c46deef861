// Daemon support for the long-running trainer and server processes

pub mod signals;

pub use signals::cancel_on_shutdown_signal;
