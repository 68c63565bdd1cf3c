pub mod commands;
pub mod context;
pub mod runtime;

pub use commands::Command;
pub use context::BotContext;
pub use runtime::{Cadence, ExitReason, run, shutdown_signal};
