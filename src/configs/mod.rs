pub mod base;
pub mod discord;
pub mod logging;
pub mod server;
pub mod tracker;

pub use base::*;
pub use discord::*;
pub use logging::*;
pub use server::*;
pub use tracker::*;
