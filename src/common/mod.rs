pub mod banner;
pub mod clock;
pub mod errors;
pub mod http;
pub mod lock;
pub mod logger;
pub mod types;

pub use clock::*;
pub use errors::*;
pub use http::*;
pub use lock::*;
pub use logger::*;
pub use types::*;
