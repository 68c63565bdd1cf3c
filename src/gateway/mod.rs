pub mod constants;
pub mod events;
pub mod session;

pub use events::{ChannelInfo, GatewayEvent, IncomingMessage, Presence};
pub use session::GatewaySession;
