pub mod format;
pub mod ledger;
pub mod live;
pub mod matcher;
pub mod notifier;
pub mod query;
pub mod reconcile;
pub mod service;
pub mod session;

pub use ledger::{LedgerStore, SessionSummary};
pub use notifier::{MessageSink, Notice};
pub use service::TrackerService;
pub use session::{Session, Transition};
