//! Client-side synchronization engine for the Wave Portal.
//!
//! Reconciles the view state with the ledger along three paths: the
//! count/history reads, live `NewWave` pushes, and the user's own
//! submissions. Everything runs on one thread; suspension points are plain
//! futures, so dropping one cancels it.

pub mod connection;
pub mod reader;
pub mod session;
pub mod store;
pub mod subscriber;
pub mod writer;

pub use connection::ConnectionManager;
pub use reader::LedgerReader;
pub use session::{Bindings, Session, SessionOptions, validate_message};
pub use store::{BusyGuard, ObserverId, ViewStore};
pub use subscriber::{LiveSubscriber, Spawner, SubscriberState, SubscriptionHandle};
pub use writer::{LedgerWriter, WriterConfig};
