//! The wire interface to the sync source.
//!
//! The fetcher does not open sockets itself; callers provide a
//! [`SyncSourceConnector`] that speaks the find/get-more protocol. The
//! types here define the contract that connector must uphold, most
//! importantly the out-of-band interruption of blocked reads.

mod connector;
mod find_spec;
mod interrupt;

pub use connector::CursorReply;
pub use connector::SyncSourceConn;
pub use connector::SyncSourceConnector;
pub use find_spec::FindSpec;
pub use interrupt::InterruptHandle;
