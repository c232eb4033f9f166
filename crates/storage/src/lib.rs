//! SQLite-backed transcript storage for analytics sessions.
//!
//! Every agent session writes an append-only log of what happened: the
//! instructions it received, the tools it called, the replies it produced and
//! any failures. The log backs the `sessions` and `logs` commands and is the
//! place to look when a dashboard came out wrong.
//!
//! # Example
//!
//! ```no_run
//! use storage::{Event, EventKind, EventStore, SessionId};
//!
//! let store = EventStore::open("events.db")?;
//!
//! let session_id = SessionId::new();
//! store.append(&Event::new(session_id, EventKind::SessionStart { agent: "analyst".into() }))?;
//! store.append(&Event::instruction(session_id, "Show revenue by region"))?;
//! store.append(&Event::reply(session_id, "Revenue is highest in EMEA."))?;
//!
//! for summary in store.list_sessions()? {
//!     println!("{}: {} instructions", summary.id, summary.instruction_count);
//! }
//! # Ok::<(), storage::Error>(())
//! ```

mod error;
mod event;
mod store;

pub use error::{Error, Result};
pub use event::{Event, EventKind, SessionId};
pub use store::{EventStore, SessionSummary};
