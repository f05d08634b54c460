//! brook-flows — the flow runtime.
//!
//! Callers hand a session blob plus caller events to `Session::resume`;
//! the runtime resumes the innermost waiting run, sweeps nodes (executing
//! actions and routing exits), and returns the updated session with the
//! events emitted this resume. Sessions are not persisted here: the caller
//! owns the opaque session JSON between suspensions.

pub mod actions;
pub mod assets;
pub mod contacts;
pub mod context;
pub mod definition;
pub mod engine;
pub mod events;
pub mod references;
pub mod routers;
pub mod runs;
pub mod session;
pub mod triggers;
pub mod utils;
pub mod waits;
pub mod webhook;

pub use assets::SessionAssets;
pub use engine::{EngineConfig, EngineError};
pub use events::{Event, EventKind};
pub use session::{Session, SessionStatus};
pub use triggers::Trigger;
