//! # a3s-session
//!
//! Session-scoped state machines for reactive A3S apps.
//!
//! ## Overview
//!
//! Reactive pages re-run their render function from the top on every
//! interaction. `a3s-session` gives each piece of page logic a named,
//! persistent state slot in a per-user session store, plus a uniform way to
//! transition it and to ask for another render pass.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_session::{Flow, Machine, MemorySession, RenderLoop, SessionStore};
//!
//! # fn example() -> a3s_session::Result<()> {
//! let session = MemorySession::new();
//!
//! let outcome = RenderLoop::default().run(&session, |store: &dyn SessionStore| -> a3s_session::Result<Flow> {
//!     let auth = Machine::new(store, "auth_state", "form".to_string())?;
//!     if auth.current()? == "form" {
//!         auth.set_variable("profile", serde_json::json!({"name": "Ana"}))?;
//!         return auth.to("authenticated".to_string(), true);
//!     }
//!     Ok(Flow::Continue)
//! })?;
//!
//! assert_eq!(outcome.passes, 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **SessionStore** trait — injected per-session key-value store
//! - **Machine** — named, namespaced view with transitions and variables
//! - **Flow** — rerun signal returned by transitions
//! - **RenderLoop** — re-invokes a render function until it settles
//! - **SessionManager** — one session per client connection
//! - **SnapshotStore** — save and resume sessions, optionally sealed per session

pub mod config;
pub mod crypto;
pub mod error;
pub mod flow;
pub mod flows;
pub mod machine;
pub mod manager;
pub mod persist;
pub mod render;
pub mod store;

// Re-export core types
pub use config::SessionConfig;
pub use crypto::{AesGcmKeyring, SealedEntries, SnapshotCipher};
pub use error::{Result, SessionError};
pub use flow::Flow;
pub use machine::{Machine, DONE};
pub use manager::{SessionInfo, SessionManager};
pub use persist::{
    FileSnapshotStore, MemorySnapshotStore, SessionSnapshot, SnapshotEntries, SnapshotStore,
};
pub use render::{RenderLoop, RenderOutcome};
pub use store::{namespaced, MemorySession, SessionStore, NAMESPACE_SEPARATOR};
