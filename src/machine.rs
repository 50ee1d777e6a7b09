//! Session-scoped state machine
//!
//! A `Machine` is a named slice of a `SessionStore`: the primary state lives
//! at `{key}` and auxiliary variables at `{key}__{name}`. Machines are cheap
//! wrappers rebuilt on every render pass; the state they address outlives
//! them in the session.
//!
//! The machine does not know which transitions are legal. Each call site
//! owns its own automaton, usually as a small enum per concern:
//!
//! ```rust
//! use a3s_session::{Machine, MemorySession};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! enum Tab {
//!     Goals,
//!     Scales,
//! }
//!
//! # fn example() -> a3s_session::Result<()> {
//! let session = MemorySession::new();
//! let tabs = Machine::new(&session, "tab_state", Tab::Goals)?;
//! let flow = tabs.to(Tab::Scales, false)?;
//! assert!(!flow.is_rerun());
//! assert_eq!(tabs.current()?, Tab::Scales);
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, SessionError};
use crate::flow::Flow;
use crate::store::{namespaced, SessionStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Default `done_state` for string machines
pub const DONE: &str = "done";

/// Named, namespaced view over a session store
pub struct Machine<'a, S> {
    store: &'a dyn SessionStore,
    key: String,
    initial: S,
    logging: bool,
}

impl<'a, S> Machine<'a, S>
where
    S: Serialize + DeserializeOwned,
{
    /// Bind a machine to `key`, writing `initial` only if the key is absent
    ///
    /// Constructing again with a different initial state never touches an
    /// existing primary state.
    pub fn new(store: &'a dyn SessionStore, key: impl Into<String>, initial: S) -> Result<Self> {
        let key = key.into();
        let value = serde_json::to_value(&initial)?;
        store.set_if_absent(&key, value)?;

        Ok(Self {
            store,
            key,
            initial,
            logging: false,
        })
    }

    /// Emit one log line per transition
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging = enabled;
        self
    }

    /// Primary session key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// State written on construction and on reset
    pub fn initial(&self) -> &S {
        &self.initial
    }

    /// Current state
    pub fn current(&self) -> Result<S> {
        let value = self.current_value()?;
        Ok(serde_json::from_value(value)?)
    }

    /// Whether the current state equals the initial state
    pub fn is_initial(&self) -> Result<bool> {
        Ok(self.current_value()? == serde_json::to_value(&self.initial)?)
    }

    /// Transition to `new_state`
    ///
    /// Returns `Flow::Rerun` when `rerun` is set; the caller should stop the
    /// current pass and hand the flow to the render loop.
    pub fn to(&self, new_state: S, rerun: bool) -> Result<Flow> {
        let value = serde_json::to_value(&new_state)?;
        if self.logging {
            let old = self.store.get(&self.key)?;
            self.log_transition(old.as_ref(), &value);
        }
        self.store.set(&self.key, value)?;
        Ok(Flow::from_rerun(rerun))
    }

    /// Drop every auxiliary variable and return to the initial state
    ///
    /// Both steps happen in one store call.
    pub fn reset(&self, rerun: bool) -> Result<Flow> {
        let value = serde_json::to_value(&self.initial)?;
        let old = if self.logging {
            self.store.get(&self.key)?
        } else {
            None
        };

        let removed = self.store.reset_namespace(&self.key, value.clone())?;
        if self.logging {
            self.log_transition(old.as_ref(), &value);
            tracing::info!(key = %self.key, removed, "Machine reset");
        }
        Ok(Flow::from_rerun(rerun))
    }

    /// Run `callback` once, then move to `done_state`
    ///
    /// Does nothing unless the machine is in its initial state. A failing
    /// callback leaves the state untouched, so the next pass calls it again.
    /// Returns whether the callback ran successfully.
    pub fn init_once<F, E>(&self, callback: F, done_state: S) -> std::result::Result<bool, E>
    where
        F: FnOnce() -> std::result::Result<(), E>,
        E: From<SessionError>,
    {
        if !self.is_initial()? {
            return Ok(false);
        }

        callback()?;
        let _continue = self.to(done_state, false)?;
        Ok(true)
    }

    /// Move to `value` only while still in the initial state
    pub fn set_once(&self, value: S, rerun: bool) -> Result<Flow> {
        if self.is_initial()? {
            self.to(value, rerun)
        } else {
            Ok(Flow::Continue)
        }
    }

    /// Store an auxiliary variable at `{key}__{name}`
    pub fn set_variable<T: Serialize>(&self, name: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.store.set(&namespaced(&self.key, name), value)
    }

    /// Read an auxiliary variable, falling back to `default`
    pub fn get_variable(&self, name: &str, default: Value) -> Result<Value> {
        Ok(self
            .store
            .get(&namespaced(&self.key, name))?
            .unwrap_or(default))
    }

    /// Read and deserialize an auxiliary variable
    pub fn get_variable_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.store.get(&namespaced(&self.key, name))? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Remove an auxiliary variable
    pub fn remove_variable(&self, name: &str) -> Result<Option<Value>> {
        self.store.delete(&namespaced(&self.key, name))
    }

    /// Auxiliary variables whose name starts with `sub_prefix`
    ///
    /// Keys in the returned map have the `{key}__` prefix stripped.
    pub fn list_variables_with_prefix(&self, sub_prefix: &str) -> Result<BTreeMap<String, Value>> {
        let namespace = namespaced(&self.key, "");
        let entries = self
            .store
            .entries_with_prefix(&namespaced(&self.key, sub_prefix))?;

        Ok(entries
            .into_iter()
            .filter_map(|(k, v)| k.strip_prefix(&namespace).map(|name| (name.to_string(), v)))
            .collect())
    }

    fn current_value(&self) -> Result<Value> {
        self.store
            .get(&self.key)?
            .ok_or_else(|| SessionError::StateMissing(self.key.clone()))
    }

    fn log_transition(&self, old: Option<&Value>, new: &Value) {
        let from = old.map(|v| v.to_string()).unwrap_or_default();
        tracing::info!(key = %self.key, from = %from, to = %new, "State transition");
    }
}

impl<'a> Machine<'a, String> {
    /// `init_once` with the conventional `"done"` state
    pub fn init_once_default<F, E>(&self, callback: F) -> std::result::Result<bool, E>
    where
        F: FnOnce() -> std::result::Result<(), E>,
        E: From<SessionError>,
    {
        self.init_once(callback, DONE.to_string())
    }
}
