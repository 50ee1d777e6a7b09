//! Render loop driver
//!
//! Re-invokes a render function from the top for as long as it asks for a
//! rerun. Session contents carry over between passes untouched.

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::flow::Flow;
use crate::store::SessionStore;

/// Result of a completed render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOutcome {
    /// Number of passes executed, including the first
    pub passes: u32,
}

/// Drives render passes until one finishes with `Flow::Continue`
#[derive(Debug, Clone, Copy)]
pub struct RenderLoop {
    max_reruns: u32,
}

impl RenderLoop {
    /// Create a loop allowing `max_reruns` passes after the first
    pub fn new(max_reruns: u32) -> Self {
        Self { max_reruns }
    }

    /// Create a loop from the configured rerun limit
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.max_reruns)
    }

    /// Rerun limit
    pub fn max_reruns(&self) -> u32 {
        self.max_reruns
    }

    /// Render until settled
    ///
    /// Errors from `render` abort the loop and are returned as-is. A render
    /// still asking for a rerun after `max_reruns` extra passes fails with
    /// `SessionError::RerunLimit`.
    pub fn run<F, E>(&self, store: &dyn SessionStore, mut render: F) -> Result<RenderOutcome, E>
    where
        F: FnMut(&dyn SessionStore) -> Result<Flow, E>,
        E: From<SessionError>,
    {
        let mut passes = 0;
        loop {
            passes += 1;
            let flow = render(store)?;
            tracing::debug!(session = %store.id(), pass = passes, ?flow, "Render pass finished");

            if !flow.is_rerun() {
                return Ok(RenderOutcome { passes });
            }
            if passes > self.max_reruns {
                tracing::warn!(
                    session = %store.id(),
                    limit = self.max_reruns,
                    "Render did not settle"
                );
                return Err(SessionError::RerunLimit {
                    limit: self.max_reruns,
                }
                .into());
            }
        }
    }
}

impl Default for RenderLoop {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}
