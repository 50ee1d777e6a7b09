//! Rerun signal returned by state transitions

/// What the render loop should do after an operation
///
/// Transitions never unwind the render pass themselves. They return a
/// `Flow` and the caller decides whether to stop rendering and hand
/// `Flow::Rerun` back to the loop driver.
#[must_use]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Flow {
    /// Keep rendering the current pass
    #[default]
    Continue,
    /// Abandon the current pass and render again from the top
    Rerun,
}

impl Flow {
    /// Map a `rerun` flag onto a flow
    pub fn from_rerun(rerun: bool) -> Self {
        if rerun {
            Flow::Rerun
        } else {
            Flow::Continue
        }
    }

    /// Whether a rerun was requested
    pub fn is_rerun(self) -> bool {
        self == Flow::Rerun
    }

    /// Combine two flows; a rerun on either side wins
    pub fn then(self, other: Flow) -> Flow {
        if self.is_rerun() || other.is_rerun() {
            Flow::Rerun
        } else {
            Flow::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rerun() {
        assert_eq!(Flow::from_rerun(true), Flow::Rerun);
        assert_eq!(Flow::from_rerun(false), Flow::Continue);
        assert_eq!(Flow::default(), Flow::Continue);
    }

    #[test]
    fn test_then_rerun_wins() {
        assert_eq!(Flow::Continue.then(Flow::Continue), Flow::Continue);
        assert_eq!(Flow::Continue.then(Flow::Rerun), Flow::Rerun);
        assert_eq!(Flow::Rerun.then(Flow::Continue), Flow::Rerun);
    }
}
