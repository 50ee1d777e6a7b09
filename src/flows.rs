//! Typed flows built on `Machine`
//!
//! The pages of the app each own a small automaton. These are the shared
//! ones: sign-in, role routing, mount stabilization, one-shot feedback
//! banners, and per-entity progress tracking.

use crate::error::Result;
use crate::flow::Flow;
use crate::machine::Machine;
use crate::store::SessionStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Session key of the authentication machine
pub const AUTH_KEY: &str = "auth_state";

/// Sub-prefix for progress records
pub const PROGRESS_PREFIX: &str = "progress__";

// ─── Authentication ──────────────────────────────────────────────

/// Authentication states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// Sign-in / sign-up form is shown
    Form,
    /// A user is signed in
    Authenticated,
}

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Professional,
}

/// Signed-in user as cached in the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: String,
    pub name: String,
    /// Unset until onboarding completes
    #[serde(default)]
    pub role: Option<Role>,
}

/// Sign-in flow over the `auth_state` machine
pub struct AuthFlow<'a> {
    machine: Machine<'a, AuthState>,
}

impl<'a> AuthFlow<'a> {
    /// Bind to the session, starting at `AuthState::Form`
    pub fn new(store: &'a dyn SessionStore) -> Result<Self> {
        Ok(Self {
            machine: Machine::new(store, AUTH_KEY, AuthState::Form)?,
        })
    }

    /// Current state
    pub fn state(&self) -> Result<AuthState> {
        self.machine.current()
    }

    pub fn is_authenticated(&self) -> Result<bool> {
        Ok(self.state()? == AuthState::Authenticated)
    }

    /// Cache the profile and move to `Authenticated`
    pub fn sign_in(&self, profile: &Profile) -> Result<Flow> {
        self.machine.set_variable("profile", profile)?;
        tracing::info!(user = %profile.user_id, "User signed in");
        self.machine.to(AuthState::Authenticated, true)
    }

    /// Drop everything cached for the user and go back to the form
    pub fn sign_out(&self) -> Result<Flow> {
        self.machine.reset(true)
    }

    /// Cached profile
    pub fn profile(&self) -> Result<Option<Profile>> {
        self.machine.get_variable_as("profile")
    }

    /// Record the role chosen during onboarding
    ///
    /// Returns `Flow::Continue` without writing when nobody is signed in.
    pub fn complete_onboarding(&self, role: Role) -> Result<Flow> {
        let Some(mut profile) = self.profile()? else {
            return Ok(Flow::Continue);
        };
        profile.role = Some(role);
        self.machine.set_variable("profile", &profile)?;
        Ok(Flow::Rerun)
    }
}

/// Page to render for the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Onboarding,
    PatientDashboard,
    ProfessionalDashboard,
}

/// Pick the page from authentication state and profile role
pub fn route(auth: &AuthFlow<'_>) -> Result<Route> {
    if !auth.is_authenticated()? {
        return Ok(Route::Login);
    }
    let route = match auth.profile()?.and_then(|p| p.role) {
        None => Route::Onboarding,
        Some(Role::Patient) => Route::PatientDashboard,
        Some(Role::Professional) => Route::ProfessionalDashboard,
    };
    Ok(route)
}

// ─── Mount stabilization ─────────────────────────────────────────

/// Force exactly one extra render pass after a page first mounts
///
/// Layout placeholders settle on the extra pass before user-visible content
/// is drawn. Returns `Flow::Rerun` the first time, `Flow::Continue` after.
pub fn settle_after_mount(store: &dyn SessionStore, key: &str) -> Result<Flow> {
    Machine::new(store, key, false)?.set_once(true, true)
}

// ─── Feedback banner ─────────────────────────────────────────────

/// Feedback severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Message shown once on the next pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackMessage {
    pub level: FeedbackLevel,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum BannerState {
    Idle,
    Pending,
}

/// One-shot feedback banner
///
/// A form handler pushes a message and reruns; the next pass takes it and
/// displays it once.
pub struct Feedback<'a> {
    machine: Machine<'a, BannerState>,
}

impl<'a> Feedback<'a> {
    pub fn new(store: &'a dyn SessionStore, key: &str) -> Result<Self> {
        Ok(Self {
            machine: Machine::new(store, key, BannerState::Idle)?,
        })
    }

    /// Queue a message for the next pass
    pub fn push(&self, level: FeedbackLevel, text: impl Into<String>) -> Result<Flow> {
        self.machine.set_variable(
            "message",
            FeedbackMessage {
                level,
                text: text.into(),
            },
        )?;
        self.machine.to(BannerState::Pending, true)
    }

    /// Take the queued message, if any
    pub fn take(&self) -> Result<Option<FeedbackMessage>> {
        if self.machine.current()? == BannerState::Idle {
            return Ok(None);
        }
        let message = self.machine.get_variable_as("message")?;
        let _continue = self.machine.reset(false)?;
        Ok(message)
    }
}

// ─── Progress tracking ───────────────────────────────────────────

/// Per-entity progress records (one slot per goal, scale, ...)
pub struct ProgressTracker<'a> {
    machine: Machine<'a, String>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(store: &'a dyn SessionStore, key: &str) -> Result<Self> {
        Ok(Self {
            machine: Machine::new(store, key, "tracking".to_string())?,
        })
    }

    /// Store the progress of one entity
    pub fn record<T: Serialize>(&self, entity_id: &str, progress: T) -> Result<()> {
        self.machine
            .set_variable(&format!("{}{}", PROGRESS_PREFIX, entity_id), progress)
    }

    /// Progress of one entity
    pub fn get<T: DeserializeOwned>(&self, entity_id: &str) -> Result<Option<T>> {
        self.machine
            .get_variable_as(&format!("{}{}", PROGRESS_PREFIX, entity_id))
    }

    /// Every recorded entity, keyed by entity id
    pub fn harvest(&self) -> Result<BTreeMap<String, Value>> {
        Ok(self
            .machine
            .list_variables_with_prefix(PROGRESS_PREFIX)?
            .into_iter()
            .filter_map(|(name, value)| {
                name.strip_prefix(PROGRESS_PREFIX)
                    .map(|id| (id.to_string(), value))
            })
            .collect())
    }

    /// Forget every record; other variables in the namespace are kept
    pub fn clear(&self) -> Result<usize> {
        let records = self.machine.list_variables_with_prefix(PROGRESS_PREFIX)?;
        for name in records.keys() {
            self.machine.remove_variable(name)?;
        }
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySession;
    use serde_json::json;

    fn ana() -> Profile {
        Profile {
            user_id: "u-1".into(),
            name: "Ana".into(),
            role: None,
        }
    }

    #[test]
    fn test_auth_sign_in_out() {
        let session = MemorySession::new();
        let auth = AuthFlow::new(&session).unwrap();
        assert_eq!(auth.state().unwrap(), AuthState::Form);
        assert!(auth.profile().unwrap().is_none());

        assert!(auth.sign_in(&ana()).unwrap().is_rerun());
        assert!(auth.is_authenticated().unwrap());
        assert_eq!(auth.profile().unwrap().unwrap().name, "Ana");
        assert_eq!(session.get(AUTH_KEY).unwrap(), Some(json!("authenticated")));

        assert!(auth.sign_out().unwrap().is_rerun());
        assert_eq!(auth.state().unwrap(), AuthState::Form);
        assert!(auth.profile().unwrap().is_none());
    }

    #[test]
    fn test_route() {
        let session = MemorySession::new();
        let auth = AuthFlow::new(&session).unwrap();
        assert_eq!(route(&auth).unwrap(), Route::Login);

        let _ = auth.sign_in(&ana()).unwrap();
        assert_eq!(route(&auth).unwrap(), Route::Onboarding);

        assert!(auth.complete_onboarding(Role::Professional).unwrap().is_rerun());
        assert_eq!(route(&auth).unwrap(), Route::ProfessionalDashboard);

        let patient = Profile {
            role: Some(Role::Patient),
            ..ana()
        };
        let _ = auth.sign_in(&patient).unwrap();
        assert_eq!(route(&auth).unwrap(), Route::PatientDashboard);
    }

    #[test]
    fn test_onboarding_without_profile() {
        let session = MemorySession::new();
        let auth = AuthFlow::new(&session).unwrap();
        assert_eq!(auth.complete_onboarding(Role::Patient).unwrap(), Flow::Continue);
        assert!(auth.profile().unwrap().is_none());
    }

    #[test]
    fn test_settle_after_mount() {
        let session = MemorySession::new();
        assert_eq!(settle_after_mount(&session, "dashboard_redirect_state").unwrap(), Flow::Rerun);
        assert_eq!(settle_after_mount(&session, "dashboard_redirect_state").unwrap(), Flow::Continue);
        assert_eq!(settle_after_mount(&session, "goals_redirect_state").unwrap(), Flow::Rerun);
    }

    #[test]
    fn test_feedback_shown_once() {
        let session = MemorySession::new();
        let banner = Feedback::new(&session, "goal_feedback").unwrap();
        assert!(banner.take().unwrap().is_none());

        assert!(banner.push(FeedbackLevel::Success, "Goal saved").unwrap().is_rerun());

        let message = banner.take().unwrap().unwrap();
        assert_eq!(message.level, FeedbackLevel::Success);
        assert_eq!(message.text, "Goal saved");
        assert!(banner.take().unwrap().is_none());
    }

    #[test]
    fn test_progress_harvest() {
        let session = MemorySession::new();
        let tracker = ProgressTracker::new(&session, "goal_state").unwrap();
        tracker.record("g1", json!({"value": 40})).unwrap();
        tracker.record("g2", json!({"value": 75})).unwrap();

        // Unrelated variable in the same namespace
        session.set("goal_state__filter", json!("active")).unwrap();

        let all = tracker.harvest().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["g1"]["value"], 40);
        assert_eq!(all["g2"]["value"], 75);

        let g1: Value = tracker.get("g1").unwrap().unwrap();
        assert_eq!(g1["value"], 40);
        assert!(tracker.get::<Value>("g3").unwrap().is_none());

        assert_eq!(tracker.clear().unwrap(), 2);
        assert!(tracker.harvest().unwrap().is_empty());
        assert_eq!(
            session.get("goal_state__filter").unwrap(),
            Some(json!("active"))
        );
        assert_eq!(session.get("goal_state").unwrap(), Some(json!("tracking")));
    }
}
