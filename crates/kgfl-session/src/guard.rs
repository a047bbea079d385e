//! Route gating on top of the session state.
//!
//! The guard only holds a `watch::Receiver`, so it can observe the session
//! but has no way to change it.

use tokio::sync::watch;

use crate::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Startup restore still running; show a placeholder.
    Loading,
    /// No session; send the user to the login entry point.
    RedirectToLogin,
    /// Signed in, but without the required role.
    Forbidden,
    Allow,
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    state: watch::Receiver<SessionState>,
    required_role: Option<String>,
}

impl RouteGuard {
    pub fn new(state: watch::Receiver<SessionState>) -> Self {
        Self {
            state,
            required_role: None,
        }
    }

    pub fn require_role(mut self, role: impl Into<String>) -> Self {
        self.required_role = Some(role.into());
        self
    }

    pub fn decide(&self) -> GuardDecision {
        decide(&self.state.borrow(), self.required_role.as_deref())
    }

    /// Wait for the startup restore to finish, then decide.
    pub async fn settled(&mut self) -> GuardDecision {
        // Sender gone means the context was shut down; decide on the last value.
        let _ = self.state.wait_for(|s| !s.is_initializing()).await;
        self.decide()
    }
}

pub fn decide(state: &SessionState, required_role: Option<&str>) -> GuardDecision {
    if state.is_initializing() {
        return GuardDecision::Loading;
    }
    let Some(principal) = state.principal() else {
        return GuardDecision::RedirectToLogin;
    };
    match required_role {
        Some(role) if !principal.has_role(role) => GuardDecision::Forbidden,
        _ => GuardDecision::Allow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Principal;

    fn principal(role: Option<&str>, is_superuser: bool) -> Principal {
        Principal {
            id: 3,
            username: "u".into(),
            role: role.map(str::to_string),
            is_superuser,
            email: None,
            first_name: None,
            last_name: None,
        }
    }

    #[test]
    fn test_decisions() {
        assert_eq!(decide(&SessionState::initializing(), None), GuardDecision::Loading);
        assert_eq!(decide(&SessionState::signed_out(), None), GuardDecision::RedirectToLogin);

        let editor = SessionState::signed_in(principal(Some("editor"), false));
        assert_eq!(decide(&editor, None), GuardDecision::Allow);
        assert_eq!(decide(&editor, Some("editor")), GuardDecision::Allow);
        assert_eq!(decide(&editor, Some("admin")), GuardDecision::Forbidden);

        let root = SessionState::signed_in(principal(None, true));
        assert_eq!(decide(&root, Some("admin")), GuardDecision::Allow);
    }

    #[tokio::test]
    async fn test_settled_waits_for_restore() {
        let (tx, rx) = watch::channel(SessionState::initializing());
        let mut guard = RouteGuard::new(rx).require_role("admin");
        assert_eq!(guard.decide(), GuardDecision::Loading);

        let waiter = tokio::spawn(async move { guard.settled().await });
        tx.send_replace(SessionState::signed_in(principal(Some("admin"), false)));
        assert_eq!(waiter.await.unwrap(), GuardDecision::Allow);
    }
}
