//! Navigation side effect for unrecoverable sessions
//!
//! The client can't move the host application itself. When a session ends
//! involuntarily it tells a `Navigator`, which the host implements to show
//! its login view. Implementations must not panic: the call happens on the
//! refresh path after storage is already cleared.

use std::sync::Mutex;

use tracing::warn;

/// Where the host should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationTarget {
    Login { session_expired: bool },
}

impl NavigationTarget {
    /// Route for the target, e.g. `/login?session=expired`.
    pub fn path(&self) -> String {
        match self {
            NavigationTarget::Login {
                session_expired: true,
            } => "/login?session=expired".to_string(),
            NavigationTarget::Login {
                session_expired: false,
            } => "/login".to_string(),
        }
    }
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, target: NavigationTarget);
}

/// Logs the navigation request. For headless hosts such as the CLI.
#[derive(Debug, Default)]
pub struct LoggingNavigator;

impl Navigator for LoggingNavigator {
    fn navigate(&self, target: NavigationTarget) {
        warn!(route = %target.path(), "session ended, sign in again");
    }
}

/// Keeps every navigation request in order.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    events: Mutex<Vec<NavigationTarget>>,
}

impl RecordingNavigator {
    pub fn events(&self) -> Vec<NavigationTarget> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, target: NavigationTarget) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_paths_carry_expiry_indicator() {
        assert_eq!(
            NavigationTarget::Login {
                session_expired: true
            }
            .path(),
            "/login?session=expired"
        );
        assert_eq!(
            NavigationTarget::Login {
                session_expired: false
            }
            .path(),
            "/login"
        );
    }

    #[test]
    fn recording_navigator_keeps_order() {
        let nav = RecordingNavigator::default();
        nav.navigate(NavigationTarget::Login {
            session_expired: true,
        });
        nav.navigate(NavigationTarget::Login {
            session_expired: false,
        });
        assert_eq!(
            nav.events(),
            vec![
                NavigationTarget::Login {
                    session_expired: true
                },
                NavigationTarget::Login {
                    session_expired: false
                },
            ]
        );
    }

    #[test]
    fn logging_navigator_does_not_panic() {
        LoggingNavigator.navigate(NavigationTarget::Login {
            session_expired: true,
        });
    }
}
