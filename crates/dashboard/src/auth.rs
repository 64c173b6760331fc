use serde::{Deserialize, Serialize};

/// Snapshot of the identity provider's client state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub is_loading: bool,
    pub is_authenticated: bool,
    pub access_token: Option<String>,
}

/// What the application shell does with an [`AuthStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Render the wait state.
    Loading,
    /// Start the provider's redirect-based login; nothing else is rendered.
    RedirectToLogin { login_url: Option<String> },
    /// Render the dashboard; tile requests carry `token` when present.
    Ready { token: Option<String> },
}

impl GateDecision {
    pub fn is_ready(&self) -> bool {
        matches!(self, GateDecision::Ready { .. })
    }
}

/// There is no local session logic: loading wins, then authentication decides.
pub fn gate(status: &AuthStatus, login_url: Option<&str>) -> GateDecision {
    if status.is_loading {
        GateDecision::Loading
    } else if !status.is_authenticated {
        GateDecision::RedirectToLogin {
            login_url: login_url.map(str::to_string),
        }
    } else {
        GateDecision::Ready {
            token: status.access_token.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthStatus, GateDecision, gate};

    #[test]
    fn loading_takes_precedence() {
        let status = AuthStatus {
            is_loading: true,
            is_authenticated: true,
            access_token: Some("t".into()),
        };
        assert_eq!(gate(&status, None), GateDecision::Loading);
    }

    #[test]
    fn unauthenticated_redirects() {
        let decision = gate(&AuthStatus::default(), Some("https://id.example.org/authorize"));
        assert_eq!(
            decision,
            GateDecision::RedirectToLogin {
                login_url: Some("https://id.example.org/authorize".into())
            }
        );
        assert!(!decision.is_ready());
    }

    #[test]
    fn authenticated_is_ready_with_token() {
        let status: AuthStatus = serde_json::from_str(
            r#"{"isLoading": false, "isAuthenticated": true, "accessToken": "abc"}"#,
        )
        .unwrap();
        assert_eq!(
            gate(&status, None),
            GateDecision::Ready {
                token: Some("abc".into())
            }
        );
    }
}
