//! Operator identity injected into an editor session.

use serde::{Deserialize, Serialize};

/// Role of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Staff,
    Admin,
}

/// Who is operating the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Identity {
    Anonymous,
    Authenticated { user_id: String, role: Role },
}

impl Identity {
    pub fn admin(user_id: impl Into<String>) -> Self {
        Identity::Authenticated {
            user_id: user_id.into(),
            role: Role::Admin,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated { user_id, .. } => Some(user_id.as_str()),
        }
    }

    /// Label for log fields.
    pub fn label(&self) -> &str {
        self.user_id().unwrap_or("anonymous")
    }

    /// Only admins may publish lab reports.
    pub fn can_manage_lab_reports(&self) -> bool {
        matches!(
            self,
            Identity::Authenticated {
                role: Role::Admin,
                ..
            }
        )
    }
}
