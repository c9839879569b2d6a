//! Caller identity as produced by the token verifier

use serde::{Deserialize, Serialize};

/// Role attached to a verified identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

/// Verified caller identity
///
/// Produced by the token verifier from a bearer token and immutable for the
/// lifetime of a connection. Anonymous connections carry a placeholder
/// identity until an `auth` or `user_info` frame upgrades them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    /// Placeholder identity for connections that have not authenticated
    pub fn anonymous() -> Self {
        Self {
            user_id: String::new(),
            role: Role::User,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serde() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(
            serde_json::from_str::<Role>("\"user\"").unwrap(),
            Role::User
        );
    }

    #[test]
    fn test_anonymous() {
        let id = Identity::anonymous();
        assert!(id.is_anonymous());
        assert_eq!(id.role, Role::User);
    }
}
