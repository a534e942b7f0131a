//! Turn types for conversation contexts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a turn's author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(crate::error::Error::invalid_input(format!(
                "Unknown role: {}",
                other
            ))),
        }
    }
}

/// A single turn in a bounded context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Role of the author
    pub role: Role,

    /// Turn content
    pub content: String,

    /// Token cost of this turn
    pub token_count: u32,

    /// When the turn was added
    pub created_at: DateTime<Utc>,

    /// Eviction weight, kept within the policy range (0.0 - 2.0 by default)
    pub importance: f64,
}

impl Turn {
    /// Create a new turn stamped now with importance 1.0
    pub fn new(role: Role, content: impl Into<String>, token_count: u32) -> Self {
        Self {
            role,
            content: content.into(),
            token_count,
            created_at: Utc::now(),
            importance: 1.0,
        }
    }

    /// Override the timestamp
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Override the importance
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    /// The role/content pair handed to a model
    pub fn to_message(&self) -> ContextMessage {
        ContextMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// A turn as returned from `BoundedContext::get`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

/// Per-role token and turn counts for a context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Total tokens used
    pub total: u64,

    /// Tokens used by system turns
    pub system: u64,

    /// Tokens used by user turns
    pub user: u64,

    /// Tokens used by assistant turns
    pub assistant: u64,

    pub system_turns: usize,
    pub user_turns: usize,
    pub assistant_turns: usize,

    /// Context limit
    pub limit: u32,

    /// Utilization (0.0 - 1.0)
    pub utilization: f32,
}

impl TokenUsage {
    /// Create an empty usage summary
    pub fn new(limit: u32) -> Self {
        Self {
            total: 0,
            system: 0,
            user: 0,
            assistant: 0,
            system_turns: 0,
            user_turns: 0,
            assistant_turns: 0,
            limit,
            utilization: 0.0,
        }
    }

    /// Add a turn's tokens for its role
    pub fn add(&mut self, role: Role, tokens: u32) {
        let tokens = u64::from(tokens);
        self.total += tokens;
        match role {
            Role::System => {
                self.system += tokens;
                self.system_turns += 1;
            }
            Role::User => {
                self.user += tokens;
                self.user_turns += 1;
            }
            Role::Assistant => {
                self.assistant += tokens;
                self.assistant_turns += 1;
            }
        }
        self.utilization = if self.limit == 0 {
            0.0
        } else {
            self.total as f32 / self.limit as f32
        };
    }

    pub fn turns(&self) -> usize {
        self.system_turns + self.user_turns + self.assistant_turns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip_through_str() {
        for role in [Role::System, Role::User, Role::Assistant] {
            let parsed: Role = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert!("tool".parse::<Role>().is_err());
    }

    #[test]
    fn test_usage_by_role() {
        let mut usage = TokenUsage::new(100);
        usage.add(Role::System, 10);
        usage.add(Role::User, 20);
        usage.add(Role::Assistant, 20);
        usage.add(Role::User, 5);

        assert_eq!(usage.total, 55);
        assert_eq!(usage.user, 25);
        assert_eq!(usage.user_turns, 2);
        assert_eq!(usage.turns(), 4);
        assert!((usage.utilization - 0.55).abs() < 1e-6);
    }
}
