use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Restaurant,
    Driver,
    Support,
    /// Internal pipelines such as upload processing.
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Customer => write!(fmt, "customer"),
            Role::Restaurant => write!(fmt, "restaurant"),
            Role::Driver => write!(fmt, "driver"),
            Role::Support => write!(fmt, "support"),
            Role::System => write!(fmt, "system"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct RoleParseError;

impl FromStr for Role {
    type Err = RoleParseError;
    fn from_str(role: &str) -> Result<Role, Self::Err> {
        match role.to_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "restaurant" => Ok(Role::Restaurant),
            "driver" => Ok(Role::Driver),
            "support" => Ok(Role::Support),
            "system" => Ok(Role::System),
            _ => Err(RoleParseError),
        }
    }
}

/// An authenticated principal: who is acting, and in which role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parses_case_insensitively() {
        assert_eq!("Driver".parse::<Role>(), Ok(Role::Driver));
        assert_eq!("RESTAURANT".parse::<Role>(), Ok(Role::Restaurant));
        assert_eq!("chef".parse::<Role>(), Err(RoleParseError));
    }
}
