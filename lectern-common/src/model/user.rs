use crate::model::Id;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use thiserror::Error;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
pub enum Role {
    Student,
    Tutor,
    Admin,
}

/// Display identity of a user, as shown next to their posts.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Identity {
    pub id: Id<UserMarker>,
    pub name: String,
    pub role: Role,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Unknown role: {0:?}")]
pub struct InvalidRoleError(pub String);

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "Student",
            Role::Tutor => "Tutor",
            Role::Admin => "Admin",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = InvalidRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Student" => Ok(Role::Student),
            "Tutor" => Ok(Role::Tutor),
            "Admin" => Ok(Role::Admin),
            other => Err(InvalidRoleError(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::user::{InvalidRoleError, Role};

    #[test]
    fn role_names() {
        for role in [Role::Student, Role::Tutor, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
            assert_eq!(
                serde_json::to_string(&role).unwrap(),
                format!("\"{role}\"")
            );
        }
        assert_eq!(
            "student".parse::<Role>(),
            Err(InvalidRoleError("student".to_owned()))
        );
    }
}
