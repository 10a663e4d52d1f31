use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,

    #[serde(default)]
    pub role: Option<String>,

    #[serde(default)]
    pub approved: bool,

    #[serde(default)]
    pub department_id: Option<Uuid>,

    #[serde(default)]
    pub department: Option<DepartmentRef>,
}

impl User {
    pub fn department_name(&self) -> &str {
        self.department.as_ref().map(|d| d.name.as_str()).unwrap_or("-")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
}

/// Department summary embedded in user and task payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentRef {
    pub id: Uuid,
    pub name: String,
}

/// Backend role enum. Submitted uppercase, accepted in any case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Employee,
    Manager,
}

impl Role {
    pub fn wire_value(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Employee => "EMPLOYEE",
            Self::Manager => "MANAGER",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "EMPLOYEE" => Ok(Self::Employee),
            "MANAGER" => Ok(Self::Manager),
            other => Err(anyhow!("unknown role: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("employee".parse::<Role>().expect("role"), Role::Employee);
        assert_eq!("Admin".parse::<Role>().expect("role"), Role::Admin);
        assert!("supervisor".parse::<Role>().is_err());
    }
}
