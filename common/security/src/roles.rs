use crate::context::SecurityContext;
use crate::SecurityError;
use tracing::warn;

use serde::{Deserialize, Serialize};

/// Roles mirror the lab's user model: lab administrators, lab assistants
/// ("aslab") who share approval duties, and students who borrow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Aslab,
    Student,
    Unknown(String),
}

impl Role {
    pub fn from_str(s: &str) -> Self {
        match s {
            "admin" | "Admin" => Role::Admin,
            "aslab" | "Aslab" => Role::Aslab,
            "student" | "Student" | "mahasiswa" => Role::Student,
            other => Role::Unknown(other.to_string()),
        }
    }
}

pub fn ensure_role(ctx: &SecurityContext, required: Role) -> Result<(), SecurityError> {
    if ctx.roles.iter().any(|r| *r == required) { return Ok(()); }
    warn!(actor = ?ctx.actor.id, ?required, roles = ?ctx.roles, "role_check_failed");
    Err(SecurityError::Forbidden)
}

pub fn ensure_any_role(ctx: &SecurityContext, required: &[Role]) -> Result<(), SecurityError> {
    if ctx.roles.iter().any(|r| required.iter().any(|x| x == r)) { return Ok(()); }
    warn!(actor = ?ctx.actor.id, ?required, roles = ?ctx.roles, "any_role_check_failed");
    Err(SecurityError::Forbidden)
}
