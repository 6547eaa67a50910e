use crate::{roles::Role, SecurityContext, SecurityError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    InventoryView,
    LoanSubmit,
    LoanApprove,
    LoanReturn,
    LoanViewAll,
}

// Simple mapping: which roles are allowed each capability.
fn allowed_roles(cap: Capability) -> &'static [Role] {
    use Capability::*;
    use Role::*;
    match cap {
        InventoryView => &[Admin, Aslab, Student],
        LoanSubmit => &[Admin, Aslab, Student],
        LoanApprove => &[Admin, Aslab],
        LoanReturn => &[Admin, Aslab],
        LoanViewAll => &[Admin, Aslab],
    }
}

pub fn ensure_capability(ctx: &SecurityContext, cap: Capability) -> Result<(), SecurityError> {
    let allowed = allowed_roles(cap);
    if ctx.roles.iter().any(|r| allowed.iter().any(|a| a == r)) { return Ok(()); }
    Err(SecurityError::Forbidden)
}

pub fn has_capability(ctx: &SecurityContext, cap: Capability) -> bool {
    ensure_capability(ctx, cap).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_notify::Actor;
    use uuid::Uuid;

    fn mk_ctx(roles: Vec<Role>) -> SecurityContext {
        SecurityContext {
            actor: Actor { id: Some(Uuid::new_v4()), name: None, email: None },
            roles,
            trace_id: None,
        }
    }

    #[test]
    fn student_cannot_approve() {
        let ctx = mk_ctx(vec![Role::Student]);
        assert!(ensure_capability(&ctx, Capability::LoanApprove).is_err(), "Student should not approve loans");
        assert!(ensure_capability(&ctx, Capability::LoanReturn).is_err());
        assert!(ensure_capability(&ctx, Capability::LoanViewAll).is_err());
    }

    #[test]
    fn student_can_submit_and_browse() {
        let ctx = mk_ctx(vec![Role::Student]);
        assert!(ensure_capability(&ctx, Capability::LoanSubmit).is_ok());
        assert!(ensure_capability(&ctx, Capability::InventoryView).is_ok());
    }

    #[test]
    fn aslab_has_approval_duties() {
        let ctx = mk_ctx(vec![Role::Aslab]);
        for cap in [Capability::LoanApprove, Capability::LoanReturn, Capability::LoanViewAll] {
            assert!(ensure_capability(&ctx, cap).is_ok(), "Aslab missing {:?}", cap);
        }
    }

    #[test]
    fn unknown_role_has_nothing() {
        let ctx = mk_ctx(vec![Role::Unknown("dosen".into())]);
        assert!(ensure_capability(&ctx, Capability::LoanSubmit).is_err());
    }
}
