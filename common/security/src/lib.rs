pub mod context;
pub mod error;
pub mod policy;
pub mod roles;

pub use context::{SecurityContext, SecurityCtxExtractor};
pub use error::SecurityError;
pub use policy::{ensure_capability, has_capability, Capability};
pub use roles::{ensure_any_role, ensure_role, Role};
