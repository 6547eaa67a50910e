pub mod app;
pub mod approval_handlers;
pub mod consumption_handlers;
pub mod item_handlers;
pub mod loan_handlers;
pub mod return_handlers;
pub mod stock;

pub use crate::app::{build_router, AppState};

use serde::{Deserialize, Serialize};

pub const SERVICE_NAME: &str = "loan-service";

/// Embedded migrations so tests and the binary share one schema source.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// The two item families the lab lends out. Assets come back; materials
/// are consumed on approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Asset,
    Material,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Asset => "asset",
            ItemKind::Material => "material",
        }
    }

    /// Accepts both the canonical tags and the legacy Indonesian ones the
    /// submission API contract uses ("aset"/"bahan").
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asset" | "aset" => Some(ItemKind::Asset),
            "material" | "bahan" => Some(ItemKind::Material),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
    Returned,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
            LoanStatus::Returned => "returned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(LoanStatus::Pending),
            "approved" => Some(LoanStatus::Approved),
            "rejected" => Some(LoanStatus::Rejected),
            "returned" => Some(LoanStatus::Returned),
            _ => None,
        }
    }

    /// Approve and reject only move out of Pending.
    pub fn accepts_decision(&self) -> bool {
        matches!(self, LoanStatus::Pending)
    }

    /// Return closes an Approved asset loan; everything else is refused.
    pub fn accepts_return(&self, kind: ItemKind) -> bool {
        matches!(self, LoanStatus::Approved) && kind == ItemKind::Asset
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_kind_accepts_legacy_tags() {
        assert_eq!(ItemKind::parse("aset"), Some(ItemKind::Asset));
        assert_eq!(ItemKind::parse("bahan"), Some(ItemKind::Material));
        assert_eq!(ItemKind::parse("asset"), Some(ItemKind::Asset));
        assert_eq!(ItemKind::parse("equipment"), None);
    }

    #[test]
    fn only_pending_accepts_decisions() {
        assert!(LoanStatus::Pending.accepts_decision());
        for s in [LoanStatus::Approved, LoanStatus::Rejected, LoanStatus::Returned] {
            assert!(!s.accepts_decision(), "{s} should refuse approve/reject");
        }
    }

    #[test]
    fn only_approved_assets_accept_returns() {
        assert!(LoanStatus::Approved.accepts_return(ItemKind::Asset));
        assert!(!LoanStatus::Approved.accepts_return(ItemKind::Material));
        assert!(!LoanStatus::Pending.accepts_return(ItemKind::Asset));
        assert!(!LoanStatus::Returned.accepts_return(ItemKind::Asset));
    }

    #[test]
    fn status_round_trips_through_storage_tags() {
        for s in [LoanStatus::Pending, LoanStatus::Approved, LoanStatus::Rejected, LoanStatus::Returned] {
            assert_eq!(LoanStatus::parse(s.as_str()), Some(s));
        }
    }
}
