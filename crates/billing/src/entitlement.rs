//! Copy-generation quota gate
//!
//! Free users get a fixed lifetime budget of copy generations; paid users
//! (including those with a cancellation scheduled) are unmetered. The gate
//! reads the user's document at call time, so it always reflects the most
//! recent webhook transition.

use std::sync::Arc;

use crate::error::BillingResult;
use crate::ledger::LedgerStore;

/// Result of a quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CopyAllowance {
    pub allowed: bool,
    /// Remaining free generations; `None` for unmetered paid plans
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<i64>,
}

pub struct CopyQuotaService {
    ledger: Arc<dyn LedgerStore>,
    max_free_copy_generations: i64,
}

impl CopyQuotaService {
    pub fn new(ledger: Arc<dyn LedgerStore>, max_free_copy_generations: i64) -> Self {
        Self {
            ledger,
            max_free_copy_generations,
        }
    }

    /// Whether the user may generate another piece of copy
    ///
    /// Free users need strictly more than one generation left: the last
    /// slot is reserved so the upgrade prompt appears before the budget is
    /// fully spent.
    pub async fn check_allowance(&self, user_id: &str) -> BillingResult<CopyAllowance> {
        let user = self.ledger.get_user(user_id).await?;

        if user.status.is_paid() {
            return Ok(CopyAllowance {
                allowed: true,
                remaining: None,
            });
        }

        let remaining = self.max_free_copy_generations - user.lifetime_copy_generations;
        Ok(CopyAllowance {
            allowed: remaining > 1,
            remaining: Some(remaining.max(0)),
        })
    }
}
