//! # Discount Authorization
//!
//! Maps a role to the largest line discount it may grant. The table comes
//! from configuration; business code only ever asks the policy.
//!
//! ```text
//! ┌───────────────┬───────────────────┐
//! │ role          │ ceiling           │
//! ├───────────────┼───────────────────┤
//! │ owner, admin  │ unrestricted      │
//! │ manager       │ up to 30%         │
//! │ cashier       │ up to 10%         │
//! │ anything else │ 0% (default)      │
//! └───────────────┴───────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::{Rate, FULL_RATE_BPS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", content = "max", rename_all = "snake_case")]
pub enum DiscountCeiling {
    Unrestricted,
    UpTo(Rate),
}

impl DiscountCeiling {
    pub fn allows(&self, rate: Rate) -> bool {
        match self {
            DiscountCeiling::Unrestricted => true,
            DiscountCeiling::UpTo(max) => rate <= *max,
        }
    }

    /// The ceiling as a rate; unrestricted reports 100%.
    pub fn max_allowed(&self) -> Rate {
        match self {
            DiscountCeiling::Unrestricted => Rate::from_bps(FULL_RATE_BPS),
            DiscountCeiling::UpTo(max) => *max,
        }
    }
}

/// Role → ceiling lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountPolicy {
    ceilings: HashMap<String, DiscountCeiling>,
    default_ceiling: DiscountCeiling,
}

impl Default for DiscountPolicy {
    fn default() -> Self {
        DiscountPolicy::new(DiscountCeiling::UpTo(Rate::zero()))
            .with_role("owner", DiscountCeiling::Unrestricted)
            .with_role("admin", DiscountCeiling::Unrestricted)
            .with_role("manager", DiscountCeiling::UpTo(Rate::from_percent(30)))
            .with_role("cashier", DiscountCeiling::UpTo(Rate::from_percent(10)))
    }
}

impl DiscountPolicy {
    /// An empty policy where every role gets `default_ceiling`.
    pub fn new(default_ceiling: DiscountCeiling) -> Self {
        DiscountPolicy {
            ceilings: HashMap::new(),
            default_ceiling,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>, ceiling: DiscountCeiling) -> Self {
        self.ceilings.insert(role.into().to_ascii_lowercase(), ceiling);
        self
    }

    /// Role names are matched case-insensitively.
    pub fn ceiling_for(&self, role: &str) -> DiscountCeiling {
        self.ceilings
            .get(&role.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default_ceiling)
    }

    /// Checks one line's discount, returning the ceiling that allowed it.
    pub fn authorize(&self, line: usize, role: &str, requested: Rate) -> CoreResult<DiscountCeiling> {
        let ceiling = self.ceiling_for(role);
        if ceiling.allows(requested) {
            Ok(ceiling)
        } else {
            Err(CoreError::DiscountNotAuthorized {
                line,
                role: role.to_string(),
                requested,
                max_allowed: ceiling.max_allowed(),
            })
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
