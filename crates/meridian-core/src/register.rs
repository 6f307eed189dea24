//! # Cash Register Sessions
//!
//! A cashier's open-to-close interval at a branch, and the arithmetic that
//! reconciles the drawer at close.
//!
//! ## Reconciliation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  expected = opening                                                     │
//! │           + Σ cash sale totals rung on this session                     │
//! │           − Σ cash refunds of those sales                               │
//! │           + Σ cash in                                                   │
//! │           − Σ cash out                                                  │
//! │                                                                         │
//! │  difference = counted − expected                                        │
//! │               > 0 overage, < 0 shortage                                 │
//! │                                                                         │
//! │  e.g. 100 + 40 − 10 = 130 expected, 125 counted → −5 (shortage)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RegisterStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CashMovementKind {
    Opening,
    Closing,
    Sale,
    Return,
    CashIn,
    CashOut,
}

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RegisterSession {
    pub id: String,
    pub branch_id: String,
    pub user_id: String,
    pub status: RegisterStatus,
    pub opening_balance_cents: i64,
    pub closing_balance_cents: Option<i64>,
    pub expected_balance_cents: Option<i64>,
    pub difference_cents: Option<i64>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl RegisterSession {
    #[inline]
    pub fn opening_balance(&self) -> Money {
        Money::from_cents(self.opening_balance_cents)
    }

    pub fn is_open(&self) -> bool {
        self.status == RegisterStatus::Open
    }

    /// Fails unless the session is open; `action` names what was attempted.
    pub fn ensure_open(&self, action: &'static str) -> CoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CoreError::transition(
                "register session",
                &self.id,
                self.status,
                action,
            ))
        }
    }

    /// Closes the session with a computed reconciliation.
    pub fn close(
        &mut self,
        reconciliation: &Reconciliation,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        if !self.is_open() {
            return Err(CoreError::RegisterAlreadyClosed {
                session_id: self.id.clone(),
            });
        }
        self.status = RegisterStatus::Closed;
        self.closing_balance_cents = Some(reconciliation.counted.cents());
        self.expected_balance_cents = Some(reconciliation.expected.cents());
        self.difference_cents = Some(reconciliation.difference.cents());
        if notes.is_some() {
            self.notes = notes;
        }
        self.closed_at = Some(at);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CashMovement {
    pub id: String,
    pub session_id: String,
    pub kind: CashMovementKind,
    /// Always non-negative; the kind gives the direction.
    pub amount_cents: i64,
    /// Sale or return id for Sale/Return movements.
    pub reference_id: Option<String>,
    pub note: Option<String>,
    pub actor_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl CashMovement {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Running cash figures of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RegisterTally {
    pub opening: Money,
    pub cash_sales: Money,
    pub cash_refunds: Money,
    pub cash_in: Money,
    pub cash_out: Money,
}

impl RegisterTally {
    /// Folds a session's cash movements. Opening and closing movements are
    /// informational; the opening balance comes from the session itself.
    pub fn from_movements<'a, I>(opening: Money, movements: I) -> RegisterTally
    where
        I: IntoIterator<Item = &'a CashMovement>,
    {
        let mut tally = RegisterTally {
            opening,
            ..RegisterTally::default()
        };
        for m in movements {
            match m.kind {
                CashMovementKind::Sale => tally.cash_sales += m.amount(),
                CashMovementKind::Return => tally.cash_refunds += m.amount(),
                CashMovementKind::CashIn => tally.cash_in += m.amount(),
                CashMovementKind::CashOut => tally.cash_out += m.amount(),
                CashMovementKind::Opening | CashMovementKind::Closing => {}
            }
        }
        tally
    }

    pub fn expected(&self) -> Money {
        self.opening + self.cash_sales - self.cash_refunds + self.cash_in - self.cash_out
    }

    pub fn reconcile(&self, counted: Money) -> Reconciliation {
        let expected = self.expected();
        Reconciliation {
            expected,
            counted,
            difference: counted - expected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Reconciliation {
    pub expected: Money,
    pub counted: Money,
    /// Positive is an overage, negative a shortage.
    pub difference: Money,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(kind: CashMovementKind, amount: i64) -> CashMovement {
        CashMovement {
            id: "m".into(),
            session_id: "r-1".into(),
            kind,
            amount_cents: amount,
            reference_id: None,
            note: None,
            actor_id: "u-1".into(),
            created_at: Utc::now(),
        }
    }

    fn session() -> RegisterSession {
        RegisterSession {
            id: "r-1".into(),
            branch_id: "b-1".into(),
            user_id: "u-1".into(),
            status: RegisterStatus::Open,
            opening_balance_cents: 10_000,
            closing_balance_cents: None,
            expected_balance_cents: None,
            difference_cents: None,
            notes: None,
            opened_at: Utc::now(),
            closed_at: None,
        }
    }

    #[test]
    fn test_reconciliation_shortage() {
        let movements = vec![
            movement(CashMovementKind::Opening, 10_000),
            movement(CashMovementKind::Sale, 4_000),
            movement(CashMovementKind::CashOut, 1_000),
        ];
        let tally = RegisterTally::from_movements(Money::from_major(100), &movements);
        assert_eq!(tally.expected(), Money::from_major(130));

        let rec = tally.reconcile(Money::from_major(125));
        assert_eq!(rec.difference, Money::from_major(-5));
    }

    #[test]
    fn test_refunds_and_cash_in() {
        let movements = vec![
            movement(CashMovementKind::Sale, 5_000),
            movement(CashMovementKind::Return, 2_000),
            movement(CashMovementKind::CashIn, 500),
        ];
        let tally = RegisterTally::from_movements(Money::zero(), &movements);
        assert_eq!(tally.expected(), Money::from_cents(3_500));
    }

    #[test]
    fn test_close_twice() {
        let mut s = session();
        let none: Vec<CashMovement> = Vec::new();
        let rec = RegisterTally::from_movements(s.opening_balance(), &none)
            .reconcile(Money::from_major(100));
        s.close(&rec, None, Utc::now()).unwrap();
        assert_eq!(s.difference_cents, Some(0));
        assert!(matches!(
            s.close(&rec, None, Utc::now()),
            Err(CoreError::RegisterAlreadyClosed { .. })
        ));
        assert!(s.ensure_open("record cash").is_err());
    }
}
