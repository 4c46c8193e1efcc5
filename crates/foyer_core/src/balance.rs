//! crates/foyer_core/src/balance.rs
//!
//! Pure derivation of payment status and net credit from raw records.
//! The same formulas apply to the live week and to archived history weeks;
//! callers substitute the archived inputs.

use crate::domain::{Debt, MonthlyBill, Payment};
use serde::Serialize;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BalanceError {
    /// A monthly split over an empty roster would divide by zero.
    #[error("cannot split a bill across zero users")]
    NoUsers,
}

/// Weekly contribution status relative to the expected amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    PaidSurplus,
    PaidExact,
    Underpaid,
}

/// Which direction the net balance points. Positive credit always means the
/// house owes the user; negative always means the user owes the house.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "amount")]
pub enum Settlement {
    OwedToUser(f64),
    OwedByUser(f64),
    Balanced,
}

impl Settlement {
    fn from_credit(credit: f64) -> Self {
        if credit > 0.0 {
            Settlement::OwedToUser(credit)
        } else if credit < 0.0 {
            Settlement::OwedByUser(-credit)
        } else {
            Settlement::Balanced
        }
    }
}

/// The derived weekly position of one user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeeklyBalance {
    pub status: PaymentStatus,
    /// Amount actually paid this week (0 when no payment was recorded).
    pub amount: f64,
    /// Paid amount minus the expected weekly amount; negative when short.
    pub surplus: f64,
    /// Net credit after combining the surplus/deficit with ad-hoc debts.
    #[serde(rename = "finalCredit")]
    pub final_credit: f64,
    pub settlement: Settlement,
}

/// Computes a user's weekly balance.
///
/// Debts the user fronted for the house increase their credit when they are
/// at or above the expected amount, and deepen the deficit figure when they
/// are short (the deficit branch subtracts, keeping the historical ledger
/// convention).
pub fn weekly_balance(
    weekly_amount: f64,
    payment: Option<&Payment>,
    debts: &[Debt],
) -> WeeklyBalance {
    let total_debts: f64 = debts.iter().map(|d| d.amount).sum();
    let amount = payment.map(|p| p.amount).unwrap_or(0.0);
    let surplus = amount - weekly_amount;

    let (status, final_credit) = if payment.is_none() {
        (PaymentStatus::Underpaid, -weekly_amount - total_debts)
    } else if surplus > 0.0 {
        (PaymentStatus::PaidSurplus, surplus + total_debts)
    } else if surplus == 0.0 {
        (PaymentStatus::PaidExact, total_debts)
    } else {
        (PaymentStatus::Underpaid, surplus - total_debts)
    };

    WeeklyBalance {
        status,
        amount,
        surplus,
        final_credit,
        settlement: Settlement::from_credit(final_credit),
    }
}

/// Status of a member's monthly ledger against their share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthlyStatus {
    Paid,
    Partial,
    Pending,
}

/// Sum of all charges on a monthly bill.
pub fn monthly_total(bill: &MonthlyBill) -> f64 {
    bill.loyer
        + bill.electricite
        + bill.eau
        + bill.gaz
        + bill.imprevus
        + bill.autres.iter().map(|a| a.montant).sum::<f64>()
}

/// The even split of a bill across the roster. Rejects an empty roster
/// instead of propagating a non-finite number into the ledger.
pub fn per_person_share(bill: &MonthlyBill, user_count: usize) -> Result<f64, BalanceError> {
    if user_count == 0 {
        return Err(BalanceError::NoUsers);
    }
    Ok(monthly_total(bill) / user_count as f64)
}

pub fn monthly_status(paid: f64, per_person: f64) -> MonthlyStatus {
    if paid >= per_person {
        MonthlyStatus::Paid
    } else if paid > 0.0 {
        MonthlyStatus::Partial
    } else {
        MonthlyStatus::Pending
    }
}

/// Remaining share after `paid`, floored at zero.
pub fn remaining_share(paid: f64, per_person: f64) -> f64 {
    (per_person - paid).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExtraCharge;
    use chrono::Utc;

    fn payment(amount: f64) -> Payment {
        Payment {
            id: "p1".into(),
            user_name: "Ahmed".into(),
            amount,
            date: Utc::now(),
            week: "2026-08-24".into(),
        }
    }

    fn debt(amount: f64) -> Debt {
        Debt {
            id: "d1".into(),
            amount,
            description: "Achat imprévu".into(),
            date: Utc::now(),
            week: "2026-08-24".into(),
        }
    }

    #[test]
    fn status_classification_matches_sign_of_surplus() {
        let w = 100.0;
        assert_eq!(
            weekly_balance(w, Some(&payment(150.0)), &[]).status,
            PaymentStatus::PaidSurplus
        );
        assert_eq!(
            weekly_balance(w, Some(&payment(100.0)), &[]).status,
            PaymentStatus::PaidExact
        );
        assert_eq!(
            weekly_balance(w, Some(&payment(60.0)), &[]).status,
            PaymentStatus::Underpaid
        );
        assert_eq!(
            weekly_balance(w, None, &[]).status,
            PaymentStatus::Underpaid
        );
    }

    #[test]
    fn no_payment_no_debts_owes_exactly_weekly_amount() {
        let b = weekly_balance(100.0, None, &[]);
        assert_eq!(b.amount, 0.0);
        assert_eq!(b.surplus, -100.0);
        assert_eq!(b.final_credit, -100.0);
        assert_eq!(b.settlement, Settlement::OwedByUser(100.0));
    }

    #[test]
    fn missing_payment_with_debt_deepens_the_deficit() {
        // Ahmed skipped the week and fronted 30 for the house.
        let b = weekly_balance(100.0, None, &[debt(30.0)]);
        assert_eq!(b.status, PaymentStatus::Underpaid);
        assert_eq!(b.final_credit, -130.0);
        assert_eq!(b.settlement, Settlement::OwedByUser(130.0));
    }

    #[test]
    fn surplus_and_debts_accumulate_as_credit() {
        let b = weekly_balance(100.0, Some(&payment(150.0)), &[]);
        assert_eq!(b.status, PaymentStatus::PaidSurplus);
        assert_eq!(b.surplus, 50.0);
        assert_eq!(b.final_credit, 50.0);
        assert_eq!(b.settlement, Settlement::OwedToUser(50.0));

        let b = weekly_balance(100.0, Some(&payment(120.0)), &[debt(25.0)]);
        assert_eq!(b.final_credit, 45.0);
    }

    #[test]
    fn exact_payment_credit_is_the_debt_total() {
        let b = weekly_balance(100.0, Some(&payment(100.0)), &[debt(10.0), debt(15.0)]);
        assert_eq!(b.status, PaymentStatus::PaidExact);
        assert_eq!(b.final_credit, 25.0);
        assert_eq!(b.settlement, Settlement::OwedToUser(25.0));
    }

    #[test]
    fn underpaid_branch_subtracts_debts() {
        let b = weekly_balance(100.0, Some(&payment(80.0)), &[debt(30.0)]);
        assert_eq!(b.status, PaymentStatus::Underpaid);
        assert_eq!(b.final_credit, -50.0);
    }

    #[test]
    fn settlement_sign_convention_is_consistent() {
        for (amount, debts, expected_positive) in [
            (150.0, vec![], true),
            (60.0, vec![debt(10.0)], false),
            (100.0, vec![debt(5.0)], true),
        ] {
            let p = payment(amount);
            let b = weekly_balance(100.0, Some(&p), &debts);
            match b.settlement {
                Settlement::OwedToUser(x) => {
                    assert!(expected_positive);
                    assert_eq!(x, b.final_credit);
                }
                Settlement::OwedByUser(x) => {
                    assert!(!expected_positive);
                    assert_eq!(x, -b.final_credit);
                }
                Settlement::Balanced => assert_eq!(b.final_credit, 0.0),
            }
        }
    }

    fn sample_bill() -> MonthlyBill {
        MonthlyBill {
            loyer: 4500.0,
            electricite: 300.0,
            eau: 100.0,
            gaz: 50.0,
            imprevus: 0.0,
            autres: vec![],
        }
    }

    #[test]
    fn monthly_split_across_four_users() {
        let bill = sample_bill();
        assert_eq!(monthly_total(&bill), 4950.0);
        let share = per_person_share(&bill, 4).unwrap();
        assert_eq!(share, 1237.5);

        assert_eq!(monthly_status(1237.5, share), MonthlyStatus::Paid);
        assert_eq!(monthly_status(600.0, share), MonthlyStatus::Partial);
        assert_eq!(remaining_share(600.0, share), 637.5);
        assert_eq!(monthly_status(0.0, share), MonthlyStatus::Pending);
    }

    #[test]
    fn extra_charges_count_toward_the_total() {
        let mut bill = sample_bill();
        bill.autres.push(ExtraCharge {
            nom: "Internet".into(),
            montant: 200.0,
        });
        assert_eq!(monthly_total(&bill), 5150.0);
    }

    #[test]
    fn empty_roster_split_is_rejected() {
        assert_eq!(
            per_person_share(&sample_bill(), 0),
            Err(BalanceError::NoUsers)
        );
    }
}
