//! # Spending Rules — the Daily-Limit Evaluator
//!
//! A guardian can put a daily ceiling on a student wallet. The evaluator
//! answers one question: "would this payment, on top of everything the
//! wallet already spent today, breach the ceiling?"
//!
//! "Today" is the server's wall-clock local day — the window opens at
//! local midnight, not UTC midnight. That is a deliberate policy carried
//! over from the platform's origins: guardians and vendors share one
//! campus and one timezone.
//!
//! The evaluator is a read-side check only. It is **not** a concurrency
//! boundary: the transfer engine calls it while holding the paying
//! wallet's lock, so two simultaneous payments cannot both pass on a
//! stale "spent today" figure.

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::CoreResult;
use crate::ids::{UserId, WalletId};
use crate::ledger::store::LedgerStore;
use crate::money::Amount;

// ---------------------------------------------------------------------------
// SpendingRule
// ---------------------------------------------------------------------------

/// The per-wallet spending configuration.
///
/// At most one rule exists per wallet: the store keys rules by wallet id,
/// so setting a new rule updates the existing one in place instead of
/// accumulating duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingRule {
    /// Primary key (stable across in-place updates).
    pub id: Uuid,
    /// The wallet this rule governs.
    pub wallet_id: WalletId,
    /// Daily debit ceiling. `None` (or zero) disables the limit.
    pub daily_limit: Option<Amount>,
    /// Vendors the wallet may pay. Stored and surfaced for guardian
    /// review; not currently enforced at payment time.
    pub allowed_vendors: Vec<UserId>,
    /// Master switch. An inactive rule is ignored entirely.
    pub active: bool,
    /// The guardian or admin that created the rule.
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SpendingRule {
    /// Returns the daily limit if the rule is live: active, with a
    /// non-null, non-zero ceiling.
    pub fn enforced_limit(&self) -> Option<Amount> {
        if !self.active {
            return None;
        }
        self.daily_limit.filter(|limit| !limit.is_zero())
    }
}

// ---------------------------------------------------------------------------
// RuleDecision
// ---------------------------------------------------------------------------

/// The evaluator's verdict on a proposed debit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleDecision {
    /// No live rule, or the payment fits under the ceiling.
    Allowed,
    /// The payment would breach the ceiling. Both figures are carried so
    /// the client can render "₹150 of ₹200 spent today".
    Denied {
        daily_limit: Amount,
        spent_today: Amount,
    },
}

/// Guardian-facing summary of a wallet's spending state.
#[derive(Debug, Clone, Serialize)]
pub struct SpendingSummary {
    pub daily_limit: Option<Amount>,
    pub active: bool,
    pub spent_today: Amount,
    /// `daily_limit - spent_today`, floored at zero. `None` when no live
    /// limit is configured.
    pub remaining: Option<Amount>,
}

// ---------------------------------------------------------------------------
// Window computation
// ---------------------------------------------------------------------------

/// Start of the local calendar day containing `now`, as a UTC instant.
///
/// Falls back to `now` itself in the degenerate case where local midnight
/// does not exist (a DST jump at exactly 00:00), which yields an empty
/// window and therefore an allowed payment.
pub(crate) fn local_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let local_day = now.with_timezone(&Local).date_naive();
    local_day
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or(now)
}

// ---------------------------------------------------------------------------
// RuleEvaluator
// ---------------------------------------------------------------------------

/// Computes whether a proposed debit violates the wallet's spending rule.
#[derive(Clone)]
pub struct RuleEvaluator {
    store: Arc<LedgerStore>,
}

impl RuleEvaluator {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    /// Checks a proposed payment amount against the wallet's daily limit.
    ///
    /// No rule, an inactive rule, or a null/zero limit all mean
    /// unconditionally [`RuleDecision::Allowed`]. Otherwise the COMPLETED
    /// PAYMENT debits since local midnight are summed and the proposal is
    /// denied if `spent_today + proposed > daily_limit`.
    pub fn check_limit(
        &self,
        wallet: WalletId,
        proposed: Amount,
        now: DateTime<Utc>,
    ) -> CoreResult<RuleDecision> {
        let Some(rule) = self.store.get_rule(wallet)? else {
            return Ok(RuleDecision::Allowed);
        };
        let Some(daily_limit) = rule.enforced_limit() else {
            return Ok(RuleDecision::Allowed);
        };

        let spent_today = self.spent_today(wallet, now)?;
        let projected = spent_today.checked_add(proposed);
        match projected {
            Some(total) if total <= daily_limit => Ok(RuleDecision::Allowed),
            // Overflow counts as a breach: the proposal is absurdly large.
            _ => Ok(RuleDecision::Denied {
                daily_limit,
                spent_today,
            }),
        }
    }

    /// COMPLETED payment volume debited from the wallet since local
    /// midnight. The window has no upper bound: a payment committed in
    /// the same instant as the check must count, since the check runs
    /// inside the payment critical section.
    pub fn spent_today(&self, wallet: WalletId, now: DateTime<Utc>) -> CoreResult<Amount> {
        let start = local_day_start(now);
        let payments = self.store.completed_payments_since(wallet, start)?;
        let mut total = Amount::ZERO;
        for tx in payments {
            total = total.checked_add(tx.amount).unwrap_or(total);
        }
        Ok(total)
    }

    /// The guardian-facing view: limit, switch, spend, and remainder.
    pub fn spending_summary(
        &self,
        wallet: WalletId,
        now: DateTime<Utc>,
    ) -> CoreResult<SpendingSummary> {
        let rule = self.store.get_rule(wallet)?;
        let spent_today = self.spent_today(wallet, now)?;
        let (daily_limit, active) = match &rule {
            Some(r) => (r.daily_limit, r.active),
            None => (None, false),
        };
        let remaining = rule
            .as_ref()
            .and_then(SpendingRule::enforced_limit)
            .map(|limit| limit.saturating_sub(spent_today));

        Ok(SpendingSummary {
            daily_limit,
            active,
            spent_today,
            remaining,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::store::LedgerOp;
    use crate::ledger::transaction::{TransactionRecord, TxKind, TxParties, TxStatus};
    use crate::ledger::wallet::{WalletKind, WalletOwner};
    use chrono::Duration;

    /// Noon today in local time, so that "earlier the same day" timestamps
    /// stay inside the local-midnight window regardless of the host zone.
    fn local_noon() -> DateTime<Utc> {
        local_day_start(Utc::now()) + Duration::hours(12)
    }

    fn setup() -> (Arc<LedgerStore>, RuleEvaluator, WalletId, WalletId) {
        let store = Arc::new(LedgerStore::open_temporary().unwrap());
        let student = store
            .create_wallet(
                WalletOwner::Student(Uuid::new_v4()),
                WalletKind::Student,
                local_noon(),
            )
            .unwrap();
        let vendor = store
            .create_wallet(
                WalletOwner::User(Uuid::new_v4()),
                WalletKind::Vendor,
                local_noon(),
            )
            .unwrap();
        let evaluator = RuleEvaluator::new(Arc::clone(&store));
        (store, evaluator, student.id, vendor.id)
    }

    fn put_rule(store: &LedgerStore, wallet: WalletId, limit: Option<Amount>, active: bool) {
        let now = local_noon();
        store
            .put_rule(&SpendingRule {
                id: Uuid::new_v4(),
                wallet_id: wallet,
                daily_limit: limit,
                allowed_vendors: Vec::new(),
                active,
                created_by: Uuid::new_v4(),
                created_at: now,
                updated_at: now,
            })
            .unwrap();
    }

    fn record_payment(
        store: &LedgerStore,
        from: WalletId,
        to: WalletId,
        amount: Amount,
        at: DateTime<Utc>,
        status: TxStatus,
    ) {
        let tx = TransactionRecord::new(
            TxParties::Both { from, to },
            amount,
            TxKind::Payment,
            status,
            "canteen",
            Uuid::new_v4(),
            at,
        );
        store
            .atomic_apply(&[LedgerOp::InsertTransaction(tx)])
            .unwrap();
    }

    #[test]
    fn no_rule_means_allowed() {
        let (_store, evaluator, student, _) = setup();
        let decision = evaluator
            .check_limit(student, Amount::from_rupees(10_000), local_noon())
            .unwrap();
        assert_eq!(decision, RuleDecision::Allowed);
    }

    #[test]
    fn inactive_or_zero_limit_rules_are_ignored() {
        let (store, evaluator, student, _) = setup();

        put_rule(&store, student, Some(Amount::from_rupees(1)), false);
        assert_eq!(
            evaluator
                .check_limit(student, Amount::from_rupees(100), local_noon())
                .unwrap(),
            RuleDecision::Allowed
        );

        put_rule(&store, student, Some(Amount::ZERO), true);
        assert_eq!(
            evaluator
                .check_limit(student, Amount::from_rupees(100), local_noon())
                .unwrap(),
            RuleDecision::Allowed
        );

        put_rule(&store, student, None, true);
        assert_eq!(
            evaluator
                .check_limit(student, Amount::from_rupees(100), local_noon())
                .unwrap(),
            RuleDecision::Allowed
        );
    }

    #[test]
    fn boundary_spend_is_allowed_one_over_is_denied() {
        let (store, evaluator, student, vendor) = setup();
        let now = local_noon();
        put_rule(&store, student, Some(Amount::from_rupees(200)), true);
        record_payment(
            &store,
            student,
            vendor,
            Amount::from_rupees(150),
            now - Duration::hours(2),
            TxStatus::Completed,
        );

        // 150 + 50 == 200: exactly at the ceiling, allowed.
        assert_eq!(
            evaluator
                .check_limit(student, Amount::from_rupees(50), now)
                .unwrap(),
            RuleDecision::Allowed
        );

        // 150 + 51 > 200: denied, carrying both figures.
        assert_eq!(
            evaluator
                .check_limit(student, Amount::from_paise(5_100), now)
                .unwrap(),
            RuleDecision::Denied {
                daily_limit: Amount::from_rupees(200),
                spent_today: Amount::from_rupees(150),
            }
        );
    }

    #[test]
    fn only_completed_payments_count() {
        let (store, evaluator, student, vendor) = setup();
        let now = local_noon();
        put_rule(&store, student, Some(Amount::from_rupees(100)), true);

        record_payment(
            &store,
            student,
            vendor,
            Amount::from_rupees(90),
            now - Duration::hours(1),
            TxStatus::Failed,
        );

        assert_eq!(
            evaluator.spent_today(student, now).unwrap(),
            Amount::ZERO
        );
        assert_eq!(
            evaluator
                .check_limit(student, Amount::from_rupees(100), now)
                .unwrap(),
            RuleDecision::Allowed
        );
    }

    #[test]
    fn yesterdays_spend_does_not_count() {
        let (store, evaluator, student, vendor) = setup();
        let now = local_noon();
        put_rule(&store, student, Some(Amount::from_rupees(100)), true);

        // 13 hours before local noon is the previous local day.
        record_payment(
            &store,
            student,
            vendor,
            Amount::from_rupees(95),
            now - Duration::hours(13),
            TxStatus::Completed,
        );

        assert_eq!(evaluator.spent_today(student, now).unwrap(), Amount::ZERO);
    }

    #[test]
    fn incoming_payments_do_not_count_as_spend() {
        let (store, evaluator, student, vendor) = setup();
        let now = local_noon();
        put_rule(&store, student, Some(Amount::from_rupees(100)), true);

        // Money flowing *into* the student wallet is not spend.
        record_payment(
            &store,
            vendor,
            student,
            Amount::from_rupees(80),
            now - Duration::hours(1),
            TxStatus::Completed,
        );

        assert_eq!(evaluator.spent_today(student, now).unwrap(), Amount::ZERO);
    }

    #[test]
    fn summary_reports_remaining_budget() {
        let (store, evaluator, student, vendor) = setup();
        let now = local_noon();
        put_rule(&store, student, Some(Amount::from_rupees(200)), true);
        record_payment(
            &store,
            student,
            vendor,
            Amount::from_rupees(60),
            now - Duration::hours(3),
            TxStatus::Completed,
        );

        let summary = evaluator.spending_summary(student, now).unwrap();
        assert_eq!(summary.daily_limit, Some(Amount::from_rupees(200)));
        assert!(summary.active);
        assert_eq!(summary.spent_today, Amount::from_rupees(60));
        assert_eq!(summary.remaining, Some(Amount::from_rupees(140)));
    }

    #[test]
    fn summary_without_rule_is_inert() {
        let (_store, evaluator, student, _) = setup();
        let summary = evaluator.spending_summary(student, local_noon()).unwrap();
        assert_eq!(summary.daily_limit, None);
        assert!(!summary.active);
        assert_eq!(summary.spent_today, Amount::ZERO);
        assert_eq!(summary.remaining, None);
    }

    #[test]
    fn day_start_is_at_or_before_now() {
        let now = Utc::now();
        let start = local_day_start(now);
        assert!(start <= now);
        assert!(now - start < Duration::hours(24));
    }
}
