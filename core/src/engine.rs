//! # Transfer Engine — Every Balance Mutation Goes Through Here
//!
//! Four operation families, each an atomic state-machine step:
//!
//! 1. **Deposits** — external money onto a guardian wallet, either as a
//!    direct load or through the two-phase gateway flow (PENDING order,
//!    idempotent confirmation keyed by the gateway reference).
//! 2. **Guardian → student transfers** — ownership-checked, funds-checked.
//! 3. **Vendor payments** — the counter flow: approved vendor, active
//!    student, PIN/OTP, funds, daily limit, then the atomic debit/credit.
//!    Failed credential attempts are *always* audited before returning.
//! 4. **Withdrawals & settlement** — the vendor is debited at request
//!    time (money is "in flight" while PENDING) and an admin later flips
//!    exactly that PENDING withdrawal to COMPLETED, exactly once.
//!
//! ## Concurrency
//!
//! The correctness-critical resource is the wallet balance. Every
//! check-then-act sequence (balance check → limit check → mutation) runs
//! inside a per-wallet critical section: a lock table keyed by wallet id,
//! with two-wallet operations acquiring both locks in id order so a
//! concurrent pair of payments can't deadlock. Audit writes happen after
//! the locks drop — their failure must never unwind a committed batch.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLog, EntityType};
use crate::clock::Clock;
use crate::config;
use crate::directory::{Directory, Student, StudentStatus};
use crate::error::{CoreError, CoreResult};
use crate::identity::{IdentityVerifier, IssuedOtp};
use crate::ids::{Principal, Role, StudentId, TransactionId, UserId, WalletId};
use crate::ledger::store::{LedgerError, LedgerOp, LedgerStore};
use crate::ledger::transaction::{LineItem, TransactionRecord, TxKind, TxParties, TxStatus};
use crate::ledger::wallet::{Wallet, WalletKind};
use crate::money::Amount;
use crate::rules::{RuleDecision, RuleEvaluator, SpendingRule};

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// The credential a student presents at the vendor terminal.
#[derive(Debug, Clone, Deserialize)]
pub enum Credential {
    /// The guardian-set PIN.
    Pin(String),
    /// A single-use code from the student's registered device.
    Otp(String),
}

/// One cart line as submitted by the vendor terminal.
#[derive(Debug, Clone, Deserialize)]
pub struct CartItem {
    pub menu_item_id: Option<Uuid>,
    pub name: String,
    pub unit_price: Amount,
    pub quantity: u32,
}

/// What the vendor is charging: a flat amount, or an itemized cart whose
/// total is Σ price × quantity.
#[derive(Debug, Clone, Deserialize)]
pub enum Charge {
    Flat(Amount),
    Cart(Vec<CartItem>),
}

/// A vendor-initiated payment request.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    /// The college id the vendor typed in.
    pub student_external_id: String,
    pub credential: Credential,
    pub charge: Charge,
    /// Optional override for the transaction description.
    pub description: Option<String>,
}

/// A successful payment: the completed record plus the vendor's balance
/// after the credit.
#[derive(Debug, Clone)]
pub struct PaymentReceipt {
    pub transaction: TransactionRecord,
    pub vendor_balance: Amount,
}

/// A successful guardian → student transfer.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub transaction: TransactionRecord,
    pub student_balance: Amount,
}

// ---------------------------------------------------------------------------
// WalletLocks
// ---------------------------------------------------------------------------

/// Lock table keyed by wallet id.
///
/// Lock entries are never removed — a campus has a bounded wallet
/// population and a `Mutex<()>` is 16 bytes.
#[derive(Default)]
struct WalletLocks {
    table: DashMap<WalletId, Arc<Mutex<()>>>,
}

impl WalletLocks {
    fn handle(&self, wallet: WalletId) -> Arc<Mutex<()>> {
        self.table
            .entry(wallet)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Handles for a two-wallet operation, ordered by wallet id so every
    /// caller acquires them in the same order. The second handle is
    /// `None` when both sides are the same wallet.
    fn pair(&self, a: WalletId, b: WalletId) -> (Arc<Mutex<()>>, Option<Arc<Mutex<()>>>) {
        if a == b {
            return (self.handle(a), None);
        }
        let (lo, hi) = if a.as_bytes() < b.as_bytes() {
            (a, b)
        } else {
            (b, a)
        };
        (self.handle(lo), Some(self.handle(hi)))
    }
}

// ---------------------------------------------------------------------------
// TransferEngine
// ---------------------------------------------------------------------------

/// Orchestrates every balance-changing operation on the platform.
pub struct TransferEngine {
    ledger: Arc<LedgerStore>,
    rules: RuleEvaluator,
    identity: Arc<IdentityVerifier>,
    directory: Arc<Directory>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    locks: WalletLocks,
}

impl TransferEngine {
    pub fn new(
        ledger: Arc<LedgerStore>,
        rules: RuleEvaluator,
        identity: Arc<IdentityVerifier>,
        directory: Arc<Directory>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            rules,
            identity,
            directory,
            audit,
            clock,
            locks: WalletLocks::default(),
        }
    }

    /// The rule evaluator, for read-side callers (spending summaries).
    pub fn rules(&self) -> &RuleEvaluator {
        &self.rules
    }

    /// Resolves the caller's wallet from their role.
    pub fn wallet_of(&self, principal: &Principal) -> CoreResult<Wallet> {
        let kind = match principal.role {
            Role::Guardian => WalletKind::Guardian,
            Role::Vendor => WalletKind::Vendor,
            Role::Student => return self.directory.student_wallet(principal.id),
            Role::Admin => return Err(CoreError::NotFound { entity: "wallet" }),
        };
        self.ledger
            .find_wallet(principal.id, kind)?
            .ok_or(CoreError::NotFound { entity: "wallet" })
    }

    /// Applies a batch, retrying once on a storage conflict with fresh
    /// internal reads before surfacing [`CoreError::Conflict`].
    fn apply(&self, ops: &[LedgerOp]) -> CoreResult<()> {
        match self.ledger.atomic_apply(ops) {
            Err(LedgerError::Conflict) => {
                self.ledger.atomic_apply(ops).map_err(CoreError::from)
            }
            other => other.map_err(CoreError::from),
        }
    }

    // -----------------------------------------------------------------------
    // 1. Deposits
    // -----------------------------------------------------------------------

    /// Direct load onto the guardian's own wallet: COMPLETED immediately.
    pub fn deposit(
        &self,
        guardian: &Principal,
        amount: Amount,
        description: Option<&str>,
        origin: Option<&str>,
    ) -> CoreResult<(TransactionRecord, Amount)> {
        guardian.require(Role::Guardian)?;
        require_positive(amount)?;
        let wallet = self.wallet_of(guardian)?;

        let tx;
        {
            let handle = self.locks.handle(wallet.id);
            let _guard = handle.lock();
            tx = TransactionRecord::new(
                TxParties::To { to: wallet.id },
                amount,
                TxKind::Deposit,
                TxStatus::Completed,
                description.unwrap_or("Load Money"),
                guardian.id,
                self.clock.now(),
            );
            self.apply(&[
                LedgerOp::Credit {
                    wallet: wallet.id,
                    amount,
                },
                LedgerOp::InsertTransaction(tx.clone()),
            ])?;
        }

        self.audit.record(
            AuditAction::MoneyAdded,
            guardian.id,
            EntityType::Wallet,
            wallet.id.to_string(),
            serde_json::json!({ "amount": amount.paise() }),
            origin,
        );

        let balance = self.ledger.get_wallet(wallet.id)?.balance;
        Ok((tx, balance))
    }

    /// Phase one of the gateway flow: record a PENDING deposit carrying
    /// the gateway order reference. No balance effect yet.
    pub fn begin_gateway_deposit(
        &self,
        guardian: &Principal,
        amount: Amount,
        order_ref: &str,
    ) -> CoreResult<TransactionRecord> {
        guardian.require(Role::Guardian)?;
        require_positive(amount)?;
        if order_ref.trim().is_empty() {
            return Err(CoreError::Validation(
                "gateway order reference is required".to_string(),
            ));
        }
        let wallet = self.wallet_of(guardian)?;

        if self.ledger.find_by_gateway_ref(order_ref)?.is_some() {
            return Err(CoreError::AlreadyProcessed);
        }

        let tx = TransactionRecord::new(
            TxParties::To { to: wallet.id },
            amount,
            TxKind::Deposit,
            TxStatus::Pending,
            format!("Gateway order {order_ref}"),
            guardian.id,
            self.clock.now(),
        )
        .with_gateway_ref(order_ref);
        self.apply(&[LedgerOp::InsertTransaction(tx.clone())])?;
        Ok(tx)
    }

    /// Phase two: the gateway confirmed payment. Idempotent on the order
    /// reference — a duplicate callback finds the record already terminal
    /// and fails `AlreadyProcessed` without touching any balance.
    pub fn confirm_gateway_deposit(
        &self,
        order_ref: &str,
        payment_ref: Option<&str>,
        origin: Option<&str>,
    ) -> CoreResult<(TransactionRecord, Amount)> {
        let pending = self
            .ledger
            .find_by_gateway_ref(order_ref)?
            .ok_or(CoreError::NotFound {
                entity: "transaction",
            })?;
        if pending.status != TxStatus::Pending {
            return Err(CoreError::AlreadyProcessed);
        }
        let wallet = pending
            .parties
            .to_wallet()
            .ok_or(CoreError::InvalidTransaction)?;

        let note = match payment_ref {
            Some(p) => format!("Wallet recharge - Payment {p} (Order: {order_ref})"),
            None => format!("Wallet recharge (Order: {order_ref})"),
        };

        {
            let handle = self.locks.handle(wallet);
            let _guard = handle.lock();
            // Re-check under the lock: a racing confirmation may have
            // resolved the record between our probe and here.
            let fresh = self.ledger.get_transaction(pending.id)?;
            if fresh.status != TxStatus::Pending {
                return Err(CoreError::AlreadyProcessed);
            }
            self.apply(&[
                LedgerOp::Credit {
                    wallet,
                    amount: pending.amount,
                },
                LedgerOp::FinalizeTransaction {
                    id: pending.id,
                    status: TxStatus::Completed,
                    note: Some(note),
                },
            ])?;
        }

        self.audit.record(
            AuditAction::WalletRecharge,
            pending.initiated_by,
            EntityType::Transaction,
            pending.id.to_string(),
            serde_json::json!({
                "amount": pending.amount.paise(),
                "orderRef": order_ref,
                "paymentRef": payment_ref,
            }),
            origin,
        );

        let tx = self.ledger.get_transaction(pending.id)?;
        let balance = self.ledger.get_wallet(wallet)?.balance;
        Ok((tx, balance))
    }

    /// The gateway rejected the order (bad signature, cancelled payment).
    /// Terminal FAILED, no credit, annotated with the reason.
    pub fn fail_gateway_deposit(
        &self,
        order_ref: &str,
        reason: &str,
    ) -> CoreResult<TransactionRecord> {
        let pending = self
            .ledger
            .find_by_gateway_ref(order_ref)?
            .ok_or(CoreError::NotFound {
                entity: "transaction",
            })?;
        if pending.status != TxStatus::Pending {
            return Err(CoreError::AlreadyProcessed);
        }
        self.apply(&[LedgerOp::FinalizeTransaction {
            id: pending.id,
            status: TxStatus::Failed,
            note: Some(format!("{reason} (Order: {order_ref})")),
        }])?;
        self.ledger.get_transaction(pending.id).map_err(Into::into)
    }

    // -----------------------------------------------------------------------
    // 2. Guardian → student transfer
    // -----------------------------------------------------------------------

    /// Moves money from the calling guardian to one of *their* students.
    pub fn transfer_to_student(
        &self,
        guardian: &Principal,
        student_id: StudentId,
        amount: Amount,
        description: Option<&str>,
        origin: Option<&str>,
    ) -> CoreResult<TransferOutcome> {
        guardian.require(Role::Guardian)?;
        require_positive(amount)?;

        let student = self.directory.student(student_id)?;
        if student.guardian != guardian.id {
            return Err(CoreError::NotAuthorized("not this student's guardian"));
        }

        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("Transfer to {}", student.name));
        let tx =
            self.execute_guardian_transfer(guardian.id, &student, amount, description, vec![])?;

        self.audit.record(
            AuditAction::MoneyTransferred,
            guardian.id,
            EntityType::Transaction,
            tx.id.to_string(),
            serde_json::json!({ "amount": amount.paise(), "studentId": student_id }),
            origin,
        );

        let student_balance = self.directory.student_wallet(student_id)?.balance;
        Ok(TransferOutcome {
            transaction: tx,
            student_balance,
        })
    }

    /// Shared two-party executor for guardian → student movements. The
    /// money-request workflow folds its APPROVED mark into `extra_ops`
    /// so the status flip commits in the same batch as the transfer.
    pub(crate) fn execute_guardian_transfer(
        &self,
        guardian: UserId,
        student: &Student,
        amount: Amount,
        description: String,
        extra_ops: Vec<LedgerOp>,
    ) -> CoreResult<TransactionRecord> {
        let guardian_wallet = self
            .ledger
            .find_wallet(guardian, WalletKind::Guardian)?
            .ok_or(CoreError::NotFound { entity: "wallet" })?;
        let student_wallet = self.directory.student_wallet(student.id)?;

        let (first, second) = self.locks.pair(guardian_wallet.id, student_wallet.id);
        let _g1 = first.lock();
        let _g2 = second.as_ref().map(|m| m.lock());

        // Fresh read under the lock; the earlier fetch may be stale.
        let fresh = self.ledger.get_wallet(guardian_wallet.id)?;
        if fresh.balance < amount {
            return Err(CoreError::InsufficientFunds {
                available: fresh.balance,
                requested: amount,
            });
        }

        let tx = TransactionRecord::new(
            TxParties::Both {
                from: guardian_wallet.id,
                to: student_wallet.id,
            },
            amount,
            TxKind::Transfer,
            TxStatus::Completed,
            description,
            guardian,
            self.clock.now(),
        );
        let mut ops = vec![
            LedgerOp::Debit {
                wallet: guardian_wallet.id,
                amount,
            },
            LedgerOp::Credit {
                wallet: student_wallet.id,
                amount,
            },
            LedgerOp::InsertTransaction(tx.clone()),
        ];
        ops.extend(extra_ops);
        self.apply(&ops)?;
        Ok(tx)
    }

    // -----------------------------------------------------------------------
    // 3. Vendor-initiated payment
    // -----------------------------------------------------------------------

    /// The counter flow. Short-circuits on the first failing step; every
    /// credential failure is audited before the error is returned.
    pub fn vendor_payment(
        &self,
        vendor: &Principal,
        request: &PaymentRequest,
        origin: Option<&str>,
    ) -> CoreResult<PaymentReceipt> {
        vendor.require(Role::Vendor)?;

        // (a) Vendor must exist and be approved.
        let profile = match self.directory.vendor(vendor.id) {
            Ok(profile) => profile,
            Err(CoreError::NotFound { .. }) => return Err(CoreError::VendorNotApproved),
            Err(other) => return Err(other),
        };
        if !profile.approved {
            return Err(CoreError::VendorNotApproved);
        }

        // Total the charge before touching the student: a malformed cart
        // should fail fast, not mid-flow.
        let (amount, items) = total_charge(&request.charge)?;

        // (b) Student must exist and be active.
        let student = self
            .directory
            .student_by_external(&request.student_external_id)?;
        if student.status != StudentStatus::Active {
            return Err(CoreError::StudentBlocked);
        }

        // (c) Authenticate. Failures are audited with the attempted id —
        // a brute-force pattern must be visible in the trail.
        self.authenticate(vendor, &student, &request.credential, origin)?;

        // (d)–(f) Funds, limit, and the atomic movement, all inside the
        // wallet-pair critical section.
        let student_wallet = self.directory.student_wallet(student.id)?;
        let vendor_wallet = self
            .ledger
            .find_wallet(vendor.id, WalletKind::Vendor)?
            .ok_or(CoreError::NotFound { entity: "wallet" })?;

        let description = match (&request.description, items.is_empty()) {
            (Some(text), _) => text.clone(),
            (None, false) => items
                .iter()
                .map(|i| format!("{} x{}", i.name, i.quantity))
                .collect::<Vec<_>>()
                .join(", "),
            (None, true) => format!("Payment at {}", profile.store_name),
        };

        let tx;
        {
            let (first, second) = self.locks.pair(student_wallet.id, vendor_wallet.id);
            let _g1 = first.lock();
            let _g2 = second.as_ref().map(|m| m.lock());

            let fresh = self.ledger.get_wallet(student_wallet.id)?;
            if fresh.balance < amount {
                return Err(CoreError::InsufficientFunds {
                    available: fresh.balance,
                    requested: amount,
                });
            }

            let now = self.clock.now();
            if let RuleDecision::Denied {
                daily_limit,
                spent_today,
            } = self.rules.check_limit(student_wallet.id, amount, now)?
            {
                return Err(CoreError::DailyLimitExceeded {
                    daily_limit,
                    spent_today,
                });
            }

            tx = TransactionRecord::new(
                TxParties::Both {
                    from: student_wallet.id,
                    to: vendor_wallet.id,
                },
                amount,
                TxKind::Payment,
                TxStatus::Completed,
                description,
                vendor.id,
                now,
            )
            .with_items(items.clone());
            self.apply(&[
                LedgerOp::Debit {
                    wallet: student_wallet.id,
                    amount,
                },
                LedgerOp::Credit {
                    wallet: vendor_wallet.id,
                    amount,
                },
                LedgerOp::InsertTransaction(tx.clone()),
            ])?;
        }

        let item_details: Vec<serde_json::Value> = items
            .iter()
            .map(|i| {
                serde_json::json!({
                    "name": i.name,
                    "price": i.unit_price.paise(),
                    "quantity": i.quantity,
                })
            })
            .collect();
        self.audit.record(
            AuditAction::VendorPayment,
            vendor.id,
            EntityType::Transaction,
            tx.id.to_string(),
            serde_json::json!({
                "amount": amount.paise(),
                "studentId": student.id,
                "studentCollegeId": request.student_external_id,
                "items": item_details,
            }),
            origin,
        );

        let vendor_balance = self.ledger.get_wallet(vendor_wallet.id)?.balance;
        Ok(PaymentReceipt {
            transaction: tx,
            vendor_balance,
        })
    }

    fn authenticate(
        &self,
        vendor: &Principal,
        student: &Student,
        credential: &Credential,
        origin: Option<&str>,
    ) -> CoreResult<()> {
        match credential {
            Credential::Pin(pin) => {
                if !self.identity.verify_pin(pin, &student.pin_hash)? {
                    self.audit.record(
                        AuditAction::FailedPinAttempt,
                        vendor.id,
                        EntityType::Student,
                        student.id.to_string(),
                        serde_json::json!({ "studentId": student.external_id }),
                        origin,
                    );
                    return Err(CoreError::AuthenticationFailed);
                }
            }
            Credential::Otp(code) => {
                match self.identity.validate_otp(&student.external_id, code) {
                    Ok(validated) if validated == student.id => {}
                    outcome => {
                        let reason = match outcome {
                            Err(e) => e.to_string(),
                            Ok(_) => "code bound to a different student".to_string(),
                        };
                        self.audit.record(
                            AuditAction::FailedOtpAttempt,
                            vendor.id,
                            EntityType::Student,
                            student.id.to_string(),
                            serde_json::json!({
                                "studentId": student.external_id,
                                "error": reason,
                            }),
                            origin,
                        );
                        return Err(CoreError::AuthenticationFailed);
                    }
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // 4. Withdrawal & settlement
    // -----------------------------------------------------------------------

    /// Vendor requests a withdrawal. The debit happens *now*: the money
    /// leaves the vendor ledger immediately and rides the PENDING record
    /// until an admin settles it.
    pub fn request_withdrawal(
        &self,
        vendor: &Principal,
        amount: Amount,
        origin: Option<&str>,
    ) -> CoreResult<TransactionRecord> {
        vendor.require(Role::Vendor)?;
        require_positive(amount)?;
        let wallet = self
            .ledger
            .find_wallet(vendor.id, WalletKind::Vendor)?
            .ok_or(CoreError::NotFound { entity: "wallet" })?;

        let tx;
        {
            let handle = self.locks.handle(wallet.id);
            let _guard = handle.lock();

            let fresh = self.ledger.get_wallet(wallet.id)?;
            if fresh.balance < amount {
                return Err(CoreError::InsufficientFunds {
                    available: fresh.balance,
                    requested: amount,
                });
            }

            tx = TransactionRecord::new(
                TxParties::From { from: wallet.id },
                amount,
                TxKind::Withdrawal,
                TxStatus::Pending,
                "Settlement Request",
                vendor.id,
                self.clock.now(),
            );
            self.apply(&[
                LedgerOp::Debit {
                    wallet: wallet.id,
                    amount,
                },
                LedgerOp::InsertTransaction(tx.clone()),
            ])?;
        }

        self.audit.record(
            AuditAction::WithdrawalRequested,
            vendor.id,
            EntityType::Wallet,
            wallet.id.to_string(),
            serde_json::json!({ "amount": amount.paise() }),
            origin,
        );
        Ok(tx)
    }

    /// Admin finalizes a PENDING withdrawal. Idempotent in the safe
    /// direction: settling anything that isn't a PENDING withdrawal —
    /// including an already-settled one — fails `InvalidTransaction` and
    /// moves no money.
    pub fn settle_withdrawal(
        &self,
        admin: &Principal,
        transaction_id: TransactionId,
        origin: Option<&str>,
    ) -> CoreResult<TransactionRecord> {
        admin.require(Role::Admin)?;

        let tx = match self.ledger.get_transaction(transaction_id) {
            Ok(tx) => tx,
            Err(LedgerError::TransactionNotFound(_)) => {
                return Err(CoreError::InvalidTransaction)
            }
            Err(other) => return Err(other.into()),
        };
        if tx.kind != TxKind::Withdrawal || tx.status != TxStatus::Pending {
            return Err(CoreError::InvalidTransaction);
        }

        let result = self.apply(&[LedgerOp::FinalizeTransaction {
            id: transaction_id,
            status: TxStatus::Completed,
            note: Some("Settled by Admin".to_string()),
        }]);
        if let Err(err) = result {
            // A racing settle beat us to the terminal transition.
            return Err(match err {
                CoreError::AlreadyProcessed => CoreError::InvalidTransaction,
                other => other,
            });
        }

        self.audit.record(
            AuditAction::SettlementApproved,
            admin.id,
            EntityType::Transaction,
            transaction_id.to_string(),
            serde_json::json!({}),
            origin,
        );
        self.ledger.get_transaction(transaction_id).map_err(Into::into)
    }

    // -----------------------------------------------------------------------
    // Spending rules
    // -----------------------------------------------------------------------

    /// Guardian (owner) or admin sets the daily limit on a student's
    /// wallet. A second call updates the existing rule in place; a zero
    /// or absent limit leaves the rule present but inactive.
    pub fn set_spending_limit(
        &self,
        caller: &Principal,
        student_id: StudentId,
        daily_limit: Option<Amount>,
        allowed_vendors: Vec<UserId>,
        origin: Option<&str>,
    ) -> CoreResult<SpendingRule> {
        let student = self.directory.student(student_id)?;
        match caller.role {
            Role::Admin => {}
            Role::Guardian if student.guardian == caller.id => {}
            Role::Guardian => {
                return Err(CoreError::NotAuthorized("not this student's guardian"))
            }
            _ => return Err(CoreError::NotAuthorized("role mismatch")),
        }

        let wallet = self.directory.student_wallet(student_id)?;
        let now = self.clock.now();
        let active = daily_limit.map_or(false, |limit| !limit.is_zero());

        let rule = match self.ledger.get_rule(wallet.id)? {
            Some(existing) => SpendingRule {
                daily_limit,
                allowed_vendors,
                active,
                updated_at: now,
                ..existing
            },
            None => SpendingRule {
                id: Uuid::new_v4(),
                wallet_id: wallet.id,
                daily_limit,
                allowed_vendors,
                active,
                created_by: caller.id,
                created_at: now,
                updated_at: now,
            },
        };
        self.ledger.put_rule(&rule)?;

        self.audit.record(
            AuditAction::SpendingLimitSet,
            caller.id,
            EntityType::WalletRule,
            rule.id.to_string(),
            serde_json::json!({
                "studentId": student_id,
                "dailyLimit": daily_limit.map(|l| l.paise()),
            }),
            origin,
        );
        Ok(rule)
    }

    // -----------------------------------------------------------------------
    // Device registration & OTP issuance (student app surface)
    // -----------------------------------------------------------------------

    /// Binds a device to the calling student. The biometric gate already
    /// happened on the device; this records the result.
    pub fn register_device(
        &self,
        student: &Principal,
        device_key: &str,
        device_name: Option<&str>,
        origin: Option<&str>,
    ) -> CoreResult<()> {
        student.require(Role::Student)?;
        if device_key.trim().is_empty() {
            return Err(CoreError::Validation("device key is required".to_string()));
        }
        // The student must exist; a dangling binding would be unusable.
        let record = self.directory.student(student.id)?;
        self.identity
            .register_device(device_key, record.id, device_name, self.clock.now());

        self.audit.record(
            AuditAction::DeviceRegistered,
            student.id,
            EntityType::Student,
            record.id.to_string(),
            serde_json::json!({ "deviceName": device_name }),
            origin,
        );
        Ok(())
    }

    /// Issues a payment OTP to the calling student, gated on an active
    /// account and a registered device.
    pub fn issue_otp(
        &self,
        student: &Principal,
        device_key: &str,
        origin: Option<&str>,
    ) -> CoreResult<IssuedOtp> {
        student.require(Role::Student)?;
        let record = self.directory.student(student.id)?;
        if record.status != StudentStatus::Active {
            return Err(CoreError::StudentBlocked);
        }

        let issued = self
            .identity
            .issue_otp(device_key, &record.external_id, record.id)?;

        self.audit.record(
            AuditAction::OtpGenerated,
            student.id,
            EntityType::Student,
            record.id.to_string(),
            serde_json::json!({}),
            origin,
        );
        Ok(issued)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn require_positive(amount: Amount) -> CoreResult<()> {
    if amount.is_zero() {
        return Err(CoreError::Validation(
            "amount must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Totals a charge. Flat amounts pass through; carts are summed with
/// checked arithmetic and converted into ledger line items.
fn total_charge(charge: &Charge) -> CoreResult<(Amount, Vec<LineItem>)> {
    match charge {
        Charge::Flat(amount) => {
            require_positive(*amount)?;
            Ok((*amount, Vec::new()))
        }
        Charge::Cart(items) => {
            if items.is_empty() {
                return Err(CoreError::Validation("cart is empty".to_string()));
            }
            if items.len() > config::MAX_CART_ITEMS {
                return Err(CoreError::Validation(format!(
                    "cart exceeds {} items",
                    config::MAX_CART_ITEMS
                )));
            }
            let mut total = Amount::ZERO;
            let mut lines = Vec::with_capacity(items.len());
            for item in items {
                if item.quantity == 0 {
                    return Err(CoreError::Validation(format!(
                        "zero quantity for item {:?}",
                        item.name
                    )));
                }
                let line = LineItem {
                    menu_item_id: item.menu_item_id,
                    name: item.name.clone(),
                    unit_price: item.unit_price,
                    quantity: item.quantity,
                };
                let line_total = line
                    .line_total()
                    .ok_or_else(|| CoreError::Validation("cart total overflow".to_string()))?;
                total = total
                    .checked_add(line_total)
                    .ok_or_else(|| CoreError::Validation("cart total overflow".to_string()))?;
                lines.push(line);
            }
            require_positive(total)?;
            Ok((total, lines))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
