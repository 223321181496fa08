// Copyright (c) 2026 CampusPay Contributors. MIT License.
// See LICENSE for details.

//! # CampusPay — Ledger & Rule-Enforcement Core
//!
//! The beating heart of a closed-loop campus payment platform. Guardians
//! load money, provision PIN-protected student sub-wallets, and set spending
//! rules; vendors charge those wallets at the counter; an administrator
//! settles vendor withdrawals. Everything that touches a balance flows
//! through this crate.
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the actual concerns of a
//! money-moving system:
//!
//! - **money** — Fixed-point amounts. Integers only; floats never touch a balance.
//! - **ledger** — Wallets, immutable transaction records, and the storage
//!   engine with its all-or-nothing batch primitive.
//! - **rules** — The daily-spending-limit evaluator.
//! - **identity** — PIN hashing and the single-use OTP contract.
//! - **directory** — Student and vendor registries.
//! - **engine** — The transfer engine: deposits, transfers, vendor payments,
//!   withdrawals, and settlement, each behind a per-wallet lock.
//! - **requests** — The guardian-approval workflow for student money requests.
//! - **audit** — Append-only audit trail, best-effort by design.
//! - **clock** — Injected time source so tests never sleep.
//! - **config** — Platform constants and limits.
//!
//! ## Design Philosophy
//!
//! 1. A balance never goes negative as the result of a successful operation.
//! 2. Terminal transaction states are immutable. PENDING resolves exactly once.
//! 3. Check-then-act sequences hold the wallet lock for their whole duration.
//! 4. If it touches money, it has tests. Plural.

pub mod audit;
pub mod clock;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod identity;
pub mod ids;
pub mod ledger;
pub mod money;
pub mod requests;
pub mod rules;
