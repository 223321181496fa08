//! # Directory — Student & Vendor Registries
//!
//! Students are non-authenticating principals created and administered by
//! their guardian; vendors are accounts that must be approved by an admin
//! before they can charge anyone. Both live in their own trees of the
//! ledger database, and both get their wallet the moment they are created
//! — a wallet's owner always exists before the wallet's first transaction.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sled::Tree;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLog, EntityType};
use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::identity::pin;
use crate::ids::{Principal, Role, StudentId, UserId};
use crate::ledger::store::{LedgerError, LedgerStore};
use crate::ledger::wallet::{Wallet, WalletKind, WalletOwner};

// ---------------------------------------------------------------------------
// Student
// ---------------------------------------------------------------------------

/// Guardian-controlled lifecycle switch. A blocked student cannot pay,
/// full stop — the payment state machine checks this before touching
/// credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudentStatus {
    Active,
    Blocked,
}

impl fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Blocked => write!(f, "BLOCKED"),
        }
    }
}

/// A student record.
///
/// `external_id` is the human-entered college id printed on the student's
/// card — unique platform-wide, because it is what vendors type at the
/// terminal. `pin_hash` never leaves the core; presentation DTOs must
/// not carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub external_id: String,
    pub pin_hash: String,
    pub guardian: UserId,
    pub status: StudentStatus,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Vendor
// ---------------------------------------------------------------------------

/// A vendor profile. `approved` starts false; an admin flips it before
/// the vendor can process a single payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorProfile {
    pub user_id: UserId,
    pub store_name: String,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

/// Headcount aggregation for the admin dashboard.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DirectoryStats {
    pub students: usize,
    pub active_students: usize,
    pub blocked_students: usize,
    pub vendors: usize,
    pub approved_vendors: usize,
    pub pending_vendors: usize,
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Student and vendor registry.
///
/// | Tree          | Key                     | Value                    |
/// |---------------|-------------------------|--------------------------|
/// | `students`    | student id (16B)        | `bincode(Student)`       |
/// | `student_ids` | external id (UTF-8)     | student id (16B)         |
/// | `vendors`     | user id (16B)           | `bincode(VendorProfile)` |
pub struct Directory {
    ledger: Arc<LedgerStore>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    students: Tree,
    student_ids: Tree,
    vendors: Tree,
    /// Serializes create/update so the external-id uniqueness check can't
    /// race with itself.
    write: Mutex<()>,
}

impl Directory {
    pub fn open(
        ledger: Arc<LedgerStore>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
    ) -> CoreResult<Self> {
        let students = ledger.open_tree("students")?;
        let student_ids = ledger.open_tree("student_ids")?;
        let vendors = ledger.open_tree("vendors")?;
        Ok(Self {
            ledger,
            audit,
            clock,
            students,
            student_ids,
            vendors,
            write: Mutex::new(()),
        })
    }

    // -- Students -----------------------------------------------------------

    /// Guardian creates a student: record, unique external id, hashed PIN,
    /// and a zero-balance student wallet, in that order.
    pub fn create_student(
        &self,
        guardian: &Principal,
        name: &str,
        external_id: &str,
        pin: &str,
        origin: Option<&str>,
    ) -> CoreResult<Student> {
        guardian.require(Role::Guardian)?;
        if name.trim().is_empty() || external_id.trim().is_empty() {
            return Err(CoreError::Validation(
                "name and student id are required".to_string(),
            ));
        }
        let pin_hash = pin::hash_pin(pin)?;

        let _guard = self.write.lock();
        if self.student_ids.get(external_id.as_bytes()).map_err(LedgerError::Storage)?.is_some() {
            return Err(CoreError::Validation(
                "student id already exists".to_string(),
            ));
        }

        let student = Student {
            id: Uuid::new_v4(),
            name: name.to_string(),
            external_id: external_id.to_string(),
            pin_hash,
            guardian: guardian.id,
            status: StudentStatus::Active,
            created_at: self.clock.now(),
        };
        self.put_student(&student)?;
        self.student_ids
            .insert(external_id.as_bytes(), student.id.as_bytes())
            .map_err(LedgerError::Storage)?;

        self.ledger.create_wallet(
            WalletOwner::Student(student.id),
            WalletKind::Student,
            self.clock.now(),
        )?;

        self.audit.record(
            AuditAction::StudentCreated,
            guardian.id,
            EntityType::Student,
            student.id.to_string(),
            serde_json::json!({ "name": name, "studentId": external_id }),
            origin,
        );
        Ok(student)
    }

    /// Lookup by internal id.
    pub fn student(&self, id: StudentId) -> CoreResult<Student> {
        match self.students.get(id.as_bytes()).map_err(LedgerError::Storage)? {
            Some(bytes) => decode(&bytes),
            None => Err(CoreError::NotFound { entity: "student" }),
        }
    }

    /// Lookup by the external id vendors type at the terminal.
    pub fn student_by_external(&self, external_id: &str) -> CoreResult<Student> {
        let id_bytes = self
            .student_ids
            .get(external_id.as_bytes())
            .map_err(LedgerError::Storage)?
            .ok_or(CoreError::NotFound { entity: "student" })?;
        let id = Uuid::from_slice(&id_bytes)
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        self.student(id)
    }

    /// All students of one guardian.
    pub fn students_of(&self, guardian: UserId) -> CoreResult<Vec<Student>> {
        let mut out = Vec::new();
        for item in self.students.iter() {
            let (_, bytes) = item.map_err(LedgerError::Storage)?;
            let student: Student = decode(&bytes)?;
            if student.guardian == guardian {
                out.push(student);
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    /// Every student, for the admin surface.
    pub fn list_students(&self) -> CoreResult<Vec<Student>> {
        let mut out: Vec<Student> = Vec::new();
        for item in self.students.iter() {
            let (_, bytes) = item.map_err(LedgerError::Storage)?;
            out.push(decode(&bytes)?);
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    /// Guardian rotates a student's PIN.
    pub fn update_pin(
        &self,
        guardian: &Principal,
        student_id: StudentId,
        new_pin: &str,
        origin: Option<&str>,
    ) -> CoreResult<()> {
        guardian.require(Role::Guardian)?;
        let pin_hash = pin::hash_pin(new_pin)?;

        let _guard = self.write.lock();
        let mut student = self.student(student_id)?;
        if student.guardian != guardian.id {
            return Err(CoreError::NotAuthorized("not this student's guardian"));
        }
        student.pin_hash = pin_hash;
        self.put_student(&student)?;

        self.audit.record(
            AuditAction::StudentPinUpdated,
            guardian.id,
            EntityType::Student,
            student_id.to_string(),
            serde_json::json!({}),
            origin,
        );
        Ok(())
    }

    /// Guardian blocks or unblocks a student.
    pub fn set_status(
        &self,
        guardian: &Principal,
        student_id: StudentId,
        status: StudentStatus,
        origin: Option<&str>,
    ) -> CoreResult<Student> {
        guardian.require(Role::Guardian)?;

        let _guard = self.write.lock();
        let mut student = self.student(student_id)?;
        if student.guardian != guardian.id {
            return Err(CoreError::NotAuthorized("not this student's guardian"));
        }
        student.status = status;
        self.put_student(&student)?;

        self.audit.record(
            AuditAction::StudentStatusUpdated,
            guardian.id,
            EntityType::Student,
            student_id.to_string(),
            serde_json::json!({ "status": status.to_string() }),
            origin,
        );
        Ok(student)
    }

    fn put_student(&self, student: &Student) -> CoreResult<()> {
        self.students
            .insert(student.id.as_bytes(), encode(student)?)
            .map_err(LedgerError::Storage)?;
        Ok(())
    }

    // -- Vendors ------------------------------------------------------------

    /// Registers a vendor profile (unapproved) and its wallet.
    pub fn register_vendor(
        &self,
        vendor: &Principal,
        store_name: &str,
        origin: Option<&str>,
    ) -> CoreResult<VendorProfile> {
        vendor.require(Role::Vendor)?;
        if store_name.trim().is_empty() {
            return Err(CoreError::Validation("store name is required".to_string()));
        }

        let _guard = self.write.lock();
        if self.vendors.get(vendor.id.as_bytes()).map_err(LedgerError::Storage)?.is_some() {
            return Err(CoreError::Validation(
                "vendor already registered".to_string(),
            ));
        }

        let profile = VendorProfile {
            user_id: vendor.id,
            store_name: store_name.to_string(),
            approved: false,
            created_at: self.clock.now(),
        };
        self.put_vendor(&profile)?;
        self.ledger.create_wallet(
            WalletOwner::User(vendor.id),
            WalletKind::Vendor,
            self.clock.now(),
        )?;

        self.audit.record(
            AuditAction::VendorRegistered,
            vendor.id,
            EntityType::Vendor,
            vendor.id.to_string(),
            serde_json::json!({ "storeName": store_name }),
            origin,
        );
        Ok(profile)
    }

    /// Lookup a vendor profile by its account id.
    pub fn vendor(&self, user_id: UserId) -> CoreResult<VendorProfile> {
        match self.vendors.get(user_id.as_bytes()).map_err(LedgerError::Storage)? {
            Some(bytes) => decode(&bytes),
            None => Err(CoreError::NotFound { entity: "vendor" }),
        }
    }

    /// Admin approves (or revokes approval for) a vendor.
    pub fn set_vendor_approval(
        &self,
        admin: &Principal,
        vendor_user: UserId,
        approved: bool,
        origin: Option<&str>,
    ) -> CoreResult<VendorProfile> {
        admin.require(Role::Admin)?;

        let _guard = self.write.lock();
        let mut profile = self.vendor(vendor_user)?;
        profile.approved = approved;
        self.put_vendor(&profile)?;

        self.audit.record(
            AuditAction::VendorApproved,
            admin.id,
            EntityType::Vendor,
            vendor_user.to_string(),
            serde_json::json!({ "approved": approved }),
            origin,
        );
        Ok(profile)
    }

    /// Vendors students are allowed to see: approved only.
    pub fn approved_vendors(&self) -> CoreResult<Vec<VendorProfile>> {
        Ok(self
            .all_vendors()?
            .into_iter()
            .filter(|v| v.approved)
            .collect())
    }

    /// Every vendor, for the admin surface.
    pub fn all_vendors(&self) -> CoreResult<Vec<VendorProfile>> {
        let mut out: Vec<VendorProfile> = Vec::new();
        for item in self.vendors.iter() {
            let (_, bytes) = item.map_err(LedgerError::Storage)?;
            out.push(decode(&bytes)?);
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    fn put_vendor(&self, profile: &VendorProfile) -> CoreResult<()> {
        self.vendors
            .insert(profile.user_id.as_bytes(), encode(profile)?)
            .map_err(LedgerError::Storage)?;
        Ok(())
    }

    // -- Reporting ----------------------------------------------------------

    /// Headcounts for the admin dashboard.
    pub fn stats(&self) -> CoreResult<DirectoryStats> {
        let mut stats = DirectoryStats::default();
        for student in self.list_students()? {
            stats.students += 1;
            match student.status {
                StudentStatus::Active => stats.active_students += 1,
                StudentStatus::Blocked => stats.blocked_students += 1,
            }
        }
        for vendor in self.all_vendors()? {
            stats.vendors += 1;
            if vendor.approved {
                stats.approved_vendors += 1;
            } else {
                stats.pending_vendors += 1;
            }
        }
        Ok(stats)
    }

    /// The student's wallet. Provided here because "student → wallet" is
    /// the join every caller needs right after a directory lookup.
    pub fn student_wallet(&self, student: StudentId) -> CoreResult<Wallet> {
        self.ledger
            .find_wallet(student, WalletKind::Student)?
            .ok_or(CoreError::NotFound { entity: "wallet" })
    }
}

fn encode<T: Serialize>(value: &T) -> CoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| CoreError::Storage(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> CoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| CoreError::Storage(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
