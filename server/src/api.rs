//! # REST API
//!
//! Builds the axum router for the platform. All endpoints share
//! application state through axum's `State` extractor.
//!
//! ## Authentication
//!
//! The fronting identity provider terminates sessions and forwards the
//! authenticated principal as two headers: `x-principal-id` (UUID) and
//! `x-principal-role` (GUARDIAN | VENDOR | ADMIN | STUDENT). Handlers
//! trust that pair; the core performs all authorization on top of it.
//! The per-payment PIN/OTP check is the only place a credential is
//! re-verified.
//!
//! ## Errors
//!
//! Failures map to structured JSON, never prose-only:
//!
//! ```json
//! { "error": { "code": "DAILY_LIMIT_EXCEEDED", "message": "...",
//!              "dailyLimit": 20000, "spentToday": 15000 } }
//! ```
//!
//! ## Endpoints
//!
//! | Method | Path                           | Caller    | Description                     |
//! |--------|--------------------------------|-----------|---------------------------------|
//! | GET    | `/health`                      | anyone    | Liveness probe                  |
//! | GET    | `/wallet`                      | any role  | Own wallet balance              |
//! | GET    | `/wallet/transactions`         | any role  | Own history (newest first)      |
//! | POST   | `/wallet/deposit`              | guardian  | Direct load                     |
//! | POST   | `/gateway/orders`              | guardian  | Begin gateway deposit           |
//! | POST   | `/gateway/confirm`             | gateway   | Idempotent confirmation         |
//! | POST   | `/gateway/fail`                | gateway   | Mark order failed               |
//! | POST   | `/students`                    | guardian  | Create student + wallet         |
//! | GET    | `/students`                    | guardian/admin | List students              |
//! | POST   | `/students/:id/transfer`       | guardian  | Fund a student                  |
//! | POST   | `/students/:id/status`         | guardian  | Block / unblock                 |
//! | POST   | `/students/:id/pin`            | guardian  | Rotate PIN                      |
//! | GET    | `/students/:id/spending-limit` | guardian  | Limit + spent today             |
//! | POST   | `/students/:id/spending-limit` | guardian/admin | Set daily limit            |
//! | POST   | `/devices`                     | student   | Register device                 |
//! | POST   | `/otp`                         | student   | Issue payment OTP               |
//! | POST   | `/vendors`                     | vendor    | Register vendor profile         |
//! | GET    | `/vendors`                     | anyone    | Approved vendors                |
//! | POST   | `/vendors/:id/approval`        | admin     | Approve / revoke                |
//! | POST   | `/payments`                    | vendor    | Charge a student                |
//! | POST   | `/withdrawals`                 | vendor    | Request withdrawal              |
//! | POST   | `/settlements`                 | admin     | Settle a withdrawal             |
//! | POST   | `/requests`                    | student   | File a money request            |
//! | GET    | `/requests`                    | student/guardian | List money requests      |
//! | POST   | `/requests/:id/approve`        | guardian  | Approve (transfers atomically)  |
//! | POST   | `/requests/:id/reject`         | guardian  | Reject                          |
//! | GET    | `/admin/audit`                 | admin     | Query the audit trail           |
//! | GET    | `/admin/stats`                 | admin     | Platform aggregates             |

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use campuspay_core::audit::{AuditAction, AuditLog, AuditQuery, EntityType};
use campuspay_core::directory::{Directory, DirectoryStats, Student, StudentStatus};
use campuspay_core::engine::{
    CartItem, Charge, Credential, PaymentRequest, TransferEngine,
};
use campuspay_core::error::CoreError;
use campuspay_core::ids::{Principal, Role};
use campuspay_core::ledger::store::{LedgerStats, LedgerStore};
use campuspay_core::ledger::transaction::{TransactionRecord, TxKind, TxStatus};
use campuspay_core::money::Amount;
use campuspay_core::requests::{MoneyRequest, RequestWorkflow};
use campuspay_core::rules::SpendingSummary;

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state. Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TransferEngine>,
    pub store: Arc<LedgerStore>,
    pub directory: Arc<Directory>,
    pub requests: Arc<RequestWorkflow>,
    pub audit: Arc<AuditLog>,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/wallet", get(wallet_handler))
        .route("/wallet/transactions", get(wallet_transactions_handler))
        .route("/wallet/deposit", post(deposit_handler))
        .route("/gateway/orders", post(gateway_order_handler))
        .route("/gateway/confirm", post(gateway_confirm_handler))
        .route("/gateway/fail", post(gateway_fail_handler))
        .route("/students", post(create_student_handler).get(list_students_handler))
        .route("/students/:id/transfer", post(transfer_handler))
        .route("/students/:id/status", post(student_status_handler))
        .route("/students/:id/pin", post(student_pin_handler))
        .route(
            "/students/:id/spending-limit",
            get(spending_limit_get_handler).post(spending_limit_set_handler),
        )
        .route("/devices", post(register_device_handler))
        .route("/otp", post(issue_otp_handler))
        .route("/vendors", post(register_vendor_handler).get(list_vendors_handler))
        .route("/vendors/:id/approval", post(vendor_approval_handler))
        .route("/payments", post(payment_handler))
        .route("/withdrawals", post(withdrawal_handler))
        .route("/settlements", post(settlement_handler))
        .route("/requests", post(create_request_handler).get(list_requests_handler))
        .route("/requests/:id/approve", post(approve_request_handler))
        .route("/requests/:id/reject", post(reject_request_handler))
        .route("/admin/audit", get(audit_query_handler))
        .route("/admin/stats", get(stats_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// API-layer error: an HTTP status plus a structured JSON body.
pub struct ApiError {
    status: StatusCode,
    body: serde_json::Value,
}

impl ApiError {
    fn unauthenticated() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: serde_json::json!({
                "error": { "code": "UNAUTHENTICATED", "message": "missing or malformed principal headers" }
            }),
        }
    }

    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: serde_json::json!({
                "error": { "code": "VALIDATION_ERROR", "message": message }
            }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::NotAuthorized(_)
            | CoreError::DeviceNotRegistered
            | CoreError::StudentBlocked
            | CoreError::VendorNotApproved => StatusCode::FORBIDDEN,
            CoreError::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            CoreError::InsufficientFunds { .. }
            | CoreError::DailyLimitExceeded { .. }
            | CoreError::AlreadyProcessed
            | CoreError::InvalidTransaction
            | CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Conflict => StatusCode::CONFLICT,
            CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut error = serde_json::json!({
            "code": err.code(),
            "message": err.to_string(),
        });
        match &err {
            CoreError::DailyLimitExceeded {
                daily_limit,
                spent_today,
            } => {
                error["dailyLimit"] = serde_json::json!(daily_limit.paise());
                error["spentToday"] = serde_json::json!(spent_today.paise());
            }
            CoreError::InsufficientFunds {
                available,
                requested,
            } => {
                error["available"] = serde_json::json!(available.paise());
                error["requested"] = serde_json::json!(requested.paise());
            }
            _ => {}
        }

        Self {
            status,
            body: serde_json::json!({ "error": error }),
        }
    }
}

// ---------------------------------------------------------------------------
// Principal extraction
// ---------------------------------------------------------------------------

fn principal(headers: &HeaderMap) -> Result<Principal, ApiError> {
    let id = headers
        .get("x-principal-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok());
    let role = headers
        .get("x-principal-role")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<Role>().ok());

    match (id, role) {
        (Some(id), Some(role)) => Ok(Principal::new(id, role)),
        _ => Err(ApiError::unauthenticated()),
    }
}

fn origin(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------
//
// All amounts on the wire are integer paise.

#[derive(Debug, Deserialize)]
struct DepositBody {
    amount: u64,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayOrderBody {
    amount: u64,
    order_ref: String,
}

#[derive(Debug, Deserialize)]
struct GatewayConfirmBody {
    order_ref: String,
    payment_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayFailBody {
    order_ref: String,
    reason: String,
}

#[derive(Debug, Deserialize)]
struct CreateStudentBody {
    name: String,
    student_id: String,
    pin: String,
}

#[derive(Debug, Deserialize)]
struct TransferBody {
    amount: u64,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StudentStatusBody {
    status: String,
}

#[derive(Debug, Deserialize)]
struct StudentPinBody {
    new_pin: String,
}

#[derive(Debug, Deserialize)]
struct SpendingLimitBody {
    /// Daily ceiling in paise. Null or zero disables the limit.
    daily_limit: Option<u64>,
    #[serde(default)]
    allowed_vendors: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
struct RegisterDeviceBody {
    device_key: String,
    device_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IssueOtpBody {
    device_key: String,
}

#[derive(Debug, Deserialize)]
struct RegisterVendorBody {
    store_name: String,
}

#[derive(Debug, Deserialize)]
struct VendorApprovalBody {
    approved: bool,
}

#[derive(Debug, Deserialize)]
struct CartItemBody {
    menu_item_id: Option<Uuid>,
    name: String,
    price: u64,
    quantity: u32,
}

/// Mirrors the terminal payload: student id plus exactly one credential,
/// and either a flat amount or an itemized cart.
#[derive(Debug, Deserialize)]
struct PaymentBody {
    student_id: String,
    pin: Option<String>,
    otp: Option<String>,
    amount: Option<u64>,
    items: Option<Vec<CartItemBody>>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WithdrawalBody {
    amount: u64,
}

#[derive(Debug, Deserialize)]
struct SettlementBody {
    transaction_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct CreateRequestBody {
    amount: u64,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
    kind: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuditQueryParams {
    actor: Option<Uuid>,
    action: Option<String>,
    entity_type: Option<String>,
    limit: Option<usize>,
}

/// Student view without the PIN hash. The hash never crosses the API.
#[derive(Debug, Serialize)]
struct StudentDto {
    id: Uuid,
    name: String,
    student_id: String,
    status: String,
    wallet_balance: u64,
}

impl StudentDto {
    fn from_student(student: &Student, balance: Amount) -> Self {
        Self {
            id: student.id,
            name: student.name.clone(),
            student_id: student.external_id.clone(),
            status: student.status.to_string(),
            wallet_balance: balance.paise(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WalletResponse {
    wallet_id: Uuid,
    kind: String,
    balance: u64,
    currency: String,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    ledger: LedgerStats,
    directory: DirectoryStats,
}

// ---------------------------------------------------------------------------
// Handlers — health & wallet
// ---------------------------------------------------------------------------

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn wallet_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<WalletResponse>, ApiError> {
    let caller = principal(&headers)?;
    let wallet = state.engine.wallet_of(&caller)?;
    Ok(Json(WalletResponse {
        wallet_id: wallet.id,
        kind: wallet.kind.to_string(),
        balance: wallet.balance.paise(),
        currency: wallet.currency.to_string(),
    }))
}

async fn wallet_transactions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<TransactionRecord>>, ApiError> {
    let caller = principal(&headers)?;
    let wallet = state.engine.wallet_of(&caller)?;
    let limit = query
        .limit
        .unwrap_or(campuspay_core::config::DEFAULT_HISTORY_LIMIT);

    let kind = query.kind.as_deref().map(parse_kind).transpose()?;
    let status = query.status.as_deref().map(parse_status).transpose()?;

    let history = state
        .store
        .transactions_for_wallet(wallet.id, limit)
        .map_err(CoreError::from)?
        .into_iter()
        .filter(|tx| kind.map_or(true, |k| tx.kind == k))
        .filter(|tx| status.map_or(true, |s| tx.status == s))
        .collect();
    Ok(Json(history))
}

fn parse_kind(s: &str) -> Result<TxKind, ApiError> {
    match s.to_ascii_uppercase().as_str() {
        "DEPOSIT" => Ok(TxKind::Deposit),
        "TRANSFER" => Ok(TxKind::Transfer),
        "PAYMENT" => Ok(TxKind::Payment),
        "WITHDRAWAL" => Ok(TxKind::Withdrawal),
        _ => Err(ApiError::bad_request("unknown transaction kind")),
    }
}

fn parse_status(s: &str) -> Result<TxStatus, ApiError> {
    match s.to_ascii_uppercase().as_str() {
        "PENDING" => Ok(TxStatus::Pending),
        "COMPLETED" => Ok(TxStatus::Completed),
        "FAILED" => Ok(TxStatus::Failed),
        _ => Err(ApiError::bad_request("unknown transaction status")),
    }
}

// ---------------------------------------------------------------------------
// Handlers — deposits
// ---------------------------------------------------------------------------

async fn deposit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DepositBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = principal(&headers)?;
    let (tx, balance) = state.engine.deposit(
        &caller,
        Amount::from_paise(body.amount),
        body.description.as_deref(),
        origin(&headers).as_deref(),
    )?;
    state.metrics.deposits_total.inc();
    Ok(Json(serde_json::json!({
        "transaction": tx,
        "balance": balance.paise(),
    })))
}

async fn gateway_order_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<GatewayOrderBody>,
) -> Result<Json<TransactionRecord>, ApiError> {
    let caller = principal(&headers)?;
    let tx = state.engine.begin_gateway_deposit(
        &caller,
        Amount::from_paise(body.amount),
        &body.order_ref,
    )?;
    Ok(Json(tx))
}

async fn gateway_confirm_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<GatewayConfirmBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Called by the fronting gateway adapter after it verified the
    // provider signature; any authenticated principal may relay it.
    principal(&headers)?;
    let (tx, balance) = state.engine.confirm_gateway_deposit(
        &body.order_ref,
        body.payment_ref.as_deref(),
        origin(&headers).as_deref(),
    )?;
    state.metrics.deposits_total.inc();
    Ok(Json(serde_json::json!({
        "transaction": tx,
        "balance": balance.paise(),
    })))
}

async fn gateway_fail_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<GatewayFailBody>,
) -> Result<Json<TransactionRecord>, ApiError> {
    principal(&headers)?;
    let tx = state
        .engine
        .fail_gateway_deposit(&body.order_ref, &body.reason)?;
    Ok(Json(tx))
}

// ---------------------------------------------------------------------------
// Handlers — students
// ---------------------------------------------------------------------------

async fn create_student_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateStudentBody>,
) -> Result<(StatusCode, Json<StudentDto>), ApiError> {
    let caller = principal(&headers)?;
    let student = state.directory.create_student(
        &caller,
        &body.name,
        &body.student_id,
        &body.pin,
        origin(&headers).as_deref(),
    )?;
    let balance = state.directory.student_wallet(student.id)?.balance;
    Ok((
        StatusCode::CREATED,
        Json(StudentDto::from_student(&student, balance)),
    ))
}

async fn list_students_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<StudentDto>>, ApiError> {
    let caller = principal(&headers)?;
    let students = match caller.role {
        Role::Guardian => state.directory.students_of(caller.id)?,
        Role::Admin => state.directory.list_students()?,
        _ => return Err(CoreError::NotAuthorized("role mismatch").into()),
    };

    let mut out = Vec::with_capacity(students.len());
    for student in &students {
        let balance = state.directory.student_wallet(student.id)?.balance;
        out.push(StudentDto::from_student(student, balance));
    }
    Ok(Json(out))
}

async fn transfer_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(student_id): Path<Uuid>,
    Json(body): Json<TransferBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = principal(&headers)?;
    let outcome = state.engine.transfer_to_student(
        &caller,
        student_id,
        Amount::from_paise(body.amount),
        body.description.as_deref(),
        origin(&headers).as_deref(),
    )?;
    state.metrics.transfers_total.inc();
    Ok(Json(serde_json::json!({
        "transaction": outcome.transaction,
        "student_balance": outcome.student_balance.paise(),
    })))
}

async fn student_status_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(student_id): Path<Uuid>,
    Json(body): Json<StudentStatusBody>,
) -> Result<Json<StudentDto>, ApiError> {
    let caller = principal(&headers)?;
    let status = match body.status.to_ascii_uppercase().as_str() {
        "ACTIVE" => StudentStatus::Active,
        "BLOCKED" => StudentStatus::Blocked,
        _ => return Err(ApiError::bad_request("status must be ACTIVE or BLOCKED")),
    };
    let student =
        state
            .directory
            .set_status(&caller, student_id, status, origin(&headers).as_deref())?;
    let balance = state.directory.student_wallet(student.id)?.balance;
    Ok(Json(StudentDto::from_student(&student, balance)))
}

async fn student_pin_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(student_id): Path<Uuid>,
    Json(body): Json<StudentPinBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = principal(&headers)?;
    state.directory.update_pin(
        &caller,
        student_id,
        &body.new_pin,
        origin(&headers).as_deref(),
    )?;
    Ok(Json(serde_json::json!({ "message": "PIN updated" })))
}

async fn spending_limit_get_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(student_id): Path<Uuid>,
) -> Result<Json<SpendingSummary>, ApiError> {
    let caller = principal(&headers)?;
    let student = state.directory.student(student_id)?;
    if caller.role != Role::Admin && student.guardian != caller.id {
        return Err(CoreError::NotAuthorized("not this student's guardian").into());
    }
    let wallet = state.directory.student_wallet(student_id)?;
    let summary = state
        .engine
        .rules()
        .spending_summary(wallet.id, chrono::Utc::now())?;
    Ok(Json(summary))
}

async fn spending_limit_set_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(student_id): Path<Uuid>,
    Json(body): Json<SpendingLimitBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = principal(&headers)?;
    let rule = state.engine.set_spending_limit(
        &caller,
        student_id,
        body.daily_limit.map(Amount::from_paise),
        body.allowed_vendors,
        origin(&headers).as_deref(),
    )?;
    Ok(Json(serde_json::json!({
        "daily_limit": rule.daily_limit.map(|l| l.paise()),
        "active": rule.active,
    })))
}

// ---------------------------------------------------------------------------
// Handlers — student app (devices & OTP)
// ---------------------------------------------------------------------------

async fn register_device_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RegisterDeviceBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = principal(&headers)?;
    state.engine.register_device(
        &caller,
        &body.device_key,
        body.device_name.as_deref(),
        origin(&headers).as_deref(),
    )?;
    Ok(Json(serde_json::json!({ "message": "device registered" })))
}

async fn issue_otp_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<IssueOtpBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = principal(&headers)?;
    let issued = state
        .engine
        .issue_otp(&caller, &body.device_key, origin(&headers).as_deref())?;
    Ok(Json(serde_json::json!({
        "otp": issued.code,
        "expires_at": issued.expires_at,
    })))
}

// ---------------------------------------------------------------------------
// Handlers — vendors
// ---------------------------------------------------------------------------

async fn register_vendor_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RegisterVendorBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let caller = principal(&headers)?;
    let profile =
        state
            .directory
            .register_vendor(&caller, &body.store_name, origin(&headers).as_deref())?;
    Ok((StatusCode::CREATED, Json(serde_json::json!(profile))))
}

async fn list_vendors_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let vendors = state.directory.approved_vendors()?;
    Ok(Json(serde_json::json!(vendors)))
}

async fn vendor_approval_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(vendor_user): Path<Uuid>,
    Json(body): Json<VendorApprovalBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = principal(&headers)?;
    let profile = state.directory.set_vendor_approval(
        &caller,
        vendor_user,
        body.approved,
        origin(&headers).as_deref(),
    )?;
    Ok(Json(serde_json::json!(profile)))
}

// ---------------------------------------------------------------------------
// Handlers — payments, withdrawals, settlement
// ---------------------------------------------------------------------------

async fn payment_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PaymentBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = principal(&headers)?;

    // OTP takes precedence when both are supplied, matching the terminal
    // firmware's behavior.
    let credential = match (&body.otp, &body.pin) {
        (Some(otp), _) => Credential::Otp(otp.clone()),
        (None, Some(pin)) => Credential::Pin(pin.clone()),
        (None, None) => return Err(ApiError::bad_request("a PIN or OTP is required")),
    };
    let charge = match (&body.items, body.amount) {
        (Some(items), _) if !items.is_empty() => Charge::Cart(
            items
                .iter()
                .map(|i| CartItem {
                    menu_item_id: i.menu_item_id,
                    name: i.name.clone(),
                    unit_price: Amount::from_paise(i.price),
                    quantity: i.quantity,
                })
                .collect(),
        ),
        (_, Some(amount)) => Charge::Flat(Amount::from_paise(amount)),
        _ => return Err(ApiError::bad_request("an amount or items are required")),
    };

    let request = PaymentRequest {
        student_external_id: body.student_id.clone(),
        credential,
        charge,
        description: body.description.clone(),
    };

    let started = Instant::now();
    let result = state
        .engine
        .vendor_payment(&caller, &request, origin(&headers).as_deref());
    state
        .metrics
        .payment_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(receipt) => {
            state.metrics.payments_total.inc();
            Ok(Json(serde_json::json!({
                "transaction": receipt.transaction,
                "vendor_balance": receipt.vendor_balance.paise(),
            })))
        }
        Err(err) => {
            state.metrics.payment_failures_total.inc();
            Err(err.into())
        }
    }
}

async fn withdrawal_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<WithdrawalBody>,
) -> Result<Json<TransactionRecord>, ApiError> {
    let caller = principal(&headers)?;
    let tx = state.engine.request_withdrawal(
        &caller,
        Amount::from_paise(body.amount),
        origin(&headers).as_deref(),
    )?;
    state.metrics.withdrawal_requests_total.inc();
    Ok(Json(tx))
}

async fn settlement_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SettlementBody>,
) -> Result<Json<TransactionRecord>, ApiError> {
    let caller = principal(&headers)?;
    let tx = state.engine.settle_withdrawal(
        &caller,
        body.transaction_id,
        origin(&headers).as_deref(),
    )?;
    state.metrics.settlements_total.inc();
    Ok(Json(tx))
}

// ---------------------------------------------------------------------------
// Handlers — money requests
// ---------------------------------------------------------------------------

async fn create_request_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateRequestBody>,
) -> Result<(StatusCode, Json<MoneyRequest>), ApiError> {
    let caller = principal(&headers)?;
    let request = state.requests.create(
        &caller,
        Amount::from_paise(body.amount),
        body.reason.as_deref(),
    )?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn list_requests_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<MoneyRequest>>, ApiError> {
    let caller = principal(&headers)?;
    let requests = match caller.role {
        Role::Student => state.requests.list_for_student(&caller)?,
        Role::Guardian => state.requests.list_for_guardian(&caller)?,
        _ => return Err(CoreError::NotAuthorized("role mismatch").into()),
    };
    Ok(Json(requests))
}

async fn approve_request_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(request_id): Path<Uuid>,
) -> Result<Json<MoneyRequest>, ApiError> {
    let caller = principal(&headers)?;
    let request = state.requests.approve(&caller, request_id)?;
    state.metrics.transfers_total.inc();
    Ok(Json(request))
}

async fn reject_request_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(request_id): Path<Uuid>,
) -> Result<Json<MoneyRequest>, ApiError> {
    let caller = principal(&headers)?;
    let request = state.requests.reject(&caller, request_id)?;
    Ok(Json(request))
}

// ---------------------------------------------------------------------------
// Handlers — admin
// ---------------------------------------------------------------------------

async fn audit_query_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = principal(&headers)?;
    caller.require(Role::Admin)?;

    let action = params
        .action
        .as_deref()
        .map(|s| {
            s.parse::<AuditAction>()
                .map_err(|_| ApiError::bad_request("unknown audit action"))
        })
        .transpose()?;
    let entity_type = params
        .entity_type
        .as_deref()
        .map(parse_entity_type)
        .transpose()?;

    let entries = state.audit.query(&AuditQuery {
        actor: params.actor,
        action,
        entity_type,
        from: None,
        to: None,
        limit: params.limit.unwrap_or(0),
    })?;
    Ok(Json(serde_json::json!(entries)))
}

fn parse_entity_type(s: &str) -> Result<EntityType, ApiError> {
    match s.to_ascii_uppercase().as_str() {
        "STUDENT" => Ok(EntityType::Student),
        "WALLET" => Ok(EntityType::Wallet),
        "TRANSACTION" => Ok(EntityType::Transaction),
        "WALLET_RULE" => Ok(EntityType::WalletRule),
        "VENDOR" => Ok(EntityType::Vendor),
        "MONEY_REQUEST" => Ok(EntityType::MoneyRequest),
        _ => Err(ApiError::bad_request("unknown entity type")),
    }
}

async fn stats_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatsResponse>, ApiError> {
    let caller = principal(&headers)?;
    caller.require(Role::Admin)?;

    let ledger = state.store.ledger_stats().map_err(CoreError::from)?;
    let directory = state.directory.stats()?;
    Ok(Json(StatsResponse { ledger, directory }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
