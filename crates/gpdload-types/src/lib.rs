//! Shared types for gpdload.
//!
//! Design goal: mirror the GPD-Upload wire format exactly.
//! Payload documents serialize with the camelCase keys the service expects;
//! status and report DTOs are read-only views of remote state.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const LOAD_SCHEMA_V1: &str = "gpdload.load.v1";
pub const RUN_SCHEMA_V1: &str = "gpdload.run.v1";

/// Name of the single entry a well-formed upload archive carries.
pub const PAYMENT_POSITIONS_ENTRY: &str = "payment-positions.json";

pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
pub const CANARY_HEADER: &str = "X-Canary";
pub const CANARY_VALUE: &str = "canary";

// ----------------------------
// Payload documents
// ----------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Metadata {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub id_transfer: String,

    /// Amount in the smallest currency unit.
    pub amount: i64,

    pub remittance_information: String,
    pub category: String,
    pub iban: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,

    #[serde(default)]
    pub transfer_metadata: Vec<Metadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOption {
    pub iuv: String,

    /// Amount in the smallest currency unit.
    pub amount: i64,

    pub is_partial_payment: bool,
    pub description: String,

    /// ISO-8601 local date-time, millisecond precision (`YYYY-MM-DDTHH:MM:SS.mmm`).
    pub due_date: String,

    pub transfer: Vec<Transfer>,

    #[serde(default)]
    pub payment_option_metadata: Vec<Metadata>,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum DebtorType {
    #[serde(rename = "F")]
    NaturalPerson,
    #[serde(rename = "G")]
    LegalPerson,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPosition {
    pub iupd: String,

    #[serde(rename = "type")]
    pub debtor_type: DebtorType,

    pub fiscal_code: String,
    pub full_name: String,

    /// Always serialized: an invalid fixture carries an explicit `null` here.
    pub company_name: Option<String>,

    pub payment_option: Vec<PaymentOption>,
    pub switch_to_expired: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPositionBatch {
    pub payment_positions: Vec<PaymentPosition>,
}

impl PaymentPositionBatch {
    pub fn len(&self) -> usize {
        self.payment_positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payment_positions.is_empty()
    }

    /// Position identifiers in document order.
    pub fn iupds(&self) -> Vec<String> {
        self.payment_positions
            .iter()
            .map(|p| p.iupd.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct IupdBatch {
    #[serde(rename = "paymentPositionIUPDs")]
    pub payment_position_iupds: Vec<String>,
}

/// Document shape the service does not accept for bulk deletes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct MalformedIupdDocument {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(untagged)]
pub enum IupdDocument {
    Batch(IupdBatch),
    Malformed(MalformedIupdDocument),
}

// ----------------------------
// Generation knobs
// ----------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown {kind} {value:?} (expected one of: {expected})")]
pub struct ParseKindError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl ParseKindError {
    fn new(kind: &'static str, value: &str, expected: &'static str) -> Self {
        Self {
            kind,
            value: value.to_string(),
            expected,
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Validity {
    Valid,
    Invalid,
}

impl FromStr for Validity {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VALID" => Ok(Validity::Valid),
            "INVALID" => Ok(Validity::Invalid),
            _ => Err(ParseKindError::new("validity", s, "VALID, INVALID")),
        }
    }
}

/// How the archive around a fixture is assembled.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArchiveMode {
    Valid,
    InvalidEntries,
    InvalidFormat,
    Empty,
}

impl FromStr for ArchiveMode {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "VALID" => Ok(ArchiveMode::Valid),
            "INVALID_ENTRIES" => Ok(ArchiveMode::InvalidEntries),
            "INVALID_FORMAT" => Ok(ArchiveMode::InvalidFormat),
            "EMPTY" => Ok(ArchiveMode::Empty),
            _ => Err(ParseKindError::new(
                "archive mode",
                s,
                "VALID, INVALID_ENTRIES, INVALID_FORMAT, EMPTY",
            )),
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UploadOperation {
    Create,
    Update,
    Delete,
}

impl UploadOperation {
    /// HTTP verb the service binds this operation to.
    pub fn method(self) -> HttpMethod {
        match self {
            UploadOperation::Create => HttpMethod::Post,
            UploadOperation::Update => HttpMethod::Put,
            UploadOperation::Delete => HttpMethod::Delete,
        }
    }
}

impl FromStr for UploadOperation {
    type Err = ParseKindError;

    /// Accepts both the verb and its participle ("create" / "created").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" | "created" => Ok(UploadOperation::Create),
            "update" | "updated" => Ok(UploadOperation::Update),
            "delete" | "deleted" => Ok(UploadOperation::Delete),
            _ => Err(ParseKindError::new(
                "upload operation",
                s,
                "create, update, delete",
            )),
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(ParseKindError::new(
                "http method",
                s,
                "GET, POST, PUT, DELETE",
            )),
        }
    }
}

// ----------------------------
// Service responses (read-only)
// ----------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatus {
    #[serde(rename = "uploadID", default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,

    pub processed_item: u64,
    pub submitted_item: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
}

impl UploadStatus {
    /// The job is terminal once every submitted item has been processed.
    pub fn is_completed(&self) -> bool {
        self.processed_item == self.submitted_item
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEntry {
    pub status_code: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,

    /// Position identifiers this outcome applies to.
    #[serde(rename = "requestIDs", default)]
    pub request_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    #[serde(rename = "uploadID", default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,

    pub processed_item: u64,
    pub submitted_item: u64,

    #[serde(default)]
    pub responses: Vec<ResponseEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct AppInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub environment: String,
}

// ----------------------------
// Harness receipts
// ----------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct IterationResult {
    pub archive: String,

    /// HTTP status of the upload call; absent when no response came back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_status: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    pub polls: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_item: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_status: Option<u16>,

    /// Upload accepted until report available.
    pub elapsed_ms: u64,

    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct DurationSummary {
    pub median_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct LoadSummary {
    pub iterations: u32,
    pub passed: u32,
    pub failed: u32,

    /// Over passed iterations only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<DurationSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct LoadReceipt {
    pub schema: String,
    pub tool: ToolInfo,
    pub target: String,
    pub started_at: String,
    pub ended_at: String,
    pub results: Vec<IterationResult>,
    pub summary: LoadSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RunReceipt {
    pub schema: String,
    pub tool: ToolInfo,
    pub target: String,
    pub started_at: String,
    pub result: IterationResult,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<UploadReport>,
}

// ----------------------------
// Optional config file schema
// ----------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Base URL of the service, e.g. `https://api.dev.example.it/upload/gpd/debt-positions-service/v1`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Upload path relative to `host`; overrides `broker` / `organization`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub canary: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    /// Duration strings parseable by humantime, e.g. "10s".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<String>,
}
