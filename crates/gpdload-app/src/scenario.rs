//! Scenario steps against a live (or simulated) service.
//!
//! Each step of a behaviour scenario maps onto one [`ScenarioAction`]; the
//! [`ScenarioContext`] carries what earlier steps produced.

use crate::payload::{PayloadRequest, PayloadUseCase};
use crate::poll::{PollError, UploadPoller};
use gpdload_adapters::{AdapterError, extract_iupds};
use gpdload_client::{ApiResponse, ClientError, GpdUploadClient};
use gpdload_domain::{extract_upload_uid, status_url, substitute_uid};
use gpdload_types::{ArchiveMode, HttpMethod, UploadOperation, Validity};
use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Placeholder replaced by the extracted upload id in request paths.
pub const UID_PLACEHOLDER: &str = "UID";

/// Per-scenario state.
#[derive(Debug, Clone, Default)]
pub struct ScenarioContext {
    /// Where fixtures and archives are written.
    pub work_dir: PathBuf,
    pub archive_path: Option<PathBuf>,
    pub last_response: Option<ApiResponse>,
    pub uid: Option<String>,
    /// Position ids of the last generated payment-position batch.
    pub iupds: Vec<String>,
}

impl ScenarioContext {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            ..Self::default()
        }
    }

    fn response(&self) -> Result<&ApiResponse, ScenarioError> {
        self.last_response.as_ref().ok_or(ScenarioError::MissingResponse)
    }

    fn body(&self) -> Result<Value, ScenarioError> {
        Ok(self.response()?.json_value()?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioAction {
    /// A valid archive of `count` valid payment positions.
    ZipPaymentPositions { count: usize },
    PreparePayload {
        zip_mode: ArchiveMode,
        count: usize,
        validity: Validity,
        operation: UploadOperation,
    },
    CheckServiceRunning,
    ExtractUid { header: String },
    SendFile { method: HttpMethod, path: String },
    /// `path` may contain the `UID` placeholder.
    Send { method: HttpMethod, path: String },
    AwaitUpload { broker: String, organization: String },
    ExpectStatus(u16),
    ExpectFieldsPresent(Vec<String>),
    ExpectFieldValue { field: String, value: Value },
    ExpectPathFieldValue {
        field: String,
        index: usize,
        subfield: String,
        value: Value,
    },
    ExpectHeaderMatches { header: String, pattern: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("assertion failed: {0}")]
    Assertion(String),

    #[error("no response recorded yet")]
    MissingResponse,

    #[error("no upload UID recorded yet")]
    MissingUid,

    #[error("no archive prepared yet")]
    MissingArchive,

    #[error("invalid header pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("response body is not JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

fn ensure(cond: bool, msg: impl FnOnce() -> String) -> Result<(), ScenarioError> {
    if cond {
        Ok(())
    } else {
        Err(ScenarioError::Assertion(msg()))
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioDriver {
    client: GpdUploadClient,
    poller: UploadPoller,
    /// Wait before every call to the service.
    pause: Duration,
    payloads: PayloadUseCase,
}

impl ScenarioDriver {
    pub fn new(client: GpdUploadClient, poller: UploadPoller, pause: Duration) -> Self {
        Self {
            client,
            poller,
            pause,
            payloads: PayloadUseCase::default(),
        }
    }

    pub fn client(&self) -> &GpdUploadClient {
        &self.client
    }

    pub async fn execute(
        &self,
        ctx: &mut ScenarioContext,
        action: ScenarioAction,
    ) -> Result<(), ScenarioError> {
        debug!(?action, "scenario step");
        match action {
            ScenarioAction::ZipPaymentPositions { count } => {
                let out = self.payloads.zip_positions(&ctx.work_dir, count)?;
                ctx.iupds = extract_iupds(&out.fixture.path);
                ctx.archive_path = Some(out.archive);
            }

            ScenarioAction::PreparePayload {
                zip_mode,
                count,
                validity,
                operation,
            } => {
                let req = PayloadRequest {
                    zip_mode,
                    count,
                    validity,
                    operation,
                    iupds: match operation {
                        UploadOperation::Delete => ctx.iupds.clone(),
                        _ => Vec::new(),
                    },
                };
                let out = self.payloads.prepare(&ctx.work_dir, &req)?;
                if operation != UploadOperation::Delete {
                    ctx.iupds = extract_iupds(&out.fixture.path);
                }
                ctx.archive_path = Some(out.archive);
            }

            ScenarioAction::CheckServiceRunning => {
                self.pause().await;
                let status = self.client.info().await.map(|r| r.status);
                ensure(status == Some(200), || {
                    format!("service info answered {status:?}, expected 200")
                })?;
            }

            ScenarioAction::ExtractUid { header } => {
                let uid = {
                    let resp = ctx.response()?;
                    let value = resp.header(&header).ok_or_else(|| {
                        ScenarioError::Assertion(format!("response has no {header} header"))
                    })?;
                    extract_upload_uid(value)
                };
                ctx.uid = uid;
                info!(uid = ?ctx.uid, "upload uid extracted");
            }

            ScenarioAction::SendFile { method, path } => {
                let archive = ctx.archive_path.clone().ok_or(ScenarioError::MissingArchive)?;
                self.pause().await;
                ctx.last_response = self.client.upload_file(&path, &archive, method).await?;
            }

            ScenarioAction::Send { method, path } => {
                let path = if path.contains(UID_PLACEHOLDER) {
                    let uid = ctx.uid.as_deref().ok_or(ScenarioError::MissingUid)?;
                    substitute_uid(&path, uid)
                } else {
                    debug!(%path, "path has no UID placeholder");
                    path
                };
                self.pause().await;
                ctx.last_response = self.client.request(method, &path, None).await;
            }

            ScenarioAction::AwaitUpload {
                broker,
                organization,
            } => {
                let uid = ctx.uid.as_deref().ok_or(ScenarioError::MissingUid)?;
                let url = status_url(&broker, &organization, uid);
                self.pause().await;
                self.poller.wait(&self.client, &url).await?;
            }

            ScenarioAction::ExpectStatus(expected) => {
                let resp = ctx.response()?;
                ensure(resp.status == expected, || {
                    format!(
                        "status is {}, expected {expected}; body: {}",
                        resp.status, resp.body
                    )
                })?;
            }

            ScenarioAction::ExpectFieldsPresent(fields) => {
                let body = ctx.body()?;
                for field in fields {
                    let present = body.get(&field).is_some_and(|v| !v.is_null());
                    ensure(present, || format!("field {field} should not be null"))?;
                }
            }

            ScenarioAction::ExpectFieldValue { field, value } => {
                let body = ctx.body()?;
                let actual = &body[field.as_str()];
                ensure(*actual == value, || {
                    format!("field {field} is {actual}, expected {value}")
                })?;
            }

            ScenarioAction::ExpectPathFieldValue {
                field,
                index,
                subfield,
                value,
            } => {
                let body = ctx.body()?;
                let actual = &body[field.as_str()][index][subfield.as_str()];
                ensure(*actual == value, || {
                    format!("field {field}[{index}].{subfield} is {actual}, expected {value}")
                })?;
            }

            ScenarioAction::ExpectHeaderMatches { header, pattern } => {
                let re = Regex::new(&pattern)?;
                let resp = ctx.response()?;
                let value = resp.header(&header).unwrap_or_default();
                ensure(re.is_match(value), || {
                    format!("{header} header {value:?} does not match {pattern}")
                })?;
            }
        }
        Ok(())
    }

    async fn pause(&self) {
        if !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }
    }
}
