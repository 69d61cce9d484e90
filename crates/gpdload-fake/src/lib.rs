//! In-process simulator of the GPD-Upload service.
//!
//! [`GpdUploadSimulator`] serves the same routes as the real service on a
//! local port: liveness, archive upload, job status and job report. Uploaded
//! archives are validated like the service does, and each status read moves
//! the job forward until every submitted item is processed.
//!
//! ```no_run
//! # async fn demo() {
//! use gpdload_fake::{GpdUploadSimulator, SimulatorOptions};
//!
//! let sim = GpdUploadSimulator::start_with(SimulatorOptions {
//!     polls_to_complete: 3,
//!     ..SimulatorOptions::default()
//! })
//! .await;
//! println!("service at {}", sim.uri());
//! # }
//! ```

mod multipart;
mod validate;

use gpdload_types::{
    AppInfo, ResponseEntry, SUBSCRIPTION_KEY_HEADER, UploadOperation, UploadReport, UploadStatus,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Match, Mock, MockServer, Request, Respond, ResponseTemplate};

const UPLOAD_ROUTE: &str = r"^/brokers/[^/]+/organizations/[^/]+/debtpositions/file$";
const STATUS_ROUTE: &str = r"^/brokers/[^/]+/organizations/[^/]+/debtpositions/file/[^/]+/status$";
const REPORT_ROUTE: &str = r"^/brokers/[^/]+/organizations/[^/]+/debtpositions/file/[^/]+/report$";

#[derive(Debug, Clone)]
pub struct SimulatorOptions {
    /// When set, requests without this subscription key get 401.
    pub subscription_key: Option<String>,
    /// Status reads needed before a job reports completion; 0 completes at once.
    pub polls_to_complete: u32,
    /// Value of the `Retry-After` header on accepted uploads, in seconds.
    pub retry_after_secs: u32,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        Self {
            subscription_key: None,
            polls_to_complete: 2,
            retry_after_secs: 1,
        }
    }
}

/// Server-side view of one upload job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedJob {
    pub broker: String,
    pub organization: String,
    pub operation: UploadOperation,
    pub iupds: Vec<String>,
    pub status_reads: u32,
    pub start_time: String,
}

impl SimulatedJob {
    fn submitted(&self) -> u64 {
        self.iupds.len() as u64
    }

    fn processed(&self, polls_to_complete: u32) -> u64 {
        if self.status_reads >= polls_to_complete {
            return self.submitted();
        }
        self.submitted() * u64::from(self.status_reads) / u64::from(polls_to_complete)
    }
}

#[derive(Debug, Default)]
struct State {
    jobs: HashMap<String, SimulatedJob>,
}

type Shared = Arc<Mutex<State>>;

fn lock(state: &Shared) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct GpdUploadSimulator {
    server: MockServer,
    state: Shared,
    options: SimulatorOptions,
}

impl fmt::Debug for GpdUploadSimulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpdUploadSimulator")
            .field("uri", &self.server.uri())
            .field("jobs", &lock(&self.state).jobs.len())
            .field("options", &self.options)
            .finish()
    }
}

impl GpdUploadSimulator {
    pub async fn start() -> Self {
        Self::start_with(SimulatorOptions::default()).await
    }

    pub async fn start_with(options: SimulatorOptions) -> Self {
        let server = MockServer::start().await;
        let state: Shared = Arc::default();

        if let Some(key) = &options.subscription_key {
            Mock::given(WrongKey(key.clone()))
                .respond_with(problem(401, "UNAUTHORIZED", "Missing or invalid subscription key"))
                .with_priority(1)
                .mount(&server)
                .await;
        }

        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(AppInfo {
                name: "gpd-upload".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                environment: "simulator".to_string(),
            }))
            .mount(&server)
            .await;

        Mock::given(path_regex(UPLOAD_ROUTE))
            .respond_with(UploadResponder {
                state: state.clone(),
                retry_after_secs: options.retry_after_secs,
            })
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path_regex(STATUS_ROUTE))
            .respond_with(StatusResponder {
                state: state.clone(),
                polls_to_complete: options.polls_to_complete,
            })
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path_regex(REPORT_ROUTE))
            .respond_with(ReportResponder {
                state: state.clone(),
                polls_to_complete: options.polls_to_complete,
            })
            .mount(&server)
            .await;

        Self {
            server,
            state,
            options,
        }
    }

    /// Base URL, e.g. `http://127.0.0.1:41234`.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn options(&self) -> &SimulatorOptions {
        &self.options
    }

    pub fn job(&self, uid: &str) -> Option<SimulatedJob> {
        lock(&self.state).jobs.get(uid).cloned()
    }

    pub fn job_count(&self) -> usize {
        lock(&self.state).jobs.len()
    }

    pub async fn received_requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }
}

struct WrongKey(String);

impl Match for WrongKey {
    fn matches(&self, request: &Request) -> bool {
        request
            .headers
            .get(SUBSCRIPTION_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            != Some(self.0.as_str())
    }
}

struct UploadResponder {
    state: Shared,
    retry_after_secs: u32,
}

impl Respond for UploadResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let operation = match request.method.as_str() {
            "POST" => UploadOperation::Create,
            "PUT" => UploadOperation::Update,
            "DELETE" => UploadOperation::Delete,
            _ => return problem(405, "METHOD NOT ALLOWED", "Use POST, PUT or DELETE"),
        };
        let content_type = request
            .headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let Some(part) = multipart::find_part(content_type, &request.body, "file") else {
            return problem(400, "BAD REQUEST", "Required multipart part 'file' is missing");
        };

        let accepted = match validate::check_upload(part.filename.as_deref(), &part.content, operation)
        {
            Ok(accepted) => accepted,
            Err(rejection) => {
                debug!(title = rejection.title, detail = %rejection.detail, "upload rejected");
                return problem(400, rejection.title, &rejection.detail);
            }
        };

        let segments = path_segments(request);
        let (broker, organization) = (segments[1].clone(), segments[3].clone());
        let uid = uuid::Uuid::new_v4().to_string();
        let location =
            format!("brokers/{broker}/organizations/{organization}/debtpositions/file/{uid}/status");

        debug!(%uid, ?operation, items = accepted.iupds.len(), "upload accepted");
        lock(&self.state).jobs.insert(
            uid,
            SimulatedJob {
                broker,
                organization,
                operation,
                iupds: accepted.iupds,
                status_reads: 0,
                start_time: now(),
            },
        );

        ResponseTemplate::new(202)
            .insert_header("Location", location.as_str())
            .insert_header("Retry-After", self.retry_after_secs.to_string().as_str())
    }
}

struct StatusResponder {
    state: Shared,
    polls_to_complete: u32,
}

impl Respond for StatusResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let uid = &path_segments(request)[6];
        let mut state = lock(&self.state);
        let Some(job) = state.jobs.get_mut(uid) else {
            return problem(404, "NOT FOUND", &format!("Upload {uid} not found"));
        };
        job.status_reads = job.status_reads.saturating_add(1);

        ResponseTemplate::new(200).set_body_json(UploadStatus {
            upload_id: Some(uid.clone()),
            processed_item: job.processed(self.polls_to_complete),
            submitted_item: job.submitted(),
            start_time: Some(job.start_time.clone()),
        })
    }
}

struct ReportResponder {
    state: Shared,
    polls_to_complete: u32,
}

impl Respond for ReportResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let uid = &path_segments(request)[6];
        let state = lock(&self.state);
        let Some(job) = state.jobs.get(uid) else {
            return problem(404, "NOT FOUND", &format!("Upload {uid} not found"));
        };
        let processed = job.processed(self.polls_to_complete);
        if processed != job.submitted() {
            return problem(404, "NOT FOUND", &format!("Report for {uid} not ready"));
        }

        let (status_code, message) = match job.operation {
            UploadOperation::Create => (201, "Created"),
            UploadOperation::Update | UploadOperation::Delete => (200, "OK"),
        };
        ResponseTemplate::new(200).set_body_json(UploadReport {
            upload_id: Some(uid.clone()),
            processed_item: processed,
            submitted_item: job.submitted(),
            responses: vec![ResponseEntry {
                status_code,
                status_message: Some(message.to_string()),
                request_ids: job.iupds.clone(),
            }],
            start_time: Some(job.start_time.clone()),
            end_time: Some(now()),
        })
    }
}

/// Path segments without the leading slash; routes guarantee the length.
fn path_segments(request: &Request) -> Vec<String> {
    request
        .url
        .path()
        .trim_start_matches('/')
        .split('/')
        .map(str::to_string)
        .collect()
}

fn problem(status: u16, title: &str, detail: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(serde_json::json!({
        "title": title,
        "status": status,
        "detail": detail,
    }))
}

fn now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
