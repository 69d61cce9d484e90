//! Upload, wait, report: one iteration and a sequential load run of them.

use crate::poll::UploadPoller;
use crate::{now_rfc3339, summarize};
use anyhow::Context;
use gpdload_client::GpdUploadClient;
use gpdload_domain::{Clock, extract_upload_uid, report_url};
use gpdload_types::{
    HttpMethod, IterationResult, LOAD_SCHEMA_V1, LoadReceipt, ToolInfo, UploadReport,
};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct IterationOutcome {
    pub result: IterationResult,
    /// Parsed report body, when the report call answered 200.
    pub report: Option<UploadReport>,
}

/// Upload one archive, wait for the job, fetch its report.
#[derive(Debug, Clone)]
pub struct EndToEndUseCase {
    client: GpdUploadClient,
    poller: UploadPoller,
    upload_path: String,
}

impl EndToEndUseCase {
    pub fn new(client: GpdUploadClient, poller: UploadPoller, upload_path: impl Into<String>) -> Self {
        Self {
            client,
            poller,
            upload_path: upload_path.into(),
        }
    }

    pub fn target(&self) -> String {
        self.client.resolve(&self.upload_path)
    }

    /// Only local failures (the archive cannot be read) are errors; service
    /// misbehaviour is recorded as a failed iteration.
    pub async fn execute(&self, archive: &Path) -> anyhow::Result<IterationOutcome> {
        let mut result = IterationResult {
            archive: archive.display().to_string(),
            upload_status: None,
            uid: None,
            polls: 0,
            submitted_item: None,
            report_status: None,
            elapsed_ms: 0,
            passed: false,
            error: None,
        };

        let upload = self
            .client
            .upload_file(&self.upload_path, archive, HttpMethod::Post)
            .await
            .with_context(|| format!("upload {}", archive.display()))?;
        let Some(upload) = upload else {
            return Ok(failed(result, "no response to upload"));
        };
        result.upload_status = Some(upload.status);
        if upload.status != 202 {
            let msg = format!("upload answered {}: {}", upload.status, upload.body);
            return Ok(failed(result, msg));
        }
        let Some(location) = upload.header("location").map(str::to_string) else {
            return Ok(failed(result, "upload accepted without a Location header"));
        };
        result.uid = extract_upload_uid(&location);

        let started = Instant::now();
        let polled = match self.poller.wait(&self.client, &location).await {
            Ok(polled) => polled,
            Err(err) => return Ok(failed(result, err.to_string())),
        };
        result.polls = polled.polls;
        result.submitted_item = Some(polled.status.submitted_item);

        let report_url = match report_url(&location) {
            Ok(url) => url,
            Err(err) => return Ok(failed(result, err.to_string())),
        };
        let Some(report) = self.client.report(&report_url).await else {
            return Ok(failed(result, "no response to report request"));
        };
        result.elapsed_ms = started.elapsed().as_millis() as u64;
        result.report_status = Some(report.status);
        if report.status != 200 {
            let msg = format!("report answered {}", report.status);
            return Ok(failed(result, msg));
        }

        let parsed = match report.json::<UploadReport>() {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!(url = %report_url, error = %err, "report body is not an upload report");
                None
            }
        };
        result.passed = true;
        info!(
            uid = ?result.uid,
            polls = result.polls,
            duration_ms = result.elapsed_ms,
            "report created"
        );
        Ok(IterationOutcome {
            result,
            report: parsed,
        })
    }
}

fn failed(mut result: IterationResult, msg: impl Into<String>) -> IterationOutcome {
    let msg = msg.into();
    warn!(archive = %result.archive, error = %msg, "iteration failed");
    result.passed = false;
    result.error = Some(msg);
    IterationOutcome {
        result,
        report: None,
    }
}

#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub archives: Vec<PathBuf>,
    pub iterations: u32,
    /// Wait between iterations.
    pub pause: Duration,
}

/// Runs iterations one after another; iteration `i` uploads `archives[i % len]`.
pub struct LoadUseCase<C: Clock> {
    flow: EndToEndUseCase,
    clock: C,
    tool: ToolInfo,
}

impl<C: Clock> LoadUseCase<C> {
    pub fn new(flow: EndToEndUseCase, clock: C, tool: ToolInfo) -> Self {
        Self { flow, clock, tool }
    }

    pub async fn execute(&self, req: &LoadRequest) -> anyhow::Result<LoadReceipt> {
        anyhow::ensure!(!req.archives.is_empty(), "no archives to upload");

        let started_at = now_rfc3339(&self.clock);
        let mut results = Vec::with_capacity(req.iterations as usize);

        for i in 0..req.iterations {
            if i > 0 && !req.pause.is_zero() {
                tokio::time::sleep(req.pause).await;
            }
            let archive = &req.archives[i as usize % req.archives.len()];
            info!(iteration = i + 1, total = req.iterations, archive = %archive.display(), "iteration");
            let outcome = self
                .flow
                .execute(archive)
                .await
                .with_context(|| format!("iteration {}", i + 1))?;
            results.push(outcome.result);
        }

        let summary = summarize(&results);
        Ok(LoadReceipt {
            schema: LOAD_SCHEMA_V1.to_string(),
            tool: self.tool.clone(),
            target: self.flow.target(),
            started_at,
            ended_at: now_rfc3339(&self.clock),
            results,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpdload_adapters::{ArchivePackager, FixtureWriter, ZipPackager};
    use gpdload_client::ClientConfig;
    use gpdload_domain::{SystemClock, upload_path};
    use gpdload_fake::{GpdUploadSimulator, SimulatorOptions};
    use gpdload_types::{ArchiveMode, Validity};
    use tempfile::TempDir;

    fn archive(dir: &TempDir, validity: Validity) -> PathBuf {
        let fx = FixtureWriter::system()
            .payment_positions(dir.path(), 3, validity)
            .unwrap();
        ZipPackager::default()
            .pack(ArchiveMode::Valid, &fx.path)
            .unwrap()
    }

    fn flow(sim: &GpdUploadSimulator) -> EndToEndUseCase {
        let client = GpdUploadClient::new(ClientConfig::new(sim.uri())).unwrap();
        EndToEndUseCase::new(
            client,
            UploadPoller::new(Duration::from_millis(2)),
            upload_path("77777777777", "77777777777"),
        )
    }

    fn tool() -> ToolInfo {
        ToolInfo {
            name: "gpdload".into(),
            version: "test".into(),
        }
    }

    #[tokio::test]
    async fn iteration_passes_against_simulator() {
        let sim = GpdUploadSimulator::start_with(SimulatorOptions {
            polls_to_complete: 3,
            ..SimulatorOptions::default()
        })
        .await;
        let dir = TempDir::new().unwrap();

        let out = flow(&sim).execute(&archive(&dir, Validity::Valid)).await.unwrap();
        assert!(out.result.passed, "{:?}", out.result.error);
        assert_eq!(out.result.upload_status, Some(202));
        assert_eq!(out.result.report_status, Some(200));
        assert_eq!(out.result.polls, 3);
        assert_eq!(out.result.submitted_item, Some(3));
        assert!(out.result.uid.is_some());
        assert_eq!(out.report.unwrap().responses[0].request_ids.len(), 3);
    }

    #[tokio::test]
    async fn rejected_upload_is_a_failed_iteration() {
        let sim = GpdUploadSimulator::start().await;
        let dir = TempDir::new().unwrap();

        let out = flow(&sim).execute(&archive(&dir, Validity::Invalid)).await.unwrap();
        assert!(!out.result.passed);
        assert_eq!(out.result.upload_status, Some(400));
        assert!(out.result.error.unwrap().contains("400"));
    }

    #[tokio::test]
    async fn unreadable_archive_is_an_error() {
        let sim = GpdUploadSimulator::start().await;
        let err = flow(&sim)
            .execute(Path::new("/no/such/archive.zip"))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("archive.zip"));
    }

    #[tokio::test]
    async fn load_cycles_archives_and_summarizes() {
        let sim = GpdUploadSimulator::start_with(SimulatorOptions {
            polls_to_complete: 1,
            ..SimulatorOptions::default()
        })
        .await;
        let dir = TempDir::new().unwrap();
        let good = archive(&dir, Validity::Valid);
        let bad = archive(&dir, Validity::Invalid);

        let receipt = LoadUseCase::new(flow(&sim), SystemClock, tool())
            .execute(&LoadRequest {
                archives: vec![good.clone(), bad.clone()],
                iterations: 5,
                pause: Duration::ZERO,
            })
            .await
            .unwrap();

        assert_eq!(receipt.schema, LOAD_SCHEMA_V1);
        assert_eq!(receipt.results.len(), 5);
        assert_eq!(receipt.results[0].archive, good.display().to_string());
        assert_eq!(receipt.results[1].archive, bad.display().to_string());
        assert_eq!(receipt.summary.iterations, 5);
        assert_eq!(receipt.summary.passed, 3);
        assert_eq!(receipt.summary.failed, 2);
        assert!(receipt.summary.duration.is_some());
        assert!(receipt.target.ends_with("/debtpositions/file"));
    }

    #[tokio::test]
    async fn load_needs_archives() {
        let sim = GpdUploadSimulator::start().await;
        let err = LoadUseCase::new(flow(&sim), SystemClock, tool())
            .execute(&LoadRequest {
                archives: vec![],
                iterations: 1,
                pause: Duration::ZERO,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no archives"));
    }
}
