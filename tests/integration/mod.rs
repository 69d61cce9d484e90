//! End-to-end flows wired the way the CLI wires them: configuration
//! resolved from an environment map, then run against the simulator.

use gpdload_adapters::{ArchivePackager, FixtureWriter, ZipPackager, list_entries};
use gpdload_app::{
    EndToEndUseCase, LoadRequest, LoadUseCase, PayloadRequest, PayloadUseCase, ScenarioAction,
    ScenarioContext, ScenarioDriver, UploadPoller,
};
use gpdload_client::GpdUploadClient;
use gpdload_config::{HarnessConfig, resolve};
use gpdload_domain::SystemClock;
use gpdload_fake::{GpdUploadSimulator, SimulatorOptions};
use gpdload_types::{
    ArchiveMode, ConfigFile, HttpMethod, SUBSCRIPTION_KEY_HEADER, ToolInfo, UploadOperation,
    Validity,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

const BROKER: &str = "77777777777";
const ORGANIZATION: &str = "77777777777";

fn config(sim: &GpdUploadSimulator, extra: &[(&str, &str)]) -> HarnessConfig {
    let mut env: HashMap<String, String> = [
        ("APP_HOST", sim.uri()),
        ("GPDLOAD_BROKER", BROKER.to_string()),
        ("GPDLOAD_ORGANIZATION", ORGANIZATION.to_string()),
        ("GPDLOAD_POLL_INTERVAL", "5ms".to_string()),
        ("GPDLOAD_POLL_TIMEOUT", "30s".to_string()),
        ("GPDLOAD_PAUSE", "0s".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    for (k, v) in extra {
        env.insert(k.to_string(), v.to_string());
    }
    resolve(ConfigFile::default(), |key| env.get(key).cloned()).expect("config resolves")
}

fn end_to_end(cfg: &HarnessConfig) -> EndToEndUseCase {
    let client = GpdUploadClient::new(cfg.client_config()).expect("client");
    let poller = UploadPoller::new(cfg.poll_interval).with_timeout(cfg.poll_timeout);
    EndToEndUseCase::new(client, poller, cfg.upload_path().expect("upload path"))
}

fn tool() -> ToolInfo {
    ToolInfo {
        name: "gpdload".to_string(),
        version: "integration".to_string(),
    }
}

/// `files/test{i}.json.zip`, each holding `per_file` valid positions.
fn fixture_set(dir: &TempDir, files: usize, per_file: usize) -> Vec<PathBuf> {
    let writer = FixtureWriter::system();
    let packager = ZipPackager::default();
    let out = dir.path().join("files");
    (0..files)
        .map(|i| {
            let fx = writer
                .payment_positions_as(&out, per_file, Validity::Valid, &i.to_string())
                .expect("fixture");
            packager.pack(ArchiveMode::Valid, &fx.path).expect("archive")
        })
        .collect()
}

#[tokio::test]
async fn load_over_indexed_fixture_set() {
    let sim = GpdUploadSimulator::start().await;
    let dir = TempDir::new().unwrap();
    let archives = fixture_set(&dir, 3, 4);
    assert!(archives[2].ends_with("files/test2.json.zip"));

    let cfg = config(&sim, &[]);
    let receipt = LoadUseCase::new(end_to_end(&cfg), SystemClock, tool())
        .execute(&LoadRequest {
            archives: archives.clone(),
            iterations: 6,
            pause: Duration::ZERO,
        })
        .await
        .unwrap();

    assert_eq!(receipt.summary.passed, 6);
    assert_eq!(receipt.results[4].archive, archives[1].display().to_string());
    assert!(receipt.results.iter().all(|r| r.submitted_item == Some(4)));
    assert_eq!(sim.job_count(), 6);
}

#[tokio::test]
async fn subscription_key_from_alternate_variable_is_sent() {
    let sim = GpdUploadSimulator::start_with(SimulatorOptions {
        subscription_key: Some("k6-key".to_string()),
        ..SimulatorOptions::default()
    })
    .await;
    let dir = TempDir::new().unwrap();
    let archive = fixture_set(&dir, 1, 1).remove(0);

    let cfg = config(&sim, &[("API_SUBSCRIPTION_KEY", "k6-key"), ("CANARY", "1")]);
    let out = end_to_end(&cfg).execute(&archive).await.unwrap();
    assert!(out.result.passed, "{:?}", out.result.error);

    let requests = sim.received_requests().await;
    assert!(requests.iter().all(|r| {
        r.headers
            .get(SUBSCRIPTION_KEY_HEADER)
            .is_some_and(|v| v.as_bytes() == b"k6-key")
            && r.headers.get("x-canary").is_some_and(|v| v.as_bytes() == b"canary")
    }));
}

#[tokio::test]
async fn missing_key_fails_the_iteration() {
    let sim = GpdUploadSimulator::start_with(SimulatorOptions {
        subscription_key: Some("secret".to_string()),
        ..SimulatorOptions::default()
    })
    .await;
    let dir = TempDir::new().unwrap();
    let archive = fixture_set(&dir, 1, 1).remove(0);

    let out = end_to_end(&config(&sim, &[])).execute(&archive).await.unwrap();
    assert!(!out.result.passed);
    assert_eq!(out.result.upload_status, Some(401));
}

#[tokio::test]
async fn create_then_delete_through_the_scenario_driver() {
    let sim = GpdUploadSimulator::start().await;
    let dir = TempDir::new().unwrap();
    let cfg = config(&sim, &[]);
    let client = GpdUploadClient::new(cfg.client_config()).unwrap();
    let driver = ScenarioDriver::new(
        client,
        UploadPoller::new(cfg.poll_interval).with_timeout(cfg.poll_timeout),
        cfg.pause,
    );
    let upload_path = cfg.upload_path().unwrap();
    let mut ctx = ScenarioContext::new(dir.path());

    for (operation, method) in [
        (UploadOperation::Create, HttpMethod::Post),
        (UploadOperation::Delete, HttpMethod::Delete),
    ] {
        let steps = vec![
            ScenarioAction::PreparePayload {
                zip_mode: ArchiveMode::Valid,
                count: 3,
                validity: Validity::Valid,
                operation,
            },
            ScenarioAction::SendFile {
                method,
                path: upload_path.clone(),
            },
            ScenarioAction::ExpectStatus(202),
            ScenarioAction::ExtractUid {
                header: "Location".to_string(),
            },
            ScenarioAction::AwaitUpload {
                broker: BROKER.to_string(),
                organization: ORGANIZATION.to_string(),
            },
        ];
        for step in steps {
            driver.execute(&mut ctx, step).await.unwrap();
        }
    }

    let requests = sim.received_requests().await;
    assert!(requests.iter().any(|r| r.method.as_str() == "DELETE"));
    let uid = ctx.uid.clone().unwrap();
    let job = sim.job(&uid).unwrap();
    assert_eq!(job.operation, UploadOperation::Delete);
    assert_eq!(job.iupds, ctx.iupds);
    assert_eq!(job.iupds.len(), 3);
}

#[test]
fn payload_archives_hold_one_document() {
    let dir = TempDir::new().unwrap();
    let out = PayloadUseCase::<ZipPackager>::default()
        .prepare(
            dir.path(),
            &PayloadRequest {
                zip_mode: ArchiveMode::Valid,
                count: 5,
                validity: Validity::Valid,
                operation: UploadOperation::Update,
                iupds: vec![],
            },
        )
        .unwrap();
    assert_eq!(list_entries(&out.archive).unwrap().len(), 1);
}
