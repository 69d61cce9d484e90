use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use gpdload_adapters::{ArchivePackager, Fixture, FixtureWriter, ZipPackager};
use gpdload_app::{
    EndToEndUseCase, LoadRequest, LoadUseCase, UploadPoller, now_rfc3339, run_receipt,
};
use gpdload_client::GpdUploadClient;
use gpdload_config::{
    ENV_BASE_PATH, ENV_BROKER, ENV_CANARY, ENV_HOST, ENV_ORGANIZATION, ENV_POLL_INTERVAL,
    ENV_POLL_TIMEOUT, ENV_SUBSCRIPTION_KEY, HarnessConfig,
};
use gpdload_domain::SystemClock;
use gpdload_types::{ArchiveMode, HttpMethod, ToolInfo, UploadStatus, Validity};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "gpdload",
    version,
    about = "Payload generator, uploader and load driver for the GPD-Upload service"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// TOML config file (defaults to ./gpdload.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Service base URL
    #[arg(long, global = true)]
    host: Option<String>,

    #[arg(long, global = true)]
    subscription_key: Option<String>,

    /// Send `X-Canary: canary` on every call
    #[arg(long, global = true, default_value_t = false)]
    canary: bool,

    #[arg(long, global = true)]
    broker: Option<String>,

    #[arg(long, global = true)]
    organization: Option<String>,

    /// Upload path; overrides --broker / --organization
    #[arg(long, global = true)]
    base_path: Option<String>,

    /// Delay between status reads (e.g. "10s")
    #[arg(long, global = true)]
    poll_interval: Option<String>,

    /// Give up waiting after this long (default: wait forever)
    #[arg(long, global = true)]
    poll_timeout: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FixtureKind {
    /// Payment-position batches (create / update)
    Positions,
    /// IUPD lists (delete)
    Iupds,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write fixture documents and (by default) their archives.
    Generate {
        /// Items per document
        #[arg(long, default_value_t = 1)]
        count: usize,

        #[arg(long, default_value = "VALID")]
        validity: Validity,

        #[arg(long, value_enum, default_value_t = FixtureKind::Positions)]
        kind: FixtureKind,

        /// Number of documents; more than one names them test0.json, test1.json, ...
        #[arg(long, default_value_t = 1)]
        files: usize,

        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        #[arg(long, default_value = "VALID")]
        zip_mode: ArchiveMode,

        /// Leave the JSON documents unpacked
        #[arg(long, default_value_t = false)]
        no_zip: bool,

        /// Existing position ids for an IUPD list (repeatable)
        #[arg(long = "iupd")]
        iupds: Vec<String>,
    },

    /// Pack an existing JSON document into `<source>.zip`.
    Pack {
        #[arg(long, default_value = "VALID")]
        mode: ArchiveMode,

        /// Store the document as `data.json` in `test_<id>.zip` next to the source
        #[arg(long, default_value_t = false, conflicts_with = "mode")]
        data_entry: bool,

        source: PathBuf,
    },

    /// Write an uncompressed archive of padding entries.
    MockZip {
        #[arg(long)]
        size_mb: usize,

        #[arg(long, default_value = "file.zip")]
        out: PathBuf,
    },

    /// Check that the service answers `GET /info`.
    Info,

    /// Upload one archive and print the response.
    Upload {
        #[arg(long, default_value = "POST")]
        method: HttpMethod,

        archive: PathBuf,
    },

    /// Poll a status URL until the upload completes.
    Wait { status_url: String },

    /// Upload, wait and fetch the report; emit a run receipt (JSON).
    Run {
        archive: PathBuf,

        #[arg(long, default_value = "gpdload-run.json")]
        out: PathBuf,

        #[arg(long, default_value_t = false)]
        pretty: bool,
    },

    /// Repeat the run flow over a set of archives; emit a load receipt (JSON).
    Load {
        /// Archive to upload (repeatable); iteration i uses archive i % n
        #[arg(long = "archive", required = true)]
        archives: Vec<PathBuf>,

        #[arg(long, default_value_t = 10)]
        iterations: u32,

        /// Delay between iterations
        #[arg(long, default_value = "0s")]
        iteration_pause: String,

        #[arg(long, default_value = "gpdload-load.json")]
        out: PathBuf,

        #[arg(long, default_value_t = false)]
        pretty: bool,
    },
}

fn main() -> ExitCode {
    if let Err(err) = real_main() {
        eprintln!("{err:#}");
        return ExitCode::from(1);
    }
    ExitCode::from(0)
}

fn real_main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.log_json);

    match cli.cmd {
        Command::Generate {
            count,
            validity,
            kind,
            files,
            out_dir,
            zip_mode,
            no_zip,
            iupds,
        } => {
            let writer = FixtureWriter::system();
            let packager = ZipPackager::default();
            for i in 0..files {
                let fixture: Fixture = match kind {
                    FixtureKind::Positions if files > 1 => {
                        writer.payment_positions_as(&out_dir, count, validity, &i.to_string())?
                    }
                    FixtureKind::Positions => writer.payment_positions(&out_dir, count, validity)?,
                    FixtureKind::Iupds => writer.iupds(&out_dir, count, validity, &iupds)?,
                };
                let written = if no_zip {
                    fixture.path
                } else {
                    packager.pack(zip_mode, &fixture.path)?
                };
                println!("{}", written.display());
            }
            Ok(())
        }

        Command::Pack {
            mode,
            data_entry,
            source,
        } => {
            let packager = ZipPackager::default();
            let archive = if data_entry {
                let json = fs::read_to_string(&source)
                    .with_context(|| format!("read {}", source.display()))?;
                let dir = source.parent().unwrap_or_else(|| Path::new("."));
                let id = uuid::Uuid::new_v4().simple().to_string();
                packager.pack_content(dir, &id[..10], &json)?
            } else {
                packager
                    .pack(mode, &source)
                    .with_context(|| format!("pack {}", source.display()))?
            };
            println!("{}", archive.display());
            Ok(())
        }

        Command::MockZip { size_mb, out } => {
            let archive = ZipPackager::default().mock_zip(&out, size_mb)?;
            println!("{}", archive.display());
            Ok(())
        }

        Command::Info => {
            let cfg = load_config(&cli.global)?;
            let client = GpdUploadClient::new(cfg.client_config())?;
            let resp = runtime()?.block_on(client.info());
            let Some(resp) = resp else {
                eprintln!("no response from {}", client.resolve("/info"));
                std::process::exit(2);
            };
            println!("{}", resp.body);
            if resp.status != 200 {
                eprintln!("info answered {}", resp.status);
                std::process::exit(2);
            }
            Ok(())
        }

        Command::Upload { method, archive } => {
            let cfg = load_config(&cli.global)?;
            let path = cfg.upload_path()?;
            let client = GpdUploadClient::new(cfg.client_config())?;
            let resp = runtime()?.block_on(client.upload_file(&path, &archive, method))?;
            let Some(resp) = resp else {
                eprintln!("no response from {}", client.resolve(&path));
                std::process::exit(2);
            };
            let summary = serde_json::json!({
                "status": resp.status,
                "location": resp.header("location"),
                "retryAfter": resp.header("retry-after"),
                "body": resp.json_value().unwrap_or(serde_json::Value::String(resp.body.clone())),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if !resp.is_success() {
                std::process::exit(2);
            }
            Ok(())
        }

        Command::Wait { status_url } => {
            let cfg = load_config(&cli.global)?;
            let client = GpdUploadClient::new(cfg.client_config())?;
            let outcome = runtime()?.block_on(poller(&cfg).wait(&client, &status_url))?;
            let status: &UploadStatus = &outcome.status;
            println!("{}", serde_json::to_string_pretty(status)?);
            Ok(())
        }

        Command::Run {
            archive,
            out,
            pretty,
        } => {
            let cfg = load_config(&cli.global)?;
            let flow = end_to_end(&cfg)?;
            let started_at = now_rfc3339(&SystemClock);
            let outcome = runtime()?.block_on(flow.execute(&archive))?;
            let passed = outcome.result.passed;
            let receipt = run_receipt(tool_info(), flow.target(), started_at, outcome);
            write_json(&out, &receipt, pretty)?;
            if !passed {
                eprintln!(
                    "run failed: {}",
                    receipt.result.error.as_deref().unwrap_or("unknown")
                );
                std::process::exit(2);
            }
            Ok(())
        }

        Command::Load {
            archives,
            iterations,
            iteration_pause,
            out,
            pretty,
        } => {
            let cfg = load_config(&cli.global)?;
            let req = LoadRequest {
                archives,
                iterations,
                pause: parse_duration(&iteration_pause)?,
            };
            let load = LoadUseCase::new(end_to_end(&cfg)?, SystemClock, tool_info());
            let receipt = runtime()?.block_on(load.execute(&req))?;
            write_json(&out, &receipt, pretty)?;
            if receipt.summary.failed > 0 {
                eprintln!(
                    "{} of {} iterations failed",
                    receipt.summary.failed, receipt.summary.iterations
                );
                std::process::exit(2);
            }
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    // A second init (e.g. in tests) is harmless.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")
}

/// Flags shadow the environment variables they correspond to.
fn load_config(global: &GlobalArgs) -> anyhow::Result<HarnessConfig> {
    let overrides: [(&str, Option<String>); 8] = [
        (ENV_HOST, global.host.clone()),
        (ENV_SUBSCRIPTION_KEY, global.subscription_key.clone()),
        (ENV_CANARY, global.canary.then(|| "true".to_string())),
        (ENV_BROKER, global.broker.clone()),
        (ENV_ORGANIZATION, global.organization.clone()),
        (ENV_BASE_PATH, global.base_path.clone()),
        (ENV_POLL_INTERVAL, global.poll_interval.clone()),
        (ENV_POLL_TIMEOUT, global.poll_timeout.clone()),
    ];
    let env = |key: &str| {
        overrides
            .iter()
            .find(|(k, v)| *k == key && v.is_some())
            .and_then(|(_, v)| v.clone())
            .or_else(|| std::env::var(key).ok())
    };
    let cfg = gpdload_config::load(global.config.as_deref(), env)?;
    debug_config(&cfg);
    Ok(cfg)
}

fn debug_config(cfg: &HarnessConfig) {
    tracing::debug!(
        host = %cfg.host,
        canary = cfg.canary,
        subscription_key = cfg.subscription_key.is_some(),
        poll_interval = ?cfg.poll_interval,
        poll_timeout = ?cfg.poll_timeout,
        "configuration loaded"
    );
}

fn poller(cfg: &HarnessConfig) -> UploadPoller {
    UploadPoller::new(cfg.poll_interval).with_timeout(cfg.poll_timeout)
}

fn end_to_end(cfg: &HarnessConfig) -> anyhow::Result<EndToEndUseCase> {
    let client = GpdUploadClient::new(cfg.client_config())?;
    Ok(EndToEndUseCase::new(client, poller(cfg), cfg.upload_path()?))
}

fn tool_info() -> ToolInfo {
    ToolInfo {
        name: "gpdload".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let d = humantime::parse_duration(s).with_context(|| format!("invalid duration: {s}"))?;
    Ok(d)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T, pretty: bool) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }

    let bytes = if pretty {
        serde_json::to_vec_pretty(value)?
    } else {
        serde_json::to_vec(value)?
    };

    atomic_write(path, &bytes)
}

fn atomic_write(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    use std::io::Write;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = parent.to_path_buf();
    tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4()));

    {
        let mut f =
            fs::File::create(&tmp).with_context(|| format!("create temp {}", tmp.display()))?;
        f.write_all(bytes)
            .with_context(|| format!("write temp {}", tmp.display()))?;
        f.sync_all().ok();
    }

    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}
