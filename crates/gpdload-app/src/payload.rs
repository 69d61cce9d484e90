use gpdload_adapters::{AdapterError, ArchivePackager, Fixture, FixtureWriter, ZipPackager};
use gpdload_domain::{Clock, IdSource, SystemClock, UuidIdSource};
use gpdload_types::{ArchiveMode, UploadOperation, Validity};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadRequest {
    pub zip_mode: ArchiveMode,
    pub count: usize,
    pub validity: Validity,
    pub operation: UploadOperation,
    /// Identifiers a delete document should target; empty generates fresh ones.
    pub iupds: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedPayload {
    pub fixture: Fixture,
    pub archive: PathBuf,
}

/// Writes the document an upload operation expects and packs it.
#[derive(Debug, Default, Clone)]
pub struct PayloadUseCase<P = ZipPackager, I = UuidIdSource, C = SystemClock> {
    packager: P,
    writer: FixtureWriter<I, C>,
}

impl<P: ArchivePackager, I: IdSource, C: Clock> PayloadUseCase<P, I, C> {
    pub fn new(packager: P, writer: FixtureWriter<I, C>) -> Self {
        Self { packager, writer }
    }

    /// Create and update send payment positions; delete sends position ids.
    pub fn prepare(&self, dir: &Path, req: &PayloadRequest) -> Result<PreparedPayload, AdapterError> {
        info!(
            zip_mode = ?req.zip_mode,
            validity = ?req.validity,
            operation = ?req.operation,
            count = req.count,
            "preparing payload"
        );
        let fixture = match req.operation {
            UploadOperation::Create | UploadOperation::Update => {
                self.writer.payment_positions(dir, req.count, req.validity)?
            }
            UploadOperation::Delete => {
                self.writer
                    .iupds(dir, req.count, req.validity, &req.iupds)?
            }
        };
        let archive = self.packager.pack(req.zip_mode, &fixture.path)?;
        Ok(PreparedPayload { fixture, archive })
    }

    /// A valid archive of `count` valid positions.
    pub fn zip_positions(&self, dir: &Path, count: usize) -> Result<PreparedPayload, AdapterError> {
        let fixture = self
            .writer
            .payment_positions(dir, count, Validity::Valid)?;
        let archive = self.packager.pack(ArchiveMode::Valid, &fixture.path)?;
        Ok(PreparedPayload { fixture, archive })
    }
}
