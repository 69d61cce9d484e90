use gpdload_types::{IupdBatch, PaymentPositionBatch, UploadOperation};
use std::io::{Cursor, Read};

/// A 400 the simulated service answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rejection {
    pub title: &'static str,
    pub detail: String,
}

impl Rejection {
    fn new(title: &'static str, detail: impl Into<String>) -> Self {
        Self {
            title,
            detail: detail.into(),
        }
    }
}

/// Outcome of an accepted upload: the identifiers it will report on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Accepted {
    pub iupds: Vec<String>,
}

/// Checks an uploaded archive the way the service does before queuing it.
pub(crate) fn check_upload(
    filename: Option<&str>,
    archive: &[u8],
    operation: UploadOperation,
) -> Result<Accepted, Rejection> {
    let is_zip = filename.is_some_and(|f| f.to_ascii_lowercase().ends_with(".zip"));
    if !is_zip {
        return Err(Rejection::new("NOT A ZIP FILE", "Only ZIP files can be uploaded."));
    }

    let document = single_json_entry(archive)?;

    match operation {
        UploadOperation::Create | UploadOperation::Update => {
            let batch: PaymentPositionBatch = serde_json::from_slice(&document)
                .map_err(|e| Rejection::new("INVALID JSON", e.to_string()))?;
            if batch.is_empty() {
                return Err(Rejection::new(
                    "INVALID DEBT POSITIONS",
                    "The list of payment positions must contain at least one element",
                ));
            }
            if batch.payment_positions.iter().any(|p| p.company_name.is_none()) {
                return Err(Rejection::new(
                    "INVALID DEBT POSITIONS",
                    "The format of the debt positions in the uploaded file is invalid.",
                ));
            }
            Ok(Accepted {
                iupds: batch.iupds(),
            })
        }
        UploadOperation::Delete => {
            let batch: IupdBatch = serde_json::from_slice(&document)
                .map_err(|e| Rejection::new("INVALID JSON", e.to_string()))?;
            if batch.payment_position_iupds.is_empty() {
                return Err(Rejection::new(
                    "INVALID DEBT POSITIONS",
                    "The list of payment positions IUPD must contain at least one element",
                ));
            }
            Ok(Accepted {
                iupds: batch.payment_position_iupds,
            })
        }
    }
}

fn single_json_entry(archive: &[u8]) -> Result<Vec<u8>, Rejection> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| Rejection::new("INVALID FILE", format!("Could not unzip file: {e}")))?;

    if zip.len() == 0 {
        return Err(Rejection::new("INVALID FILE", "No valid file found in ZIP."));
    }
    if zip.len() > 1 {
        return Err(Rejection::new("INVALID FILE", "Too many entries in ZIP file."));
    }

    let mut entry = zip
        .by_index(0)
        .map_err(|e| Rejection::new("INVALID FILE", format!("Could not unzip file: {e}")))?;
    if !entry.name().to_ascii_lowercase().ends_with(".json") {
        return Err(Rejection::new("INVALID FILE", "ZIP contains unsupported file type."));
    }
    let mut out = Vec::new();
    entry
        .read_to_end(&mut out)
        .map_err(|e| Rejection::new("INVALID FILE", format!("Could not unzip file: {e}")))?;
    Ok(out)
}
