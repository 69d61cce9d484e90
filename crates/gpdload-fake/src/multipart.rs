//! Pulls one file part out of a recorded `multipart/form-data` body.

use futures::stream;
use std::convert::Infallible;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FilePart {
    pub filename: Option<String>,
    pub content: Vec<u8>,
}

/// Finds the part whose form field name is exactly `field`.
///
/// The body is already in memory, so the parser runs to completion on the
/// calling thread. A malformed body or missing boundary yields `None`.
pub(crate) fn find_part(content_type: &str, body: &[u8], field: &str) -> Option<FilePart> {
    let boundary = multer::parse_boundary(content_type).ok()?;
    let chunks = stream::once(futures::future::ready(Ok::<_, Infallible>(body.to_vec())));
    let mut multipart = multer::Multipart::new(chunks, boundary);

    futures::executor::block_on(async move {
        while let Some(part) = multipart.next_field().await.ok()? {
            if part.name() != Some(field) {
                continue;
            }
            let filename = part.file_name().map(str::to_string);
            let content = part.bytes().await.ok()?.to_vec();
            return Some(FilePart { filename, content });
        }
        None
    })
}
