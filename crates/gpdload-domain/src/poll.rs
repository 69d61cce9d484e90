//! Upload-job state and the resource paths derived from it.

use crate::DomainError;
use gpdload_types::UploadStatus;
use regex::Regex;
use std::sync::LazyLock;

static UID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"file/(.*?)/status").expect("uid pattern is valid"));

/// Two-state view of a remote upload job.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PollState {
    /// `processedItem != submittedItem`
    Pending,
    /// `processedItem == submittedItem`
    Completed,
}

impl PollState {
    pub fn from_status(status: &UploadStatus) -> Self {
        if status.is_completed() {
            PollState::Completed
        } else {
            PollState::Pending
        }
    }

    pub fn is_terminal(self) -> bool {
        self == PollState::Completed
    }
}

/// Extract the job UID from a `Location` value such as
/// `brokers/B/organizations/O/debtpositions/file/<UID>/status`.
pub fn extract_upload_uid(location: &str) -> Option<String> {
    UID_PATTERN
        .captures(location)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|uid| !uid.is_empty())
        .map(str::to_string)
}

/// Sibling report resource of a status URL.
pub fn report_url(status_url: &str) -> Result<String, DomainError> {
    if !status_url.contains("/status") {
        return Err(DomainError::NotAStatusUrl(status_url.to_string()));
    }
    Ok(status_url.replacen("/status", "/report", 1))
}

pub fn upload_path(broker: &str, organization: &str) -> String {
    format!("/brokers/{broker}/organizations/{organization}/debtpositions/file")
}

pub fn status_url(broker: &str, organization: &str, uid: &str) -> String {
    format!("{}/{uid}/status", upload_path(broker, organization))
}

/// Replace the `UID` placeholder of a scenario path with the extracted job id.
pub fn substitute_uid(template: &str, uid: &str) -> String {
    template.replace("UID", uid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(processed: u64, submitted: u64) -> UploadStatus {
        UploadStatus {
            upload_id: Some("abc".into()),
            processed_item: processed,
            submitted_item: submitted,
            start_time: None,
        }
    }

    #[test]
    fn state_follows_counters() {
        assert_eq!(PollState::from_status(&status(0, 3)), PollState::Pending);
        assert_eq!(PollState::from_status(&status(3, 3)), PollState::Completed);
        assert!(PollState::Completed.is_terminal());
        assert!(!PollState::Pending.is_terminal());
    }

    #[test]
    fn completed_state_is_stable_across_reads() {
        let done = status(7, 7);
        for _ in 0..3 {
            assert_eq!(PollState::from_status(&done), PollState::Completed);
        }
    }

    #[test]
    fn uid_is_extracted_from_relative_location() {
        let loc = "brokers/77777777777/organizations/77777777777/debtpositions/file/4a7e1f/status";
        assert_eq!(extract_upload_uid(loc).as_deref(), Some("4a7e1f"));
    }

    #[test]
    fn uid_is_extracted_from_absolute_location() {
        let loc = "https://api.example.it/v1/brokers/b/organizations/o/debtpositions/file/u-1/status";
        assert_eq!(extract_upload_uid(loc).as_deref(), Some("u-1"));
    }

    #[test]
    fn uid_missing_when_location_has_no_status_segment() {
        assert_eq!(extract_upload_uid("brokers/b/organizations/o"), None);
        assert_eq!(extract_upload_uid("file//status"), None);
    }

    #[test]
    fn report_url_replaces_status_segment() {
        assert_eq!(
            report_url("/brokers/b/organizations/o/debtpositions/file/u/status").unwrap(),
            "/brokers/b/organizations/o/debtpositions/file/u/report"
        );
    }

    #[test]
    fn report_url_rejects_non_status_url() {
        assert_eq!(
            report_url("/info"),
            Err(DomainError::NotAStatusUrl("/info".into()))
        );
    }

    #[test]
    fn paths_are_broker_scoped() {
        assert_eq!(
            status_url("B1", "O1", "U1"),
            "/brokers/B1/organizations/O1/debtpositions/file/U1/status"
        );
        assert_eq!(
            substitute_uid("/brokers/B1/organizations/O1/debtpositions/file/UID/report", "abc"),
            "/brokers/B1/organizations/O1/debtpositions/file/abc/report"
        );
    }
}
