//! Synthetic payment-position and IUPD documents.

use gpdload_types::{
    DebtorType, IupdBatch, IupdDocument, MalformedIupdDocument, PaymentOption, PaymentPosition,
    PaymentPositionBatch, Transfer, Validity,
};
use time::OffsetDateTime;
use time::macros::format_description;

pub const IUPD_PREFIX: &str = "IUPD_GPD_UPLOAD_TEST";
pub const IUV_PREFIX: &str = "IUV_GPD_UPLOAD_TEST";
pub const FIXTURE_CATEGORY: &str = "category-integration-test-gpd-upload";
pub const FIXTURE_IBAN: &str = "IT0000000000000000000000000";

const FIXTURE_AMOUNT: i64 = 100;

/// Source of random identifier fragments.
pub trait IdSource {
    /// Returns a fragment of exactly `len` characters.
    fn fragment(&self, len: usize) -> String;
}

/// Prefixes of hyphenated v4 UUIDs, e.g. `"1f0e4c2a-9b"` for `len == 11`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdSource;

impl IdSource for UuidIdSource {
    fn fragment(&self, len: usize) -> String {
        let mut out = String::with_capacity(len);
        while out.len() < len {
            out.push_str(&uuid::Uuid::new_v4().to_string());
        }
        out.truncate(len);
        out
    }
}

pub trait Clock: Send + Sync {
    fn now_utc(&self) -> OffsetDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now_utc(&self) -> OffsetDateTime {
        self.0
    }
}

/// Due date one day after `now`, as `YYYY-MM-DDTHH:MM:SS.mmm` (UTC, no offset).
pub fn due_date(now: OffsetDateTime) -> String {
    let fmt = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]");
    (now + time::Duration::days(1))
        .format(&fmt)
        .unwrap_or_else(|_| "1970-01-02T00:00:00.000".to_string())
}

/// Build `count` positions owned by one freshly generated fiscal code.
///
/// `Validity::Invalid` nulls `companyName` on every position and changes
/// nothing else.
pub fn generate_batch<I: IdSource, C: Clock>(
    count: usize,
    validity: Validity,
    ids: &I,
    clock: &C,
) -> PaymentPositionBatch {
    let fiscal_code = ids.fragment(11);
    let due = due_date(clock.now_utc());

    let payment_positions = (0..count)
        .map(|_| {
            let mut position = payment_position(&fiscal_code, &due, ids);
            if validity == Validity::Invalid {
                position.company_name = None;
            }
            position
        })
        .collect();

    PaymentPositionBatch { payment_positions }
}

fn payment_position<I: IdSource>(fiscal_code: &str, due: &str, ids: &I) -> PaymentPosition {
    PaymentPosition {
        iupd: format!("{IUPD_PREFIX}{}", ids.fragment(11)),
        debtor_type: DebtorType::NaturalPerson,
        fiscal_code: fiscal_code.to_string(),
        full_name: "Full Name".to_string(),
        company_name: Some("Company Name".to_string()),
        payment_option: vec![PaymentOption {
            iuv: format!("{IUV_PREFIX}{}", ids.fragment(11)),
            amount: FIXTURE_AMOUNT,
            is_partial_payment: false,
            description: "An example description".to_string(),
            due_date: due.to_string(),
            transfer: vec![Transfer {
                id_transfer: "1".to_string(),
                amount: FIXTURE_AMOUNT,
                remittance_information: ids.fragment(10),
                category: FIXTURE_CATEGORY.to_string(),
                iban: FIXTURE_IBAN.to_string(),
                company_name: Some("Integration Test Company".to_string()),
                transfer_metadata: vec![],
            }],
            payment_option_metadata: vec![],
        }],
        switch_to_expired: false,
    }
}

/// Build the document for a bulk-delete upload.
///
/// A valid document reuses `existing` when it is non-empty (ids taken from
/// an earlier batch), otherwise it carries `count` fresh ids.
pub fn generate_iupd_document<I: IdSource>(
    count: usize,
    validity: Validity,
    existing: &[String],
    ids: &I,
) -> IupdDocument {
    match validity {
        Validity::Invalid => IupdDocument::Malformed(MalformedIupdDocument {
            name: "John".to_string(),
        }),
        Validity::Valid => {
            let payment_position_iupds = if existing.is_empty() {
                (0..count).map(|_| ids.fragment(11)).collect()
            } else {
                existing.to_vec()
            };
            IupdDocument::Batch(IupdBatch {
                payment_position_iupds,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicU64, Ordering};
    use time::PrimitiveDateTime;
    use time::macros::datetime;

    /// Deterministic ids: zero-padded counter.
    #[derive(Default)]
    struct SequentialIds(AtomicU64);

    impl IdSource for SequentialIds {
        fn fragment(&self, len: usize) -> String {
            let n = self.0.fetch_add(1, Ordering::Relaxed);
            let s = format!("{n:0>width$}", width = len);
            s[s.len() - len..].to_string()
        }
    }

    fn clock() -> FixedClock {
        FixedClock(datetime!(2024-03-10 08:15:30.123456 UTC))
    }

    #[test]
    fn due_date_is_next_day_truncated_to_millis() {
        assert_eq!(due_date(clock().0), "2024-03-11T08:15:30.123");
    }

    #[test]
    fn uuid_fragments_have_requested_length() {
        let ids = UuidIdSource;
        assert_eq!(ids.fragment(4).len(), 4);
        assert_eq!(ids.fragment(11).len(), 11);
        assert_eq!(ids.fragment(50).len(), 50);
        assert_ne!(ids.fragment(11), ids.fragment(11));
    }

    #[test]
    fn valid_batch_uses_fixture_constants() {
        let batch = generate_batch(2, Validity::Valid, &SequentialIds::default(), &clock());
        let p = &batch.payment_positions[0];
        assert!(p.iupd.starts_with(IUPD_PREFIX));
        assert_eq!(p.iupd.len(), IUPD_PREFIX.len() + 11);
        assert_eq!(p.company_name.as_deref(), Some("Company Name"));
        let option = &p.payment_option[0];
        assert!(option.iuv.starts_with(IUV_PREFIX));
        assert_eq!(option.amount, 100);
        assert_eq!(option.transfer[0].iban, FIXTURE_IBAN);
        assert_eq!(option.transfer[0].category, FIXTURE_CATEGORY);
        assert_eq!(option.transfer[0].remittance_information.len(), 10);
    }

    #[test]
    fn empty_batch_is_allowed() {
        let batch = generate_batch(0, Validity::Valid, &UuidIdSource, &clock());
        assert!(batch.is_empty());
        let json = serde_json::to_string(&batch).unwrap();
        assert_eq!(json, r#"{"paymentPositions":[]}"#);
    }

    #[test]
    fn invalid_batch_differs_only_in_company_name() {
        let valid = generate_batch(3, Validity::Valid, &SequentialIds::default(), &clock());
        let mut invalid = generate_batch(3, Validity::Invalid, &SequentialIds::default(), &clock());

        assert!(invalid.payment_positions.iter().all(|p| p.company_name.is_none()));

        for p in &mut invalid.payment_positions {
            p.company_name = Some("Company Name".to_string());
        }
        assert_eq!(valid, invalid);
    }

    #[test]
    fn iupd_document_reuses_existing_ids() {
        let existing = vec!["IUPD_A".to_string(), "IUPD_B".to_string()];
        let doc = generate_iupd_document(5, Validity::Valid, &existing, &UuidIdSource);
        match doc {
            IupdDocument::Batch(b) => assert_eq!(b.payment_position_iupds, existing),
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn iupd_document_generates_fresh_ids() {
        let doc = generate_iupd_document(4, Validity::Valid, &[], &UuidIdSource);
        match doc {
            IupdDocument::Batch(b) => {
                assert_eq!(b.payment_position_iupds.len(), 4);
                assert!(b.payment_position_iupds.iter().all(|id| id.len() == 11));
            }
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn invalid_iupd_document_has_unrelated_shape() {
        let doc = generate_iupd_document(4, Validity::Invalid, &[], &UuidIdSource);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json, serde_json::json!({"name": "John"}));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn valid_batch_invariants(count in 0usize..40) {
            let batch = generate_batch(count, Validity::Valid, &UuidIdSource, &SystemClock);
            prop_assert_eq!(batch.len(), count);

            let fiscal_codes: BTreeSet<&str> =
                batch.payment_positions.iter().map(|p| p.fiscal_code.as_str()).collect();
            prop_assert!(fiscal_codes.len() <= 1);

            let iupds: BTreeSet<String> = batch.iupds().into_iter().collect();
            prop_assert_eq!(iupds.len(), count);

            let fmt = format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
            );
            for p in &batch.payment_positions {
                for o in &p.payment_option {
                    prop_assert!(PrimitiveDateTime::parse(&o.due_date, &fmt).is_ok());
                }
            }
        }
    }
}
