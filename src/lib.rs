//! gpdload workspace-level test utilities.
//!
//! This crate exists solely to host workspace-level integration tests:
//! the BDD/cucumber scenarios in `tests/cucumber.rs` (features under
//! `features/`) and the end-to-end flows in `tests/integration/`.
//!
//! The harness itself lives in the workspace member crates:
//! - `gpdload-types`: wire documents, receipts and JSON schemas
//! - `gpdload-domain`: fixture generation and status-URL rules
//! - `gpdload-adapters`: fixture files and ZIP packaging
//! - `gpdload-client`: HTTP facade for the GPD-Upload service
//! - `gpdload-config`: config file and environment resolution
//! - `gpdload-fake`: in-process service simulator
//! - `gpdload-app`: polling, scenario driver, end-to-end and load use cases
//! - `gpdload` (gpdload-cli): CLI interface
