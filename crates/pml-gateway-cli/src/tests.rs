// crates/pml-gateway-cli/src/tests.rs
// ============================================================================
// Module: CLI Tests
// Description: Unit tests for exit-code mapping and config loading.
// Purpose: Validate the documented exit codes and env override plumbing.
// Dependencies: pml-gateway-cli, tempfile
// ============================================================================

//! ## Overview
//! Validates the serve-error to exit-code mapping and config-file loading
//! with environment overrides.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;

use pml_gateway_mcp::server::ServeError;

use super::EXIT_INIT_FAILURE;
use super::EXIT_OK;
use super::EXIT_PORT_IN_USE;
use super::command_config_validate;
use super::exit_code_for;

// ============================================================================
// SECTION: Exit Code Tests
// ============================================================================

#[test]
fn port_in_use_maps_to_exit_code_two() {
    assert_eq!(exit_code_for(&ServeError::PortInUse(8787)), EXIT_PORT_IN_USE);
}

#[test]
fn initialization_failures_map_to_exit_code_one() {
    assert_eq!(exit_code_for(&ServeError::Init("db".to_string())), EXIT_INIT_FAILURE);
    assert_eq!(exit_code_for(&ServeError::Serve("io".to_string())), EXIT_INIT_FAILURE);
}

// ============================================================================
// SECTION: Config Validation Tests
// ============================================================================

#[test]
fn valid_config_file_passes_validation() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(file, "[server]\nport = 9000").expect("write");
    assert_eq!(command_config_validate(file.path()), EXIT_OK);
}

#[test]
fn invalid_config_file_fails_validation() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(file, "[sse]\nmax_clients = 0").expect("write");
    assert_eq!(command_config_validate(file.path()), EXIT_INIT_FAILURE);
}

#[test]
fn missing_config_file_fails_validation() {
    let path = std::path::Path::new("/nonexistent/gateway.toml");
    assert_eq!(command_config_validate(path), EXIT_INIT_FAILURE);
}
