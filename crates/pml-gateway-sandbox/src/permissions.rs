// crates/pml-gateway-sandbox/src/permissions.rs
// ============================================================================
// Module: Sandbox Permission Flags
// Description: Deny-by-default flag mapping for subprocess-mode workers.
// Purpose: Translate permission sets into worker runtime flags.
// Dependencies: pml-gateway-core
// ============================================================================

//! ## Overview
//! Subprocess-mode workers receive their host access as runtime flags
//! computed from the effective permission set. The mapping is
//! deny-by-default: an empty set of grants for `minimal`, scoped grants for
//! the named sets, and `--deny-run --deny-ffi` appended unconditionally.
//! In-process worker modes carry no filesystem or network at all;
//! permissions exist there only for API symmetry.
//!
//! Security posture: flags are the sandbox's outer boundary; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use pml_gateway_core::types::permission::PermissionSet;

// ============================================================================
// SECTION: Flag Mapping
// ============================================================================

/// Flags always applied regardless of the permission set.
pub const ALWAYS_DENIED: &[&str] = &["--deny-run", "--deny-ffi"];

/// Returns the worker runtime flags for a permission set.
///
/// The returned vector always ends with [`ALWAYS_DENIED`].
#[must_use]
pub fn permission_flags(set: PermissionSet) -> Vec<String> {
    let mut flags: Vec<String> = match set {
        PermissionSet::Minimal => Vec::new(),
        PermissionSet::Readonly => vec!["--allow-read=./data,/tmp".to_string()],
        PermissionSet::Filesystem => {
            vec!["--allow-read".to_string(), "--allow-write=/tmp".to_string()]
        }
        PermissionSet::NetworkApi => vec!["--allow-net".to_string()],
        PermissionSet::McpStandard => vec![
            "--allow-read".to_string(),
            "--allow-net".to_string(),
            "--allow-write=/tmp,./output".to_string(),
            "--allow-env=HOME,PATH".to_string(),
        ],
        PermissionSet::Trusted => vec![
            "--allow-read".to_string(),
            "--allow-write".to_string(),
            "--allow-net".to_string(),
            "--allow-env".to_string(),
        ],
    };
    flags.extend(ALWAYS_DENIED.iter().map(ToString::to_string));
    flags
}

/// Returns true when the set grants any network access.
#[must_use]
pub const fn allows_network(set: PermissionSet) -> bool {
    matches!(
        set,
        PermissionSet::NetworkApi | PermissionSet::McpStandard | PermissionSet::Trusted
    )
}

/// Returns true when the set grants any filesystem read access.
#[must_use]
pub const fn allows_read(set: PermissionSet) -> bool {
    !matches!(set, PermissionSet::Minimal | PermissionSet::NetworkApi)
}
