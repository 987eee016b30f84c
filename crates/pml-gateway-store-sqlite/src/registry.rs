// crates/pml-gateway-store-sqlite/src/registry.rs
// ============================================================================
// Module: Capability Registry
// Description: FQDN-addressed capability records with idempotent creation.
// Purpose: Create, resolve, list, and meter capability records.
// Dependencies: pml-gateway-core, rusqlite
// ============================================================================

//! ## Overview
//! The registry owns the `capability_records` table. Creation is idempotent
//! on the FQDN components: re-creating a capability with identical
//! `(org, project, namespace, action, hash)` updates the existing row in
//! place and increments its version. Bare-name resolution prefers the
//! caller's scope and falls back to public records in any scope.
//! Permission-set updates validate against the escalation lattice and fail
//! closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;

use pml_gateway_core::types::capability::CapabilityRecord;
use pml_gateway_core::types::capability::Fqdn;
use pml_gateway_core::types::capability::Routing;
use pml_gateway_core::types::capability::Scope;
use pml_gateway_core::types::capability::Visibility;
use pml_gateway_core::types::identifiers::CapabilityId;
use pml_gateway_core::types::permission::PermissionSet;
use pml_gateway_core::types::permission::PermissionSource;
use pml_gateway_core::types::time::Timestamp;

use crate::store::SqliteStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Request to create (or idempotently update) a capability.
///
/// # Invariants
/// - `fqdn` is validated before the request is constructed.
#[derive(Debug, Clone)]
pub struct CreateCapabilityRequest {
    /// Unique naming components.
    pub fqdn: Fqdn,
    /// Workflow pattern owning code and embedding.
    pub workflow_pattern_id: String,
    /// Visibility outside the owning scope.
    pub visibility: Visibility,
    /// Execution routing.
    pub routing: Routing,
    /// Stored permission set.
    pub permission_set: PermissionSet,
    /// Permission provenance.
    pub permission_source: PermissionSource,
    /// Permission inference confidence in `[0, 1]`.
    pub permission_confidence: f64,
}

/// Sort orders for capability listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapabilitySort {
    /// Most recently updated first.
    #[default]
    UpdatedAt,
    /// Most used first.
    Usage,
    /// Highest success rate first.
    SuccessRate,
}

/// Listing filter for capability queries.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Page size; zero means no limit.
    pub limit: usize,
    /// Offset into the sorted listing.
    pub offset: usize,
    /// Minimum observed success rate.
    pub min_success_rate: Option<f64>,
    /// Sort order.
    pub sort: CapabilitySort,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Registry over the `capability_records` table.
#[derive(Clone)]
pub struct CapabilityRegistry {
    /// Shared database handle.
    store: SqliteStore,
}

impl CapabilityRegistry {
    /// Creates a registry over the shared store.
    #[must_use]
    pub fn new(store: SqliteStore) -> Self {
        Self {
            store,
        }
    }

    /// Creates a capability, or idempotently updates the FQDN match.
    ///
    /// On an existing FQDN the stored `id` is retained and `version`
    /// increments; counters are preserved.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure or invalid confidence.
    pub fn create(&self, request: &CreateCapabilityRequest) -> Result<CapabilityRecord, StoreError> {
        if !(0.0..=1.0).contains(&request.permission_confidence) {
            return Err(StoreError::Invalid(format!(
                "permission confidence out of range: {}",
                request.permission_confidence
            )));
        }
        let now = Timestamp::now();
        let connection = self.store.lock();
        let existing: Option<String> = connection
            .query_row(
                "SELECT id FROM capability_records
                 WHERE org = ?1 AND project = ?2 AND namespace = ?3 AND action = ?4 AND hash = ?5",
                params![
                    request.fqdn.org,
                    request.fqdn.project,
                    request.fqdn.namespace,
                    request.fqdn.action,
                    request.fqdn.hash
                ],
                |row| row.get(0),
            )
            .optional()?;
        let id = match existing {
            Some(id) => {
                connection.execute(
                    "UPDATE capability_records SET
                         workflow_pattern_id = ?1,
                         visibility = ?2,
                         routing = ?3,
                         version = version + 1,
                         permission_set = ?4,
                         permission_source = ?5,
                         permission_confidence = ?6,
                         updated_at = ?7
                     WHERE id = ?8",
                    params![
                        request.workflow_pattern_id,
                        visibility_label(request.visibility),
                        routing_label(request.routing),
                        request.permission_set.as_str(),
                        permission_source_label(request.permission_source),
                        request.permission_confidence,
                        now.as_unix_millis(),
                        id
                    ],
                )?;
                id
            }
            None => {
                let id = CapabilityId::generate().to_string();
                connection.execute(
                    "INSERT INTO capability_records (
                         id, org, project, namespace, action, hash,
                         workflow_pattern_id, visibility, routing, version,
                         verified, usage_count, success_count, total_latency_ms,
                         permission_set, permission_source, permission_confidence,
                         created_at, updated_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1,
                               0, 0, 0, 0, ?10, ?11, ?12, ?13, ?13)",
                    params![
                        id,
                        request.fqdn.org,
                        request.fqdn.project,
                        request.fqdn.namespace,
                        request.fqdn.action,
                        request.fqdn.hash,
                        request.workflow_pattern_id,
                        visibility_label(request.visibility),
                        routing_label(request.routing),
                        request.permission_set.as_str(),
                        permission_source_label(request.permission_source),
                        request.permission_confidence,
                        now.as_unix_millis()
                    ],
                )?;
                id
            }
        };
        read_by_id(&connection, &id)
    }

    /// Returns a capability by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent.
    pub fn get(&self, id: &CapabilityId) -> Result<CapabilityRecord, StoreError> {
        read_by_id(&self.store.lock(), &id.to_string())
    }

    /// Resolves a bare name (`ns:action` or `action`) within a scope.
    ///
    /// Records in the caller's scope win; otherwise any public record
    /// matches.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when nothing matches.
    pub fn resolve(&self, name: &str, scope: &Scope) -> Result<CapabilityRecord, StoreError> {
        let (namespace, action) = match name.split_once(':') {
            Some((namespace, action)) => (Some(namespace.to_string()), action.to_string()),
            None => (None, name.to_string()),
        };
        let connection = self.store.lock();
        let scoped = query_resolution(
            &connection,
            namespace.as_deref(),
            &action,
            Some(scope),
            false,
        )?;
        if let Some(record) = scoped {
            return Ok(record);
        }
        let public = query_resolution(&connection, namespace.as_deref(), &action, None, true)?;
        public.ok_or_else(|| StoreError::NotFound(format!("capability `{name}`")))
    }

    /// Lists capabilities in a scope.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn list(
        &self,
        scope: &Scope,
        options: &ListOptions,
    ) -> Result<(Vec<CapabilityRecord>, usize), StoreError> {
        let connection = self.store.lock();
        let order = match options.sort {
            CapabilitySort::UpdatedAt => "updated_at DESC",
            CapabilitySort::Usage => "usage_count DESC",
            CapabilitySort::SuccessRate => {
                "CASE WHEN usage_count = 0 THEN 0.0
                      ELSE CAST(success_count AS REAL) / usage_count END DESC"
            }
        };
        let sql = format!(
            "SELECT * FROM capability_records WHERE org = ?1 AND project = ?2 ORDER BY {order}"
        );
        let mut statement = connection.prepare(&sql)?;
        let rows = statement
            .query_map(params![scope.org, scope.project], read_record)?
            .collect::<Result<Vec<_>, _>>()?;
        let mut records: Vec<CapabilityRecord> = rows.into_iter().collect::<Result<_, _>>()?;
        if let Some(min) = options.min_success_rate {
            records.retain(|record| record.success_rate().unwrap_or(0.0) >= min);
        }
        let total = records.len();
        let records = records
            .into_iter()
            .skip(options.offset)
            .take(if options.limit == 0 { usize::MAX } else { options.limit })
            .collect();
        Ok((records, total))
    }

    /// Records one call against a capability.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the capability is absent.
    pub fn record_usage(
        &self,
        id: &CapabilityId,
        success: bool,
        latency_ms: u64,
    ) -> Result<(), StoreError> {
        let connection = self.store.lock();
        let updated = connection.execute(
            "UPDATE capability_records SET
                 usage_count = usage_count + 1,
                 success_count = success_count + ?1,
                 total_latency_ms = total_latency_ms + ?2,
                 updated_at = ?3
             WHERE id = ?4",
            params![
                i64::from(success),
                latency_ms as i64,
                Timestamp::now().as_unix_millis(),
                id.to_string()
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("capability {id}")));
        }
        Ok(())
    }

    /// Marks a capability as verified.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the capability is absent.
    pub fn set_verified(&self, id: &CapabilityId, verified: bool) -> Result<(), StoreError> {
        let connection = self.store.lock();
        let updated = connection.execute(
            "UPDATE capability_records SET verified = ?1 WHERE id = ?2",
            params![i64::from(verified), id.to_string()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("capability {id}")));
        }
        Ok(())
    }

    /// Updates a capability's permission set through the escalation lattice.
    ///
    /// Same-set updates are no-ops; anything not in the lattice fails and
    /// leaves the stored set unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Integrity`] on an illegal escalation and
    /// [`StoreError::NotFound`] when the capability is absent.
    pub fn update_permission_set(
        &self,
        id: &CapabilityId,
        to: PermissionSet,
    ) -> Result<(), StoreError> {
        let connection = self.store.lock();
        let current_label: Option<String> = connection
            .query_row(
                "SELECT permission_set FROM capability_records WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let current_label =
            current_label.ok_or_else(|| StoreError::NotFound(format!("capability {id}")))?;
        let current = PermissionSet::parse(&current_label)
            .ok_or_else(|| StoreError::Corrupt(format!("permission set `{current_label}`")))?;
        if current == to {
            return Ok(());
        }
        if !current.may_escalate(to) {
            return Err(StoreError::Integrity(format!(
                "illegal permission escalation {} -> {}",
                current.as_str(),
                to.as_str()
            )));
        }
        connection.execute(
            "UPDATE capability_records SET permission_set = ?1, updated_at = ?2 WHERE id = ?3",
            params![to.as_str(), Timestamp::now().as_unix_millis(), id.to_string()],
        )?;
        Ok(())
    }

    /// Deletes a capability.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the capability is absent.
    pub fn delete(&self, id: &CapabilityId) -> Result<(), StoreError> {
        let deleted = self
            .store
            .lock()
            .execute("DELETE FROM capability_records WHERE id = ?1", params![id.to_string()])?;
        if deleted == 0 {
            return Err(StoreError::NotFound(format!("capability {id}")));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Reads a capability by string id.
fn read_by_id(
    connection: &rusqlite::Connection,
    id: &str,
) -> Result<CapabilityRecord, StoreError> {
    let record = connection
        .query_row(
            "SELECT * FROM capability_records WHERE id = ?1",
            params![id],
            read_record,
        )
        .optional()?;
    match record {
        Some(record) => record,
        None => Err(StoreError::NotFound(format!("capability {id}"))),
    }
}

/// Runs a single resolution query.
fn query_resolution(
    connection: &rusqlite::Connection,
    namespace: Option<&str>,
    action: &str,
    scope: Option<&Scope>,
    public_only: bool,
) -> Result<Option<CapabilityRecord>, StoreError> {
    let mut sql = String::from("SELECT * FROM capability_records WHERE action = ?");
    let mut arguments: Vec<String> = vec![action.to_string()];
    if let Some(namespace) = namespace {
        sql.push_str(" AND namespace = ?");
        arguments.push(namespace.to_string());
    }
    if let Some(scope) = scope {
        sql.push_str(" AND org = ? AND project = ?");
        arguments.push(scope.org.clone());
        arguments.push(scope.project.clone());
    }
    if public_only {
        sql.push_str(" AND visibility = 'public'");
    }
    sql.push_str(" ORDER BY updated_at DESC LIMIT 1");
    let mut statement = connection.prepare(&sql)?;
    let row = statement
        .query_row(rusqlite::params_from_iter(arguments.iter()), read_record)
        .optional()?;
    row.transpose()
}

/// Decodes one capability row.
///
/// Returns a nested result so corrupt rows map onto [`StoreError::Corrupt`]
/// instead of panicking.
fn read_record(row: &Row<'_>) -> rusqlite::Result<Result<CapabilityRecord, StoreError>> {
    let id_raw: String = row.get("id")?;
    let org: String = row.get("org")?;
    let project: String = row.get("project")?;
    let namespace: String = row.get("namespace")?;
    let action: String = row.get("action")?;
    let hash: String = row.get("hash")?;
    let visibility_raw: String = row.get("visibility")?;
    let routing_raw: String = row.get("routing")?;
    let permission_raw: String = row.get("permission_set")?;
    let source_raw: String = row.get("permission_source")?;
    Ok((|| {
        let id = CapabilityId::parse(&id_raw)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let fqdn = Fqdn::new(org, project, namespace, action, hash)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        Ok(CapabilityRecord {
            id,
            fqdn,
            workflow_pattern_id: row
                .get("workflow_pattern_id")
                .map_err(|err| StoreError::Db(err.to_string()))?,
            visibility: parse_visibility(&visibility_raw)?,
            routing: parse_routing(&routing_raw)?,
            version: row.get::<_, i64>("version").map_err(|err| StoreError::Db(err.to_string()))?
                as u64,
            verified: row
                .get::<_, i64>("verified")
                .map_err(|err| StoreError::Db(err.to_string()))?
                != 0,
            usage_count: row
                .get::<_, i64>("usage_count")
                .map_err(|err| StoreError::Db(err.to_string()))? as u64,
            success_count: row
                .get::<_, i64>("success_count")
                .map_err(|err| StoreError::Db(err.to_string()))? as u64,
            total_latency_ms: row
                .get::<_, i64>("total_latency_ms")
                .map_err(|err| StoreError::Db(err.to_string()))? as u64,
            permission_set: PermissionSet::parse(&permission_raw)
                .ok_or_else(|| StoreError::Corrupt(format!("permission `{permission_raw}`")))?,
            permission_source: parse_permission_source(&source_raw)?,
            permission_confidence: row
                .get("permission_confidence")
                .map_err(|err| StoreError::Db(err.to_string()))?,
            created_at: Timestamp::from_unix_millis(
                row.get("created_at").map_err(|err| StoreError::Db(err.to_string()))?,
            ),
            updated_at: Timestamp::from_unix_millis(
                row.get("updated_at").map_err(|err| StoreError::Db(err.to_string()))?,
            ),
        })
    })())
}

/// Returns the persisted visibility label.
const fn visibility_label(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Public => "public",
        Visibility::Private => "private",
    }
}

/// Parses a persisted visibility label.
fn parse_visibility(label: &str) -> Result<Visibility, StoreError> {
    match label {
        "public" => Ok(Visibility::Public),
        "private" => Ok(Visibility::Private),
        other => Err(StoreError::Corrupt(format!("visibility `{other}`"))),
    }
}

/// Returns the persisted routing label.
const fn routing_label(routing: Routing) -> &'static str {
    match routing {
        Routing::Local => "local",
        Routing::Remote => "remote",
    }
}

/// Parses a persisted routing label.
fn parse_routing(label: &str) -> Result<Routing, StoreError> {
    match label {
        "local" => Ok(Routing::Local),
        "remote" => Ok(Routing::Remote),
        other => Err(StoreError::Corrupt(format!("routing `{other}`"))),
    }
}

/// Returns the persisted permission-source label.
const fn permission_source_label(source: PermissionSource) -> &'static str {
    match source {
        PermissionSource::Manual => "manual",
        PermissionSource::Emergent => "emergent",
    }
}

/// Parses a persisted permission-source label.
fn parse_permission_source(label: &str) -> Result<PermissionSource, StoreError> {
    match label {
        "manual" => Ok(PermissionSource::Manual),
        "emergent" => Ok(PermissionSource::Emergent),
        other => Err(StoreError::Corrupt(format!("permission source `{other}`"))),
    }
}
