//! redb table definitions for the uptrack state store.
//!
//! Values are JSON documents; keys are plain strings.

use redb::TableDefinition;

/// Endpoint documents keyed by `{endpoint_id}`.
pub const ENDPOINTS: TableDefinition<&str, &[u8]> = TableDefinition::new("endpoints");

/// Health-check log keyed by `{endpoint_id}:{timestamp_millis:020}`, so a
/// prefix scan yields one endpoint's checks in chronological order.
pub const HEALTH_CHECKS: TableDefinition<&str, &[u8]> = TableDefinition::new("health_checks");
