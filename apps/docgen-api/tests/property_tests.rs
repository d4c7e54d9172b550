//! Property-based tests for docgen-api
//!
//! Tests the API models and identity validation using proptest.

use docgen_api::models::{AuditEntry, AuditQuery, DbAuditEvent};
use proptest::prelude::*;
use shared_types::{AuditAction, AuditEvent, Role, TenantContext};
use std::collections::BTreeMap;

// ============================================================
// Strategies
// ============================================================

fn valid_tenant_id() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{1,40}"
}

fn role_name() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("admin"),
        Just("attorney"),
        Just("paralegal"),
        Just("viewer"),
        Just("ADMIN"),
        Just(" Viewer "),
    ]
}

fn stored(event: &AuditEvent, seq: i64) -> DbAuditEvent {
    DbAuditEvent {
        seq,
        event_id: event.event_id.clone(),
        tenant_id: event.tenant_id.clone(),
        actor: event.actor.clone(),
        action: event.action.name().to_string(),
        details_json: serde_json::to_string(&event.action).unwrap(),
        metadata_json: serde_json::to_string(&event.metadata).unwrap(),
        document_hash: event.document_hash.clone(),
        previous_hash: event.previous_hash.clone(),
        event_hash: event.compute_hash(),
        created_at: event.timestamp.clone(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ============================================================
    // Identity Tests
    // ============================================================

    #[test]
    fn valid_tenant_ids_are_accepted(tenant in valid_tenant_id(), role in role_name()) {
        let role = Role::parse(role).unwrap();
        let ctx = TenantContext::new(&tenant, "user-1", role).unwrap();
        prop_assert_eq!(ctx.tenant_id, tenant);
    }

    #[test]
    fn path_like_tenant_ids_are_rejected(
        prefix in "[a-z]{0,8}",
        sep in prop_oneof![Just("/"), Just("\\"), Just(".."), Just("a b")],
        suffix in "[a-z]{1,8}"
    ) {
        let tenant = format!("{}{}{}", prefix, sep, suffix);
        prop_assert!(TenantContext::new(&tenant, "user-1", Role::Admin).is_err());
    }

    #[test]
    fn unknown_roles_do_not_parse(name in "[a-z]{1,12}") {
        let known = ["admin", "attorney", "paralegal", "viewer"];
        prop_assume!(!known.contains(&name.as_str()));
        prop_assert!(Role::parse(&name).is_none());
    }

    // ============================================================
    // Audit Query Tests
    // ============================================================

    #[test]
    fn audit_limit_is_clamped(limit in proptest::option::of(any::<u32>())) {
        let query = AuditQuery { limit };
        let effective = query.limit();
        prop_assert!(effective >= 1);
        prop_assert!(effective <= AuditQuery::MAX_LIMIT);
        if limit.is_none() {
            prop_assert_eq!(effective, AuditQuery::DEFAULT_LIMIT);
        }
    }

    // ============================================================
    // Audit Row Tests
    // ============================================================

    #[test]
    fn stored_rows_rebuild_the_same_event(
        field in "[A-Za-z]{1,20}",
        attempts in 1u32..5,
        key in "[a-z]{1,10}",
        value in "[ -~]{0,30}"
    ) {
        let mut metadata = BTreeMap::new();
        metadata.insert(key, value);
        let event = AuditEvent::new(
            "firm-a",
            AuditAction::TextGenerated { field, attempts },
            "user-1",
            None,
            Some("ab".repeat(32)),
            metadata,
        );

        let row = stored(&event, 7);
        let rebuilt = row.to_event().unwrap();
        prop_assert_eq!(rebuilt.compute_hash(), event.compute_hash());

        let entry = AuditEntry::from(row);
        prop_assert_eq!(entry.action, "TEXT_GENERATED");
        prop_assert_eq!(entry.metadata, event.metadata);
    }
}
