use serde_json::json;
use wp_portal_schema::db::{MemoryStorage, Storage, SyncOutcome, TableNames};
use wp_portal_schema::service::Portal;
use wp_portal_schema::service::portal::DB_VERSION_OPTION;
use wp_portal_schema::SchemaVersion;

fn portal() -> Portal<MemoryStorage> {
    Portal::new(
        MemoryStorage::new().with_users_table("wp_users"),
        TableNames::new("wp_", None).unwrap(),
    )
}

fn v(s: &str) -> SchemaVersion {
    s.parse().unwrap()
}

#[tokio::test]
async fn fresh_activation_builds_everything() {
    let portal = portal();

    let report = portal.activate().await.unwrap();

    assert_eq!(report.schema.tables.len(), 4);
    assert!(
        report
            .schema
            .tables
            .iter()
            .all(|(_, o)| *o == SyncOutcome::Created)
    );
    assert_eq!(report.upgrade.from, v("1.0.0"));
    assert_eq!(report.upgrade.to, v("1.0.2"));
    assert_eq!(report.upgrade.applied, vec![v("1.0.1"), v("1.0.2")]);

    assert_eq!(report.foreign_keys.added.len(), 5);
    let storage = portal.storage();
    assert_eq!(storage.constraints().len(), 5);
    // The 1.0.1 step finds every constraint already present.
    assert_eq!(storage.constraint_statements(), 5);
    assert_eq!(
        storage.get_option(DB_VERSION_OPTION).await.unwrap().as_deref(),
        Some("1.0.2")
    );
    let writes: Vec<String> = storage.option_writes().into_iter().map(|(_, v)| v).collect();
    assert_eq!(writes, vec!["1.0.1", "1.0.2"]);
    assert_eq!(portal.installed_version().await.unwrap(), v("1.0.2"));
}

#[tokio::test]
async fn reactivation_is_a_no_op() {
    let portal = portal();
    portal.activate().await.unwrap();
    let ddl = portal.storage().ddl_log();
    let writes = portal.storage().option_writes();

    let again = portal.activate().await.unwrap();

    assert!(again.schema.is_unchanged());
    assert!(again.foreign_keys.added.is_empty());
    assert_eq!(again.foreign_keys.present.len(), 5);
    assert!(again.upgrade.applied.is_empty());
    assert_eq!(portal.storage().ddl_log(), ddl);
    assert_eq!(portal.storage().option_writes(), writes);
}

#[tokio::test]
async fn constraint_failures_do_not_fail_activation() {
    let portal = portal();
    let storage = portal.storage();
    portal.migrations().ensure_schema().await.unwrap();
    storage
        .insert_row(
            "wp_portal_updates",
            json!({ "project_id": 7, "message": "left behind" })
                .as_object()
                .unwrap(),
        )
        .await
        .unwrap();

    let report = portal.activate().await.unwrap();

    assert_eq!(report.upgrade.to, v("1.0.2"));
    let names: Vec<String> = storage.constraints().into_iter().map(|c| c.name).collect();
    assert!(!names.contains(&"fk_projects_project".to_string()));
    assert_eq!(names.len(), 4);
}

#[tokio::test]
async fn reactivation_retries_a_constraint_that_failed_before() {
    let portal = portal();
    let storage = portal.storage();
    portal.migrations().ensure_schema().await.unwrap();
    let orphan = storage
        .insert_row(
            "wp_portal_updates",
            json!({ "project_id": 7, "message": "left behind" })
                .as_object()
                .unwrap(),
        )
        .await
        .unwrap();

    let first = portal.activate().await.unwrap();
    assert_eq!(first.foreign_keys.failed.len(), 1);
    assert_eq!(first.foreign_keys.failed[0].name, "fk_projects_project");
    assert_eq!(storage.constraints().len(), 4);

    storage
        .delete_row("wp_portal_updates", "id", orphan)
        .await
        .unwrap();
    let second = portal.activate().await.unwrap();

    assert_eq!(second.foreign_keys.added, vec!["fk_projects_project"]);
    assert!(second.foreign_keys.failed.is_empty());
    assert!(second.upgrade.applied.is_empty());
    assert_eq!(storage.constraints().len(), 5);
}

#[tokio::test]
async fn up_to_date_install_still_gets_its_constraints() {
    let portal = portal();
    portal
        .storage()
        .set_option(DB_VERSION_OPTION, "1.0.2")
        .await
        .unwrap();

    let report = portal.activate().await.unwrap();

    assert!(report.upgrade.applied.is_empty());
    assert_eq!(report.foreign_keys.added.len(), 5);
    assert_eq!(portal.storage().constraints().len(), 5);
}

#[tokio::test]
async fn upgrade_from_1_0_1_adds_constraints_and_bumps_the_marker() {
    let portal = portal();
    portal
        .storage()
        .set_option(DB_VERSION_OPTION, "1.0.1")
        .await
        .unwrap();

    let report = portal.activate().await.unwrap();

    assert_eq!(report.upgrade.applied, vec![v("1.0.2")]);
    assert_eq!(portal.storage().constraints().len(), 5);
    assert_eq!(portal.installed_version().await.unwrap(), v("1.0.2"));
}

#[tokio::test]
async fn custom_prefix_and_users_table_are_respected() {
    let portal = Portal::new(
        MemoryStorage::new().with_users_table("shared_users"),
        TableNames::new("site7_", Some("shared_users")).unwrap(),
    );

    portal.activate().await.unwrap();

    let storage = portal.storage();
    assert!(storage.table_exists("site7_portal_clients"));
    assert!(!storage.table_exists("wp_portal_clients"));
    let user_refs: Vec<String> = storage
        .constraints()
        .into_iter()
        .filter(|c| c.ref_column == "ID")
        .map(|c| c.ref_table)
        .collect();
    assert_eq!(user_refs, vec!["shared_users", "shared_users"]);
}

#[tokio::test]
async fn deactivation_keeps_schema_and_version() {
    let portal = portal();
    portal.activate().await.unwrap();
    let ddl = portal.storage().ddl_log();

    portal.deactivate().await;

    assert_eq!(portal.storage().ddl_log(), ddl);
    assert!(portal.storage().table_exists("wp_portal_projects"));
    assert_eq!(portal.installed_version().await.unwrap(), v("1.0.2"));
}
