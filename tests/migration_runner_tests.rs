use serde_json::{Value, json};
use wp_portal_schema::db::constraints::{OnDelete, ResolvedForeignKey};
use wp_portal_schema::db::models::{Client, Project, to_row};
use wp_portal_schema::db::{MemoryStorage, PortalTable, Row, Storage, SyncOutcome, TableNames};
use wp_portal_schema::service::MigrationRunner;

const ALL_FKS: [&str; 5] = [
    "fk_projects_clients",
    "fk_projects_wp_users",
    "fk_projects_credentials",
    "fk_projects_project",
    "fk_projects_user",
];

fn names() -> TableNames {
    TableNames::new("wp_", None).unwrap()
}

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => panic!("row literal must be an object"),
    }
}

async fn insert_client(storage: &MemoryStorage, company: &str) -> u64 {
    let client = Client {
        company_name: company.into(),
        contact_name: "Contact".into(),
        email: "contact@example.test".into(),
        phone: Some("555-0100".into()),
        ..Default::default()
    };
    storage
        .insert_row("wp_portal_clients", &to_row(&client).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn ensure_schema_creates_tables_once() {
    let storage = MemoryStorage::new();
    let runner = MigrationRunner::new(&storage, names());

    let first = runner.ensure_schema().await.unwrap();
    let created: Vec<&str> = first.tables.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(
        created,
        vec![
            "wp_portal_clients",
            "wp_portal_projects",
            "wp_portal_credentials",
            "wp_portal_updates"
        ]
    );
    assert!(first.tables.iter().all(|(_, o)| *o == SyncOutcome::Created));

    let id = insert_client(&storage, "Acme").await;
    let ddl_before = storage.ddl_log().len();
    let shape_before = storage.columns("wp_portal_projects");

    for _ in 0..3 {
        let again = runner.ensure_schema().await.unwrap();
        assert!(again.is_unchanged());
    }

    assert_eq!(storage.ddl_log().len(), ddl_before);
    assert_eq!(storage.columns("wp_portal_projects"), shape_before);
    let kept = storage.row("wp_portal_clients", id).expect("client survives re-sync");
    assert_eq!(kept["company_name"], "Acme");
}

#[tokio::test]
async fn ensure_schema_restores_missing_columns_without_losing_rows() {
    let storage = MemoryStorage::new();
    let runner = MigrationRunner::new(&storage, names());
    runner.ensure_schema().await.unwrap();
    let id = insert_client(&storage, "Globex").await;

    storage.drop_column("wp_portal_clients", "phone").unwrap();
    let report = runner.ensure_schema().await.unwrap();

    let clients = report
        .tables
        .iter()
        .find(|(t, _)| t == "wp_portal_clients")
        .map(|(_, o)| o.clone());
    assert_eq!(
        clients,
        Some(SyncOutcome::AddedColumns(vec!["phone".to_string()]))
    );
    let restored = storage.row("wp_portal_clients", id).unwrap();
    assert_eq!(restored["company_name"], "Globex");
    assert_eq!(restored["phone"], "");
    assert!(
        storage
            .ddl_log()
            .last()
            .is_some_and(|s| s.starts_with("ALTER TABLE `wp_portal_clients` ADD COLUMN `phone`"))
    );
}

#[tokio::test]
async fn foreign_keys_are_added_once() {
    let storage = MemoryStorage::new().with_users_table("wp_users");
    let runner = MigrationRunner::new(&storage, names());
    runner.ensure_schema().await.unwrap();

    let first = runner.apply_foreign_keys().await;
    assert_eq!(first.added, ALL_FKS);
    assert!(first.failed.is_empty());
    assert_eq!(storage.constraint_statements(), 5);

    let second = runner.apply_foreign_keys().await;
    assert!(second.added.is_empty());
    assert_eq!(second.present, ALL_FKS);
    assert_eq!(storage.constraint_statements(), 5);

    for fk in storage.constraints() {
        let same_name = storage
            .constraints()
            .iter()
            .filter(|c| c.name == fk.name)
            .count();
        assert_eq!(same_name, 1, "{}", fk.name);
    }
}

#[tokio::test]
async fn constraint_lookup_has_no_side_effects() {
    let storage = MemoryStorage::new().with_users_table("wp_users");
    let runner = MigrationRunner::new(&storage, names());
    runner.ensure_schema().await.unwrap();
    let ddl_before = storage.ddl_log();

    for _ in 0..5 {
        assert!(
            !runner
                .constraint_exists("wp_portal_projects", "fk_projects_clients")
                .await
                .unwrap()
        );
    }
    assert_eq!(storage.ddl_log(), ddl_before);

    runner.apply_foreign_keys().await;
    assert!(
        runner
            .constraint_exists("wp_portal_projects", "fk_projects_clients")
            .await
            .unwrap()
    );
    // Scoped to the table the constraint lives on.
    assert!(
        !runner
            .constraint_exists("wp_portal_updates", "fk_projects_clients")
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn one_failing_constraint_does_not_block_the_rest() {
    let storage = MemoryStorage::new().with_users_table("wp_users");
    let runner = MigrationRunner::new(&storage, names());
    runner.ensure_schema().await.unwrap();

    let client_id = insert_client(&storage, "Initech").await;
    let project = Project {
        client_id,
        title: "Orphaned staff".into(),
        status: "active".into(),
        assigned_staff_user_id: Some(99),
        ..Default::default()
    };
    let project_id = storage
        .insert_row("wp_portal_projects", &to_row(&project).unwrap())
        .await
        .unwrap();

    let report = runner.apply_foreign_keys().await;

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, "fk_projects_wp_users");
    assert!(report.failed[0].message.contains("fk_projects_wp_users"));
    assert_eq!(
        report.added,
        vec![
            "fk_projects_clients",
            "fk_projects_credentials",
            "fk_projects_project",
            "fk_projects_user"
        ]
    );

    storage
        .update_row(
            "wp_portal_projects",
            "id",
            project_id,
            &row(json!({ "assigned_staff_user_id": null })),
        )
        .await
        .unwrap();
    let retry = runner.apply_foreign_keys().await;
    assert_eq!(retry.added, vec!["fk_projects_wp_users"]);
    assert_eq!(retry.present.len(), 4);
}

#[tokio::test]
async fn missing_users_table_only_fails_user_links() {
    let storage = MemoryStorage::new();
    let runner = MigrationRunner::new(&storage, names());
    runner.ensure_schema().await.unwrap();

    let report = runner.apply_foreign_keys().await;

    let failed: Vec<&str> = report.failed.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(failed, vec!["fk_projects_wp_users", "fk_projects_user"]);
    assert_eq!(report.added.len(), 3);
}

#[tokio::test]
async fn name_taken_by_another_table_is_reported_not_raised() {
    let storage = MemoryStorage::new().with_users_table("wp_users");
    let names = names();
    let runner = MigrationRunner::new(&storage, names.clone());
    runner.ensure_schema().await.unwrap();

    storage
        .add_foreign_key(&ResolvedForeignKey {
            name: "fk_projects_user".into(),
            table: names.table(PortalTable::Credentials),
            column: "project_id".into(),
            ref_table: names.table(PortalTable::Projects),
            ref_column: "id".into(),
            on_delete: OnDelete::Cascade,
        })
        .await
        .unwrap();

    let report = runner.apply_foreign_keys().await;

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, "fk_projects_user");
    assert_eq!(report.added.len(), 4);
}

#[tokio::test]
async fn deleting_a_client_cascades_and_deleting_a_user_nulls() {
    let storage = MemoryStorage::new().with_users_table("wp_users");
    let runner = MigrationRunner::new(&storage, names());
    runner.ensure_schema().await.unwrap();
    runner.apply_foreign_keys().await;

    let staff = storage
        .insert_row("wp_users", &row(json!({ "user_login": "staff" })))
        .await
        .unwrap();
    let client_a = insert_client(&storage, "Keep").await;
    let client_b = insert_client(&storage, "Drop").await;

    let mut project_ids = Vec::new();
    for client_id in [client_a, client_b] {
        let project = Project {
            client_id,
            title: "Site rebuild".into(),
            status: "active".into(),
            assigned_staff_user_id: Some(staff),
            ..Default::default()
        };
        project_ids.push(
            storage
                .insert_row("wp_portal_projects", &to_row(&project).unwrap())
                .await
                .unwrap(),
        );
    }
    for project_id in &project_ids {
        storage
            .insert_row(
                "wp_portal_credentials",
                &row(json!({
                    "project_id": project_id,
                    "label": "FTP",
                    "username": "deploy",
                    "password_enc": "c2VjcmV0",
                    "encryption_iv": "aXY=",
                })),
            )
            .await
            .unwrap();
        storage
            .insert_row(
                "wp_portal_updates",
                &row(json!({
                    "project_id": project_id,
                    "user_id": staff,
                    "message": "Kickoff",
                    "type": "note",
                })),
            )
            .await
            .unwrap();
    }

    let deleted = storage
        .delete_row("wp_portal_clients", "id", client_b)
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let projects = storage.rows("wp_portal_projects");
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0]["client_id"], client_a);
    assert_eq!(storage.rows("wp_portal_credentials").len(), 1);
    assert_eq!(storage.rows("wp_portal_updates").len(), 1);

    storage.delete_row("wp_users", "ID", staff).await.unwrap();

    let project = storage.row("wp_portal_projects", project_ids[0]).unwrap();
    assert_eq!(project["assigned_staff_user_id"], Value::Null);
    let updates = storage.rows("wp_portal_updates");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["user_id"], Value::Null);
    assert_eq!(updates[0]["message"], "Kickoff");
}

#[tokio::test]
async fn constraints_are_enforced_once_present() {
    let storage = MemoryStorage::new().with_users_table("wp_users");
    let runner = MigrationRunner::new(&storage, names());
    runner.ensure_schema().await.unwrap();
    runner.apply_foreign_keys().await;

    let dangling = Project {
        client_id: 404,
        title: "Nobody's".into(),
        status: "draft".into(),
        ..Default::default()
    };
    let err = storage
        .insert_row("wp_portal_projects", &to_row(&dangling).unwrap())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("fk_projects_clients"));
    assert!(storage.rows("wp_portal_projects").is_empty());
}
