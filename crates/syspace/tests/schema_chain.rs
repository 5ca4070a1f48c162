//! The platform's own revision chain against the in-memory backend.

use syspace::builtin_scripts;
use syspace_core::config::{MigrationsConfig, TransactionMode};
use syspace_core::schema::Catalog;
use syspace_runtime::migrations::{
    MemoryBackend, MemoryDatabase, MigrationEngine, OfflineBackend, RevisionGraph, SchemaDiff,
    VersionMarker,
};

const USERS: &str = "1a2b3c4d5e6f";
const HEAD: &str = "0581da68b2ba";

fn engine(db: &MemoryDatabase) -> MigrationEngine<MemoryBackend> {
    let graph = RevisionGraph::new(builtin_scripts().unwrap()).unwrap();
    MigrationEngine::new(graph, db.connect(), MigrationsConfig::default())
}

fn column_names(catalog: &Catalog, table: &str) -> Vec<String> {
    let mut names: Vec<String> = catalog
        .table(table)
        .unwrap()
        .columns
        .iter()
        .map(|c| c.name.clone())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_full_chain_links_users_to_organisations() {
    let db = MemoryDatabase::new();
    let mut engine = engine(&db);

    let report = engine.upgrade("head").await.unwrap();
    assert_eq!(report.revisions.len(), 5);
    assert_eq!(engine.current().await.unwrap().single().unwrap().as_str(), HEAD);

    let catalog = db.catalog().await;
    for table in ["companies", "startups", "users", "user_profiles", "connections"] {
        assert!(catalog.table(table).is_some(), "missing {}", table);
    }

    let users = catalog.table("users").unwrap();
    let company_fk = users
        .foreign_keys
        .iter()
        .find(|fk| fk.columns == ["company_id"])
        .unwrap();
    assert_eq!(company_fk.ref_table, "companies");
    assert_eq!(company_fk.ref_columns, ["id"]);

    let startup_fk = users
        .foreign_keys
        .iter()
        .find(|fk| fk.columns == ["startup_id"])
        .unwrap();
    assert_eq!(startup_fk.ref_table, "startups");
    assert_eq!(startup_fk.ref_columns, ["id"]);

    let connections = catalog.table("connections").unwrap();
    assert!(connections.has_constraint("_requester_recipient_uc"));
    assert_eq!(
        connections.column("status").unwrap().sql_type.to_sql(),
        "connectionstatus"
    );
    assert!(catalog.enums.contains_key("connectionstatus"));
}

#[tokio::test]
async fn test_downgrade_restores_users_column_set() {
    let db = MemoryDatabase::new();
    let mut engine = engine(&db);

    engine.upgrade(USERS).await.unwrap();
    let before = db.catalog().await;
    let users_before = column_names(&before, "users");

    engine.upgrade("head").await.unwrap();
    assert_ne!(column_names(&db.catalog().await, "users"), users_before);

    engine.downgrade(USERS).await.unwrap();
    let after = db.catalog().await;
    assert!(after.table("companies").is_none());
    assert!(after.table("startups").is_none());
    assert!(after.table("users").unwrap().foreign_keys.is_empty());
    assert_eq!(column_names(&after, "users"), users_before);
    assert!(SchemaDiff::between(&before, &after).is_empty());

    engine.downgrade("base").await.unwrap();
    assert!(db.catalog().await.is_empty());
    assert!(engine.current().await.unwrap().is_base());
}

#[tokio::test]
async fn test_rerunning_head_is_noop() {
    let db = MemoryDatabase::new();
    let mut engine = engine(&db);
    engine.upgrade("head").await.unwrap();
    let applied = db.operations_applied().await;

    let report = engine.upgrade("head").await.unwrap();
    assert!(report.is_noop());
    assert_eq!(db.operations_applied().await, applied);
}

#[test]
fn test_builtin_scripts_reverse_cleanly() {
    let graph = RevisionGraph::new(builtin_scripts().unwrap()).unwrap();
    let report = syspace_runtime::migrations::verify_graph(&graph);
    assert!(report.is_ok(), "{:#?}", report.issues);
    assert_eq!(report.checked, 5);
    assert_eq!(report.opaque.len(), 1);
    assert_eq!(report.opaque[0].as_str(), HEAD);
}

#[tokio::test]
async fn test_offline_upgrade_of_builtin_chain() {
    let graph = RevisionGraph::new(builtin_scripts().unwrap()).unwrap();
    let config = MigrationsConfig {
        transaction_mode: TransactionMode::PerRevision,
        ..Default::default()
    };
    let mut engine = MigrationEngine::new(graph, OfflineBackend::new("syspace_version", None), config);

    let report = engine.upgrade("head").await.unwrap();
    assert!(matches!(report.to, VersionMarker::Heads(_)));

    let sql = engine.into_backend().to_script();
    assert!(sql.contains("CREATE TYPE connectionstatus AS ENUM ('PENDING', 'ACCEPTED', 'DECLINED', 'BLOCKED')"));
    assert!(sql.contains("ALTER TABLE connections RENAME COLUMN status_new TO status"));
    assert!(sql.contains("CREATE UNIQUE INDEX ix_users_email ON users (email)"));
    assert_eq!(sql.matches("BEGIN;").count(), 5);
}
