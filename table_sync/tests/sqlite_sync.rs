//! End-to-end synchronization against a file-backed SQLite database

use pretty_assertions::assert_eq;
use rstest::*;
use tempfile::{tempdir, TempDir};

use table_sync::schema::reverser::SchemaReverser;
use table_sync::{
    DatabaseConnection, DatabaseInspector, Error, Field, FieldTag, FieldType, Link, LogicalSchema,
    Phase, Relation, SyncConfig,
};

async fn open_link(dir: &TempDir, sync_section: &str) -> Link {
    let path = dir.path().join("sync.db");
    let config = SyncConfig::from_toml(&format!(
        r#"
        [database]
        url = "sqlite://{}"
        pool_size = 1

        [sync]
        {}
        "#,
        path.display(),
        sync_section
    ))
    .unwrap();

    Link::open(&config).await.unwrap()
}

fn category() -> LogicalSchema {
    LogicalSchema::new("category", "categories")
        .field(Field::new("id", "id", FieldType::Uuid).tag(FieldTag::Primary))
        .field(Field::new("title", "title", FieldType::String).tag(FieldTag::Unique))
}

fn product() -> LogicalSchema {
    LogicalSchema::new("product", "products")
        .field(Field::new("id", "id", FieldType::Uuid).tag(FieldTag::Primary))
        .field(Field::new("name", "name", FieldType::String))
        .field(Field::new("categoryId", "category_id", FieldType::Uuid).tag(FieldTag::Nullable))
        .relation(Relation::belongs_to_one("category", "categoryId", "id"))
}

async fn live_tables(link: &Link) -> Vec<String> {
    DatabaseInspector::for_connection(link.connection())
        .unwrap()
        .tables()
        .await
        .unwrap()
}

async fn count_rows(link: &Link, table: &str) -> i64 {
    match link.connection() {
        DatabaseConnection::Sqlite(pool) => sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", table))
            .fetch_one(pool)
            .await
            .unwrap(),
        _ => unreachable!("sqlite link"),
    }
}

#[tokio::test]
async fn test_creates_missing_tables() {
    let dir = tempdir().unwrap();
    let mut link = open_link(&dir, "").await;
    link.set_schema(category());
    link.set_schema(product());

    let report = link.sync().await.unwrap();

    let product_phases: Vec<Phase> = report
        .steps
        .iter()
        .filter(|s| s.table == "products")
        .map(|s| s.phase)
        .collect();
    assert_eq!(product_phases, vec![Phase::Create, Phase::Constraint, Phase::Foreign]);
    assert_eq!(live_tables(&link).await, vec!["categories", "products"]);
    assert!(link.associations().pending().is_empty());
}

#[tokio::test]
async fn test_second_sync_is_empty() {
    let dir = tempdir().unwrap();
    let mut link = open_link(&dir, "").await;
    link.set_schema(category());
    link.set_schema(product());
    link.sync().await.unwrap();

    let report = link.sync().await.unwrap();
    assert!(report.is_empty());

    // Re-supplying identical schemas forces a full reverse-and-compare
    link.set_schema(category());
    link.set_schema(product());
    let report = link.sync().await.unwrap();

    assert!(report.steps.is_empty());
    assert!(link.associations().pending().is_empty());
}

#[tokio::test]
async fn test_removed_field_is_dropped() {
    let dir = tempdir().unwrap();
    let mut link = open_link(&dir, "").await;
    link.set_schema(category());
    link.set_schema(product());
    link.sync().await.unwrap();

    let mut trimmed = product();
    trimmed.fields.retain(|f| f.reference != "name");
    link.set_schema(trimmed);
    let report = link.sync().await.unwrap();

    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].phase, Phase::Drop);
    assert_eq!(report.steps[0].table, "products");
    assert!(report.steps[0].description.contains("`name`"));

    let columns: Vec<String> = DatabaseInspector::for_connection(link.connection())
        .unwrap()
        .column_info("products")
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(columns, vec!["id", "category_id"]);
}

#[tokio::test]
async fn test_backup_keeps_rows_before_drop() {
    let dir = tempdir().unwrap();
    let mut link = open_link(&dir, "backup_before_drop = true").await;
    link.set_schema(category());
    link.set_schema(product());
    link.sync().await.unwrap();
    link.connection()
        .execute("INSERT INTO \"products\" (\"id\", \"name\") VALUES ('00000000-0000-0000-0000-000000000001', 'lamp')")
        .await
        .unwrap();

    let mut trimmed = product();
    trimmed.fields.retain(|f| f.reference != "name");
    link.set_schema(trimmed);
    let report = link.sync().await.unwrap();

    let phases: Vec<Phase> = report.steps.iter().map(|s| s.phase).collect();
    assert_eq!(phases, vec![Phase::Backup, Phase::Copy, Phase::Drop]);

    let backup = live_tables(&link)
        .await
        .into_iter()
        .find(|t| t.starts_with("products_backup_"))
        .unwrap();
    assert_eq!(count_rows(&link, &backup).await, 1);
    assert_eq!(count_rows(&link, "products").await, 1);
}

#[tokio::test]
async fn test_foreign_key_to_unique_field_is_stable() {
    let dir = tempdir().unwrap();
    let mut link = open_link(&dir, "").await;
    let categories = LogicalSchema::new("category", "categories")
        .field(Field::new("slug", "slug", FieldType::String).tag(FieldTag::Unique));
    let products = LogicalSchema::new("product", "products")
        .field(Field::new("id", "id", FieldType::Uuid).tag(FieldTag::Primary))
        .field(Field::new("categorySlug", "category_slug", FieldType::String).tag(FieldTag::Nullable))
        .relation(Relation::belongs_to_one("category", "categorySlug", "slug"));
    link.set_schema(categories.clone());
    link.set_schema(products.clone());
    link.sync().await.unwrap();

    link.set_schema(categories);
    link.set_schema(products);
    let report = link.sync().await.unwrap();

    assert!(report.steps.is_empty());
    assert!(link.associations().pending().is_empty());
}

#[tokio::test]
async fn test_foreign_key_column_drop_is_refused_before_any_ddl() {
    let dir = tempdir().unwrap();
    let mut link = open_link(&dir, "backup_before_drop = true").await;
    link.set_schema(category());
    link.set_schema(product());
    link.sync().await.unwrap();

    let mut trimmed = product();
    trimmed.fields.retain(|f| f.reference != "categoryId");
    trimmed.relations.clear();
    link.set_schema(trimmed);
    let error = link.sync().await.unwrap_err();

    match error {
        Error::UnhandledAlteration { table, changes } => {
            assert_eq!(table, "products");
            assert_eq!(
                changes,
                vec!["column `category_id` removed while it carries a key or index".to_string()]
            );
        }
        other => panic!("expected UnhandledAlteration, got {:?}", other),
    }
    assert_eq!(live_tables(&link).await, vec!["categories", "products"]);
}

#[tokio::test]
async fn test_added_field_is_refused() {
    let dir = tempdir().unwrap();
    let mut link = open_link(&dir, "").await;
    link.set_schema(category());
    link.sync().await.unwrap();

    link.set_schema(category().field(Field::new("rank", "rank", FieldType::Integer)));
    let error = link.sync().await.unwrap_err();

    match error {
        Error::UnhandledAlteration { table, changes } => {
            assert_eq!(table, "categories");
            assert_eq!(changes, vec!["column `rank` added".to_string()]);
        }
        other => panic!("expected UnhandledAlteration, got {:?}", other),
    }
    assert_eq!(link.associations().pending(), vec!["category"]);
}

#[tokio::test]
async fn test_dry_run_leaves_database_untouched() {
    let dir = tempdir().unwrap();
    let mut link = open_link(&dir, "dry_run = true").await;
    link.set_schema(category());

    let report = link.sync().await.unwrap();

    assert_eq!(report.steps.len(), 3);
    assert!(live_tables(&link).await.is_empty());
    assert_eq!(link.associations().pending(), vec!["category"]);
}

#[tokio::test]
async fn test_every_type_survives_introspection() {
    let dir = tempdir().unwrap();
    let mut link = open_link(&dir, "").await;

    let mut schema = LogicalSchema::new("sample", "samples")
        .field(Field::new("id", "id", FieldType::Integer).tag(FieldTag::Primary));
    let types: Vec<FieldType> = FieldType::ALL
        .iter()
        .copied()
        .filter(|t| *t != FieldType::Enum)
        .collect();
    for field_type in &types {
        let column = format!("c_{}", field_type.as_str().to_lowercase());
        schema = schema.field(Field::new(&column, &column, *field_type).tag(FieldTag::Nullable));
    }
    schema = schema.field(
        Field::new("state", "state", FieldType::Enum)
            .values(&["open", "closed"])
            .tag(FieldTag::Nullable),
    );
    link.set_schema(schema);
    link.sync().await.unwrap();

    let inspector = DatabaseInspector::for_connection(link.connection()).unwrap();
    let reversed = SchemaReverser::new(&inspector).to_schema("samples").await.unwrap();
    let reversed_types: Vec<FieldType> = reversed.fields[1..=types.len()]
        .iter()
        .map(|f| f.field_type)
        .collect();

    assert_eq!(reversed_types, types);
    assert_eq!(reversed.fields.last().map(|f| f.field_type), Some(FieldType::Text));

    link.set_schema(link.get_schema("sample").cloned().unwrap());
    assert!(link.sync().await.unwrap().steps.is_empty());
}

#[tokio::test]
async fn test_delete_table() {
    let dir = tempdir().unwrap();
    let mut link = open_link(&dir, "").await;
    link.set_schema(category());
    link.sync().await.unwrap();

    link.delete_table("categories").await.unwrap();
    link.delete_table("categories").await.unwrap();

    assert!(live_tables(&link).await.is_empty());
}

#[rstest]
#[case("wash")]
#[case("postgres")]
#[tokio::test]
async fn test_inspector_rejects_foreign_dialects(#[case] tag: &str) {
    let dir = tempdir().unwrap();
    let link = open_link(&dir, "").await;

    let result = DatabaseInspector::new(tag, link.connection());

    assert!(matches!(result, Err(Error::UnsupportedDialect(_))));
}
