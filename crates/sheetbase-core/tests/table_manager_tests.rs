//! Table creation, duplicate handling and soft delete through the service.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{TestResult, open_service};
use sheetbase_core::{
    CreateOutcome, DuplicatePolicy, ErrorKind, TableSpec,
    catalog::{NameField, TableId},
    manager::TableError,
    service::SheetbaseError,
};
use tempfile::TempDir;

async fn physical_table_exists(service: &sheetbase_core::Sheetbase, name: &str) -> bool {
    let mut session = service.pool().session().await.expect("session");
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_one(&mut *session)
            .await
            .expect("count");
    count == 1
}

#[tokio::test]
async fn create_registers_descriptor_and_table() -> TestResult {
    let tmp = TempDir::new()?;
    let service = open_service(tmp.path()).await;

    let outcome = service
        .create_table(TableSpec::new("survey", ["name", "age"]).display_name("Survey 2024"))
        .await?;
    assert!(outcome.is_created());
    let descriptor = outcome.descriptor().clone();
    assert_eq!(descriptor.columns, ["name", "age"]);
    assert_eq!(descriptor.display_name, "Survey 2024");

    assert!(physical_table_exists(&service, "survey").await);
    assert_eq!(service.row_count(descriptor.id).await?, 0);

    let listed = service.list_tables(false).await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, descriptor.id);

    let batch = service.show(descriptor.id).await?;
    let names: Vec<String> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    assert_eq!(names, ["id", "name", "age"]);
    Ok(())
}

#[tokio::test]
async fn invalid_definitions_touch_nothing() -> TestResult {
    let tmp = TempDir::new()?;
    let service = open_service(tmp.path()).await;

    let bad_specs = [
        TableSpec::new("t", Vec::<String>::new()),
        TableSpec::new("t", ["a", "a"]),
        TableSpec::new("t", ["a", ""]),
        TableSpec::new("t", ["id", "b"]),
        TableSpec::new("", ["a"]),
        TableSpec::new("sheet_tables", ["a"]),
    ];
    for spec in bad_specs {
        let err = service.create_table(spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSchema, "{err}");
    }

    assert!(service.list_tables(true).await?.is_empty());
    assert!(!physical_table_exists(&service, "t").await);
    Ok(())
}

#[tokio::test]
async fn duplicate_names_follow_policy() -> TestResult {
    let tmp = TempDir::new()?;
    let service = open_service(tmp.path()).await;

    let first = service
        .create_table(TableSpec::new("survey", ["a", "b"]))
        .await?;

    let again = service
        .create_table_with_policy(TableSpec::new("survey", ["x"]), DuplicatePolicy::Idempotent)
        .await?;
    match again {
        CreateOutcome::AlreadyExists(existing) => {
            assert_eq!(existing.id, first.descriptor().id);
            assert_eq!(existing.columns, ["a", "b"]);
        }
        other => panic!("expected AlreadyExists, got {other:?}"),
    }

    let err = service
        .create_table_with_policy(TableSpec::new("survey", ["x"]), DuplicatePolicy::Reject)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateName);
    assert!(matches!(
        err,
        SheetbaseError::Table {
            source: TableError::DuplicateName {
                field: NameField::Logical,
                ..
            }
        }
    ));

    // Display names are unique as well.
    let err = service
        .create_table_with_policy(
            TableSpec::new("survey_copy", ["x"]).display_name("survey"),
            DuplicatePolicy::Reject,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateName);

    assert_eq!(service.list_tables(true).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_creates_yield_one_table() -> TestResult {
    let tmp = TempDir::new()?;
    let service = open_service(tmp.path()).await;

    let (a, b) = tokio::join!(
        service.create_table_with_policy(TableSpec::new("race", ["v"]), DuplicatePolicy::Reject),
        service.create_table_with_policy(TableSpec::new("race", ["v"]), DuplicatePolicy::Reject),
    );

    let created = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Ok(o) if o.is_created()))
        .count();
    let duplicates = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::DuplicateName))
        .count();
    assert_eq!((created, duplicates), (1, 1), "{a:?} / {b:?}");

    let tables = service.list_tables(true).await?;
    assert_eq!(tables.len(), 1);
    assert!(physical_table_exists(&service, "race").await);
    Ok(())
}

#[tokio::test]
async fn soft_delete_hides_table_and_reserves_name() -> TestResult {
    let tmp = TempDir::new()?;
    let service = open_service(tmp.path()).await;

    let id = service
        .create_table(TableSpec::new("old", ["a"]))
        .await?
        .descriptor()
        .id;
    service.insert_records(id, r#"[{"a": "1"}]"#).await?;

    service.delete_table(id).await?;
    service.delete_table(id).await?;

    assert!(service.list_tables(false).await?.is_empty());
    let all = service.list_tables(true).await?;
    assert_eq!(all.len(), 1);
    assert!(all[0].deleted);

    // Storage is retained, but the table is gone for every action.
    assert!(physical_table_exists(&service, "old").await);
    let err = service.row_count(id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = service
        .insert_records(id, r#"[{"a": "2"}]"#)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let recreate = service
        .create_table_with_policy(TableSpec::new("old", ["a"]), DuplicatePolicy::Reject)
        .await
        .unwrap_err();
    assert_eq!(recreate.kind(), ErrorKind::DuplicateName);

    // The idempotent path must not hand back the deleted table either.
    let recreate = service
        .create_table_with_policy(TableSpec::new("old", ["a"]), DuplicatePolicy::Idempotent)
        .await
        .unwrap_err();
    assert_eq!(recreate.kind(), ErrorKind::DuplicateName);
    let recreate = service
        .create_table(TableSpec::new("OLD", ["a"]))
        .await
        .unwrap_err();
    assert_eq!(recreate.kind(), ErrorKind::DuplicateName);

    let err = service.delete_table(TableId(77)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}
