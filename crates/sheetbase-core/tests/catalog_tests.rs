//! Schema catalog behavior against a real database file.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{TestResult, open_pool};
use sheetbase_core::{
    catalog::{CatalogError, NameField, SchemaCatalog, TableId, ensure_catalog_relation},
    schema::TableSpec,
};
use tempfile::TempDir;

#[tokio::test]
async fn register_and_look_up() -> TestResult {
    let tmp = TempDir::new()?;
    let pool = open_pool(tmp.path()).await;
    let mut conn = pool.session().await?;
    ensure_catalog_relation(&mut conn).await?;
    // Idempotent.
    ensure_catalog_relation(&mut conn).await?;

    let mut catalog = SchemaCatalog::new(&mut conn);
    let spec = TableSpec::new("survey", ["name", "age"])
        .display_name("Spring survey")
        .validate()?;
    let registered = catalog.register(&spec).await?;
    assert!(registered.is_live());

    let by_id = catalog.find_by_id(registered.id).await?;
    assert_eq!(by_id.id, registered.id);
    assert_eq!(by_id.logical_name, "survey");
    assert_eq!(by_id.columns, ["name", "age"]);
    assert_eq!(by_id.display_name, "Spring survey");

    let by_name = catalog.find_by_name("survey").await?;
    assert_eq!(by_name.map(|d| d.id), Some(registered.id));
    assert!(catalog.find_by_name("missing").await?.is_none());

    let err = catalog.find_by_id(TableId(999)).await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound { id: TableId(999) }));
    Ok(())
}

#[tokio::test]
async fn unique_names_are_enforced() -> TestResult {
    let tmp = TempDir::new()?;
    let pool = open_pool(tmp.path()).await;
    let mut conn = pool.session().await?;
    ensure_catalog_relation(&mut conn).await?;
    let mut catalog = SchemaCatalog::new(&mut conn);

    catalog
        .register(&TableSpec::new("survey", ["a"]).display_name("Survey").validate()?)
        .await?;

    let err = catalog
        .register(&TableSpec::new("SURVEY", ["a"]).display_name("Other").validate()?)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CatalogError::DuplicateName {
            field: NameField::Logical,
            ..
        }
    ));

    let err = catalog
        .register(&TableSpec::new("survey_2", ["a"]).display_name("Survey").validate()?)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CatalogError::DuplicateName {
            field: NameField::Display,
            ..
        }
    ));
    Ok(())
}

#[tokio::test]
async fn soft_delete_hides_but_keeps_descriptor() -> TestResult {
    let tmp = TempDir::new()?;
    let pool = open_pool(tmp.path()).await;
    let mut conn = pool.session().await?;
    ensure_catalog_relation(&mut conn).await?;
    let mut catalog = SchemaCatalog::new(&mut conn);

    let first = catalog.register(&TableSpec::new("first", ["a"]).validate()?).await?;
    let second = catalog.register(&TableSpec::new("second", ["b"]).validate()?).await?;

    catalog.soft_delete(first.id).await?;
    catalog.soft_delete(first.id).await?;

    let live = catalog.list_all(false).await?;
    assert_eq!(live.iter().map(|d| d.id).collect::<Vec<_>>(), [second.id]);

    let all = catalog.list_all(true).await?;
    assert_eq!(all.len(), 2);
    assert!(!all[0].is_live());

    assert!(catalog.find_by_name("first").await?.is_none());
    let holder = catalog.find_holder("first", "first").await?.expect("holder");
    assert_eq!(holder.id, first.id);
    assert!(holder.deleted);

    let err = catalog.soft_delete(TableId(42)).await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound { .. }));
    Ok(())
}
