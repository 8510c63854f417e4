//! Models registered at link time through `inventory`.

use std::sync::Arc;

use datamapper::{
    Config, Mapper, MemoryDatabase, ModelDef, ModelRegistration, OrmError, Registry, Row, Value,
};

fn article() -> ModelDef {
    ModelDef::new("article").has_many("remark")
}

fn remark() -> ModelDef {
    ModelDef::new("remark").has_one("article")
}

datamapper::inventory::submit! { ModelRegistration { define: article } }
datamapper::inventory::submit! { ModelRegistration { define: remark } }

fn db() -> Arc<MemoryDatabase> {
    Arc::new(
        MemoryDatabase::new()
            .with_table("articles", &["id", "title"])
            .with_table("remarks", &["id", "body", "article_id"]),
    )
}

#[test]
fn registered_models_are_collected() {
    let registry = Registry::with_registered_models(Config::default());
    assert!(registry.is_registered("article"));
    assert!(registry.is_registered("Remark"));
    assert!(!registry.is_registered("comment"));
}

#[test]
fn global_mapper_resolves_registered_relations() -> anyhow::Result<()> {
    let mapper = Mapper::with_global(db());
    let mut remark = mapper.entity("remark")?;
    remark.where_related("article", "id", 3)?;
    assert_eq!(
        remark.get_sql(None, None, false)?,
        "SELECT remarks.* FROM remarks WHERE remarks.article_id = 3"
    );
    Ok(())
}

#[test]
fn related_rows_are_scoped_to_the_parent() -> anyhow::Result<()> {
    let db = db();
    db.respond(
        "FROM remarks",
        vec![Row::new().with("id", "8").with("body", "nice").with("article_id", "3")],
    );
    let mapper = Mapper::new(
        Arc::new(Registry::with_registered_models(Config::default())),
        db.clone(),
    );

    let mut article = mapper.entity("article")?;
    article.set("id", 3).set("title", "Intro");
    article.refresh_stored_values();
    let remarks = article.related("remark")?;
    remarks.get(None, None)?;

    assert_eq!(remarks.id(), Value::Int(8));
    assert_eq!(
        db.last_statement().as_deref(),
        Some("SELECT remarks.* FROM remarks WHERE remarks.article_id = 3")
    );
    Ok(())
}

#[test]
fn unknown_model_is_an_error() {
    let mapper = Mapper::with_global(db());
    let err = mapper.entity("comment").unwrap_err();
    assert!(matches!(err, OrmError::UnknownModel(_)));
}
