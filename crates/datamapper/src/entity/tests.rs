use std::sync::Arc;

use super::*;
use crate::config::Config;
use crate::db::MemoryDatabase;
use crate::error::OrmError;
use crate::query::{ClauseKind, Expr, LikeSide};
use crate::registry::{FieldDef, ModelDef, RelationDef, Registry};

fn blog_db() -> MemoryDatabase {
    MemoryDatabase::new()
        .with_table("posts", &["id", "title", "body", "author_id"])
        .with_table("users", &["id", "name"])
        .with_table("profiles", &["id", "bio", "user_id"])
        .with_table("comments", &["id", "body", "post_id"])
        .with_table("tags", &["id", "name"])
        .with_table("posts_tags", &["id", "post_id", "tag_id", "position"])
        .with_table("employees", &["id", "name", "manager_id"])
        .with_table("books", &["id", "title"])
        .with_table("categories", &["id", "name"])
        .with_table("books_categories", &["id", "book_id", "category_id"])
}

fn blog_registry(config: Config) -> Registry {
    let registry = Registry::new(config);
    registry.register(
        ModelDef::new("post")
            .has_one(RelationDef::new("author").class("user").other_field("post"))
            .has_many("comment")
            .has_many("tag")
            .field(FieldDef::new("title").label("Title").rule("required").rule_with("max_length", 120)),
    );
    registry.register(
        ModelDef::new("user")
            .has_many(RelationDef::new("post").other_field("author"))
            .has_one("profile"),
    );
    registry.register(ModelDef::new("profile").has_one("user"));
    registry.register(ModelDef::new("comment").has_one("post"));
    registry.register(ModelDef::new("tag").has_many("post"));
    registry.register(
        ModelDef::new("employee")
            .has_one(RelationDef::new("manager").class("employee").other_field("employee"))
            .has_many(RelationDef::new("employee").other_field("manager")),
    );
    registry.register(ModelDef::new("book").has_one("category"));
    registry.register(ModelDef::new("category").has_many("book"));
    registry
}

fn setup_with(config: Config) -> (Arc<MemoryDatabase>, Mapper) {
    let db = Arc::new(blog_db());
    let mapper = Mapper::new(Arc::new(blog_registry(config)), db.clone());
    (db, mapper)
}

fn setup() -> (Arc<MemoryDatabase>, Mapper) {
    setup_with(Config::default())
}

/// An entity that looks freshly loaded from its table.
fn loaded(mapper: &Mapper, class: &str, values: &[(&str, Value)]) -> Entity {
    let mut entity = mapper.entity(class).unwrap();
    for (field, value) in values {
        entity.set(field, value.clone());
    }
    entity.refresh_stored_values();
    entity
}

fn post_rows() -> Vec<Row> {
    vec![
        Row::new().with("id", "1").with("title", "Hello").with("author_id", "4"),
        Row::new().with("id", "2").with("title", "World").with("author_id", Value::Null),
    ]
}

// ==================== Relationship resolution ====================

#[test]
fn where_related_joins_through_own_foreign_key() {
    let (_db, mapper) = setup();
    let mut comment = mapper.entity("comment").unwrap();
    let sql = comment
        .where_related("post", "title", "Hello")
        .unwrap()
        .get_sql(None, None, false)
        .unwrap();
    assert_eq!(
        sql,
        "SELECT comments.* FROM comments LEFT OUTER JOIN posts posts ON posts.id = comments.post_id WHERE posts.title = 'Hello'"
    );
}

#[test]
fn related_id_uses_foreign_key_without_join() {
    let (_db, mapper) = setup();
    let mut comment = mapper.entity("comment").unwrap();
    let sql = comment
        .where_related("post", "id", 5)
        .unwrap()
        .get_sql(None, None, false)
        .unwrap();
    assert_eq!(sql, "SELECT comments.* FROM comments WHERE comments.post_id = 5");
}

#[test]
fn where_related_joins_target_holding_foreign_key() {
    let (_db, mapper) = setup();
    let mut post = mapper.entity("post").unwrap();
    let sql = post
        .where_related("comment", "id", 3)
        .unwrap()
        .get_sql(None, None, false)
        .unwrap();
    assert_eq!(
        sql,
        "SELECT posts.* FROM posts LEFT OUTER JOIN comments comments ON posts.id = comments.post_id WHERE comments.id = 3"
    );
}

#[test]
fn many_to_many_goes_through_join_table() {
    let (_db, mapper) = setup();
    let mut post = mapper.entity("post").unwrap();
    let sql = post
        .where_related("tag", "name", "rust")
        .unwrap()
        .get_sql(None, None, false)
        .unwrap();
    assert_eq!(
        sql,
        "SELECT posts.* FROM posts \
         LEFT OUTER JOIN posts_tags posts_tags ON posts.id = posts_tags.post_id \
         LEFT OUTER JOIN tags tags ON tags.id = posts_tags.tag_id \
         WHERE tags.name = 'rust'"
    );
}

#[test]
fn joins_are_added_once_per_alias() {
    let (_db, mapper) = setup();
    let mut post = mapper.entity("post").unwrap();
    post.where_related("tag", "name", "rust").unwrap();
    post.or_where_related("tag", "name", "go").unwrap();
    let sql = post.get_sql(None, None, false).unwrap();
    assert_eq!(sql.matches("LEFT OUTER JOIN").count(), 2);
    assert!(sql.ends_with("WHERE tags.name = 'rust' OR tags.name = 'go'"));
}

#[test]
fn deep_paths_prefix_aliases() {
    let (_db, mapper) = setup();
    let mut comment = mapper.entity("comment").unwrap();
    let sql = comment
        .where_related("post/author", "name", "Ann")
        .unwrap()
        .get_sql(None, None, false)
        .unwrap();
    assert_eq!(
        sql,
        "SELECT comments.* FROM comments \
         LEFT OUTER JOIN posts posts ON posts.id = comments.post_id \
         LEFT OUTER JOIN users post_author_users ON post_author_users.id = posts.author_id \
         WHERE post_author_users.name = 'Ann'"
    );
}

#[test]
fn unknown_path_segment_leaves_query_untouched() {
    let (_db, mapper) = setup();
    let mut comment = mapper.entity("comment").unwrap();
    let err = comment.where_related("post/nothing", "name", "x").unwrap_err();
    assert!(matches!(err, OrmError::UnknownRelation { ref relation, .. } if relation == "nothing"));
    assert!(comment.query_state().joins.is_empty());
    assert!(comment.query_state().select.is_empty());
    assert_eq!(
        comment.get_sql(None, None, false).unwrap(),
        "SELECT * FROM comments"
    );
}

#[test]
fn self_relations_resolve_both_directions() {
    let (_db, mapper) = setup();
    let mut employee = loaded(
        &mapper,
        "employee",
        &[("id", Value::Int(1)), ("manager_id", Value::Int(7))],
    );

    let manager = employee.related_without_populating("manager").unwrap();
    assert_eq!(
        manager.get_sql(None, None, true).unwrap(),
        "SELECT * FROM employees WHERE employees.id = 7"
    );

    let reports = employee.related_without_populating("employee").unwrap();
    assert_eq!(
        reports.get_sql(None, None, true).unwrap(),
        "SELECT employees.* FROM employees WHERE employees.manager_id = 1"
    );
}

#[test]
fn self_referencing_relations_auto_populate() {
    let (db, mapper) = setup_with(
        Config::default()
            .with_auto_populate_has_one(true)
            .with_auto_populate_has_many(true),
    );
    db.respond(
        "WHERE employees.id = 7",
        vec![Row::new().with("id", "7").with("name", "Boss")],
    );
    db.respond(
        "WHERE employees.manager_id = 1",
        vec![
            Row::new().with("id", "2").with("name", "Ann").with("manager_id", "1"),
            Row::new().with("id", "3").with("name", "Bob").with("manager_id", "1"),
        ],
    );
    let mut employee = loaded(
        &mapper,
        "employee",
        &[("id", Value::Int(1)), ("manager_id", Value::Int(7))],
    );

    let manager = employee.related("manager").unwrap();
    assert_eq!(manager.id(), Value::Int(7));
    assert_eq!(manager.value("name"), Value::from("Boss"));
    assert_eq!(db.log(), vec!["SELECT * FROM employees WHERE employees.id = 7"]);

    db.clear_log();
    let reports = employee.related("employee").unwrap();
    assert_eq!(reports.result_count(), 2);
    assert_eq!(reports.all()[1].value("manager_id"), Value::Int(1));
    let log = db.log();
    assert_eq!(log.len(), 1);
    assert!(log[0].ends_with("FROM employees WHERE employees.manager_id = 1"));

    // Cached after the first access.
    db.clear_log();
    employee.related("manager").unwrap();
    assert!(db.log().is_empty());
}

#[test]
fn related_of_unsaved_entity_fetches_nothing() {
    let (db, mapper) = setup();
    let mut post = mapper.entity("post").unwrap();
    let comments = post.related("comment").unwrap();
    comments.get(None, None).unwrap();
    assert_eq!(comments.result_count(), 0);
    assert!(db.log().is_empty());
}

#[test]
fn like_and_ilike_related() {
    let (_db, mapper) = setup();
    let mut comment = mapper.entity("comment").unwrap();
    comment.like_related("post", "title", "ell", LikeSide::Both).unwrap();
    comment.ilike_related("post", "body", "x", LikeSide::After).unwrap();
    let sql = comment.get_sql(None, None, false).unwrap();
    assert!(sql.ends_with("WHERE posts.title LIKE '%ell%' AND UPPER(posts.body) LIKE 'X%'"));
}

#[test]
fn include_related_selects_prefixed_columns() {
    let (_db, mapper) = setup();
    let mut comment = mapper.entity("comment").unwrap();
    let sql = comment
        .include_related("post", &["title"], None, false)
        .unwrap()
        .get_sql(None, None, false)
        .unwrap();
    assert_eq!(
        sql,
        "SELECT comments.*, posts.title AS post_title FROM comments LEFT OUTER JOIN posts posts ON posts.id = comments.post_id"
    );
}

#[test]
fn include_related_rejects_has_many() {
    let (_db, mapper) = setup();
    let mut post = mapper.entity("post").unwrap();
    let err = post.include_related("comment", &[], None, false).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn include_related_count_is_a_correlated_subquery() {
    let (_db, mapper) = setup();
    let mut post = mapper.entity("post").unwrap();
    let sql = post
        .include_related_count("comment", None)
        .unwrap()
        .get_sql(None, None, false)
        .unwrap();
    assert_eq!(
        sql,
        "SELECT posts.*, (SELECT COUNT(*) AS count FROM comments \
         LEFT OUTER JOIN posts posts_subquery ON posts_subquery.id = comments.post_id \
         WHERE posts_subquery.id = posts.id) AS comment_count FROM posts"
    );
}

#[test]
fn related_entity_clause_uses_every_loaded_id() {
    let (db, mapper) = setup();
    db.respond("FROM posts", post_rows());
    let mut posts = mapper.entity("post").unwrap();
    posts.get(None, None).unwrap();

    let mut comment = mapper.entity("comment").unwrap();
    comment
        .related_entity_clause(ClauseKind::WhereIn, None, &posts)
        .unwrap();
    assert_eq!(
        comment.get_sql(None, None, false).unwrap(),
        "SELECT comments.* FROM comments WHERE comments.post_id IN (1, 2)"
    );
}

// ==================== Fetching ====================

#[test]
fn get_materializes_rows() {
    let (db, mapper) = setup();
    db.respond("FROM posts", post_rows());
    let mut post = mapper.entity("post").unwrap();
    post.get(None, None).unwrap();

    assert_eq!(db.last_statement().unwrap(), "SELECT * FROM posts");
    assert_eq!(post.result_count(), 2);
    // the first row populates the entity itself
    assert_eq!(post.id(), Value::Int(1));
    assert_eq!(post.value("author_id"), Value::Int(4));
    assert_eq!(post.value("title"), Value::from("Hello"));
    assert!(post.changed_fields().is_empty());
    assert!(post.exists());

    let second = post.find(2).unwrap();
    assert_eq!(second.value("title"), Value::from("World"));
    assert!(second.value("author_id").is_null());
}

#[test]
fn empty_result_clears_entity() {
    let (db, mapper) = setup();
    let mut post = loaded(&mapper, "post", &[("id", Value::Int(3)), ("title", "Old".into())]);
    post.where_("title", "missing").get(None, None).unwrap();
    assert_eq!(db.last_statement().unwrap(), "SELECT * FROM posts WHERE posts.title = 'missing'");
    assert!(post.id().is_null());
    assert!(!post.exists());
}

#[test]
fn validate_then_get_queries_by_example() {
    let (db, mapper) = setup();
    let mut post = mapper.entity("post").unwrap();
    post.set("title", "Hello");
    post.validate().unwrap().get(None, None).unwrap();
    assert_eq!(
        db.last_statement().unwrap(),
        "SELECT * FROM posts WHERE posts.title = 'Hello'"
    );
}

#[test]
fn iterated_rows_match_get() {
    let (db, mapper) = setup();
    db.respond("FROM posts", post_rows());

    let mut eager = mapper.entity("post").unwrap();
    eager.get(None, None).unwrap();
    let expected: Vec<Value> = eager.all().iter().map(|p| p.value("title")).collect();

    let mut post = mapper.entity("post").unwrap();
    let mut rows = post.get_iterated(None, None).unwrap();
    assert_eq!(rows.len(), 2);
    let mut seen = Vec::new();
    while let Some(p) = rows.next_entity().unwrap() {
        assert!(p.changed_fields().is_empty());
        seen.push(p.value("title"));
    }
    assert_eq!(seen, expected);

    rows.rewind();
    assert_eq!(rows.next_entity().unwrap().unwrap().id(), Value::Int(1));
}

#[test]
fn count_ignores_select_and_order() {
    let (db, mapper) = setup();
    db.respond("COUNT(*)", vec![Row::new().with("numrows", 7)]);
    let mut post = mapper.entity("post").unwrap();
    post.select("title").order_by("title", "desc").where_("body", "x");
    assert_eq!(post.count().unwrap(), 7);
    assert_eq!(
        db.last_statement().unwrap(),
        "SELECT COUNT(*) AS numrows FROM posts WHERE posts.body = 'x'"
    );
}

#[test]
fn related_count_excludes_given_ids() {
    let (db, mapper) = setup();
    let mut post = loaded(&mapper, "post", &[("id", Value::Int(1))]);
    let comments = post.related_without_populating("comment").unwrap();
    comments.count_with(&[Value::Int(8)], None, None).unwrap();
    assert_eq!(
        db.last_statement().unwrap(),
        "SELECT COUNT(*) AS numrows FROM comments WHERE post_id = 1 AND id NOT IN (8)"
    );

    let tags = post.related_without_populating("tag").unwrap();
    tags.count_with(&[Value::Int(2)], None, None).unwrap();
    assert_eq!(
        db.last_statement().unwrap(),
        "SELECT COUNT(*) AS numrows FROM posts_tags WHERE post_id = 1 AND tag_id NOT IN (2)"
    );
}

#[test]
fn is_related_to_counts_one_row() {
    let (db, mapper) = setup();
    db.respond("FROM posts_tags", vec![Row::new().with("numrows", 1)]);
    let mut post = loaded(&mapper, "post", &[("id", Value::Int(1))]);
    assert!(post.is_related_to("tag", 2).unwrap());
    assert_eq!(
        db.last_statement().unwrap(),
        "SELECT COUNT(*) AS numrows FROM posts_tags WHERE post_id = 1 AND tag_id = 2"
    );
    assert!(!post.is_related_to("tag", Value::Null).unwrap());
}

#[test]
fn paging_reports_window() {
    let (db, mapper) = setup();
    db.respond("COUNT(*)", vec![Row::new().with("numrows", 7)]);
    db.respond("SELECT * FROM posts", post_rows());

    let mut post = mapper.entity("post").unwrap();
    let paged = post.get_paged(2, 3, false).unwrap();
    assert_eq!(db.statements("select"), vec![
        "SELECT COUNT(*) AS numrows FROM posts".to_string(),
        "SELECT * FROM posts LIMIT 3 OFFSET 3".to_string(),
    ]);
    assert_eq!(paged.total_rows, 7);
    assert_eq!(paged.total_pages, 3);
    assert_eq!(paged.current_page, 2);
    assert_eq!(paged.current_row, 3);
    assert_eq!(paged.last_row, 6);
    assert!(paged.has_previous);
    assert_eq!(paged.previous_page, 1);
    assert!(paged.has_next);
    assert_eq!(paged.next_page, 3);
    assert_eq!(paged.next_row, 6);
    assert_eq!(paged.items_on_page, 2);
}

#[test]
fn paging_past_the_end_clamps() {
    let (db, mapper) = setup();
    db.respond("COUNT(*)", vec![Row::new().with("numrows", 7)]);
    let mut post = mapper.entity("post").unwrap();
    let paged = post.get_paged(9, 3, false).unwrap();
    assert_eq!(paged.current_page, 3);
    assert_eq!(paged.current_row, 6);
    assert!(!paged.has_next);
}

#[test]
fn paging_past_the_end_of_full_pages_lands_on_last_page() {
    let (db, mapper) = setup();
    db.respond("COUNT(*)", vec![Row::new().with("numrows", 20)]);
    let mut post = mapper.entity("post").unwrap();
    let paged = post.get_paged(3, 10, false).unwrap();
    assert_eq!(db.last_statement().unwrap(), "SELECT * FROM posts LIMIT 10 OFFSET 10");
    assert_eq!(paged.total_pages, 2);
    assert_eq!(paged.current_page, 2);
    assert_eq!(paged.current_row, 10);
    assert!(!paged.has_next);
    assert!(paged.has_previous);
}

#[test]
fn paging_empty_result() {
    let (_db, mapper) = setup();
    let mut post = mapper.entity("post").unwrap();
    let paged = post.get_paged(1, 10, false).unwrap();
    assert_eq!(paged.total_pages, 0);
    assert_eq!(paged.current_page, 0);
    assert!(!paged.has_next);
    assert!(!paged.has_previous);
}

#[test]
fn paging_rejects_zero_page_size() {
    let (_db, mapper) = setup();
    let mut post = mapper.entity("post").unwrap();
    assert!(post.get_paged(1, 0, false).is_err());
}

// ==================== Saving ====================

#[test]
fn saved_post_reads_back_with_integer_keys() {
    let (db, mapper) = setup();
    let mut post = mapper.entity("post").unwrap();
    post.set("title", "Hello").set("author_id", 4);
    assert!(post.save().unwrap());
    assert_eq!(post.id(), Value::Int(1));

    // Drivers hand back text; key columns come back as integers.
    db.respond(
        "WHERE posts.id = 1",
        vec![Row::new().with("id", "1").with("title", "Hello").with("author_id", "4")],
    );
    let mut fetched = mapper.entity("post").unwrap();
    fetched.get_where(&[("id", post.id())], None, None).unwrap();
    assert_eq!(
        db.last_statement().unwrap(),
        "SELECT * FROM posts WHERE posts.id = 1"
    );
    assert_eq!(fetched.id(), post.id());
    assert_eq!(fetched.value("title"), post.value("title"));
    assert_eq!(fetched.value("author_id"), Value::Int(4));
    assert!(fetched.changed_fields().is_empty());
}

#[test]
fn save_inserts_then_skips_unchanged() {
    let (db, mapper) = setup();
    let mut post = mapper.entity("post").unwrap();
    post.set("title", "Hello");
    assert!(post.save().unwrap());
    assert_eq!(db.log(), vec!["INSERT INTO posts (title) VALUES ('Hello')"]);
    assert_eq!(post.id(), Value::Int(1));
    assert!(post.changed_fields().is_empty());

    db.clear_log();
    assert!(post.save().unwrap());
    assert!(db.log().is_empty());
}

#[test]
fn save_updates_only_changed_columns() {
    let (db, mapper) = setup();
    db.respond("FROM posts", post_rows());
    let mut post = mapper.entity("post").unwrap();
    post.get(None, None).unwrap();
    db.clear_log();

    post.set("title", "Bye");
    assert!(post.save().unwrap());
    assert_eq!(db.log(), vec!["UPDATE posts SET title = 'Bye' WHERE id = 1"]);
}

#[test]
fn failed_validation_writes_nothing() {
    let (db, mapper) = setup();
    let mut post = mapper.entity("post").unwrap();
    post.set("title", "");
    assert!(!post.save().unwrap());
    assert!(!post.is_valid());
    assert_eq!(post.errors().field("title"), Some("The Title field is required."));
    assert!(db.log().is_empty());
}

#[test]
fn timestamps_are_stamped() {
    let db = Arc::new(MemoryDatabase::new().with_table("notes", &["id", "text", "created", "updated"]));
    let registry = Registry::new(Config::default().with_unix_timestamp(true));
    registry.register(ModelDef::new("note"));
    let mapper = Mapper::new(Arc::new(registry), db.clone());

    let mut note = mapper.entity("note").unwrap();
    note.set("text", "hi");
    assert!(note.save().unwrap());
    let created = note.value("created");
    assert!(created.as_i64().unwrap() > 0);
    assert_eq!(note.value("updated"), created);
    assert!(db.last_statement().unwrap().starts_with("INSERT INTO notes (text, created, updated) VALUES ('hi', "));

    // only the updated stamp would change: no write
    db.clear_log();
    assert!(note.save().unwrap());
    assert!(db.log().is_empty());
}

#[test]
fn save_as_new_inserts_with_id() {
    let (db, mapper) = setup();
    let mut post = loaded(&mapper, "post", &[("id", Value::Int(5)), ("title", "Hello".into())]);
    assert!(post.save_as_new().unwrap());
    assert_eq!(db.log(), vec!["INSERT INTO posts (id, title) VALUES (5, 'Hello')"]);
    assert_eq!(post.id(), Value::Int(5));
}

#[test]
fn has_one_on_own_table_is_saved_inline() {
    let (db, mapper) = setup();
    let mut user = loaded(&mapper, "user", &[("id", Value::Int(4)), ("name", "Ann".into())]);
    let mut post = mapper.entity("post").unwrap();
    post.set("title", "Hello");
    assert!(post.save_with(Related::new().with_field("author", &mut user)).unwrap());
    assert_eq!(db.log(), vec!["INSERT INTO posts (title, author_id) VALUES ('Hello', 4)"]);
    assert_eq!(post.value("author_id"), Value::Int(4));
}

#[test]
fn one_to_one_save_releases_previous_owner() {
    let (db, mapper) = setup();
    let mut user = loaded(&mapper, "user", &[("id", Value::Int(4)), ("name", "Ann".into())]);
    let mut profile = loaded(&mapper, "profile", &[("id", Value::Int(9)), ("bio", "hi".into())]);

    assert!(user.save_with(Related::one(&mut profile)).unwrap());
    assert_eq!(
        db.log(),
        vec![
            "UPDATE profiles SET user_id = 4 WHERE id = 9",
            "UPDATE profiles SET user_id = NULL WHERE profiles.user_id = 4 AND profiles.id <> 9",
        ]
    );
    assert_eq!(profile.value("user_id"), Value::Int(4));
}

#[test]
fn one_to_one_inline_save_releases_previous_owner() {
    let (db, mapper) = setup();
    let mut user = loaded(&mapper, "user", &[("id", Value::Int(4))]);
    let mut profile = loaded(&mapper, "profile", &[("id", Value::Int(9))]);

    assert!(profile.save_with(Related::one(&mut user)).unwrap());
    assert_eq!(
        db.log(),
        vec![
            "UPDATE profiles SET user_id = NULL WHERE profiles.user_id = 4 AND profiles.id <> 9",
            "UPDATE profiles SET user_id = 4 WHERE id = 9",
        ]
    );
}

#[test]
fn join_table_row_is_inserted_once() {
    let (db, mapper) = setup();
    let mut post = loaded(&mapper, "post", &[("id", Value::Int(1)), ("title", "Hello".into())]);
    let mut tag = loaded(&mapper, "tag", &[("id", Value::Int(2))]);

    assert!(post.save_with(Related::one(&mut tag)).unwrap());
    assert_eq!(
        db.log(),
        vec![
            "SELECT * FROM posts_tags WHERE post_id = 1 AND tag_id = 2",
            "INSERT INTO posts_tags (post_id, tag_id) VALUES (1, 2)",
        ]
    );

    db.clear_log();
    db.respond("FROM posts_tags WHERE post_id = 1 AND tag_id = 2", vec![Row::new().with("id", 1)]);
    assert!(post.save_with(Related::one(&mut tag)).unwrap());
    assert_eq!(db.statements("insert").len(), 0);
}

#[test]
fn join_table_row_of_has_one_side_is_reused() {
    let (db, mapper) = setup();
    db.respond("WHERE book_id = 5 LIMIT 1", vec![Row::new().with("id", 1)]);
    let mut category = loaded(&mapper, "category", &[("id", Value::Int(3))]);
    let mut book = loaded(&mapper, "book", &[("id", Value::Int(5))]);

    assert!(category.save_with(Related::one(&mut book)).unwrap());
    assert_eq!(
        db.log(),
        vec![
            "SELECT * FROM books_categories WHERE category_id = 3 AND book_id = 5",
            "SELECT * FROM books_categories WHERE book_id = 5 LIMIT 1",
            "UPDATE books_categories SET category_id = 3, book_id = 5 WHERE book_id = 5",
        ]
    );
}

#[test]
fn unsaved_related_object_is_reported() {
    let (db, mapper) = setup();
    let mut post = loaded(&mapper, "post", &[("id", Value::Int(1)), ("title", "Hello".into())]);
    let mut tag = mapper.entity("tag").unwrap();

    assert!(!post.save_with(Related::one(&mut tag)).unwrap());
    assert_eq!(
        post.errors().field("tag"),
        Some("Unable to save the tag relationship: The related object was not saved.")
    );
    assert!(db.log().is_empty());
}

#[test]
fn set_join_field_updates_join_rows() {
    let (db, mapper) = setup();
    let mut post = loaded(&mapper, "post", &[("id", Value::Int(1))]);
    let tag = loaded(&mapper, "tag", &[("id", Value::Int(2))]);
    post.set_join_field("tag", &[("position", Value::Int(3))], &[&tag])
        .unwrap();
    assert_eq!(
        db.last_statement().unwrap(),
        "UPDATE posts_tags SET position = 3 WHERE post_id = 1 AND tag_id = 2"
    );
}

// ==================== Deleting and bulk updates ====================

#[test]
fn delete_clears_relationship_rows() {
    let (db, mapper) = setup();
    let mut post = loaded(&mapper, "post", &[("id", Value::Int(1)), ("title", "Hello".into())]);
    assert!(post.delete().unwrap());
    assert_eq!(
        db.log(),
        vec![
            "DELETE FROM posts WHERE id = 1",
            "UPDATE comments SET post_id = NULL WHERE post_id = 1",
            "DELETE FROM posts_tags WHERE post_id = 1",
        ]
    );
    assert!(post.id().is_null());
}

#[test]
fn delete_of_unsaved_entity_is_a_no_op() {
    let (db, mapper) = setup();
    let mut post = mapper.entity("post").unwrap();
    assert!(!post.delete().unwrap());
    assert!(db.log().is_empty());
}

#[test]
fn delete_related_removes_join_row() {
    let (db, mapper) = setup();
    let mut post = loaded(&mapper, "post", &[("id", Value::Int(1))]);
    let mut tag = loaded(&mapper, "tag", &[("id", Value::Int(2))]);
    assert!(post.delete_related(Related::one(&mut tag)).unwrap());
    assert_eq!(
        db.log(),
        vec!["DELETE FROM posts_tags WHERE post_id = 1 AND tag_id = 2"]
    );
}

#[test]
fn update_all_targets_loaded_rows() {
    let (db, mapper) = setup();
    db.respond("FROM posts", post_rows());
    let mut post = mapper.entity("post").unwrap();
    post.get(None, None).unwrap();
    assert!(post.update_all(&[("body", Value::from("x"))], true).unwrap());
    assert_eq!(
        db.last_statement().unwrap(),
        "UPDATE posts SET body = 'x' WHERE posts.id IN (1, 2)"
    );
}

#[test]
fn update_without_fields_is_an_error() {
    let (_db, mapper) = setup();
    let mut post = mapper.entity("post").unwrap();
    assert!(post.update_fields(&[], true).is_err());
}

#[test]
fn unescaped_update_is_qualified() {
    let (db, mapper) = setup();
    let mut post = mapper.entity("post").unwrap();
    post.where_("id", 1)
        .update_fields(&[("title", Value::from("body"))], false)
        .unwrap();
    assert_eq!(
        db.last_statement().unwrap(),
        "UPDATE posts SET title = posts.body WHERE posts.id = 1"
    );
}

// ==================== Transactions ====================

#[test]
fn auto_transaction_wraps_save() {
    let (db, mapper) = setup_with(Config::default().with_auto_transaction(true));
    let mut post = mapper.entity("post").unwrap();
    post.set("title", "Hello");
    assert!(post.save().unwrap());
    assert_eq!(
        db.log(),
        vec!["BEGIN", "INSERT INTO posts (title) VALUES ('Hello')", "COMMIT"]
    );
}

#[test]
fn failed_statement_rolls_back_and_reports() {
    let (db, mapper) = setup_with(Config::default().with_auto_transaction(true));
    db.fail_on("INSERT INTO posts");
    let mut post = mapper.entity("post").unwrap();
    post.set("title", "Hello");

    assert!(!post.save().unwrap());
    assert!(!post.is_valid());
    assert_eq!(
        post.errors().field("transaction"),
        Some("The save failed to complete, so the transaction was rolled back.")
    );
    assert_eq!(db.log().last().map(String::as_str), Some("ROLLBACK"));
}

#[test]
fn failed_delete_keeps_values() {
    let (db, mapper) = setup_with(Config::default().with_auto_transaction(true));
    db.trans_strict(false);
    db.fail_on("DELETE FROM posts_tags");
    let mut post = loaded(&mapper, "post", &[("id", Value::Int(1))]);
    assert!(!post.delete().unwrap());
    assert_eq!(post.id(), Value::Int(1));
    assert!(post.errors().field("transaction").is_some());
}

// ==================== Verb dispatch ====================

#[test]
fn call_get_by_field() {
    let (db, mapper) = setup();
    db.respond("FROM posts", post_rows());
    let mut post = mapper.entity("post").unwrap();
    assert!(post.call("get_by_title", vec!["Hello".into()]).unwrap());
    assert_eq!(
        db.last_statement().unwrap(),
        "SELECT * FROM posts WHERE posts.title = 'Hello'"
    );
    assert_eq!(post.id(), Value::Int(1));
}

#[test]
fn call_related_verb() {
    let (_db, mapper) = setup();
    let mut post = mapper.entity("post").unwrap();
    post.call("where_related_author", vec!["name".into(), "Ann".into()])
        .unwrap();
    assert_eq!(
        post.get_sql(None, None, false).unwrap(),
        "SELECT posts.* FROM posts LEFT OUTER JOIN users author_users ON author_users.id = posts.author_id WHERE author_users.name = 'Ann'"
    );
}

#[test]
fn call_related_with_entity_uses_its_id() {
    let (_db, mapper) = setup();
    let mut user = loaded(&mapper, "user", &[("id", Value::Int(4))]);
    let mut post = mapper.entity("post").unwrap();
    post.call("where_related_author", vec![(&mut user).into()]).unwrap();
    assert_eq!(
        post.get_sql(None, None, false).unwrap(),
        "SELECT posts.* FROM posts WHERE posts.author_id = 4"
    );
}

#[test]
fn call_save_relation() {
    let (db, mapper) = setup();
    let mut post = loaded(&mapper, "post", &[("id", Value::Int(1)), ("title", "Hello".into())]);
    let mut tag = loaded(&mapper, "tag", &[("id", Value::Int(2))]);
    assert!(post.call("save_tag", vec![(&mut tag).into()]).unwrap());
    assert_eq!(db.statements("insert").len(), 1);
}

#[test]
fn call_unknown_verb_fails() {
    let (_db, mapper) = setup();
    let mut post = mapper.entity("post").unwrap();
    let err = post.call("frobnicate", vec![]).unwrap_err();
    assert!(matches!(err, OrmError::QueryBuild(_)));
    let err = post.call("where_func", vec!["UPPER".into()]).unwrap_err();
    assert!(matches!(err, OrmError::QueryBuild(_)));
}

#[test]
fn call_where_func() {
    let (_db, mapper) = setup();
    let mut post = mapper.entity("post").unwrap();
    post.call("where_func", vec!["UPPER".into(), "@title".into(), "HELLO".into()])
        .unwrap();
    assert_eq!(
        post.get_sql(None, None, false).unwrap(),
        "SELECT * FROM posts WHERE UPPER(posts.title) = 'HELLO'"
    );
}

#[test]
fn function_helpers_qualify_columns() {
    let (_db, mapper) = setup();
    let mut post = mapper.entity("post").unwrap();
    post.where_("body", "x")
        .or_where_func("LOWER", &[Expr::Column("title".into())], "hello")
        .unwrap()
        .order_by_func("LENGTH", &[Expr::Column("title".into())], "desc")
        .unwrap();
    assert_eq!(
        post.get_sql(None, None, false).unwrap(),
        "SELECT * FROM posts WHERE posts.body = 'x' OR LOWER(posts.title) = 'hello' ORDER BY LENGTH(posts.title) DESC"
    );
}

// ==================== Copies ====================

#[test]
fn copies_are_independent() {
    let (_db, mapper) = setup();
    let mut post = loaded(&mapper, "post", &[("id", Value::Int(1)), ("title", "Hello".into())]);
    post.where_("title", "x");

    let mut clone = post.get_clone();
    clone.set("title", "Changed");
    assert_eq!(post.value("title"), Value::from("Hello"));
    assert_eq!(
        clone.get_sql(None, None, false).unwrap(),
        "SELECT * FROM posts WHERE posts.title = 'x'"
    );
    assert!(!post.query_state().wheres.is_empty());

    let copy = post.get_copy();
    assert!(copy.id().is_null());
    assert_eq!(copy.value("title"), Value::from("Hello"));
}
