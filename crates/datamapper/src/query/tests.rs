//! Tests for the query module.

use super::*;
use crate::db::MemoryDatabase;

fn db() -> MemoryDatabase {
    MemoryDatabase::new()
}

#[test]
fn test_select_basic() {
    let mut q = QueryState::new();
    q.from("posts");
    assert_eq!(q.compile_select(&db(), None), "SELECT * FROM posts");
}

#[test]
fn test_select_full_clause_order() {
    let mut q = QueryState::new();
    q.select("posts.id, COUNT(comments.id, 1) AS n");
    q.distinct = true;
    q.from("posts");
    q.join("comments", "comments", "posts.id = comments.post_id");
    q.where_eq("posts.status", "live");
    q.group_by.push("posts.id".into());
    q.having_condition(
        Connective::And,
        Condition::compare("n >", Operand::new(2, true)),
    );
    q.order_by("posts.id", "desc");
    q.limit = Some(10);
    q.offset = Some(20);

    assert_eq!(
        q.compile_select(&db(), None),
        "SELECT DISTINCT posts.id, COUNT(comments.id, 1) AS n FROM posts \
         LEFT OUTER JOIN comments comments ON posts.id = comments.post_id \
         WHERE posts.status = 'live' GROUP BY posts.id HAVING n > 2 \
         ORDER BY posts.id DESC LIMIT 10 OFFSET 20"
    );
}

#[test]
fn test_select_override_for_counts() {
    let mut q = QueryState::new();
    q.select("posts.*");
    q.from("posts");
    q.where_eq("id", 3);
    assert_eq!(
        q.compile_select(&db(), Some("SELECT COUNT(*) AS numrows")),
        "SELECT COUNT(*) AS numrows FROM posts WHERE id = 3"
    );
}

#[test]
fn test_compare_rendering() {
    let db = db();
    let render = |c: &str, o: Operand| Condition::compare(c, o).render(&db).unwrap();
    assert_eq!(render("posts.id", Operand::new(1, true)), "posts.id = 1");
    assert_eq!(render("posts.id <>", Operand::new(1, true)), "posts.id <> 1");
    assert_eq!(render("posts.title", Operand::Null), "posts.title IS NULL");
    assert_eq!(render("posts.title IS NOT NULL", Operand::Null), "posts.title IS NOT NULL");
    assert_eq!(render("posts.views >", Operand::Null), "posts.views > NULL");
    assert_eq!(render("posts.title IS NOT", Operand::Null), "posts.title IS NOT NULL");
    assert_eq!(render("posts.title is", Operand::Null), "posts.title is NULL");
    assert_eq!(render("posts.a", Operand::new("posts.b", false)), "posts.a = posts.b");
    assert_eq!(render("posts.t", Operand::new("it's", true)), "posts.t = 'it''s'");
}

#[test]
fn test_empty_in_lists() {
    let db = db();
    let cond = |negated| Condition::In {
        column: "posts.id".into(),
        negated,
        values: vec![],
    };
    assert_eq!(cond(false).render(&db).unwrap(), "1=0");
    assert_eq!(cond(true).render(&db).unwrap(), "1=1");

    let filled = Condition::In {
        column: "posts.id".into(),
        negated: true,
        values: vec![Value::from(1), Value::from(2)],
    };
    assert_eq!(filled.render(&db).unwrap(), "posts.id NOT IN (1, 2)");
}

#[test]
fn test_groups_do_not_emit_leading_connectives() {
    let db = db();
    let mut g = ConditionGroup::new();
    g.open(Connective::And, false);
    g.open(Connective::Or, false);
    g.push(Connective::And, Condition::Raw("a = 1".into()));
    g.push(Connective::Or, Condition::Raw("b = 2".into()));
    g.close();
    g.push(Connective::And, Condition::Raw("c = 3".into()));
    g.close();
    g.open(Connective::Or, true);
    g.push(Connective::And, Condition::Raw("d = 4".into()));
    g.close();

    assert_eq!(
        g.render(&db).unwrap(),
        "((a = 1 OR b = 2) AND c = 3) OR NOT (d = 4)"
    );
}

#[test]
fn test_empty_groups_are_skipped_and_open_groups_closed() {
    let db = db();
    let mut g = ConditionGroup::new();
    g.open(Connective::And, false);
    g.close();
    g.push(Connective::And, Condition::Raw("a = 1".into()));
    g.open(Connective::And, false);
    g.push(Connective::Or, Condition::Raw("b = 2".into()));
    assert_eq!(g.render(&db).unwrap(), "a = 1 AND (b = 2)");
    assert!(!g.is_empty());
}

#[test]
fn test_wrap_isolates_or_chains() {
    let db = db();
    let mut g = ConditionGroup::new();
    g.push(Connective::And, Condition::Raw("a = 1".into()));
    g.push(Connective::Or, Condition::Raw("b = 2".into()));
    g.wrap();
    g.push(Connective::And, Condition::Raw("c = 3".into()));
    assert_eq!(g.render(&db).unwrap(), "(a = 1 OR b = 2) AND c = 3");

    let mut empty = ConditionGroup::new();
    empty.wrap();
    assert!(empty.render(&db).is_none());
}

#[test]
fn test_update_and_delete() {
    let db = db();
    let mut q = QueryState::new();
    q.set("title", Operand::new("x", true));
    q.set("editor_id", Operand::Null);
    q.where_eq("id", 4);
    assert_eq!(
        q.compile_update(&db, "posts"),
        "UPDATE posts SET title = 'x', editor_id = NULL WHERE id = 4"
    );
    assert_eq!(q.compile_delete(&db, "posts"), "DELETE FROM posts WHERE id = 4");
}

#[test]
fn test_insert() {
    let db = db();
    let row = vec![
        ("title".to_string(), Value::from("Hi")),
        ("views".to_string(), Value::from(0)),
    ];
    assert_eq!(
        compile_insert(&db, "posts", &row),
        "INSERT INTO posts (title, views) VALUES ('Hi', 0)"
    );
    assert_eq!(
        compile_insert(&db, "posts", &[]),
        "INSERT INTO posts DEFAULT VALUES"
    );
}

#[test]
fn test_get_where() {
    let sql = compile_get_where(
        &db(),
        "comments_posts",
        &[
            ("post_id".to_string(), Value::from(1)),
            ("comment_id".to_string(), Value::from(2)),
        ],
        Some(1),
        None,
    );
    assert_eq!(
        sql,
        "SELECT * FROM comments_posts WHERE post_id = 1 AND comment_id = 2 LIMIT 1"
    );
}

#[test]
fn test_order_by_directions() {
    let mut q = QueryState::new();
    q.order_by("a", "");
    q.order_by("b", "desc");
    q.order_by("c", "sideways");
    q.order_by("d", "random");
    assert_eq!(q.order_by, vec!["a", "b DESC", "c ASC", "RANDOM()"]);
}

#[test]
fn test_reset_select_keeps_pending_writes() {
    let mut q = QueryState::new();
    q.select("posts.*");
    q.where_eq("id", 1);
    q.set("title", Operand::new("x", true));
    q.reset_select();
    assert!(q.select.is_empty());
    assert!(q.wheres.is_empty());
    assert_eq!(q.set.len(), 1);
}

#[test]
fn test_split_top_level() {
    assert_eq!(
        split_top_level("a, COALESCE(b, 'x,y'), c "),
        vec!["a", "COALESCE(b, 'x,y')", "c"]
    );
    assert!(split_top_level(" ").is_empty());
}

#[test]
fn test_clause_kind_names_round_trip() {
    for kind in ClauseKind::ALL {
        assert_eq!(ClauseKind::parse(kind.name()), Some(*kind));
    }
    assert_eq!(ClauseKind::OrWhereNotIn.connective(), Connective::Or);
    assert_eq!(ClauseKind::WhereNotIn.without_in(), ClauseKind::Where);
    assert_eq!(ClauseKind::OrNotIlike.like_flags(), Some((true, true)));
}

#[test]
fn test_like_patterns() {
    assert_eq!(LikeSide::Both.pattern("x"), "%x%");
    assert_eq!(LikeSide::parse("before").pattern("x"), "%x");
    assert_eq!(LikeSide::parse("AFTER").pattern("x"), "x%");
}

#[test]
fn test_expr_shorthand() {
    assert_eq!(Expr::parse_arg("@title", false), Expr::col("title"));
    assert_eq!(Expr::parse_arg("@author/name", false), Expr::col("author/name"));
    assert_eq!(Expr::parse_arg("@parent/id", false), Expr::parent("id"));
    assert_eq!(Expr::parse_arg("[NOW()]", false), Expr::raw("NOW()"));
    assert_eq!(Expr::parse_arg("'x'", false), Expr::raw("'x'"));
    assert_eq!(Expr::parse_arg("*", false), Expr::raw("*"));
    assert_eq!(Expr::parse_arg("+", true), Expr::op(Operator::Add));
    assert_eq!(Expr::parse_arg("+", false), Expr::lit("+"));
    assert_eq!(Expr::parse_arg("hello", false), Expr::lit("hello"));
    assert_eq!(Operator::parse("and"), Some(Operator::And));
    assert_eq!(Operator::parse("||/"), Some(Operator::CubeRoot));
}

#[test]
fn test_subquery_rewrite_aliases_own_table() {
    let sql = "SELECT COUNT(*) AS count FROM comments \
               LEFT OUTER JOIN comments_posts comments_posts ON comments.id = comments_posts.comment_id \
               LEFT OUTER JOIN posts posts ON posts.id = comments_posts.post_id \
               WHERE posts.id = ${parent}.id";
    assert_eq!(
        embed_subquery(sql, "posts"),
        "(SELECT COUNT(*) AS count FROM comments \
         LEFT OUTER JOIN comments_posts comments_posts ON comments.id = comments_posts.comment_id \
         LEFT OUTER JOIN posts posts_subquery ON posts_subquery.id = comments_posts.post_id \
         WHERE posts_subquery.id = posts.id)"
    );
}

#[test]
fn test_subquery_rewrite_from_clause() {
    let sql = "(SELECT MAX(posts.id) FROM posts WHERE posts.user_id = ${parent}.user_id)";
    assert_eq!(
        rewrite_subquery(sql, "posts"),
        "(SELECT MAX(posts_subquery.id) FROM posts posts_subquery \
         WHERE posts_subquery.user_id = posts.user_id)"
    );
    let tail = rewrite_subquery("(SELECT posts.* FROM posts)", "posts");
    assert_eq!(tail, "(SELECT posts_subquery.* FROM posts posts_subquery)");
}

#[test]
fn test_subquery_rewrite_leaves_other_tables() {
    let sql = "(SELECT user_posts.id FROM user_posts)";
    assert_eq!(rewrite_subquery(sql, "posts"), sql);
}
