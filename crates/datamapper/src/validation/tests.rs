use std::sync::Arc;

use super::*;
use crate::config::Config;
use crate::db::MemoryDatabase;
use crate::entity::Related;
use crate::mapper::Mapper;
use crate::registry::{FieldDef, ModelDef};
use crate::row::Row;

fn no_admin(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    Ok(if ctx.value().to_text().eq_ignore_ascii_case("admin") {
        RuleOutcome::Fail
    } else {
        RuleOutcome::Pass
    })
}

fn no_example(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    Ok(if ctx.value().to_text().ends_with("@example.com") {
        RuleOutcome::Message("Example addresses are not accepted.".to_string())
    } else {
        RuleOutcome::Pass
    })
}

fn accounts_db() -> MemoryDatabase {
    MemoryDatabase::new()
        .with_table(
            "accounts",
            &[
                "id", "username", "nickname", "email", "password", "confirm_password", "status",
                "birthday", "year", "month", "day",
            ],
        )
        .with_table("teams", &["id", "name"])
        .with_table("players", &["id", "name", "team_id"])
        .with_table("widgets", &["id", "name"])
}

fn accounts_registry(config: Config) -> Registry {
    let registry = Registry::new(config);
    registry.register(
        ModelDef::new("account")
            .field(
                FieldDef::new("username")
                    .label("Username")
                    .rule("trim")
                    .rule("required")
                    .rule_with("min_length", 3)
                    .rule("alpha_dash")
                    .rule("unique"),
            )
            .field(FieldDef::new("nickname").rule("no_admin"))
            .field(FieldDef::new("email").rule("valid_email").rule("no_example"))
            .field(FieldDef::new("password").label("Password").rule_with("min_length", 8))
            .field(
                FieldDef::new("confirm_password")
                    .label("Confirm Password")
                    .rule_with("matches", "password"),
            )
            .field(FieldDef::new("status").rule_list("valid_match", ["active", "banned"]))
            .field(FieldDef::new("birthday").rule_list("valid_date_group", ["year", "month", "day"]))
            .rule("no_admin", no_admin),
    );
    registry.register(
        ModelDef::new("team")
            .has_many("player")
            .field(FieldDef::new("name").get_rule("strtoupper"))
            .field(
                FieldDef::new("player")
                    .label("Players")
                    .rule("required")
                    .rule_with("max_size", 2),
            ),
    );
    registry.register(ModelDef::new("player").has_one("team"));
    registry.register(ModelDef::new("widget").field(FieldDef::new("name").rule("nope")));
    registry.register_rule("no_example", no_example);
    registry.set_message("no_admin", "The %s field cannot be admin.");
    registry
}

fn setup_with(config: Config) -> (Arc<MemoryDatabase>, Mapper) {
    let db = Arc::new(accounts_db());
    let mapper = Mapper::new(Arc::new(accounts_registry(config)), db.clone());
    (db, mapper)
}

fn setup() -> (Arc<MemoryDatabase>, Mapper) {
    setup_with(Config::default())
}

fn loaded(mapper: &Mapper, class: &str, values: &[(&str, Value)]) -> Entity {
    let mut entity = mapper.entity(class).unwrap();
    for (field, value) in values {
        entity.set(field, value.clone());
    }
    entity.refresh_stored_values();
    entity
}

// ==================== Field rules ====================

#[test]
fn first_failing_rule_stops_the_chain() {
    let (db, mapper) = setup();
    let mut account = mapper.entity("account").unwrap();
    account.set("username", "a!");
    account.validate().unwrap();

    assert!(!account.is_valid());
    assert_eq!(account.errors().len(), 1);
    assert_eq!(
        account.errors().field("username"),
        Some("The Username field must be at least 3 characters in length.")
    );
    // `unique` never ran
    assert!(db.log().is_empty());
}

#[test]
fn prep_rules_rewrite_the_value() {
    let (db, mapper) = setup();
    let mut account = mapper.entity("account").unwrap();
    account.set("username", "  bob  ");
    account.validate().unwrap();

    assert!(account.is_valid());
    assert_eq!(account.value("username"), Value::from("bob"));
    assert_eq!(
        db.log(),
        vec!["SELECT * FROM accounts WHERE username = 'bob' LIMIT 1"]
    );
}

#[test]
fn unique_rejects_value_taken_by_another_row() {
    let (db, mapper) = setup();
    db.respond("WHERE username = 'bob'", vec![Row::new().with("id", 9)]);

    let mut account = mapper.entity("account").unwrap();
    account.set("username", "bob");
    account.validate().unwrap();
    assert_eq!(
        account.errors().field("username"),
        Some("The Username you supplied is already taken.")
    );

    // the row holding the value is this one
    let mut same = loaded(&mapper, "account", &[("id", Value::Int(9)), ("username", "old".into())]);
    same.set("username", "bob");
    same.validate().unwrap();
    assert!(same.is_valid());
}

#[test]
fn unchanged_values_are_not_revalidated() {
    let (db, mapper) = setup();
    let mut account = loaded(&mapper, "account", &[("id", Value::Int(1)), ("username", "x".into())]);
    account.validate().unwrap();
    assert!(account.is_valid());
    assert!(db.log().is_empty());
}

#[test]
fn empty_optional_fields_are_skipped() {
    let (_db, mapper) = setup();
    let mut account = mapper.entity("account").unwrap();
    account.set("username", "bob").set("email", "");
    account.validate().unwrap();
    assert!(account.is_valid());
}

#[test]
fn required_runs_on_empty_input() {
    let (_db, mapper) = setup_with(Config::default().with_error_delimiters("<p>", "</p>"));
    let mut account = mapper.entity("account").unwrap();
    account.set("username", "");
    account.validate().unwrap();
    assert_eq!(
        account.errors().field("username"),
        Some("<p>The Username field is required.</p>")
    );
}

#[test]
fn matches_names_the_other_field_by_label() {
    let (_db, mapper) = setup();
    let mut account = mapper.entity("account").unwrap();
    account
        .set("username", "bob")
        .set("password", "secret123")
        .set("confirm_password", "nope");
    account.validate().unwrap();
    assert_eq!(
        account.errors().field("confirm_password"),
        Some("The Confirm Password field does not match the Password field.")
    );
    assert!(account.errors().field("password").is_none());
}

#[test]
fn valid_match_lists_choices() {
    let (_db, mapper) = setup();
    let mut account = mapper.entity("account").unwrap();
    account.set("username", "bob").set("status", "deleted");
    account.validate().unwrap();
    assert_eq!(
        account.errors().field("status"),
        Some("The status field may only be active or banned.")
    );
}

#[test]
fn date_group_combines_fields() {
    let (_db, mapper) = setup();
    let mut account = mapper.entity("account").unwrap();
    account
        .set("username", "bob")
        .set("birthday", "pending")
        .set("year", 2020)
        .set("month", 2)
        .set("day", 29);
    account.validate().unwrap();
    assert!(account.is_valid());
    assert_eq!(account.value("birthday"), Value::from("2020-02-29"));

    let mut bad = mapper.entity("account").unwrap();
    bad.set("username", "bob")
        .set("birthday", "pending")
        .set("year", 2021)
        .set("month", 2)
        .set("day", 30);
    bad.validate().unwrap();
    assert_eq!(
        bad.errors().field("birthday"),
        Some("The birthday fields must contain a valid date.")
    );
}

#[test]
fn model_rules_use_overridden_messages() {
    let (_db, mapper) = setup();
    let mut account = mapper.entity("account").unwrap();
    account.set("username", "bob").set("nickname", "Admin");
    account.validate().unwrap();
    assert_eq!(
        account.errors().field("nickname"),
        Some("The nickname field cannot be admin.")
    );
}

#[test]
fn extension_rules_can_return_their_own_message() {
    let (_db, mapper) = setup();
    let mut account = mapper.entity("account").unwrap();
    account.set("username", "bob").set("email", "bob@example.com");
    account.validate().unwrap();
    assert_eq!(
        account.errors().field("email"),
        Some("Example addresses are not accepted.")
    );

    let mut typo = mapper.entity("account").unwrap();
    typo.set("username", "bob").set("email", "bob.example.com");
    typo.validate().unwrap();
    assert_eq!(
        typo.errors().field("email"),
        Some("The email field must contain a valid email address.")
    );
}

#[test]
fn unknown_rule_is_a_config_error() {
    let (_db, mapper) = setup();
    let mut widget = mapper.entity("widget").unwrap();
    widget.set("name", "gear");
    let err = widget.validate().unwrap_err();
    assert!(err.is_config());
}

#[test]
fn validation_runs_once_until_saved() {
    let (_db, mapper) = setup();
    let mut account = mapper.entity("account").unwrap();
    account.set("username", "a!");
    account.validate().unwrap();
    assert!(!account.is_valid());

    account.set("username", "bob");
    account.validate().unwrap();
    assert!(!account.is_valid());

    account.skip_validation(false);
    account.validate().unwrap();
    assert!(account.is_valid());
}

// ==================== Relationship rules ====================

#[test]
fn related_required_counts_stored_rows() {
    let (db, mapper) = setup();
    let mut team = loaded(&mapper, "team", &[("id", Value::Int(1)), ("name", "REDS".into())]);
    team.validate().unwrap();

    assert_eq!(
        team.errors().field("player"),
        Some("The Players relationship is required.")
    );
    assert_eq!(
        db.log(),
        vec!["SELECT COUNT(*) AS numrows FROM players WHERE team_id = 1"]
    );
}

#[test]
fn related_objects_being_saved_count() {
    let (db, mapper) = setup();
    let mut team = loaded(&mapper, "team", &[("id", Value::Int(1)), ("name", "REDS".into())]);
    let mut player = loaded(&mapper, "player", &[("id", Value::Int(5))]);

    assert!(team.save_with(Related::one(&mut player)).unwrap());
    assert_eq!(
        db.statements("select")[0],
        "SELECT COUNT(*) AS numrows FROM players WHERE team_id = 1 AND id NOT IN (5)"
    );
    assert_eq!(
        db.last_statement().unwrap(),
        "UPDATE players SET team_id = 1 WHERE id = 5"
    );
}

#[test]
fn related_max_size_blocks_the_save() {
    let (db, mapper) = setup();
    db.respond("FROM players", vec![Row::new().with("numrows", 2)]);
    let mut team = loaded(&mapper, "team", &[("id", Value::Int(1)), ("name", "REDS".into())]);
    let mut player = loaded(&mapper, "player", &[("id", Value::Int(5))]);

    assert!(!team.save_with(Related::one(&mut player)).unwrap());
    assert_eq!(
        team.errors().field("player"),
        Some("The Players relationship can not exceed 2.")
    );
    assert!(db.statements("update").is_empty());
}

// ==================== Get rules ====================

#[test]
fn get_rules_format_fetched_values() {
    let (db, mapper) = setup();
    db.respond("FROM teams", vec![Row::new().with("id", 1).with("name", "reds")]);
    let mut team = mapper.entity("team").unwrap();
    team.get(None, None).unwrap();
    assert_eq!(team.value("name"), Value::from("REDS"));
    assert!(team.changed_fields().is_empty());
}

// ==================== Error set ====================

#[test]
fn error_set_keeps_order() {
    let mut errors = ErrorSet::new();
    errors.push("title", "required", "Title is required.");
    errors.push("body", "min_length", "Body is too short.");
    errors.push("title", "max_length", "Title is too long.");
    assert_eq!(errors.len(), 3);
    assert_eq!(errors.field("title"), Some("Title is too long."));
    assert_eq!(errors.string(), "Title is required.Body is too short.Title is too long.");
    assert_eq!(
        errors.to_string(),
        "Title is required.; Body is too short.; Title is too long."
    );
}
