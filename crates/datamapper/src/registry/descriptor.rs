//! Per-model metadata, built once and shared by every entity of the model.

use std::collections::HashMap;

use super::model::{ModelDef, Rule, RuleParam};
use super::verbs::VerbTable;
use crate::config::{Config, OrderSpec};
use crate::db::Database;
use crate::error::{OrmError, OrmResult};
use crate::inflect;
use crate::validation::RuleFn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    One,
    Many,
}

/// A relationship with every default filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    pub name: String,
    /// Registry key of the related model.
    pub class: String,
    pub other_field: String,
    pub join_self_as: String,
    pub join_other_as: String,
    pub kind: RelationKind,
}

impl RelationSpec {
    /// Column holding this side's id: `<join_self_as>_id`.
    pub fn self_column(&self) -> String {
        format!("{}_id", self.join_self_as)
    }

    /// Column holding the related side's id: `<join_other_as>_id`.
    pub fn other_column(&self) -> String {
        format!("{}_id", self.join_other_as)
    }

    pub fn is_one(&self) -> bool {
        self.kind == RelationKind::One
    }
}

/// Validation entry of one field or relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRules {
    pub field: String,
    pub label: String,
    pub rules: Vec<Rule>,
    pub get_rules: Vec<Rule>,
}

impl FieldRules {
    pub fn has_rule(&self, name: &str) -> bool {
        self.rules.iter().any(|r| r.name == name)
    }
}

/// Immutable model metadata.
#[derive(Debug)]
pub struct ModelDescriptor {
    /// Registry key (snake_case class name).
    pub class: String,
    pub table: String,
    pub model: String,
    /// Table columns, in table order.
    pub fields: Vec<String>,
    /// Validation entries, in declaration order, with one entry per column.
    pub validation: Vec<FieldRules>,
    /// `has_one` relations first, then `has_many`, each in declaration order.
    pub relations: Vec<RelationSpec>,
    pub config: Config,
    pub default_order_by: Vec<OrderSpec>,
    /// Fields with get-time rules.
    pub get_rule_fields: Vec<String>,
    /// `(field, other)` pairs where `field` must match `other`.
    pub matches: Vec<(String, String)>,
    /// Columns coerced to integers on load.
    pub intval: Vec<String>,
    pub rules: HashMap<String, RuleFn>,
    pub verbs: VerbTable,
}

impl ModelDescriptor {
    /// Build a descriptor, reading the table's columns from `db`.
    pub fn build(def: &ModelDef, base: &Config, db: &dyn Database) -> OrmResult<Self> {
        let class = inflect::class_key(&def.class);
        if class.is_empty() {
            return Err(OrmError::config("model class name cannot be empty"));
        }
        let config = base.merged(&def.config);
        let model = def
            .model
            .clone()
            .unwrap_or_else(|| inflect::singular(&class));
        let table = def
            .table
            .clone()
            .unwrap_or_else(|| inflect::plural(&class));
        if table.trim().is_empty() {
            return Err(OrmError::config(format!("model '{class}' has an empty table name")));
        }
        let table = format!("{}{}", config.prefix, table);

        let fields: Vec<String> = db
            .field_metadata(&table)?
            .into_iter()
            .map(|f| f.name)
            .collect();
        if fields.is_empty() {
            return Err(OrmError::config(format!(
                "no columns found for table '{table}' (model '{class}')"
            )));
        }
        if !fields.iter().any(|f| f == "id") {
            return Err(OrmError::config(format!(
                "table '{table}' (model '{class}') has no 'id' column"
            )));
        }

        let relations = build_relations(def, &class, &model)?;

        let mut validation: Vec<FieldRules> = Vec::with_capacity(fields.len());
        if !def.fields.iter().any(|f| f.name == "id") {
            validation.push(FieldRules {
                field: "id".to_string(),
                label: "Identifier".to_string(),
                rules: vec![Rule::new("integer")],
                get_rules: Vec::new(),
            });
        }
        for field in &def.fields {
            validation.push(FieldRules {
                field: field.name.clone(),
                label: field.label.clone().unwrap_or_else(|| field.name.clone()),
                rules: field.rules.clone(),
                get_rules: field.get_rules.clone(),
            });
        }
        for field in &fields {
            if !validation.iter().any(|v| &v.field == field) {
                validation.push(FieldRules {
                    field: field.clone(),
                    label: field.clone(),
                    rules: Vec::new(),
                    get_rules: Vec::new(),
                });
            }
        }

        let get_rule_fields = validation
            .iter()
            .filter(|v| !v.get_rules.is_empty())
            .map(|v| v.field.clone())
            .collect::<Vec<_>>();

        let matches = validation
            .iter()
            .flat_map(|v| {
                v.rules
                    .iter()
                    .filter(|r| r.name == "matches")
                    .filter_map(|r| match &r.param {
                        RuleParam::One(other) => Some((v.field.clone(), other.to_text())),
                        _ => None,
                    })
            })
            .collect();

        // id and in-table foreign keys, unless get-rules handle them
        let mut intval = vec!["id".to_string()];
        for rel in relations.iter().filter(|r| r.is_one()) {
            let column = format!("{}_id", rel.name);
            if fields.contains(&column)
                && !get_rule_fields.contains(&column)
                && !get_rule_fields.contains(&rel.name)
            {
                intval.push(column);
            }
        }

        let verbs = VerbTable::build(&fields, &relations);
        let default_order_by = if def.default_order_by.is_empty() {
            config.default_order_by.clone()
        } else {
            def.default_order_by.clone()
        };

        tracing::debug!(
            target: "datamapper.registry",
            class = %class,
            table = %table,
            fields = fields.len(),
            relations = relations.len(),
            verbs = verbs.len(),
            "built model descriptor"
        );

        Ok(Self {
            class,
            table,
            model,
            fields,
            validation,
            relations,
            config,
            default_order_by,
            get_rule_fields,
            matches,
            intval,
            rules: def.rules.iter().cloned().collect(),
            verbs,
        })
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Look a relation up by name, falling back to the singular form.
    pub fn relation_or_singular(&self, name: &str) -> Option<&RelationSpec> {
        self.relation(name)
            .or_else(|| self.relation(&inflect::singular(name)))
    }

    pub fn has_one(&self, name: &str) -> bool {
        self.relation(name).is_some_and(RelationSpec::is_one)
    }

    pub fn has_many(&self, name: &str) -> bool {
        self.relation(name).is_some_and(|r| !r.is_one())
    }

    pub fn validation_for(&self, field: &str) -> Option<&FieldRules> {
        self.validation.iter().find(|v| v.field == field)
    }

    /// Display label of a field or relationship.
    pub fn label<'a>(&'a self, field: &'a str) -> &'a str {
        self.validation_for(field)
            .map_or(field, |v| v.label.as_str())
    }
}

fn build_relations(def: &ModelDef, class: &str, model: &str) -> OrmResult<Vec<RelationSpec>> {
    let mut relations: Vec<RelationSpec> = Vec::new();
    let declared = def
        .has_one
        .iter()
        .map(|r| (r, RelationKind::One))
        .chain(def.has_many.iter().map(|r| (r, RelationKind::Many)));
    for (rel, kind) in declared {
        let name = rel.name.trim().to_string();
        if name.is_empty() {
            return Err(OrmError::config(format!("model '{class}' declares a relation without a name")));
        }
        if relations.iter().any(|r| r.name == name) {
            return Err(OrmError::config(format!(
                "model '{class}' declares relation '{name}' more than once"
            )));
        }
        let other_field = rel.other_field.clone().unwrap_or_else(|| model.to_string());
        let spec = RelationSpec {
            class: inflect::class_key(rel.class.as_deref().unwrap_or(&name)),
            join_self_as: rel.join_self_as.clone().unwrap_or_else(|| other_field.clone()),
            join_other_as: rel.join_other_as.clone().unwrap_or_else(|| name.clone()),
            other_field,
            name,
            kind,
        };
        if spec.class == class && spec.join_self_as == spec.join_other_as {
            return Err(OrmError::config(format!(
                "self relation '{}' on '{class}' needs distinct join columns (both are '{}_id')",
                spec.name, spec.join_self_as
            )));
        }
        relations.push(spec);
    }
    Ok(relations)
}
