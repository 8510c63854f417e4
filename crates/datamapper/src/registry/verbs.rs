//! Named query verbs (`get_by_title`, `where_related_author`, `save_editor`).
//!
//! Each descriptor enumerates every verb its fields and relationships make
//! valid when it is built, so a call by name is a single map lookup.

use std::collections::HashMap;

use super::descriptor::RelationSpec;
use crate::query::ClauseKind;

/// What a named verb does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    /// `get_by_<field>(value)`
    GetBy(String),
    /// `get_by_related_<rel>(field, value)`, or `get_by_related(rel, field, value)`
    GetByRelated(Option<String>),
    /// `<clause>_related_<rel>(field, value)`, or `<clause>_related(rel, field, value)`
    Related {
        clause: ClauseKind,
        relation: Option<String>,
    },
    /// `<clause>_related_subquery(rel, field, subquery)`
    RelatedSubquery(ClauseKind),
    /// `<clause>_subquery(subquery_or_field, value)`
    Subquery(ClauseKind),
    /// `<clause>_join_field(rel, field, value)`
    JoinField(ClauseKind),
    /// `<clause>_field_func(field, function, args...)`
    FieldFunc(ClauseKind),
    /// `<clause>_func(function, args..., value_or_alias)`
    Func(ClauseKind),
    /// `save_<rel>(objects)`
    Save(String),
    /// `delete_<rel>(objects)`
    Delete(String),
}

/// All verbs valid for one model.
#[derive(Debug, Clone, Default)]
pub struct VerbTable {
    verbs: HashMap<String, Verb>,
}

impl VerbTable {
    pub fn build(fields: &[String], relations: &[RelationSpec]) -> Self {
        let mut table = Self::default();
        for rel in relations {
            table.add(format!("save_{}", rel.name), Verb::Save(rel.name.clone()));
            table.add(format!("delete_{}", rel.name), Verb::Delete(rel.name.clone()));
            table.add(
                format!("get_by_related_{}", rel.name),
                Verb::GetByRelated(Some(rel.name.clone())),
            );
        }
        table.add("get_by_related".to_string(), Verb::GetByRelated(None));
        for field in fields {
            table.add(format!("get_by_{field}"), Verb::GetBy(field.clone()));
        }
        for &clause in ClauseKind::ALL {
            let prefix = clause.name();
            table.add(format!("{prefix}_related_subquery"), Verb::RelatedSubquery(clause));
            table.add(format!("{prefix}_subquery"), Verb::Subquery(clause));
            for rel in relations {
                table.add(
                    format!("{prefix}_related_{}", rel.name),
                    Verb::Related {
                        clause,
                        relation: Some(rel.name.clone()),
                    },
                );
            }
            table.add(
                format!("{prefix}_related"),
                Verb::Related {
                    clause,
                    relation: None,
                },
            );
            table.add(format!("{prefix}_join_field"), Verb::JoinField(clause));
            table.add(format!("{prefix}_field_func"), Verb::FieldFunc(clause));
            table.add(format!("{prefix}_func"), Verb::Func(clause));
        }
        table
    }

    // first registration wins
    fn add(&mut self, name: String, verb: Verb) {
        self.verbs.entry(name).or_insert(verb);
    }

    pub fn resolve(&self, name: &str) -> Option<&Verb> {
        self.verbs.get(name)
    }

    pub fn len(&self) -> usize {
        self.verbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verbs.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.verbs.keys().map(String::as_str)
    }
}
