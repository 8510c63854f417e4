//! Declarative model definitions.
//!
//! ```ignore
//! use datamapper::registry::{FieldDef, ModelDef, RelationDef};
//!
//! let post = ModelDef::new("Post")
//!     .has_one(RelationDef::new("author").class("user").other_field("post"))
//!     .has_many(RelationDef::new("comment"))
//!     .field(FieldDef::new("title").label("Title").rule("required").rule_with("max_length", 120))
//!     .default_order_by("created", Some("desc"));
//! ```

use crate::config::{ModelConfig, OrderSpec};
use crate::validation::RuleFn;
use crate::value::Value;

/// Parameter of a validation rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RuleParam {
    #[default]
    None,
    One(Value),
    List(Vec<Value>),
}

impl RuleParam {
    pub fn is_none(&self) -> bool {
        matches!(self, RuleParam::None)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            RuleParam::One(v) => Some(v),
            _ => None,
        }
    }

    pub fn values(&self) -> Vec<Value> {
        match self {
            RuleParam::None => Vec::new(),
            RuleParam::One(v) => vec![v.clone()],
            RuleParam::List(list) => list.clone(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_i64)
    }

    pub fn as_text(&self) -> Option<String> {
        self.as_value().map(Value::to_text)
    }
}

/// A rule applied to a field: `required`, `max_length[120]`, ...
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub param: RuleParam,
}

impl Rule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param: RuleParam::None,
        }
    }

    pub fn with(name: impl Into<String>, param: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            param: RuleParam::One(param.into()),
        }
    }

    pub fn with_list<V: Into<Value>>(
        name: impl Into<String>,
        params: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            name: name.into(),
            param: RuleParam::List(params.into_iter().map(Into::into).collect()),
        }
    }
}

/// Validation settings for one field (or relationship).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub label: Option<String>,
    pub rules: Vec<Rule>,
    /// Rules run when a row is loaded instead of when saving.
    pub get_rules: Vec<Rule>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn rule(mut self, name: impl Into<String>) -> Self {
        self.rules.push(Rule::new(name));
        self
    }

    pub fn rule_with(mut self, name: impl Into<String>, param: impl Into<Value>) -> Self {
        self.rules.push(Rule::with(name, param));
        self
    }

    pub fn rule_list<V: Into<Value>>(
        mut self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = V>,
    ) -> Self {
        self.rules.push(Rule::with_list(name, params));
        self
    }

    pub fn get_rule(mut self, name: impl Into<String>) -> Self {
        self.get_rules.push(Rule::new(name));
        self
    }

    pub fn get_rule_with(mut self, name: impl Into<String>, param: impl Into<Value>) -> Self {
        self.get_rules.push(Rule::with(name, param));
        self
    }
}

/// A declared `has_one` / `has_many` relationship.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationDef {
    pub name: String,
    /// Related model class; defaults to the relation name.
    pub class: Option<String>,
    /// Name of the reverse relationship on the related model; defaults to this model.
    pub other_field: Option<String>,
    /// Column prefix for this side (`<join_self_as>_id`); defaults to `other_field`.
    pub join_self_as: Option<String>,
    /// Column prefix for the related side; defaults to the relation name.
    pub join_other_as: Option<String>,
}

impl RelationDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn other_field(mut self, field: impl Into<String>) -> Self {
        self.other_field = Some(field.into());
        self
    }

    pub fn join_self_as(mut self, name: impl Into<String>) -> Self {
        self.join_self_as = Some(name.into());
        self
    }

    pub fn join_other_as(mut self, name: impl Into<String>) -> Self {
        self.join_other_as = Some(name.into());
        self
    }
}

/// Everything needed to build a model's descriptor.
#[derive(Debug, Clone, Default)]
pub struct ModelDef {
    pub class: String,
    pub table: Option<String>,
    pub model: Option<String>,
    pub has_one: Vec<RelationDef>,
    pub has_many: Vec<RelationDef>,
    pub fields: Vec<FieldDef>,
    pub default_order_by: Vec<OrderSpec>,
    pub config: ModelConfig,
    pub rules: Vec<(String, RuleFn)>,
}

impl ModelDef {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            ..Self::default()
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn has_one(mut self, relation: impl Into<RelationDef>) -> Self {
        self.has_one.push(relation.into());
        self
    }

    pub fn has_many(mut self, relation: impl Into<RelationDef>) -> Self {
        self.has_many.push(relation.into());
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn default_order_by(mut self, field: impl Into<String>, dir: Option<&str>) -> Self {
        self.default_order_by
            .push((field.into(), dir.map(str::to_string)));
        self
    }

    pub fn config(mut self, config: ModelConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a validation rule only this model can use.
    pub fn rule(mut self, name: impl Into<String>, rule: RuleFn) -> Self {
        self.rules.push((name.into(), rule));
        self
    }
}

impl From<&str> for RelationDef {
    fn from(name: &str) -> Self {
        RelationDef::new(name)
    }
}
