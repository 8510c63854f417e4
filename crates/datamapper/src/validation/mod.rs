//! Validation rule engine.
//!
//! Rules are plain functions over a [`RuleContext`]. They are looked up by
//! name in three places, first match wins:
//!
//! 1. rules attached to the model definition ([`ModelDef::rule`](crate::registry::ModelDef::rule)),
//! 2. process-wide extension rules ([`Registry::register_rule`](crate::Registry::register_rule)),
//! 3. the built-in rules in this module.
//!
//! An unknown rule name is a [`OrmError::Config`]: it is a bug in the model
//! definition, not bad data.
//!
//! Relationship fields run the `related_*` variant of each rule and see the
//! related objects passed to `save` through [`RuleContext::related`].
//!
//! The driver that walks fields and records messages lives on
//! [`Entity::validate`](crate::Entity::validate).

mod errors;
pub mod messages;
mod rules;

#[cfg(test)]
mod tests;

pub use errors::{ErrorSet, FieldError};


use crate::entity::Entity;
use crate::error::{OrmError, OrmResult};
use crate::registry::{ModelDescriptor, Registry, RuleParam};
use crate::value::Value;

/// Signature shared by every validation, prep and get rule.
pub type RuleFn = fn(&mut RuleContext<'_>) -> OrmResult<RuleOutcome>;

/// Result of running one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Pass,
    /// Failed; the rule's message template is used.
    Fail,
    /// Failed with a ready-made message.
    Message(String),
}

/// A related object handed to `save`, as seen by `related_*` rules.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedObject {
    /// Relationship the object is saved under.
    pub field: String,
    pub class: String,
    pub id: Value,
}

impl RelatedObject {
    /// View of `entity` saved under `field` (defaults to the entity's model name).
    pub fn of(entity: &Entity, field: Option<&str>) -> Self {
        let desc = entity.descriptor();
        Self {
            field: field.map_or_else(|| desc.model.clone(), str::to_string),
            class: desc.class.clone(),
            id: entity.id(),
        }
    }

    pub fn exists(&self) -> bool {
        !self.id.is_blank()
    }
}

/// What a rule sees while it runs.
pub struct RuleContext<'a> {
    pub entity: &'a mut Entity,
    /// Field (or relationship) being validated.
    pub field: &'a str,
    pub param: &'a RuleParam,
    pub related: &'a [RelatedObject],
}

impl RuleContext<'_> {
    /// Current value of the field under validation.
    pub fn value(&self) -> Value {
        self.entity.value(self.field)
    }

    /// Replace the field's value (prep rules).
    pub fn set_value(&mut self, value: impl Into<Value>) {
        self.entity.set(self.field, value);
    }
}

/// Resolve a rule name for `desc`.
pub(crate) fn lookup(desc: &ModelDescriptor, registry: &Registry, name: &str) -> OrmResult<RuleFn> {
    desc.rules
        .get(name)
        .copied()
        .or_else(|| registry.rule(name))
        .or_else(|| rules::builtin(name))
        .ok_or_else(|| {
            OrmError::config(format!(
                "unknown validation rule '{name}' on model '{}'",
                desc.class
            ))
        })
}

/// Format the message for a failed rule, without delimiters.
///
/// A parameter that names another field is shown as that field's label.
pub(crate) fn render_message(
    desc: &ModelDescriptor,
    registry: &Registry,
    rule: &str,
    field: &str,
    param: &RuleParam,
) -> String {
    let template = registry
        .message(rule)
        .or_else(|| messages::default_template(rule).map(str::to_string));
    let Some(template) = template else {
        return messages::missing_template(rule);
    };
    let param = match param {
        RuleParam::None => String::new(),
        RuleParam::One(value) => {
            let text = value.to_text();
            match desc.validation_for(&text) {
                Some(other) => other.label.clone(),
                None => text,
            }
        }
        RuleParam::List(values) => {
            messages::join_param(&values.iter().map(Value::to_text).collect::<Vec<_>>())
        }
    };
    messages::format_message(&template, &[desc.label(field), &param])
}
