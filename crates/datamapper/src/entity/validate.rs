//! The validation driver.

use std::sync::Arc;

use super::{Entity, ParentRef};
use crate::error::{OrmError, OrmResult};
use crate::validation::{self, RelatedObject, RuleContext, RuleOutcome};
use crate::value::Value;

impl Entity {
    /// Run every field's rules and record the failures.
    ///
    /// Fields are visited in declaration order. A field is skipped when it
    /// still holds its stored value, and also when it is empty and neither
    /// `required` nor `always_validate`; relationship fields are always
    /// checked. The first failing rule of a field records its message and
    /// stops that field's chain.
    ///
    /// Once run, further calls are no-ops until the entity is saved or
    /// fetched again.
    pub fn validate(&mut self) -> OrmResult<&mut Self> {
        self.validate_with(&[])?;
        Ok(self)
    }

    pub(crate) fn validate_with(&mut self, related: &[RelatedObject]) -> OrmResult<()> {
        if self.validated {
            return Ok(());
        }
        self.validated = true;
        self.error.clear();

        let desc = Arc::clone(&self.desc);
        let registry = Arc::clone(self.mapper.registry());
        for entry in desc.validation.iter().filter(|e| !e.rules.is_empty()) {
            let field = entry.field.as_str();
            let is_related = desc.relation(field).is_some();
            if !is_related {
                let value = self.value(field);
                let stored = self.stored_value(field);
                if !stored.is_null() && value == stored {
                    continue;
                }
                let forced = entry.has_rule("required") || entry.has_rule("always_validate");
                if !forced && value.is_empty_input() {
                    continue;
                }
            }

            for rule in &entry.rules {
                let name = if is_related {
                    format!("related_{}", rule.name)
                } else {
                    rule.name.clone()
                };
                let run = validation::lookup(&desc, &registry, &name)?;
                let outcome = run(&mut RuleContext {
                    entity: &mut *self,
                    field,
                    param: &rule.param,
                    related,
                })?;
                let message = match outcome {
                    RuleOutcome::Pass => continue,
                    RuleOutcome::Fail => {
                        validation::render_message(&desc, &registry, &name, field, &rule.param)
                    }
                    RuleOutcome::Message(message) => message,
                };
                self.push_error(field, &name, &message);
                break;
            }
        }

        self.valid = self.error.is_empty();
        Ok(())
    }

    /// Number of objects related through `field`: the saved ones in
    /// `related` plus the rows already stored, without double counting.
    pub(crate) fn count_related(&mut self, field: &str, related: &[RelatedObject]) -> OrmResult<i64> {
        let rel = self
            .desc
            .relation_or_singular(field)
            .cloned()
            .ok_or_else(|| OrmError::unknown_relation(&self.desc.class, field))?;

        let mut ids: Vec<Value> = Vec::new();
        for object in related {
            if (object.field == field || object.field == rel.name)
                && object.exists()
                && !ids.iter().any(|id| id.loose_eq(&object.id))
            {
                ids.push(object.id.clone());
            }
        }
        let mut count = i64::try_from(ids.len()).unwrap_or(i64::MAX);

        let id = self.id();
        if rel.is_one() && self.desc.has_field(&rel.other_column()) {
            if ids.is_empty() && !self.value(&rel.other_column()).is_blank() {
                count += 1;
            }
        } else if !id.is_blank() && (!rel.is_one() || ids.is_empty()) {
            let mut stored = self.mapper.entity(&rel.class)?;
            stored.parent = Some(ParentRef {
                relation: rel.other_field.clone(),
                id,
                via_column: None,
            });
            count += stored.count_with(&ids, None, None)?;
        }
        Ok(count)
    }
}
