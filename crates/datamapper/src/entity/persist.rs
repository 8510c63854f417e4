//! Writing entities back: save, delete, bulk updates and the relationship
//! rows that go with them.
//!
//! `save` validates, stamps timestamps, stores has-one foreign keys that
//! live on this table inline, writes only the changed columns, then saves
//! the remaining relationships. With `auto_transaction` enabled the whole
//! sequence runs in one transaction; a failed transaction is reported as a
//! `transaction` error on the entity and `save` returns `false`.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{Local, Utc};

use super::{relationship_table, Entity};
use crate::error::{OrmError, OrmResult};
use crate::query::{compile_get_where, compile_insert, Operand, QueryState};
use crate::registry::RelationSpec;
use crate::validation::{messages, RelatedObject};
use crate::value::Value;

/// Entities passed to `save`/`delete` to relate (or unrelate).
///
/// Each entry carries an optional relation name; without one the entity's
/// model name is used.
///
/// ```ignore
/// post.save_with(Related::one(&mut author).with_field("editor", &mut editor))?;
/// ```
#[derive(Default)]
pub struct Related<'a> {
    items: Vec<(Option<String>, &'a mut Entity)>,
}

impl<'a> Related<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn one(entity: &'a mut Entity) -> Self {
        Self::new().with(entity)
    }

    pub fn with(mut self, entity: &'a mut Entity) -> Self {
        self.items.push((None, entity));
        self
    }

    /// Add `entity` under the relation `field`.
    pub fn with_field(mut self, field: &str, entity: &'a mut Entity) -> Self {
        self.items.push((Some(field.to_string()), entity));
        self
    }

    /// Add every entity of `entities` under `field` (or their model names).
    pub fn with_all(
        mut self,
        field: Option<&str>,
        entities: impl IntoIterator<Item = &'a mut Entity>,
    ) -> Self {
        for entity in entities {
            self.items.push((field.map(str::to_string), entity));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    fn objects(&self) -> Vec<RelatedObject> {
        self.items
            .iter()
            .map(|(field, entity)| RelatedObject::of(entity, field.as_deref()))
            .collect()
    }
}

impl std::fmt::Debug for Related<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.items.iter().map(|(field, e)| (field, e.model(), e.id())))
            .finish()
    }
}

/// Where the row of `rel` between `this` and `object` is stored.
enum Storage {
    /// Foreign key column on this entity's table.
    ThisTable,
    /// Foreign key column on the related table.
    ObjectTable,
    /// A join table.
    JoinTable(String),
}

impl Entity {
    /// Validate and write this entity.
    ///
    /// Returns `Ok(false)` when validation or the auto-transaction failed;
    /// the reasons are in [`errors`](Self::errors).
    pub fn save(&mut self) -> OrmResult<bool> {
        self.save_with(Related::new())
    }

    /// Validate and write this entity, then relate it to `related`.
    ///
    /// A has-one relation whose foreign key lives on this table is stored
    /// in the same INSERT/UPDATE; the others are written afterwards.
    pub fn save_with(&mut self, mut related: Related<'_>) -> OrmResult<bool> {
        let objects = related.objects();
        self.validate_with(&objects)?;

        let mut saved = false;
        if self.valid {
            self.auto_trans_begin()?;
            let outcome = self.save_body(&mut related);
            saved = self.auto_trans_finish(outcome, "save")?;
        }
        self.force_save_as_new = false;
        Ok(saved)
    }

    /// Insert this entity as a new row even though it has an id.
    pub fn save_as_new(&mut self) -> OrmResult<bool> {
        self.save_as_new_with(Related::new())
    }

    pub fn save_as_new_with(&mut self, related: Related<'_>) -> OrmResult<bool> {
        self.force_save_as_new = true;
        self.save_with(related)
    }

    /// The write itself. Returns the success flag and the label of what was done.
    fn save_body(&mut self, related: &mut Related<'_>) -> OrmResult<(bool, String)> {
        let mut done = Vec::new();
        let mut ok = true;

        let timestamp = self.generated_timestamp()?;
        let config = self.desc.config.clone();
        if self.desc.has_field(&config.created_field) && self.value(&config.created_field).is_blank() {
            self.set(&config.created_field, timestamp.clone());
        }
        if self.desc.has_field(&config.updated_field) {
            self.set(&config.updated_field, timestamp);
        }

        self.save_itfk(related)?;

        let db = Arc::clone(self.db());
        let id = self.id();
        if !self.force_save_as_new && !id.is_blank() {
            let mut changed: Vec<usize> = (0..self.values.len())
                .filter(|&i| self.values[i] != self.stored[i])
                .collect();
            if changed.len() == 1 && self.desc.fields[changed[0]] == config.updated_field {
                let i = changed[0];
                self.values[i] = self.stored[i].clone();
                changed.clear();
            }
            if !changed.is_empty() {
                let mut query = QueryState::new();
                for i in changed {
                    query.set(
                        db.protect_identifiers(&self.desc.fields[i]),
                        Operand::new(self.values[i].clone(), true),
                    );
                }
                query.where_eq("id", id);
                db.execute(&query.compile_update(db.as_ref(), &self.desc.table))?;
                done.push("update");
            }
        } else {
            let row: Vec<(String, Value)> = self
                .desc
                .fields
                .iter()
                .zip(&self.values)
                .filter(|(_, v)| !v.is_null())
                .map(|(f, v)| (f.clone(), v.clone()))
                .collect();
            db.execute(&compile_insert(db.as_ref(), &self.desc.table, &row))?;
            if !self.force_save_as_new {
                let new_id = db.insert_id()?.map_or(Value::Null, Value::Int);
                self.set("id", new_id);
            }
            done.push("insert");
        }
        self.validated = false;
        self.refresh_stored_values();

        if !related.is_empty() {
            for (field, object) in related.items.iter_mut() {
                let field = field.clone().unwrap_or_else(|| object.desc.model.clone());
                ok &= self.save_relation(&field, object)?;
            }
            done.push("relationships");
        }

        let label = if done.is_empty() {
            "-nothing done-".to_string()
        } else {
            format!("save ({})", done.join(", "))
        };
        Ok((ok, label))
    }

    /// Current time in the configured format, or seconds since the epoch.
    pub(crate) fn generated_timestamp(&self) -> OrmResult<Value> {
        let config = &self.desc.config;
        let mut text = String::new();
        let written = if config.local_time {
            let now = Local::now();
            write!(text, "{}", now.format(&config.timestamp_format)).map(|_| now.timestamp())
        } else {
            let now = Utc::now();
            write!(text, "{}", now.format(&config.timestamp_format)).map(|_| now.timestamp())
        };
        let epoch = written.map_err(|_| {
            OrmError::config(format!(
                "invalid timestamp format '{}'",
                config.timestamp_format
            ))
        })?;
        Ok(if config.unix_timestamp {
            Value::Int(epoch)
        } else {
            Value::Text(text)
        })
    }

    /// Store has-one foreign keys that live on this table directly, and
    /// drop those entries from `related`.
    fn save_itfk(&mut self, related: &mut Related<'_>) -> OrmResult<()> {
        let items = std::mem::take(&mut related.items);
        for (field, object) in items {
            let name = field.clone().unwrap_or_else(|| object.desc.model.clone());
            let inline = self
                .desc
                .relation_or_singular(&name)
                .filter(|rel| rel.is_one() && self.desc.has_field(&rel.other_column()))
                .cloned();
            if let Some(rel) = inline {
                let column = rel.other_column();
                let id = object.id();
                if !id.is_blank() && !self.value(&column).loose_eq(&id) {
                    self.set(&column, id);
                    self.remove_other_one_to_one(&rel, object)?;
                    continue;
                }
            }
            related.items.push((field, object));
        }
        Ok(())
    }

    /// Release `object` from every other row of this model that claims it
    /// through the one-to-one `rel`.
    fn remove_other_one_to_one(&self, rel: &RelationSpec, object: &Entity) -> OrmResult<()> {
        if !object.exists() || !object.desc.has_one(&rel.other_field) {
            return Ok(());
        }
        let column = rel.other_column();
        let mut update = self.mapper.entity(&self.desc.class)?;
        update.where_(&column, object.id());
        if self.exists() {
            update.where_("id <>", self.id());
        }
        update.update(&column, Value::Null)?;
        Ok(())
    }

    fn storage(&self, rel: &RelationSpec, object: &Entity) -> Storage {
        let rt = relationship_table(&self.desc, rel, &object.desc);
        if rt == self.desc.table && self.desc.has_field(&rel.other_column()) {
            Storage::ThisTable
        } else if rt == object.desc.table {
            Storage::ObjectTable
        } else {
            Storage::JoinTable(rt)
        }
    }

    /// Relate `object` to this entity through `field`.
    ///
    /// Both sides must be saved. A join row is reused when the has-one side
    /// already has one; an identical join row is left alone.
    fn save_relation(&mut self, field: &str, object: &mut Entity) -> OrmResult<bool> {
        let rel = self.desc.relation_or_singular(field).cloned();
        let rel = match rel {
            Some(rel) if self.exists() && object.exists() => rel,
            _ => {
                let key = if !object.exists() {
                    "dm_save_rel_noobj"
                } else if !self.exists() {
                    "dm_save_rel_nothis"
                } else {
                    "dm_save_rel_failed"
                };
                self.relation_error(field, key);
                return Ok(false);
            }
        };
        let this_column = rel.self_column();
        let other_column = rel.other_column();

        match self.storage(&rel, object) {
            Storage::ThisTable => {
                self.set(&other_column, object.id());
                let saved = self.save()?;
                self.remove_other_one_to_one(&rel, object)?;
                Ok(saved)
            }
            Storage::ObjectTable => {
                object.set(&this_column, self.id());
                let saved = object.save()?;
                if let Some(back) = object.desc.relation_or_singular(&rel.other_field).cloned() {
                    object.remove_other_one_to_one(&back, self)?;
                }
                Ok(saved)
            }
            Storage::JoinTable(rt) => {
                let db = Arc::clone(self.db());
                let data = vec![
                    (this_column.clone(), self.id()),
                    (other_column.clone(), object.id()),
                ];
                let existing = db.query(&compile_get_where(db.as_ref(), &rt, &data, None, None))?;
                if existing.num_rows() > 0 {
                    return Ok(true);
                }

                // The has-one side may only appear once in the join table.
                let owner_key = if !rel.is_one() {
                    if object.desc.has_one(&rel.other_field) {
                        Some((other_column.clone(), object.id()))
                    } else if object.desc.has_many(&rel.other_field) {
                        None
                    } else {
                        self.relation_error(field, "dm_save_rel_failed");
                        return Ok(false);
                    }
                } else {
                    Some((this_column.clone(), self.id()))
                };

                if let Some(key) = owner_key {
                    let claimed = db.query(&compile_get_where(
                        db.as_ref(),
                        &rt,
                        std::slice::from_ref(&key),
                        Some(1),
                        None,
                    ))?;
                    if claimed.num_rows() > 0 {
                        let mut query = QueryState::new();
                        for (column, value) in &data {
                            query.set(column.clone(), Operand::new(value.clone(), true));
                        }
                        query.where_eq(key.0, key.1);
                        db.execute(&query.compile_update(db.as_ref(), &rt))?;
                        return Ok(true);
                    }
                }
                db.execute(&compile_insert(db.as_ref(), &rt, &data))?;
                Ok(true)
            }
        }
    }

    fn relation_error(&mut self, field: &str, key: &str) {
        let registry = Arc::clone(self.mapper.registry());
        let template = registry
            .message(key)
            .or_else(|| messages::default_template(key).map(str::to_string))
            .unwrap_or_else(|| messages::missing_template(key));
        let message = messages::format_message(&template, &[field]);
        self.push_error(field, key, &message);
    }

    /// Delete this entity's row and every relationship row pointing at it.
    ///
    /// Foreign keys on other tables are set to NULL; join-table rows are
    /// deleted. Returns `Ok(false)` for an unsaved entity or a failed
    /// auto-transaction, in which case the entity keeps its values.
    pub fn delete(&mut self) -> OrmResult<bool> {
        let id = self.id();
        if id.is_blank() {
            return Ok(false);
        }
        self.auto_trans_begin()?;
        let outcome = self.delete_body(&id);
        let deleted = self.auto_trans_finish(outcome, "delete")?;
        if deleted {
            self.clear();
        }
        Ok(deleted)
    }

    fn delete_body(&mut self, id: &Value) -> OrmResult<(bool, String)> {
        let db = Arc::clone(self.db());
        let mut query = QueryState::new();
        query.where_eq("id", id.clone());
        db.execute(&query.compile_delete(db.as_ref(), &self.desc.table))?;

        let relations = self
            .desc
            .relations
            .iter()
            .filter(|r| !r.is_one())
            .chain(self.desc.relations.iter().filter(|r| r.is_one()));
        for rel in relations {
            let object = self.mapper.descriptor(&rel.class)?;
            let rt = relationship_table(&self.desc, rel, &object);
            let this_column = rel.self_column();
            let points_at_other =
                object.table == self.desc.table && self.desc.has_field(&rel.other_column());

            let mut query = QueryState::new();
            query.where_eq(this_column.clone(), id.clone());
            if rt == object.table && !points_at_other {
                query.set(this_column, Operand::Null);
                db.execute(&query.compile_update(db.as_ref(), &object.table))?;
            } else if rt != self.desc.table {
                db.execute(&query.compile_delete(db.as_ref(), &rt))?;
            }
        }
        Ok((true, "delete".to_string()))
    }

    /// Remove the relationships between this entity and `related`.
    pub fn delete_related(&mut self, mut related: Related<'_>) -> OrmResult<bool> {
        self.auto_trans_begin()?;
        let mut outcome = Ok((true, "delete (relationship)".to_string()));
        for (field, object) in related.items.iter_mut() {
            let field = field.clone().unwrap_or_else(|| object.desc.model.clone());
            match self.delete_relation(&field, object) {
                Ok(ok) => {
                    if let Ok((all_ok, _)) = &mut outcome {
                        *all_ok &= ok;
                    }
                }
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }
        self.auto_trans_finish(outcome, "delete (relationship)")
    }

    fn delete_relation(&mut self, field: &str, object: &mut Entity) -> OrmResult<bool> {
        let Some(rel) = self.desc.relation_or_singular(field).cloned() else {
            return Ok(false);
        };
        if self.id().is_blank() || object.id().is_blank() {
            return Ok(false);
        }

        match self.storage(&rel, object) {
            Storage::ThisTable => {
                self.set(&rel.other_column(), Value::Null);
                self.save()?;
            }
            Storage::ObjectTable => {
                object.set(&rel.self_column(), Value::Null);
                object.save()?;
            }
            Storage::JoinTable(rt) => {
                let db = Arc::clone(self.db());
                let mut query = QueryState::new();
                query.where_eq(rel.self_column(), self.id());
                query.where_eq(rel.other_column(), object.id());
                db.execute(&query.compile_delete(db.as_ref(), &rt))?;
            }
        }
        self.related.remove(&rel.name);
        Ok(true)
    }

    /// Set one column on every row the pending query matches.
    pub fn update(&mut self, field: &str, value: impl Into<Value>) -> OrmResult<bool> {
        self.update_fields(&[(field, value.into())], true)
    }

    /// Set columns on every row the pending query matches.
    ///
    /// The updated-timestamp field is stamped as well. With `escape` off,
    /// values are inserted as SQL and bare field names are qualified with
    /// this table.
    pub fn update_fields(&mut self, fields: &[(&str, Value)], escape: bool) -> OrmResult<bool> {
        if fields.is_empty() {
            return Err(OrmError::query_build("nothing was provided to update"));
        }
        let db = Arc::clone(self.db());
        let mut assignments: Vec<(String, Operand)> = Vec::with_capacity(fields.len() + 1);
        for (column, value) in fields {
            let operand = if escape {
                Operand::new(value.clone(), true)
            } else {
                Operand::Raw(self.add_table_name(&value.to_text()))
            };
            assignments.push((column.to_string(), operand));
        }

        let updated = self.desc.config.updated_field.clone();
        if self.desc.has_field(&updated) {
            let timestamp = self.generated_timestamp()?;
            let operand = if escape {
                Operand::new(timestamp, true)
            } else {
                Operand::Raw(db.escape(&timestamp))
            };
            match assignments.iter_mut().find(|(c, _)| *c == updated) {
                Some(slot) => slot.1 = operand,
                None => assignments.push((updated, operand)),
            }
        }

        for (column, operand) in assignments {
            self.query.set(column, operand);
        }
        let sql = self.query.compile_update(db.as_ref(), &self.desc.table);
        self.query.reset_write();
        db.execute(&sql)?;
        Ok(true)
    }

    /// [`update_fields`](Self::update_fields) restricted to the loaded
    /// result set. Returns `false` when nothing is loaded.
    pub fn update_all(&mut self, fields: &[(&str, Value)], escape: bool) -> OrmResult<bool> {
        let ids: Vec<Value> = self.all.iter().map(Entity::id).collect();
        if ids.is_empty() {
            return Ok(false);
        }
        self.where_in("id", ids);
        self.update_fields(fields, escape)
    }

    /// Delete every saved entity of the loaded result set, then clear.
    pub fn delete_all(&mut self) -> OrmResult<bool> {
        let mut ok = true;
        for item in self.all.iter_mut() {
            if !item.id().is_blank() {
                ok &= item.delete()?;
            }
        }
        self.clear();
        Ok(ok)
    }

    /// Drop deleted entries from the result set.
    ///
    /// Returns `false` when the result set was already empty.
    pub fn refresh_all(&mut self) -> bool {
        if self.all.is_empty() {
            return false;
        }
        self.all.retain(|item| !item.id().is_blank());
        true
    }

    fn auto_trans_begin(&self) -> OrmResult<()> {
        if self.desc.config.auto_transaction {
            self.db().trans_begin()?;
        }
        Ok(())
    }

    /// Close the auto-transaction around `outcome`.
    ///
    /// A database error inside the transaction fails it: the transaction is
    /// rolled back and reported on the entity instead of returned. Other
    /// errors roll back and propagate.
    fn auto_trans_finish(
        &mut self,
        outcome: OrmResult<(bool, String)>,
        fallback_label: &str,
    ) -> OrmResult<bool> {
        if !self.desc.config.auto_transaction {
            return outcome.map(|(ok, _)| ok);
        }
        match outcome {
            Ok((ok, label)) => Ok(self.auto_trans_complete(&label)? && ok),
            Err(err) if err.is_database() => {
                tracing::debug!(
                    target: "datamapper.transaction",
                    model = %self.desc.class,
                    error = %err,
                    "statement failed inside auto-transaction"
                );
                self.db().trans_fail();
                self.auto_trans_complete(fallback_label)?;
                Ok(false)
            }
            Err(err) => {
                self.db().trans_fail();
                match self.db().trans_complete() {
                    Ok(_) => Err(err),
                    Err(rollback) => Err(OrmError::Other(format!(
                        "{err} (rollback failed: {rollback})"
                    ))),
                }
            }
        }
    }

    fn auto_trans_complete(&mut self, label: &str) -> OrmResult<bool> {
        if self.db().trans_complete()? {
            return Ok(true);
        }
        let registry = Arc::clone(self.mapper.registry());
        let template = registry
            .message("transaction")
            .or_else(|| messages::default_template("transaction").map(str::to_string))
            .unwrap_or_else(|| messages::missing_template("transaction"));
        let message = messages::format_message(&template, &[label]);
        self.push_error("transaction", "transaction", &message);
        self.valid = false;
        tracing::warn!(
            target: "datamapper.transaction",
            model = %self.desc.class,
            label = %label,
            "auto-transaction rolled back"
        );
        Ok(false)
    }

    /// Begin (or nest) a transaction on this entity's connection.
    pub fn trans_begin(&self) -> OrmResult<()> {
        self.db().trans_begin()
    }

    /// Complete the current transaction level; `false` when it failed.
    pub fn trans_complete(&self) -> OrmResult<bool> {
        self.db().trans_complete()
    }

    pub fn trans_commit(&self) -> OrmResult<()> {
        self.db().trans_commit()
    }

    pub fn trans_rollback(&self) -> OrmResult<()> {
        self.db().trans_rollback()
    }

    pub fn trans_status(&self) -> bool {
        self.db().trans_status()
    }

    /// In strict mode a failed transaction group makes every later group
    /// roll back too, until the status is cleared.
    pub fn trans_strict(&self, strict: bool) {
        self.db().trans_strict(strict);
    }

    pub fn trans_off(&self) {
        self.db().trans_off();
    }
}
