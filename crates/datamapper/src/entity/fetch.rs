//! Running queries and turning rows into entities.

use std::sync::Arc;

use super::{iter::EntityIter, relationship_table, ClauseOperand, Entity, Instantiation};
use crate::error::{OrmError, OrmResult};
use crate::query::{ClauseKind, Condition, Connective};
use crate::row::{ResultSet, Row};
use crate::validation;
use crate::value::Value;

impl Entity {
    /// Run the pending query and load the results.
    ///
    /// The first row populates this entity; every row is available through
    /// [`all`](Self::all). Right after a [`validate`](Self::validate) on an
    /// entity with no parent, the non-null field values become equality
    /// filters (query by example).
    pub fn get(&mut self, limit: Option<u64>, offset: Option<u64>) -> OrmResult<&mut Self> {
        if !self.handle_related()? {
            return Ok(self);
        }

        let example: Vec<(String, Value)> = if self.validated && self.parent.is_none() {
            self.validated = false;
            self.desc
                .fields
                .iter()
                .zip(&self.values)
                .filter(|(_, v)| !v.is_null())
                .map(|(f, v)| (format!("{}.{f}", self.desc.table), v.clone()))
                .collect()
        } else {
            Vec::new()
        };
        self.clear();
        self.handle_default_order_by();
        for (column, value) in example {
            self.query.where_eq(column, value);
        }

        let result = self.run_select(limit, offset)?;
        self.process_query(result)?;
        Ok(self)
    }

    /// Add equality filters on this model's fields, then [`get`](Self::get).
    pub fn get_where(
        &mut self,
        filter: &[(&str, Value)],
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> OrmResult<&mut Self> {
        for (field, value) in filter {
            self.where_(field, value.clone());
        }
        self.get(limit, offset)
    }

    /// Compile the pending SELECT without running it.
    ///
    /// The query is consumed either way. With `handle_related`, the parent
    /// scope of a related entity is applied first.
    pub fn get_sql(
        &mut self,
        limit: Option<u64>,
        offset: Option<u64>,
        handle_related: bool,
    ) -> OrmResult<String> {
        if handle_related {
            self.handle_related()?;
        }
        self.handle_default_order_by();
        let table = self.desc.table.clone();
        self.query.from(&table);
        if limit.is_some() {
            self.query.limit = limit;
        }
        if offset.is_some() {
            self.query.offset = offset;
        }
        let sql = self.query.compile_select(self.db().as_ref(), None);
        self.clear_after_query();
        Ok(sql)
    }

    /// Run the pending query and hand back the raw rows.
    pub fn get_raw(
        &mut self,
        limit: Option<u64>,
        offset: Option<u64>,
        handle_related: bool,
    ) -> OrmResult<ResultSet> {
        if handle_related && !self.handle_related()? {
            return Ok(ResultSet::default());
        }
        self.handle_default_order_by();
        let result = self.run_select(limit, offset);
        self.clear_after_query();
        result
    }

    /// Run the pending query, materializing one row at a time.
    pub fn get_iterated(
        &mut self,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> OrmResult<EntityIter> {
        let mut template = self.get_clone();
        template.query.reset();
        template.query_related.clear();
        template.all.clear();
        let result = self.get_raw(limit, offset, true)?;
        Ok(EntityIter::new(template, result))
    }

    /// Run raw SQL with `?` placeholders and load the rows like [`get`](Self::get).
    pub fn query(&mut self, sql: &str, binds: &[Value]) -> OrmResult<&mut Self> {
        let result = self.db().query_binds(sql, binds)?;
        self.process_query(result)?;
        Ok(self)
    }

    /// Number of rows the pending query matches.
    pub fn count(&mut self) -> OrmResult<i64> {
        self.count_with(&[], None, None)
    }

    /// Number of distinct values of `column` (default `id`).
    pub fn count_distinct(&mut self, exclude_ids: &[Value], column: Option<&str>) -> OrmResult<i64> {
        self.count_with(exclude_ids, Some(column.unwrap_or("id")), None)
    }

    /// Count matching rows.
    ///
    /// `exclude_ids` are left out, `column` switches to
    /// `COUNT(DISTINCT column)`, and `related_id` restricts to one related
    /// row. On a related entity the count runs against the table that
    /// stores the relationship, so no join is needed.
    pub fn count_with(
        &mut self,
        exclude_ids: &[Value],
        column: Option<&str>,
        related_id: Option<Value>,
    ) -> OrmResult<i64> {
        let related_id = related_id.filter(|id| !id.is_blank());
        let mut column = column.map(str::to_string);

        if let Some(parent) = self.parent.clone() {
            let rel = self.desc.relation(&parent.relation).cloned().ok_or_else(|| {
                OrmError::InvalidParent {
                    model: self.desc.class.clone(),
                    parent: parent.relation.clone(),
                }
            })?;
            let object = self.mapper.descriptor(&rel.class)?;
            let rt = relationship_table(&self.desc, &rel, &object);
            let this_column = rel.self_column();
            let other_column = rel.other_column();

            self.query.wheres.wrap();
            let fk_on_object = rt == object.table
                && !(object.table == self.desc.table && self.desc.has_field(&other_column));
            // rows of this table are keyed by their own id unless the
            // foreign key lives on the parent's table
            let key_column = if rt == self.desc.table && !fk_on_object {
                "id".to_string()
            } else {
                this_column
            };
            if fk_on_object {
                self.query.where_eq("id", parent.id.clone());
                self.query.where_condition(
                    Connective::And,
                    Condition::Raw(format!("{key_column} IS NOT NULL")),
                );
            } else {
                self.query.where_eq(other_column, parent.id.clone());
            }
            if !exclude_ids.is_empty() {
                self.query.where_condition(
                    Connective::And,
                    Condition::In {
                        column: key_column.clone(),
                        negated: true,
                        values: exclude_ids.to_vec(),
                    },
                );
            }
            if column.as_deref() == Some("id") {
                column = Some(format!("{rt}.{key_column}"));
            }
            if let Some(id) = related_id {
                self.query.where_eq(key_column, id);
            }
            self.query.from(&rt);
        } else {
            let table = self.desc.table.clone();
            self.query.from(&table);
            if !exclude_ids.is_empty() {
                self.query.where_condition(
                    Connective::And,
                    Condition::In {
                        column: "id".to_string(),
                        negated: true,
                        values: exclude_ids.to_vec(),
                    },
                );
            }
            if let Some(id) = related_id {
                self.query.where_eq("id", id);
            }
            column = column.map(|c| self.add_table_name(&c));
        }

        let head = match &column {
            Some(c) => format!(
                "SELECT COUNT(DISTINCT {}) AS numrows",
                self.db().protect_identifiers(c)
            ),
            None => "SELECT COUNT(*) AS numrows".to_string(),
        };
        self.query.select.clear();
        self.query.order_by.clear();
        let sql = self.query.compile_select(self.db().as_ref(), Some(&head));
        self.reset_query();

        let result = self.db().query(&sql)?;
        Ok(result
            .row()
            .and_then(|row| row.get("numrows"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    /// Number of entities loaded by the last fetch.
    pub fn result_count(&self) -> usize {
        self.all.len()
    }

    /// Apply the parent scope of a related entity.
    ///
    /// Returns `false` (with the pending query discarded) when the parent is
    /// unsaved or its foreign key is empty: nothing can be related to it.
    pub(crate) fn handle_related(&mut self) -> OrmResult<bool> {
        let Some(parent) = self.parent.clone() else {
            return Ok(true);
        };
        if let Some(fk) = parent.via_column {
            if fk.is_blank() {
                self.clear_after_query();
                return Ok(false);
            }
            self.query.wheres.wrap();
            self.query.where_eq(format!("{}.id", self.desc.table), fk);
            return Ok(true);
        }
        if parent.id.is_blank() {
            self.clear_after_query();
            return Ok(false);
        }
        if self.desc.relation(&parent.relation).is_none() {
            return Err(OrmError::InvalidParent {
                model: self.desc.class.clone(),
                parent: parent.relation,
            });
        }
        self.query.wheres.wrap();
        self.related_clause(
            ClauseKind::Where,
            &parent.relation,
            "id",
            ClauseOperand::Value(parent.id),
        )?;
        Ok(true)
    }

    /// Add the model's default ordering unless the query orders already or
    /// selects something other than whole rows.
    pub(crate) fn handle_default_order_by(&mut self) {
        if self.desc.default_order_by.is_empty() || !self.query.order_by.is_empty() {
            return;
        }
        let all = format!("{}.*", self.desc.table);
        let protected = self.db().protect_identifiers(&all);
        let whole_rows = self.query.select.is_empty()
            || self
                .query
                .select
                .iter()
                .any(|s| s == "*" || *s == all || *s == protected);
        if !whole_rows {
            return;
        }
        for (field, direction) in self.desc.default_order_by.clone() {
            self.order_by(&field, direction.as_deref().unwrap_or_default());
        }
    }

    fn run_select(&mut self, limit: Option<u64>, offset: Option<u64>) -> OrmResult<ResultSet> {
        let table = self.desc.table.clone();
        self.query.from(&table);
        if limit.is_some() {
            self.query.limit = limit;
        }
        if offset.is_some() {
            self.query.offset = offset;
        }
        let sql = self.query.compile_select(self.db().as_ref(), None);
        self.reset_query();
        self.db().query(&sql)
    }

    /// Load `result` into this entity and its result set.
    pub(crate) fn process_query(&mut self, mut result: ResultSet) -> OrmResult<()> {
        let instantiations = std::mem::take(&mut self.instantiations);
        if result.num_rows() == 0 {
            self.refresh_stored_values();
            return Ok(());
        }

        self.all.clear();
        let rows = result.result();
        materialize(self, &rows[0], &instantiations)?;
        let mut first = self.get_clone();
        first.all.clear();
        self.push_result(first);

        for row in &rows[1..] {
            let mut item = Entity::new(self.mapper.clone(), Arc::clone(&self.desc));
            materialize(&mut item, row, &instantiations)?;
            self.push_result(item);
        }

        let threshold = self.desc.config.free_result_threshold;
        if threshold > 0 && result.num_rows() > threshold {
            result.free();
            tracing::trace!(
                target: "datamapper.query",
                model = %self.desc.class,
                rows = self.all.len(),
                "freed large result"
            );
        }
        Ok(())
    }

    fn push_result(&mut self, item: Entity) {
        if self.desc.config.all_array_uses_ids {
            let id = item.id();
            if !id.is_null() {
                if let Some(slot) = self.all.iter_mut().find(|e| e.id() == id) {
                    *slot = item;
                    return;
                }
            }
        }
        self.all.push(item);
    }

    /// Run the get-time rules (formatting applied after a fetch).
    pub(crate) fn run_get_rules(&mut self) -> OrmResult<()> {
        let desc = Arc::clone(&self.desc);
        let registry = Arc::clone(self.mapper.registry());
        for field in &desc.get_rule_fields {
            let Some(entry) = desc.validation_for(field) else {
                continue;
            };
            let allow_null = entry.get_rules.iter().any(|r| r.name == "allow_null");
            let mut target = field.clone();
            if self.value(field).is_null() && !allow_null {
                if !desc.has_one(field) {
                    continue;
                }
                target = format!("{field}_id");
                if self.value(&target).is_null() {
                    continue;
                }
            }
            for rule in entry.get_rules.iter().filter(|r| r.name != "allow_null") {
                let run = validation::lookup(&desc, &registry, &rule.name)?;
                let mut ctx = validation::RuleContext {
                    entity: &mut *self,
                    field: &target,
                    param: &rule.param,
                    related: &[],
                };
                run(&mut ctx)?;
            }
        }
        Ok(())
    }
}

/// Copy `row` into `item`, apply load-time coercions and populate included
/// related entities.
pub(crate) fn materialize(item: &mut Entity, row: &Row, instantiations: &[Instantiation]) -> OrmResult<()> {
    for value in item.values.iter_mut() {
        *value = Value::Null;
    }
    for (column, value) in row.columns() {
        item.set(column, value.clone());
    }
    let desc = Arc::clone(&item.desc);
    for field in &desc.intval {
        if let Some(i) = desc.field_index(field) {
            if !item.values[i].is_null() {
                item.values[i] = item.values[i].to_int();
            }
        }
    }
    if !desc.get_rule_fields.is_empty() {
        item.run_get_rules()?;
    }
    item.refresh_stored_values();

    for (path, map) in instantiations {
        let mut sub = Row::new();
        for (column, field) in map {
            sub.push(field.clone(), item.value(column));
        }
        let related = item.related_path_mut(path)?;
        materialize(related, &sub, &[])?;
        let mut only = related.get_clone();
        only.all.clear();
        related.all = vec![only];
    }
    Ok(())
}
