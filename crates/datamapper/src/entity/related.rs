//! Relationship resolution: join-table naming, join aliases and the
//! `*_related` clause family.
//!
//! A relation path is one or more relation names separated by `/`
//! (`author/company`). Every hop is resolved against the model reached by
//! the previous one before any join is added, so an unknown segment leaves
//! the query untouched.
//!
//! Each hop joins in one of three ways:
//!
//! 1. this side holds the foreign key (`posts.author_id`): join the target on it,
//!    or skip the join entirely when only the related id is needed;
//! 2. the target holds the foreign key (`comments.post_id`): join the target;
//! 3. neither does: join through the join table, then the target.

use std::sync::Arc;

use super::{ClauseOperand, Entity, ParentRef, Subquery};
use crate::error::{OrmError, OrmResult};
use crate::inflect;
use crate::query::{ClauseKind, Condition, Connective, Expr, LikeSide, Operand, PARENT_TOKEN};
use crate::registry::{ModelDescriptor, RelationSpec};
use crate::value::Value;

/// Name of the table storing `rel` between `from` and `to`.
///
/// The table of whichever side holds the foreign key, otherwise a join
/// table named from both (unprefixed) table names in sorted order, or from
/// the pluralized join names for a self relation.
pub(crate) fn relationship_table(
    from: &ModelDescriptor,
    rel: &RelationSpec,
    to: &ModelDescriptor,
) -> String {
    if rel.is_one() && from.has_field(&rel.other_column()) {
        return from.table.clone();
    }
    if to.has_one(&rel.other_field) && to.has_field(&rel.self_column()) {
        return to.table.clone();
    }
    let mut names = if from.table == to.table {
        [
            inflect::plural(&rel.join_self_as),
            inflect::plural(&rel.join_other_as),
        ]
    } else {
        [
            unprefixed(&from.table, &from.config.prefix),
            unprefixed(&to.table, &to.config.prefix),
        ]
    };
    names.sort();
    let config = &from.config;
    let prefix = if config.join_prefix.is_empty() {
        &config.prefix
    } else {
        &config.join_prefix
    };
    format!("{prefix}{}_{}", names[0], names[1])
}

fn unprefixed(table: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        return table.to_string();
    }
    table.strip_prefix(prefix).unwrap_or(table).to_string()
}

/// One resolved hop of a relation path.
struct Hop {
    rel: RelationSpec,
    from: Arc<ModelDescriptor>,
    to: Arc<ModelDescriptor>,
}

/// How one hop is joined.
struct JoinPlan {
    /// Alias (or table) the hop starts from.
    this_table: String,
    relationship_table: String,
    object_as: String,
    relationship_as: String,
}

impl Entity {
    fn resolve_path(&self, path: &str) -> OrmResult<Vec<Hop>> {
        let mut hops = Vec::new();
        let mut current = Arc::clone(&self.desc);
        for name in path.split('/') {
            let rel = current
                .relation_or_singular(name.trim())
                .cloned()
                .ok_or_else(|| OrmError::unknown_relation(&current.class, name))?;
            let to = self.mapper.descriptor(&rel.class)?;
            hops.push(Hop {
                rel,
                from: current,
                to: Arc::clone(&to),
            });
            current = to;
        }
        Ok(hops)
    }

    fn plan_joins(&self, hops: &[Hop]) -> Vec<JoinPlan> {
        let mut plans: Vec<JoinPlan> = Vec::with_capacity(hops.len());
        let mut prepend = String::new();
        let mut this_table = self.desc.table.clone();
        for hop in hops {
            let rt = relationship_table(&hop.from, &hop.rel, &hop.to);
            let (object_as, relationship_as) =
                if hop.rel.class == hop.rel.name && hop.from.table != hop.to.table {
                    (format!("{prepend}{}", hop.to.table), format!("{prepend}{rt}"))
                } else {
                    (
                        format!("{prepend}{}_{}", hop.rel.name, hop.to.table),
                        format!("{prepend}{}_{rt}", hop.rel.name),
                    )
                };
            prepend.push_str(&hop.rel.name);
            prepend.push('_');
            let next = object_as.clone();
            plans.push(JoinPlan {
                this_table: std::mem::replace(&mut this_table, next),
                relationship_table: rt,
                object_as,
                relationship_as,
            });
        }
        plans
    }

    /// Join the tables along `path` and return the alias of the last one.
    ///
    /// With `id_only`, the expression holding the related id is returned
    /// instead; when this side holds the foreign key that is the foreign
    /// key column itself and no join is added for the last hop.
    pub(crate) fn add_related_table(&mut self, path: &str, id_only: bool) -> OrmResult<String> {
        let path = path.to_lowercase();
        let hops = self.resolve_path(&path)?;
        let plans = self.plan_joins(&hops);

        if self.query.select.is_empty() {
            let all = format!("{}.*", self.desc.table);
            self.query.select_direct(all);
        }

        let last = hops.len() - 1;
        let mut result = String::new();
        for (i, (hop, plan)) in hops.iter().zip(&plans).enumerate() {
            result = self.join_hop(hop, plan, id_only && i == last);
        }
        Ok(result)
    }

    fn join_hop(&mut self, hop: &Hop, plan: &JoinPlan, id_only: bool) -> String {
        let this_column = hop.rel.self_column();
        let other_column = hop.rel.other_column();
        let this_table = &plan.this_table;
        let object_as = &plan.object_as;

        if plan.relationship_table == hop.from.table && hop.from.has_field(&other_column) {
            if id_only {
                return format!("{this_table}.{other_column}");
            }
            if self.mark_joined(object_as) {
                self.query.join(
                    hop.to.table.clone(),
                    object_as.clone(),
                    format!("{object_as}.id = {this_table}.{other_column}"),
                );
            }
        } else if plan.relationship_table == hop.to.table {
            if self.mark_joined(object_as) {
                self.query.join(
                    hop.to.table.clone(),
                    object_as.clone(),
                    format!("{this_table}.id = {object_as}.{this_column}"),
                );
            }
        } else {
            let relationship_as = &plan.relationship_as;
            if self.mark_joined(relationship_as) {
                self.query.join(
                    plan.relationship_table.clone(),
                    relationship_as.clone(),
                    format!("{this_table}.id = {relationship_as}.{this_column}"),
                );
            }
            if self.mark_joined(object_as) {
                self.query.join(
                    hop.to.table.clone(),
                    object_as.clone(),
                    format!("{object_as}.id = {relationship_as}.{other_column}"),
                );
            }
            if self.include_join_fields {
                self.select_join_fields(plan, &this_column, &other_column);
            }
        }

        if id_only {
            format!("{object_as}.id")
        } else {
            object_as.clone()
        }
    }

    /// Record a join alias; `false` if it is already part of the query.
    fn mark_joined(&mut self, alias: &str) -> bool {
        if self.query_related.iter().any(|a| a == alias) {
            return false;
        }
        self.query_related.push(alias.to_string());
        true
    }

    fn select_join_fields(&mut self, plan: &JoinPlan, this_column: &str, other_column: &str) {
        self.include_join_fields = false;
        let fields = match self.db().field_metadata(&plan.relationship_table) {
            Ok(fields) => fields,
            Err(err) => {
                tracing::warn!(
                    target: "datamapper.query",
                    table = %plan.relationship_table,
                    error = %err,
                    "could not read join table columns"
                );
                return;
            }
        };
        for field in fields {
            let name = field.name;
            if name == "id" || name == this_column || name == other_column {
                continue;
            }
            self.query
                .select_direct(format!("{}.{name} AS join_{name}", plan.relationship_as));
        }
    }

    /// A clause on a field of a related model.
    ///
    /// Filtering on `id` uses the foreign key column where possible.
    /// Operands containing `${parent}` are inserted unescaped.
    pub fn related_clause(
        &mut self,
        kind: ClauseKind,
        path: &str,
        field: &str,
        operand: impl Into<ClauseOperand>,
    ) -> OrmResult<&mut Self> {
        let column = if field == "id" && kind != ClauseKind::Select {
            self.add_related_table(path, true)?
        } else {
            let table = self.add_related_table(path, false)?;
            format!("{table}.{field}")
        };
        let mut operand = operand.into();
        if operand.mentions_parent() {
            operand = operand.into_raw();
        }
        Ok(self.push_clause(kind, &column, operand))
    }

    pub fn where_related(
        &mut self,
        path: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> OrmResult<&mut Self> {
        self.related_clause(ClauseKind::Where, path, field, ClauseOperand::value(value))
    }

    pub fn or_where_related(
        &mut self,
        path: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> OrmResult<&mut Self> {
        self.related_clause(ClauseKind::OrWhere, path, field, ClauseOperand::value(value))
    }

    pub fn where_in_related<V: Into<Value>>(
        &mut self,
        path: &str,
        field: &str,
        values: impl IntoIterator<Item = V>,
    ) -> OrmResult<&mut Self> {
        self.related_clause(ClauseKind::WhereIn, path, field, ClauseOperand::list(values))
    }

    pub fn where_not_in_related<V: Into<Value>>(
        &mut self,
        path: &str,
        field: &str,
        values: impl IntoIterator<Item = V>,
    ) -> OrmResult<&mut Self> {
        self.related_clause(ClauseKind::WhereNotIn, path, field, ClauseOperand::list(values))
    }

    pub fn like_related(
        &mut self,
        path: &str,
        field: &str,
        text: &str,
        side: LikeSide,
    ) -> OrmResult<&mut Self> {
        let operand = ClauseOperand::Like(text.to_string(), side);
        self.related_clause(ClauseKind::Like, path, field, operand)
    }

    pub fn ilike_related(
        &mut self,
        path: &str,
        field: &str,
        text: &str,
        side: LikeSide,
    ) -> OrmResult<&mut Self> {
        let operand = ClauseOperand::Like(text.to_string(), side);
        self.related_clause(ClauseKind::Ilike, path, field, operand)
    }

    pub fn select_related(&mut self, path: &str, field: &str) -> OrmResult<&mut Self> {
        self.related_clause(ClauseKind::Select, path, field, ClauseOperand::None)
    }

    pub fn order_by_related(
        &mut self,
        path: &str,
        field: &str,
        direction: &str,
    ) -> OrmResult<&mut Self> {
        self.related_clause(ClauseKind::OrderBy, path, field, direction)
    }

    pub fn group_by_related(&mut self, path: &str, field: &str) -> OrmResult<&mut Self> {
        self.related_clause(ClauseKind::GroupBy, path, field, ClauseOperand::None)
    }

    pub fn having_related(
        &mut self,
        path: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> OrmResult<&mut Self> {
        self.related_clause(ClauseKind::Having, path, field, ClauseOperand::value(value))
    }

    /// Filter on an existing related entity, through `relation` (defaults to
    /// the entity's model name).
    pub fn related_entity_clause(
        &mut self,
        kind: ClauseKind,
        relation: Option<&str>,
        other: &Entity,
    ) -> OrmResult<&mut Self> {
        let relation = relation.unwrap_or(&other.desc.model).to_string();
        let operand = match kind.in_flag() {
            Some(_) => ClauseOperand::List(
                if other.all.is_empty() {
                    vec![other.id()]
                } else {
                    other.all.iter().map(Entity::id).collect()
                },
            ),
            None => ClauseOperand::Value(other.id()),
        };
        self.related_clause(kind, &relation, "id", operand)
    }

    /// `where_related(<other's model>, "id", other.id)`.
    pub fn where_related_entity(&mut self, other: &Entity) -> OrmResult<&mut Self> {
        self.related_entity_clause(ClauseKind::Where, None, other)
    }

    /// A clause comparing a related field with a subquery.
    pub fn related_subquery_clause<'s>(
        &mut self,
        kind: ClauseKind,
        path: &str,
        field: &str,
        sub: impl Into<Subquery<'s>>,
    ) -> OrmResult<&mut Self> {
        let table = self.add_related_table(path, false)?;
        let sql = self.parse_subquery(sub.into())?;
        let column = format!("{table}.{field}");
        Ok(self.special_clause(kind, &column, ClauseOperand::Raw(sql)))
    }

    pub fn where_related_subquery<'s>(
        &mut self,
        path: &str,
        field: &str,
        sub: impl Into<Subquery<'s>>,
    ) -> OrmResult<&mut Self> {
        self.related_subquery_clause(ClauseKind::Where, path, field, sub)
    }

    /// Select fields of a has-one related model into each row.
    ///
    /// `fields` empty (or `["*"]`) selects every field. Columns are named
    /// `<path>_<field>` (slashes become underscores), or `<append>_<field>`
    /// with a custom `append`; `Some("")` keeps bare field names. Names that
    /// collide with this model's own fields are skipped. With `instantiate`,
    /// fetched rows also populate the related entity.
    pub fn include_related(
        &mut self,
        path: &str,
        fields: &[&str],
        append: Option<&str>,
        instantiate: bool,
    ) -> OrmResult<&mut Self> {
        let path = path.to_lowercase();
        let hops = self.resolve_path(&path)?;
        if let Some(hop) = hops.iter().find(|h| !h.rel.is_one()) {
            return Err(OrmError::config(format!(
                "include_related on '{}' needs has-one relations, but '{}' is has-many",
                self.desc.class, hop.rel.name
            )));
        }
        let Some(target) = hops.last().map(|h| Arc::clone(&h.to)) else {
            return Err(OrmError::unknown_relation(&self.desc.class, path));
        };

        let fields: Vec<String> = if fields.is_empty() || fields == ["*"] {
            target.fields.clone()
        } else {
            fields.iter().map(|f| f.to_string()).collect()
        };
        let prefix = match append {
            None => format!("{}_", path.replace('/', "_")),
            Some("") => String::new(),
            Some(custom) => format!("{custom}_"),
        };

        let table = self.add_related_table(&path, false)?;
        let mut map = Vec::new();
        let mut selected = 0usize;
        for field in fields {
            let column = format!("{prefix}{field}");
            if self.desc.has_field(&column) {
                if instantiate && field == "id" && column != "id" {
                    map.push((column, field));
                }
                continue;
            }
            let item = format!("{} AS {column}", self.db().protect_identifiers(&format!("{table}.{field}")));
            self.query.select_direct(item);
            map.push((column, field));
            selected += 1;
        }
        if selected == 0 {
            tracing::debug!(
                target: "datamapper.query",
                model = %self.desc.class,
                path = %path,
                "include_related selected no columns"
            );
        }
        if instantiate {
            self.instantiations.push((path, map));
        }
        Ok(self)
    }

    /// Select the number of related rows as `alias` (default `<path>_count`).
    pub fn include_related_count(&mut self, path: &str, alias: Option<&str>) -> OrmResult<&mut Self> {
        let path = path.to_lowercase();
        let hops = self.resolve_path(&path)?;
        let [hop] = hops.as_slice() else {
            return Err(OrmError::query_build(format!(
                "include_related_count takes a single relation, got '{path}'"
            )));
        };
        if self.query.select.is_empty() {
            let all = format!("{}.*", self.desc.table);
            self.query.select_direct(all);
        }

        let mut object = self.mapper.entity(&hop.rel.class)?;
        object.select_func("COUNT", &[Expr::raw("*")], "count")?;
        let table = object.add_related_table(&hop.rel.other_field, false)?;
        object.where_raw(&format!("{table}.id ="), format!("{PARENT_TOKEN}.id"));

        let alias = alias.map_or_else(|| format!("{path}_count"), str::to_string);
        self.select_subquery(&mut object, &alias)
    }

    /// Select the extra columns of join tables joined from now on, as `join_<column>`.
    pub fn include_join_fields(&mut self) -> &mut Self {
        self.include_join_fields = true;
        self
    }

    fn join_plan_for(&self, path: &str) -> OrmResult<(Hop, JoinPlan)> {
        let hops = self.resolve_path(&path.to_lowercase())?;
        let mut plans = self.plan_joins(&hops);
        match (hops.into_iter().last(), plans.pop()) {
            (Some(hop), Some(plan)) => Ok((hop, plan)),
            _ => Err(OrmError::unknown_relation(&self.desc.class, path)),
        }
    }

    /// A clause on an extra column of the join table reached through `path`.
    pub fn join_field_clause(
        &mut self,
        kind: ClauseKind,
        path: &str,
        field: &str,
        operand: impl Into<ClauseOperand>,
    ) -> OrmResult<&mut Self> {
        let (_, plan) = self.join_plan_for(path)?;
        self.add_related_table(path, false)?;
        let column = format!("{}.{field}", plan.relationship_as);
        Ok(self.push_clause(kind, &column, operand.into()))
    }

    pub fn where_join_field(
        &mut self,
        path: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> OrmResult<&mut Self> {
        self.join_field_clause(ClauseKind::Where, path, field, ClauseOperand::value(value))
    }

    /// Update extra join-table columns between this entity and `others`
    /// (every related row when `others` is empty).
    pub fn set_join_field(
        &mut self,
        relation: &str,
        fields: &[(&str, Value)],
        others: &[&Entity],
    ) -> OrmResult<&mut Self> {
        if fields.is_empty() {
            return Err(OrmError::query_build("set_join_field needs at least one column"));
        }
        let rel = self
            .desc
            .relation_or_singular(relation)
            .cloned()
            .ok_or_else(|| OrmError::unknown_relation(&self.desc.class, relation))?;
        let object = self.mapper.descriptor(&rel.class)?;
        let rt = relationship_table(&self.desc, &rel, &object);
        let this_column = rel.self_column();
        let other_column = rel.other_column();

        let mut targets: Vec<Option<Value>> = others.iter().map(|o| Some(o.id())).collect();
        if targets.is_empty() {
            targets.push(None);
        }
        let db = Arc::clone(self.db());
        for target in targets {
            let mut query = crate::query::QueryState::new();
            for (column, value) in fields {
                query.set(*column, Operand::new(value.clone(), true));
            }
            query.where_eq(this_column.clone(), self.id());
            if let Some(id) = target {
                query.where_condition(
                    Connective::And,
                    Condition::compare(other_column.clone(), Operand::new(id, true)),
                );
            }
            db.execute(&query.compile_update(db.as_ref(), &rt))?;
        }
        Ok(self)
    }

    /// Is this entity related to `id` through `relation`?
    pub fn is_related_to(&mut self, relation: &str, id: impl Into<Value>) -> OrmResult<bool> {
        let id = id.into();
        if id.is_blank() || self.id().is_blank() {
            return Ok(false);
        }
        let related = self.related_without_populating(relation)?;
        Ok(related.count_with(&[], None, Some(id))? > 0)
    }

    pub fn is_related_to_entity(&mut self, other: &Entity) -> OrmResult<bool> {
        let relation = other.desc.model.clone();
        self.is_related_to(&relation, other.id())
    }

    fn new_related(&self, rel: &RelationSpec) -> OrmResult<Entity> {
        let mut child = self.mapper.entity(&rel.class)?;
        let other_column = rel.other_column();
        let via_column = (rel.is_one() && self.desc.has_field(&other_column))
            .then(|| self.value(&other_column));
        child.parent = Some(ParentRef {
            relation: rel.other_field.clone(),
            id: self.id(),
            via_column,
        });
        Ok(child)
    }

    fn cached_related(&mut self, name: &str, populate: bool) -> OrmResult<&mut Entity> {
        let rel = self
            .desc
            .relation_or_singular(name)
            .cloned()
            .ok_or_else(|| OrmError::unknown_relation(&self.desc.class, name))?;
        if !self.related.contains_key(&rel.name) {
            let mut child = self.new_related(&rel)?;
            let config = &self.desc.config;
            let auto = if rel.is_one() {
                config.auto_populate_has_one
            } else {
                config.auto_populate_has_many
            };
            if populate && auto && self.exists() {
                child.get(None, None)?;
            }
            self.related.insert(rel.name.clone(), child);
        }
        let class = self.desc.class.clone();
        self.related
            .get_mut(&rel.name)
            .ok_or_else(|| OrmError::unknown_relation(class, name))
    }

    /// The related entity for `name`, scoped to this entity.
    ///
    /// Created on first access and cached; fetched immediately when
    /// auto-population is configured for the relation's cardinality and
    /// this entity exists.
    pub fn related(&mut self, name: &str) -> OrmResult<&mut Entity> {
        self.cached_related(name, true)
    }

    /// Like [`related`](Self::related), but never queries.
    pub fn related_without_populating(&mut self, name: &str) -> OrmResult<&mut Entity> {
        self.cached_related(name, false)
    }

    /// Related entity at a `/` path, creating each level as needed.
    pub(crate) fn related_path_mut(&mut self, path: &str) -> OrmResult<&mut Entity> {
        match path.split_once('/') {
            Some((head, rest)) => self.related_without_populating(head)?.related_path_mut(rest),
            None => self.related_without_populating(path),
        }
    }
}
