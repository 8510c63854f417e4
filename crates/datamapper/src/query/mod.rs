//! Query clause state and SQL compilation.
//!
//! [`QueryState`] is the accumulator an entity builds its query in: select
//! list, joins, conditions, grouping, ordering and paging. It knows nothing
//! about models; column qualification and relationship joins happen in
//! [`crate::entity`] before clauses land here.
//!
//! Compiled SQL is a single line with a fixed clause order, so a compiled
//! query can be embedded as a subquery and rewritten by [`rewrite_subquery`].

mod condition;
mod expr;
mod subquery;

#[cfg(test)]
mod tests;

pub use condition::{has_operator, Condition, ConditionGroup, Connective, Operand};
pub use expr::{Expr, Operator};
pub use subquery::{embed_subquery, rewrite_subquery, PARENT_TOKEN};

use crate::db::Database;
use crate::value::Value;

/// Which clause a generic (dynamically named) query operation feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClauseKind {
    Select,
    Where,
    OrWhere,
    WhereIn,
    OrWhereIn,
    WhereNotIn,
    OrWhereNotIn,
    Like,
    NotLike,
    OrLike,
    OrNotLike,
    Ilike,
    NotIlike,
    OrIlike,
    OrNotIlike,
    Having,
    OrHaving,
    OrderBy,
    GroupBy,
}

impl ClauseKind {
    pub const ALL: &'static [ClauseKind] = &[
        ClauseKind::Select,
        ClauseKind::Where,
        ClauseKind::OrWhere,
        ClauseKind::WhereIn,
        ClauseKind::OrWhereIn,
        ClauseKind::WhereNotIn,
        ClauseKind::OrWhereNotIn,
        ClauseKind::Like,
        ClauseKind::NotLike,
        ClauseKind::OrLike,
        ClauseKind::OrNotLike,
        ClauseKind::Ilike,
        ClauseKind::NotIlike,
        ClauseKind::OrIlike,
        ClauseKind::OrNotIlike,
        ClauseKind::Having,
        ClauseKind::OrHaving,
        ClauseKind::OrderBy,
        ClauseKind::GroupBy,
    ];

    /// The method-name prefix of the clause (`or_where_in`).
    pub fn name(self) -> &'static str {
        match self {
            ClauseKind::Select => "select",
            ClauseKind::Where => "where",
            ClauseKind::OrWhere => "or_where",
            ClauseKind::WhereIn => "where_in",
            ClauseKind::OrWhereIn => "or_where_in",
            ClauseKind::WhereNotIn => "where_not_in",
            ClauseKind::OrWhereNotIn => "or_where_not_in",
            ClauseKind::Like => "like",
            ClauseKind::NotLike => "not_like",
            ClauseKind::OrLike => "or_like",
            ClauseKind::OrNotLike => "or_not_like",
            ClauseKind::Ilike => "ilike",
            ClauseKind::NotIlike => "not_ilike",
            ClauseKind::OrIlike => "or_ilike",
            ClauseKind::OrNotIlike => "or_not_ilike",
            ClauseKind::Having => "having",
            ClauseKind::OrHaving => "or_having",
            ClauseKind::OrderBy => "order_by",
            ClauseKind::GroupBy => "group_by",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    pub fn connective(self) -> Connective {
        match self {
            ClauseKind::OrWhere
            | ClauseKind::OrWhereIn
            | ClauseKind::OrWhereNotIn
            | ClauseKind::OrLike
            | ClauseKind::OrNotLike
            | ClauseKind::OrIlike
            | ClauseKind::OrNotIlike
            | ClauseKind::OrHaving => Connective::Or,
            _ => Connective::And,
        }
    }

    /// `(negated, case_insensitive)` for the LIKE family.
    pub fn like_flags(self) -> Option<(bool, bool)> {
        match self {
            ClauseKind::Like | ClauseKind::OrLike => Some((false, false)),
            ClauseKind::NotLike | ClauseKind::OrNotLike => Some((true, false)),
            ClauseKind::Ilike | ClauseKind::OrIlike => Some((false, true)),
            ClauseKind::NotIlike | ClauseKind::OrNotIlike => Some((true, true)),
            _ => None,
        }
    }

    /// `Some(negated)` for the IN family.
    pub fn in_flag(self) -> Option<bool> {
        match self {
            ClauseKind::WhereIn | ClauseKind::OrWhereIn => Some(false),
            ClauseKind::WhereNotIn | ClauseKind::OrWhereNotIn => Some(true),
            _ => None,
        }
    }

    /// The plain comparison clause an IN clause degrades to when its
    /// operand is a subquery or function (`where_in` -> `where`).
    pub fn without_in(self) -> Self {
        match self {
            ClauseKind::WhereIn | ClauseKind::WhereNotIn => ClauseKind::Where,
            ClauseKind::OrWhereIn | ClauseKind::OrWhereNotIn => ClauseKind::OrWhere,
            other => other,
        }
    }

    pub fn is_having(self) -> bool {
        matches!(self, ClauseKind::Having | ClauseKind::OrHaving)
    }
}

/// Where the wildcard goes in a LIKE pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LikeSide {
    #[default]
    Both,
    /// `%value`
    Before,
    /// `value%`
    After,
}

impl LikeSide {
    pub fn pattern(self, value: &str) -> String {
        match self {
            LikeSide::Both => format!("%{value}%"),
            LikeSide::Before => format!("%{value}"),
            LikeSide::After => format!("{value}%"),
        }
    }

    pub fn parse(side: &str) -> Self {
        match side.trim().to_ascii_lowercase().as_str() {
            "before" => LikeSide::Before,
            "after" => LikeSide::After,
            _ => LikeSide::Both,
        }
    }
}

/// A LEFT OUTER JOIN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: String,
    pub alias: String,
    pub on: String,
}

/// Clause accumulator for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    pub select: Vec<String>,
    pub distinct: bool,
    pub from: Vec<String>,
    pub joins: Vec<Join>,
    pub wheres: ConditionGroup,
    pub group_by: Vec<String>,
    pub having: ConditionGroup,
    pub order_by: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Column assignments for UPDATE.
    pub set: Vec<(String, Operand)>,
}

impl QueryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add select items, splitting on top-level commas.
    pub fn select(&mut self, items: &str) {
        for item in split_top_level(items) {
            self.select.push(item);
        }
    }

    /// Add one select item as is.
    pub fn select_direct(&mut self, item: impl Into<String>) {
        self.select.push(item.into());
    }

    pub fn from(&mut self, table: &str) {
        if !self.from.iter().any(|t| t == table) {
            self.from.push(table.to_string());
        }
    }

    pub fn join(&mut self, table: impl Into<String>, alias: impl Into<String>, on: impl Into<String>) {
        self.joins.push(Join {
            table: table.into(),
            alias: alias.into(),
            on: on.into(),
        });
    }

    pub fn where_condition(&mut self, connective: Connective, condition: Condition) {
        self.wheres.push(connective, condition);
    }

    pub fn having_condition(&mut self, connective: Connective, condition: Condition) {
        self.having.push(connective, condition);
    }

    /// Equality filter on an unqualified column, as used by `get_where`.
    pub fn where_eq(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.wheres.push(
            Connective::And,
            Condition::compare(column, Operand::new(value, true)),
        );
    }

    pub fn order_by(&mut self, field: &str, direction: &str) {
        let direction = direction.trim();
        if direction.eq_ignore_ascii_case("random") {
            self.order_by.push("RANDOM()".to_string());
            return;
        }
        let direction = direction.to_ascii_uppercase();
        let item = match direction.as_str() {
            "" => field.to_string(),
            "ASC" | "DESC" => format!("{field} {direction}"),
            _ => format!("{field} ASC"),
        };
        self.order_by.push(item);
    }

    pub fn set(&mut self, column: impl Into<String>, operand: Operand) {
        self.set.push((column.into(), operand));
    }

    /// Compile a SELECT.
    ///
    /// `select_override` replaces the whole `SELECT ...` head (used for
    /// `SELECT COUNT(*) AS numrows`).
    pub fn compile_select(&self, db: &dyn Database, select_override: Option<&str>) -> String {
        let mut sql = match select_override {
            Some(head) => head.to_string(),
            None => {
                let mut head = String::from("SELECT ");
                if self.distinct {
                    head.push_str("DISTINCT ");
                }
                if self.select.is_empty() {
                    head.push('*');
                } else {
                    head.push_str(&self.select.join(", "));
                }
                head
            }
        };
        if !self.from.is_empty() {
            sql.push_str(" FROM ");
            sql.push_str(&self.from.join(", "));
        }
        for join in &self.joins {
            sql.push_str(&format!(
                " LEFT OUTER JOIN {} {} ON {}",
                join.table, join.alias, join.on
            ));
        }
        if let Some(wheres) = self.wheres.render(db) {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres);
        }
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if let Some(having) = self.having.render(db) {
            sql.push_str(" HAVING ");
            sql.push_str(&having);
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset.filter(|o| *o > 0) {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        sql
    }

    /// Compile an UPDATE of `table` from the accumulated `set` and conditions.
    pub fn compile_update(&self, db: &dyn Database, table: &str) -> String {
        let assignments = self
            .set
            .iter()
            .map(|(column, operand)| {
                let rhs = match operand {
                    Operand::Null => "NULL".to_string(),
                    Operand::Value(v) => db.escape(v),
                    Operand::Raw(s) => s.clone(),
                };
                format!("{column} = {rhs}")
            })
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("UPDATE {table} SET {assignments}");
        if let Some(wheres) = self.wheres.render(db) {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres);
        }
        sql
    }

    /// Compile a DELETE from `table` with the accumulated conditions.
    pub fn compile_delete(&self, db: &dyn Database, table: &str) -> String {
        let mut sql = format!("DELETE FROM {table}");
        if let Some(wheres) = self.wheres.render(db) {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres);
        }
        sql
    }

    /// Reset everything a SELECT uses.
    pub fn reset_select(&mut self) {
        let set = std::mem::take(&mut self.set);
        *self = Self::default();
        self.set = set;
    }

    /// Reset everything a write uses.
    pub fn reset_write(&mut self) {
        self.set.clear();
        self.wheres.clear();
        self.from.clear();
        self.order_by.clear();
        self.limit = None;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Compile an INSERT of `row` into `table`.
pub fn compile_insert(db: &dyn Database, table: &str, row: &[(String, Value)]) -> String {
    if row.is_empty() {
        return format!("INSERT INTO {table} DEFAULT VALUES");
    }
    let columns = row
        .iter()
        .map(|(c, _)| db.protect_identifiers(c))
        .collect::<Vec<_>>()
        .join(", ");
    let values = row
        .iter()
        .map(|(_, v)| db.escape(v))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {table} ({columns}) VALUES ({values})")
}

/// Compile `SELECT * FROM table WHERE col = v AND ...`.
pub fn compile_get_where(
    db: &dyn Database,
    table: &str,
    filter: &[(String, Value)],
    limit: Option<u64>,
    offset: Option<u64>,
) -> String {
    let mut query = QueryState::new();
    query.from(table);
    for (column, value) in filter {
        query.where_eq(column.clone(), value.clone());
    }
    query.limit = limit;
    query.offset = offset;
    query.compile_select(db, None)
}

/// Split a comma list, ignoring commas inside parentheses or quotes.
pub fn split_top_level(list: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut current = String::new();
    for ch in list.chars() {
        match ch {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                let item = current.trim();
                if !item.is_empty() {
                    items.push(item.to_string());
                }
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    let item = current.trim();
    if !item.is_empty() {
        items.push(item.to_string());
    }
    items
}
