//! Plain query clauses on an entity's own table, SQL functions and subqueries.

use super::Entity;
use crate::error::{OrmError, OrmResult};
use crate::query::{
    rewrite_subquery, split_top_level, ClauseKind, Condition, Connective, Expr, LikeSide, Operand,
    PARENT_TOKEN,
};
use crate::value::Value;

/// Right-hand side of a clause.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ClauseOperand {
    #[default]
    None,
    /// Escaped value.
    Value(Value),
    /// Values of an IN list.
    List(Vec<Value>),
    /// Verbatim SQL.
    Raw(String),
    /// LIKE match text and wildcard placement.
    Like(String, LikeSide),
}

impl ClauseOperand {
    pub fn value(value: impl Into<Value>) -> Self {
        ClauseOperand::Value(value.into())
    }

    pub fn list<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        ClauseOperand::List(values.into_iter().map(Into::into).collect())
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        ClauseOperand::Raw(sql.into())
    }

    /// Does the operand refer to the enclosing query's table?
    pub(crate) fn mentions_parent(&self) -> bool {
        match self {
            ClauseOperand::Value(Value::Text(s))
            | ClauseOperand::Raw(s)
            | ClauseOperand::Like(s, _) => s.contains(PARENT_TOKEN),
            _ => false,
        }
    }

    /// Escaping turned off, keeping the text as SQL.
    pub(crate) fn into_raw(self) -> Self {
        match self {
            ClauseOperand::Value(v) if !v.is_null() => ClauseOperand::Raw(v.to_text()),
            other => other,
        }
    }

    fn text(&self) -> String {
        match self {
            ClauseOperand::Value(v) => v.to_text(),
            ClauseOperand::Raw(s) | ClauseOperand::Like(s, _) => s.clone(),
            ClauseOperand::List(_) | ClauseOperand::None => String::new(),
        }
    }
}

impl From<Value> for ClauseOperand {
    fn from(value: Value) -> Self {
        ClauseOperand::Value(value)
    }
}

impl From<Vec<Value>> for ClauseOperand {
    fn from(values: Vec<Value>) -> Self {
        ClauseOperand::List(values)
    }
}

impl From<&str> for ClauseOperand {
    fn from(value: &str) -> Self {
        ClauseOperand::Value(Value::from(value))
    }
}

impl From<String> for ClauseOperand {
    fn from(value: String) -> Self {
        ClauseOperand::Value(Value::Text(value))
    }
}

impl From<i64> for ClauseOperand {
    fn from(value: i64) -> Self {
        ClauseOperand::Value(Value::Int(value))
    }
}

/// A subquery operand: another entity's pending query, or SQL text.
pub enum Subquery<'a> {
    Entity(&'a mut Entity),
    Sql(String),
}

impl<'a> From<&'a mut Entity> for Subquery<'a> {
    fn from(entity: &'a mut Entity) -> Self {
        Subquery::Entity(entity)
    }
}

impl From<&str> for Subquery<'_> {
    fn from(sql: &str) -> Self {
        Subquery::Sql(sql.to_string())
    }
}

impl From<String> for Subquery<'_> {
    fn from(sql: String) -> Self {
        Subquery::Sql(sql)
    }
}

impl Entity {
    /// Qualify bare field names with this model's table.
    ///
    /// Expressions containing `.` or `(` are left alone; in a comma list,
    /// each part whose first word is `*` or a field of this model is prefixed.
    pub fn add_table_name(&self, field: &str) -> String {
        if field.contains(['.', '(']) {
            return field.to_string();
        }
        field
            .split(',')
            .map(|part| {
                let part = part.trim_start();
                let first = part.split(' ').next().unwrap_or_default();
                if first == "*" || self.desc.has_field(first) {
                    format!("{}.{part}", self.desc.table)
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Add a clause on an already qualified column.
    pub(crate) fn push_clause(
        &mut self,
        kind: ClauseKind,
        column: &str,
        operand: ClauseOperand,
    ) -> &mut Self {
        let connective = kind.connective();
        match kind {
            ClauseKind::Select => {
                self.query.select(column);
            }
            ClauseKind::GroupBy => self.query.group_by.push(column.to_string()),
            ClauseKind::OrderBy => self.query.order_by(column, &operand.text()),
            ClauseKind::Having | ClauseKind::OrHaving => {
                let condition = compare(column, operand);
                self.query.having_condition(connective, condition);
            }
            ClauseKind::Where | ClauseKind::OrWhere => {
                let condition = compare(column, operand);
                self.query.where_condition(connective, condition);
            }
            _ => {
                if let Some(negated) = kind.in_flag() {
                    let condition = match operand {
                        ClauseOperand::Raw(sql) => {
                            let not = if negated { "NOT " } else { "" };
                            Condition::compare(format!("{column} {not}IN"), Operand::Raw(sql))
                        }
                        ClauseOperand::List(values) => Condition::In {
                            column: column.to_string(),
                            negated,
                            values,
                        },
                        ClauseOperand::None => Condition::In {
                            column: column.to_string(),
                            negated,
                            values: Vec::new(),
                        },
                        other => Condition::In {
                            column: column.to_string(),
                            negated,
                            values: vec![Value::Text(other.text())],
                        },
                    };
                    self.query.where_condition(connective, condition);
                } else if let Some((negated, no_case)) = kind.like_flags() {
                    let condition = self.like_condition(column, operand, negated, no_case);
                    self.query.where_condition(connective, condition);
                }
            }
        }
        self
    }

    fn like_condition(
        &self,
        column: &str,
        operand: ClauseOperand,
        negated: bool,
        no_case: bool,
    ) -> Condition {
        let (text, side) = match operand {
            ClauseOperand::Raw(sql) => {
                let not = if negated { "NOT " } else { "" };
                return Condition::compare(format!("{column} {not}LIKE"), Operand::Raw(sql));
            }
            ClauseOperand::Like(text, side) => (text, side),
            other => (other.text(), LikeSide::Both),
        };
        let (column, text) = if no_case {
            (
                format!("UPPER({})", self.db().protect_identifiers(column)),
                text.to_uppercase(),
            )
        } else {
            (column.to_string(), text)
        };
        let not = if negated { "NOT " } else { "" };
        Condition::compare(
            format!("{column} {not}LIKE"),
            Operand::Value(Value::Text(side.pattern(&text))),
        )
    }

    /// Add a clause of any kind on a field of this model.
    pub fn clause(
        &mut self,
        kind: ClauseKind,
        field: &str,
        operand: impl Into<ClauseOperand>,
    ) -> &mut Self {
        let column = self.add_table_name(field);
        self.push_clause(kind, &column, operand.into())
    }

    /// Select fields of this model (comma list).
    pub fn select(&mut self, fields: &str) -> &mut Self {
        for item in split_top_level(fields) {
            let column = self.add_table_name(&item);
            self.query.select_direct(column);
        }
        self
    }

    /// Select an expression verbatim.
    pub fn select_raw(&mut self, sql: impl Into<String>) -> &mut Self {
        self.query.select_direct(sql);
        self
    }

    fn select_aggregate(&mut self, func: &str, field: &str, alias: Option<&str>) -> &mut Self {
        let column = self.add_table_name(field);
        let alias = alias.filter(|a| !a.is_empty()).unwrap_or(field);
        self.query.select_direct(format!("{func}({column}) AS {alias}"));
        self
    }

    pub fn select_max(&mut self, field: &str, alias: Option<&str>) -> &mut Self {
        self.select_aggregate("MAX", field, alias)
    }

    pub fn select_min(&mut self, field: &str, alias: Option<&str>) -> &mut Self {
        self.select_aggregate("MIN", field, alias)
    }

    pub fn select_avg(&mut self, field: &str, alias: Option<&str>) -> &mut Self {
        self.select_aggregate("AVG", field, alias)
    }

    pub fn select_sum(&mut self, field: &str, alias: Option<&str>) -> &mut Self {
        self.select_aggregate("SUM", field, alias)
    }

    pub fn distinct(&mut self, distinct: bool) -> &mut Self {
        self.query.distinct = distinct;
        self
    }

    /// `field = value`; `field` may carry its own operator (`"views >"`).
    pub fn where_(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.clause(ClauseKind::Where, field, ClauseOperand::value(value))
    }

    pub fn or_where(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.clause(ClauseKind::OrWhere, field, ClauseOperand::value(value))
    }

    /// Compare against unescaped SQL.
    pub fn where_raw(&mut self, field: &str, sql: impl Into<String>) -> &mut Self {
        self.clause(ClauseKind::Where, field, ClauseOperand::raw(sql))
    }

    pub fn or_where_raw(&mut self, field: &str, sql: impl Into<String>) -> &mut Self {
        self.clause(ClauseKind::OrWhere, field, ClauseOperand::raw(sql))
    }

    pub fn where_in<V: Into<Value>>(
        &mut self,
        field: &str,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        self.clause(ClauseKind::WhereIn, field, ClauseOperand::list(values))
    }

    pub fn or_where_in<V: Into<Value>>(
        &mut self,
        field: &str,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        self.clause(ClauseKind::OrWhereIn, field, ClauseOperand::list(values))
    }

    pub fn where_not_in<V: Into<Value>>(
        &mut self,
        field: &str,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        self.clause(ClauseKind::WhereNotIn, field, ClauseOperand::list(values))
    }

    pub fn or_where_not_in<V: Into<Value>>(
        &mut self,
        field: &str,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        self.clause(ClauseKind::OrWhereNotIn, field, ClauseOperand::list(values))
    }

    pub fn like(&mut self, field: &str, text: &str, side: LikeSide) -> &mut Self {
        self.clause(ClauseKind::Like, field, ClauseOperand::Like(text.to_string(), side))
    }

    pub fn not_like(&mut self, field: &str, text: &str, side: LikeSide) -> &mut Self {
        self.clause(ClauseKind::NotLike, field, ClauseOperand::Like(text.to_string(), side))
    }

    pub fn or_like(&mut self, field: &str, text: &str, side: LikeSide) -> &mut Self {
        self.clause(ClauseKind::OrLike, field, ClauseOperand::Like(text.to_string(), side))
    }

    pub fn or_not_like(&mut self, field: &str, text: &str, side: LikeSide) -> &mut Self {
        self.clause(ClauseKind::OrNotLike, field, ClauseOperand::Like(text.to_string(), side))
    }

    /// Case-insensitive LIKE through `UPPER()`.
    pub fn ilike(&mut self, field: &str, text: &str, side: LikeSide) -> &mut Self {
        self.clause(ClauseKind::Ilike, field, ClauseOperand::Like(text.to_string(), side))
    }

    pub fn not_ilike(&mut self, field: &str, text: &str, side: LikeSide) -> &mut Self {
        self.clause(ClauseKind::NotIlike, field, ClauseOperand::Like(text.to_string(), side))
    }

    pub fn or_ilike(&mut self, field: &str, text: &str, side: LikeSide) -> &mut Self {
        self.clause(ClauseKind::OrIlike, field, ClauseOperand::Like(text.to_string(), side))
    }

    pub fn or_not_ilike(&mut self, field: &str, text: &str, side: LikeSide) -> &mut Self {
        self.clause(ClauseKind::OrNotIlike, field, ClauseOperand::Like(text.to_string(), side))
    }

    pub fn group_start(&mut self) -> &mut Self {
        self.query.wheres.open(Connective::And, false);
        self
    }

    pub fn or_group_start(&mut self) -> &mut Self {
        self.query.wheres.open(Connective::Or, false);
        self
    }

    pub fn not_group_start(&mut self) -> &mut Self {
        self.query.wheres.open(Connective::And, true);
        self
    }

    pub fn or_not_group_start(&mut self) -> &mut Self {
        self.query.wheres.open(Connective::Or, true);
        self
    }

    pub fn group_end(&mut self) -> &mut Self {
        if !self.query.wheres.close() {
            tracing::debug!(target: "datamapper.query", model = %self.desc.class, "group_end without an open group");
        }
        self
    }

    pub fn group_by(&mut self, fields: &str) -> &mut Self {
        for item in split_top_level(fields) {
            let column = self.add_table_name(&item);
            self.query.group_by.push(column);
        }
        self
    }

    pub fn having(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.clause(ClauseKind::Having, field, ClauseOperand::value(value))
    }

    pub fn or_having(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.clause(ClauseKind::OrHaving, field, ClauseOperand::value(value))
    }

    /// Order by a field; `direction` is `asc`, `desc`, `random` or empty.
    pub fn order_by(&mut self, field: &str, direction: &str) -> &mut Self {
        let column = self.add_table_name(field);
        self.query.order_by(&column, direction);
        self
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.query.offset = Some(offset);
        self
    }

    /// Render `name(args...)`.
    ///
    /// Column arguments are qualified with this table; `rel/field` columns
    /// join the related table.
    pub fn func(&mut self, name: &str, args: &[Expr]) -> OrmResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(OrmError::query_build("a SQL function needs a name"));
        }
        let mut rendered = Vec::with_capacity(args.len());
        for arg in args {
            rendered.push(self.render_expr(arg)?);
        }
        Ok(format!("{name}({})", rendered.join(", ")))
    }

    pub(crate) fn render_expr(&mut self, expr: &Expr) -> OrmResult<String> {
        Ok(match expr {
            Expr::Column(column) => match column.rsplit_once('/') {
                Some((path, property)) => {
                    let table = self.add_related_table(path, false)?;
                    self.db().protect_identifiers(&format!("{table}.{property}"))
                }
                None => self.db().protect_identifiers(&self.add_table_name(column)),
            },
            Expr::Parent(column) => format!("{PARENT_TOKEN}.{column}"),
            Expr::Literal(value) => self.db().escape(value),
            Expr::Raw(sql) => sql.clone(),
            Expr::Func { name, args } => self.func(name, args)?,
            Expr::Op(op) => op.as_str().to_string(),
            Expr::Formula(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    parts.push(self.render_expr(item)?);
                }
                parts.join(" ")
            }
        })
    }

    /// `SELECT name(args...) AS alias`.
    pub fn select_func(&mut self, name: &str, args: &[Expr], alias: &str) -> OrmResult<&mut Self> {
        let sql = self.func(name, args)?;
        self.query.select_direct(format!("{sql} AS {alias}"));
        Ok(self)
    }

    /// A clause whose left-hand side is `name(args...)`.
    pub fn func_clause(
        &mut self,
        kind: ClauseKind,
        name: &str,
        args: &[Expr],
        operand: impl Into<ClauseOperand>,
    ) -> OrmResult<&mut Self> {
        let sql = self.func(name, args)?;
        Ok(self.clause(kind, &sql, operand))
    }

    pub fn where_func(
        &mut self,
        name: &str,
        args: &[Expr],
        value: impl Into<Value>,
    ) -> OrmResult<&mut Self> {
        self.func_clause(ClauseKind::Where, name, args, ClauseOperand::value(value))
    }

    pub fn or_where_func(
        &mut self,
        name: &str,
        args: &[Expr],
        value: impl Into<Value>,
    ) -> OrmResult<&mut Self> {
        self.func_clause(ClauseKind::OrWhere, name, args, ClauseOperand::value(value))
    }

    pub fn having_func(
        &mut self,
        name: &str,
        args: &[Expr],
        value: impl Into<Value>,
    ) -> OrmResult<&mut Self> {
        self.func_clause(ClauseKind::Having, name, args, ClauseOperand::value(value))
    }

    /// `ORDER BY name(args...) direction`.
    pub fn order_by_func(&mut self, name: &str, args: &[Expr], direction: &str) -> OrmResult<&mut Self> {
        self.func_clause(ClauseKind::OrderBy, name, args, ClauseOperand::value(direction))
    }

    /// A clause comparing `field` with `name(args...)`.
    pub fn field_func_clause(
        &mut self,
        kind: ClauseKind,
        field: &str,
        name: &str,
        args: &[Expr],
    ) -> OrmResult<&mut Self> {
        let sql = self.func(name, args)?;
        let column = self.add_table_name(field);
        Ok(self.special_clause(kind, &column, ClauseOperand::Raw(sql)))
    }

    pub fn where_field_func(&mut self, field: &str, name: &str, args: &[Expr]) -> OrmResult<&mut Self> {
        self.field_func_clause(ClauseKind::Where, field, name, args)
    }

    /// Comparison against a subquery or function: IN clauses become a plain
    /// comparison with the `IN` keyword moved onto the column.
    pub(crate) fn special_clause(
        &mut self,
        kind: ClauseKind,
        column: &str,
        operand: ClauseOperand,
    ) -> &mut Self {
        match kind.in_flag() {
            Some(negated) => {
                let not = if negated { "NOT " } else { "" };
                let column = format!("{column} {not}IN");
                self.push_clause(kind.without_in(), &column, operand.into_raw())
            }
            None => self.push_clause(kind, column, operand.into_raw()),
        }
    }

    /// Compile a subquery for embedding in this entity's query.
    pub(crate) fn parse_subquery(&self, sub: Subquery<'_>) -> OrmResult<String> {
        let sql = match sub {
            Subquery::Entity(entity) => format!("({})", entity.get_sql(None, None, false)?),
            Subquery::Sql(sql) => sql,
        };
        Ok(rewrite_subquery(&sql, &self.desc.table))
    }

    /// `SELECT (subquery) AS alias`.
    pub fn select_subquery<'s>(
        &mut self,
        sub: impl Into<Subquery<'s>>,
        alias: &str,
    ) -> OrmResult<&mut Self> {
        let sql = self.parse_subquery(sub.into())?;
        self.query.select_direct(format!("{sql} AS {alias}"));
        Ok(self)
    }

    /// `field <kind> (subquery)`.
    pub fn subquery_clause<'s>(
        &mut self,
        kind: ClauseKind,
        field: &str,
        sub: impl Into<Subquery<'s>>,
    ) -> OrmResult<&mut Self> {
        let sql = self.parse_subquery(sub.into())?;
        let column = self.add_table_name(field);
        Ok(self.special_clause(kind, &column, ClauseOperand::Raw(sql)))
    }

    /// `(subquery) <kind> value`; a `field` value is compared as a column.
    pub fn subquery_lhs_clause<'s>(
        &mut self,
        kind: ClauseKind,
        sub: impl Into<Subquery<'s>>,
        field: Option<&str>,
    ) -> OrmResult<&mut Self> {
        let sql = self.parse_subquery(sub.into())?;
        let operand = match field {
            Some(field) => {
                ClauseOperand::Raw(self.db().protect_identifiers(&self.add_table_name(field)))
            }
            None => ClauseOperand::None,
        };
        Ok(self.special_clause(kind, &sql, operand))
    }

    pub fn where_subquery<'s>(
        &mut self,
        field: &str,
        sub: impl Into<Subquery<'s>>,
    ) -> OrmResult<&mut Self> {
        self.subquery_clause(ClauseKind::Where, field, sub)
    }

    pub fn where_in_subquery<'s>(
        &mut self,
        field: &str,
        sub: impl Into<Subquery<'s>>,
    ) -> OrmResult<&mut Self> {
        self.subquery_clause(ClauseKind::WhereIn, field, sub)
    }

    pub fn where_not_in_subquery<'s>(
        &mut self,
        field: &str,
        sub: impl Into<Subquery<'s>>,
    ) -> OrmResult<&mut Self> {
        self.subquery_clause(ClauseKind::WhereNotIn, field, sub)
    }

    pub fn or_where_subquery<'s>(
        &mut self,
        field: &str,
        sub: impl Into<Subquery<'s>>,
    ) -> OrmResult<&mut Self> {
        self.subquery_clause(ClauseKind::OrWhere, field, sub)
    }

    pub fn or_where_in_subquery<'s>(
        &mut self,
        field: &str,
        sub: impl Into<Subquery<'s>>,
    ) -> OrmResult<&mut Self> {
        self.subquery_clause(ClauseKind::OrWhereIn, field, sub)
    }

    pub fn or_where_not_in_subquery<'s>(
        &mut self,
        field: &str,
        sub: impl Into<Subquery<'s>>,
    ) -> OrmResult<&mut Self> {
        self.subquery_clause(ClauseKind::OrWhereNotIn, field, sub)
    }
}

fn compare(column: &str, operand: ClauseOperand) -> Condition {
    match operand {
        ClauseOperand::None => Condition::compare(column, Operand::Null),
        ClauseOperand::Value(value) => Condition::compare(column, Operand::new(value, true)),
        ClauseOperand::Raw(sql) => Condition::compare(column, Operand::Raw(sql)),
        ClauseOperand::Like(text, _) => Condition::compare(column, Operand::new(text, true)),
        ClauseOperand::List(values) => Condition::In {
            column: column.to_string(),
            negated: false,
            values,
        },
    }
}
