//! Calling query verbs by name.
//!
//! Every descriptor carries a [`VerbTable`](crate::registry::VerbTable) of
//! the names its fields and relations make valid (`get_by_title`,
//! `where_related_author`, `or_like_join_field`, `save_editor`, ...).
//! [`Entity::call`] resolves a name with a single lookup and forwards to
//! the typed method.

use std::collections::VecDeque;

use super::{ClauseOperand, Entity, Related, Subquery};
use crate::error::{OrmError, OrmResult};
use crate::query::{ClauseKind, Expr};
use crate::registry::Verb;
use crate::value::Value;

/// One argument of a [`Entity::call`].
#[derive(Debug)]
pub enum Arg<'a> {
    Value(Value),
    List(Vec<Value>),
    Expr(Expr),
    Entity(&'a mut Entity),
    Entities(Vec<&'a mut Entity>),
}

impl From<Value> for Arg<'_> {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl From<&str> for Arg<'_> {
    fn from(value: &str) -> Self {
        Arg::Value(Value::from(value))
    }
}

impl From<String> for Arg<'_> {
    fn from(value: String) -> Self {
        Arg::Value(Value::Text(value))
    }
}

impl From<i64> for Arg<'_> {
    fn from(value: i64) -> Self {
        Arg::Value(Value::Int(value))
    }
}

impl From<Vec<Value>> for Arg<'_> {
    fn from(values: Vec<Value>) -> Self {
        Arg::List(values)
    }
}

impl From<Expr> for Arg<'_> {
    fn from(expr: Expr) -> Self {
        Arg::Expr(expr)
    }
}

impl<'a> From<&'a mut Entity> for Arg<'a> {
    fn from(entity: &'a mut Entity) -> Self {
        Arg::Entity(entity)
    }
}

impl<'a> From<Vec<&'a mut Entity>> for Arg<'a> {
    fn from(entities: Vec<&'a mut Entity>) -> Self {
        Arg::Entities(entities)
    }
}

type Args<'a> = VecDeque<Arg<'a>>;

fn bad_args(verb: &str, expected: &str) -> OrmError {
    OrmError::query_build(format!("{verb} expects {expected}"))
}

fn take_text(args: &mut Args<'_>, verb: &str, what: &str) -> OrmResult<String> {
    match args.pop_front() {
        Some(Arg::Value(Value::Text(s))) => Ok(s),
        _ => Err(bad_args(verb, what)),
    }
}

fn take_subquery<'a>(args: &mut Args<'a>, verb: &str) -> OrmResult<Subquery<'a>> {
    match args.pop_front() {
        Some(Arg::Entity(entity)) => Ok(Subquery::Entity(entity)),
        Some(Arg::Value(Value::Text(sql))) => Ok(Subquery::Sql(sql)),
        _ => Err(bad_args(verb, "a subquery (entity or SQL)")),
    }
}

fn expr_of(arg: Arg<'_>, verb: &str) -> OrmResult<Expr> {
    Ok(match arg {
        Arg::Value(Value::Text(s)) => Expr::parse_arg(&s, false),
        Arg::Value(value) => Expr::Literal(value),
        Arg::List(items) => Expr::Formula(
            items
                .into_iter()
                .map(|v| match v {
                    Value::Text(s) => Expr::parse_arg(&s, true),
                    other => Expr::Literal(other),
                })
                .collect(),
        ),
        Arg::Expr(expr) => expr,
        Arg::Entity(_) | Arg::Entities(_) => {
            return Err(bad_args(verb, "function arguments, not entities"));
        }
    })
}

impl Entity {
    /// Run the verb `name` with `args`.
    ///
    /// Query verbs add to the pending query and return `true`; `get_by_*`
    /// verbs also fetch; `save_*`/`delete_*` return their success flag.
    ///
    /// ```ignore
    /// post.call("where_related_author", vec!["name".into(), "Ann".into()])?;
    /// post.call("get_by_title", vec!["Hello".into()])?;
    /// post.call("save_tag", vec![(&mut tag).into()])?;
    /// ```
    pub fn call(&mut self, name: &str, args: Vec<Arg<'_>>) -> OrmResult<bool> {
        let verb = self.desc.verbs.resolve(name).cloned().ok_or_else(|| {
            OrmError::query_build(format!(
                "unknown method '{name}' on model '{}'",
                self.desc.class
            ))
        })?;
        let mut args: Args<'_> = args.into();

        match verb {
            Verb::GetBy(field) => {
                if let Some(arg) = args.pop_front() {
                    let operand = self.operand_of(arg, name)?;
                    self.clause(ClauseKind::Where, &field, operand);
                }
                self.get(None, None)?;
            }
            Verb::GetByRelated(relation) => {
                self.related_verb(ClauseKind::Where, relation, args, name)?;
                self.get(None, None)?;
            }
            Verb::Related { clause, relation } => {
                self.related_verb(clause, relation, args, name)?;
            }
            Verb::RelatedSubquery(kind) => {
                let path = take_text(&mut args, name, "a relation name")?;
                let field = if args.len() >= 2 {
                    take_text(&mut args, name, "a field name")?
                } else {
                    "id".to_string()
                };
                let sub = take_subquery(&mut args, name)?;
                self.related_subquery_clause(kind, &path, &field, sub)?;
            }
            Verb::Subquery(kind) => self.subquery_verb(kind, args, name)?,
            Verb::JoinField(kind) => {
                if args.len() < 3 {
                    return Err(bad_args(name, "a relation, a field and a value"));
                }
                let path = take_text(&mut args, name, "a relation name")?;
                let field = take_text(&mut args, name, "a field name")?;
                let operand = match args.pop_front() {
                    Some(arg) => self.operand_of(arg, name)?,
                    None => ClauseOperand::None,
                };
                self.join_field_clause(kind, &path, &field, operand)?;
            }
            Verb::FieldFunc(kind) => {
                if args.len() < 2 {
                    return Err(bad_args(name, "at least 2 arguments"));
                }
                let field = take_text(&mut args, name, "a field name")?;
                let func = take_text(&mut args, name, "a function name")?;
                let exprs = args
                    .into_iter()
                    .map(|a| expr_of(a, name))
                    .collect::<OrmResult<Vec<_>>>()?;
                self.field_func_clause(kind, &field, &func, &exprs)?;
            }
            Verb::Func(kind) => {
                if args.len() < 2 {
                    return Err(bad_args(name, "at least 2 arguments"));
                }
                let func = take_text(&mut args, name, "a function name")?;
                let last = args.pop_back().ok_or_else(|| bad_args(name, "a value"))?;
                let exprs = args
                    .into_iter()
                    .map(|a| expr_of(a, name))
                    .collect::<OrmResult<Vec<_>>>()?;
                if kind == ClauseKind::Select {
                    let alias = match last {
                        Arg::Value(Value::Text(alias)) => alias,
                        _ => return Err(bad_args(name, "an alias as the last argument")),
                    };
                    self.select_func(&func, &exprs, &alias)?;
                } else {
                    let operand = self.operand_of(last, name)?;
                    self.func_clause(kind, &func, &exprs, operand)?;
                }
            }
            Verb::Save(relation) => {
                let related = Self::related_args(&relation, args, name)?;
                return self.save_with(related);
            }
            Verb::Delete(relation) => {
                let related = Self::related_args(&relation, args, name)?;
                return self.delete_related(related);
            }
        }
        Ok(true)
    }

    fn operand_of(&mut self, arg: Arg<'_>, verb: &str) -> OrmResult<ClauseOperand> {
        Ok(match arg {
            Arg::Value(value) => ClauseOperand::Value(value),
            Arg::List(values) => ClauseOperand::List(values),
            Arg::Expr(expr) => ClauseOperand::Raw(self.render_expr(&expr)?),
            Arg::Entity(entity) => ClauseOperand::Value(entity.id()),
            Arg::Entities(entities) => {
                if entities.is_empty() {
                    return Err(bad_args(verb, "at least one entity"));
                }
                ClauseOperand::List(entities.iter().map(|e| e.id()).collect())
            }
        })
    }

    /// `(relation | entity, [entity], [field], [value])` as a related clause.
    fn related_verb(
        &mut self,
        kind: ClauseKind,
        relation: Option<String>,
        mut args: Args<'_>,
        verb: &str,
    ) -> OrmResult<()> {
        let mut object: Option<&mut Entity> = None;
        let path = match relation {
            Some(relation) => relation,
            None => match args.pop_front() {
                Some(Arg::Value(Value::Text(relation))) => relation,
                Some(Arg::Entity(entity)) => {
                    let model = entity.model().to_string();
                    object = Some(entity);
                    model
                }
                _ => return Err(bad_args(verb, "a relation name or an entity")),
            },
        };
        if object.is_none() && matches!(args.front(), Some(Arg::Entity(_))) {
            if let Some(Arg::Entity(entity)) = args.pop_front() {
                object = Some(entity);
            }
        }

        let field = match args.front() {
            Some(Arg::Value(Value::Text(_))) => take_text(&mut args, verb, "a field name")?,
            None => "id".to_string(),
            Some(_) => return Err(bad_args(verb, "a field name")),
        };
        let operand = match (args.pop_front(), object) {
            (Some(arg), _) => self.operand_of(arg, verb)?,
            (None, Some(entity)) if kind.in_flag().is_some() => {
                let ids = if entity.all.is_empty() {
                    vec![entity.id()]
                } else {
                    entity.all.iter().map(Entity::id).collect()
                };
                ClauseOperand::List(ids)
            }
            (None, Some(entity)) => ClauseOperand::Value(entity.id()),
            (None, None) => ClauseOperand::None,
        };
        self.related_clause(kind, &path, &field, operand)?;
        Ok(())
    }

    fn subquery_verb(&mut self, kind: ClauseKind, mut args: Args<'_>, verb: &str) -> OrmResult<()> {
        if args.is_empty() {
            return Err(bad_args(verb, "at least one argument"));
        }
        if kind == ClauseKind::Select {
            if args.len() < 2 {
                return Err(bad_args(verb, "a subquery and an alias"));
            }
            let sub = take_subquery(&mut args, verb)?;
            let alias = take_text(&mut args, verb, "an alias")?;
            self.select_subquery(sub, &alias)?;
            return Ok(());
        }

        let subquery_first = matches!(args.front(), Some(Arg::Entity(_))) || args.len() == 1;
        if subquery_first {
            let sub = take_subquery(&mut args, verb)?;
            let field = match args.pop_front() {
                Some(Arg::Value(Value::Text(field))) => Some(field),
                None => None,
                Some(_) => return Err(bad_args(verb, "a field name to compare with")),
            };
            self.subquery_lhs_clause(kind, sub, field.as_deref())?;
        } else {
            let field = take_text(&mut args, verb, "a field name")?;
            let sub = take_subquery(&mut args, verb)?;
            self.subquery_clause(kind, &field, sub)?;
        }
        Ok(())
    }

    fn related_args<'a>(relation: &str, args: Args<'a>, verb: &str) -> OrmResult<Related<'a>> {
        let mut related = Related::new();
        for arg in args {
            related = match arg {
                Arg::Entity(entity) => related.with_field(relation, entity),
                Arg::Entities(entities) => related.with_all(Some(relation), entities),
                _ => return Err(bad_args(verb, "entities")),
            };
        }
        if related.is_empty() {
            return Err(bad_args(verb, "at least one entity"));
        }
        Ok(related)
    }
}
