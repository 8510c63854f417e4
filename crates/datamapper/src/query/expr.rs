//! SQL function expressions.
//!
//! `select_func`, `where_func` and friends take their arguments as [`Expr`]
//! values instead of sentinel-laden strings:
//!
//! ```ignore
//! use datamapper::query::{Expr, Operator};
//!
//! // UPPER(posts.title)
//! post.select_func("UPPER", &[Expr::col("title")], "shout")?;
//! // COALESCE(author_users.name, 'anonymous')
//! post.where_func("COALESCE", &[Expr::col("author/name"), Expr::lit("anonymous")], "bob")?;
//! // posts.views + 1
//! post.where_field_func("views", "ABS", &[Expr::formula([Expr::col("views"), Expr::op(Operator::Add), Expr::lit(1)])])?;
//! ```
//!
//! Column references may travel through relationships (`author/name`); the
//! entity resolves them into joins when the expression is rendered.

use crate::value::Value;

/// Operators allowed inside a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
    Not,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BangEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    SquareRoot,
    CubeRoot,
    Factorial,
    PrefixFactorial,
    Abs,
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    ShiftLeft,
    ShiftRight,
}

impl Operator {
    pub const ALL: &'static [Operator] = &[
        Operator::And,
        Operator::Or,
        Operator::Not,
        Operator::Lt,
        Operator::Gt,
        Operator::Le,
        Operator::Ge,
        Operator::Eq,
        Operator::Ne,
        Operator::BangEq,
        Operator::Add,
        Operator::Sub,
        Operator::Mul,
        Operator::Div,
        Operator::Mod,
        Operator::Pow,
        Operator::SquareRoot,
        Operator::CubeRoot,
        Operator::Factorial,
        Operator::PrefixFactorial,
        Operator::Abs,
        Operator::BitAnd,
        Operator::BitOr,
        Operator::BitXor,
        Operator::BitNot,
        Operator::ShiftLeft,
        Operator::ShiftRight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Not => "NOT",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::BangEq => "!=",
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::Pow => "^",
            Operator::SquareRoot => "|/",
            Operator::CubeRoot => "||/",
            Operator::Factorial => "!",
            Operator::PrefixFactorial => "!!",
            Operator::Abs => "@",
            Operator::BitAnd => "&",
            Operator::BitOr => "|",
            Operator::BitXor => "#",
            Operator::BitNot => "~",
            Operator::ShiftLeft => "<<",
            Operator::ShiftRight => ">>",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
    }
}

/// A function argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column of this model, or of a related model via a `/` path (`author/name`).
    Column(String),
    /// Column of the enclosing query's row, for correlated subqueries.
    Parent(String),
    /// Escaped literal.
    Literal(Value),
    /// Inserted verbatim.
    Raw(String),
    /// Nested function call.
    Func { name: String, args: Vec<Expr> },
    Op(Operator),
    /// Space-separated sequence, e.g. `a + 1`.
    Formula(Vec<Expr>),
}

impl Expr {
    pub fn col(column: impl Into<String>) -> Self {
        Expr::Column(column.into())
    }

    pub fn parent(column: impl Into<String>) -> Self {
        Expr::Parent(column.into())
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    pub fn func(name: impl Into<String>, args: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Func {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }

    pub fn op(op: Operator) -> Self {
        Expr::Op(op)
    }

    pub fn formula(items: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Formula(items.into_iter().collect())
    }

    /// Interpret the string shorthand used by dynamic verbs.
    ///
    /// - `@field`, `@rel/field` column references, `@parent/field` outer-row reference
    /// - `[sql]` raw SQL, `'quoted'` and `*` verbatim
    /// - inside formulas, operator tokens
    /// - anything else is an escaped literal
    pub fn parse_arg(s: &str, in_formula: bool) -> Self {
        if in_formula {
            if let Some(op) = Operator::parse(s) {
                return Expr::Op(op);
            }
        }
        if s == "*" || (s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'')) {
            return Expr::Raw(s.to_string());
        }
        if s.len() >= 2 && s.starts_with('[') && s.ends_with(']') {
            return Expr::Raw(s[1..s.len() - 1].to_string());
        }
        if let Some(column) = s.strip_prefix('@') {
            return match column.strip_prefix("parent/") {
                Some(outer) => Expr::Parent(outer.to_string()),
                None => Expr::Column(column.to_string()),
            };
        }
        Expr::Literal(Value::Text(s.to_string()))
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Literal(Value::Int(value))
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::parse_arg(value, false)
    }
}

impl From<Operator> for Expr {
    fn from(op: Operator) -> Self {
        Expr::Op(op)
    }
}
