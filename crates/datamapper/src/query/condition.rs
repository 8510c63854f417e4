//! WHERE / HAVING condition trees.
//!
//! Conditions are accumulated into a [`ConditionGroup`], which tracks any
//! groups opened with `group_start` and not yet closed. Rendering never emits
//! a leading connective, so a group opened right after another group (or as
//! the first condition) starts cleanly.

use crate::db::Database;
use crate::value::Value;

/// Boolean connective joining a condition to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

impl Connective {
    pub fn as_str(self) -> &'static str {
        match self {
            Connective::And => "AND",
            Connective::Or => "OR",
        }
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Null,
    /// Escaped by the backend at render time.
    Value(Value),
    /// Inserted verbatim.
    Raw(String),
}

impl Operand {
    /// Build an operand, escaping unless `escape` is false.
    pub fn new(value: impl Into<Value>, escape: bool) -> Self {
        match value.into() {
            Value::Null => Operand::Null,
            v if escape => Operand::Value(v),
            v => Operand::Raw(v.to_text()),
        }
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::new(value, true)
    }
}

/// Does the column expression already carry a comparison operator?
pub fn has_operator(key: &str) -> bool {
    key.trim()
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '!' | '='))
}

/// Whether `key` ends in a bare operator still awaiting its operand.
fn ends_with_operator(key: &str) -> bool {
    let key = key.trim_end();
    if key.ends_with(['<', '>', '!', '=']) {
        return true;
    }
    let last = key.rsplit(char::is_whitespace).next().unwrap_or_default();
    key.len() > last.len()
        && ["is", "not", "like", "ilike"]
            .iter()
            .any(|word| last.eq_ignore_ascii_case(word))
}

/// A single condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column = operand`, or `column <op> operand` when the column carries an operator.
    Compare { column: String, operand: Operand },
    /// `column [NOT] IN (...)`.
    In {
        column: String,
        negated: bool,
        values: Vec<Value>,
    },
    Raw(String),
    Group {
        negated: bool,
        items: Vec<(Connective, Condition)>,
    },
}

impl Condition {
    pub fn compare(column: impl Into<String>, operand: Operand) -> Self {
        Condition::Compare {
            column: column.into(),
            operand,
        }
    }

    /// Render the condition; empty groups render to `None`.
    pub fn render(&self, db: &dyn Database) -> Option<String> {
        match self {
            Condition::Compare { column, operand } => {
                let key = column.trim();
                let rhs = match operand {
                    Operand::Null if ends_with_operator(key) => return Some(format!("{key} NULL")),
                    Operand::Null if has_operator(key) => return Some(key.to_string()),
                    Operand::Null => return Some(format!("{key} IS NULL")),
                    Operand::Value(v) => db.escape(v),
                    Operand::Raw(s) => s.clone(),
                };
                if has_operator(key) {
                    Some(format!("{key} {rhs}"))
                } else {
                    Some(format!("{key} = {rhs}"))
                }
            }
            Condition::In {
                column,
                negated,
                values,
            } => {
                if values.is_empty() {
                    return Some(if *negated { "1=1" } else { "1=0" }.to_string());
                }
                let list = values
                    .iter()
                    .map(|v| db.escape(v))
                    .collect::<Vec<_>>()
                    .join(", ");
                let not = if *negated { "NOT " } else { "" };
                Some(format!("{} {not}IN ({list})", column.trim()))
            }
            Condition::Raw(sql) => Some(sql.clone()),
            Condition::Group { negated, items } => {
                let inner = render_items(items, db)?;
                let not = if *negated { "NOT " } else { "" };
                Some(format!("{not}({inner})"))
            }
        }
    }
}

fn render_items(items: &[(Connective, Condition)], db: &dyn Database) -> Option<String> {
    let mut out = String::new();
    for (connective, condition) in items {
        let Some(sql) = condition.render(db) else {
            continue;
        };
        if !out.is_empty() {
            out.push(' ');
            out.push_str(connective.as_str());
            out.push(' ');
        }
        out.push_str(&sql);
    }
    (!out.is_empty()).then_some(out)
}

#[derive(Debug, Clone, PartialEq)]
struct OpenGroup {
    connective: Connective,
    negated: bool,
    items: Vec<(Connective, Condition)>,
}

/// Accumulated conditions plus the stack of open groups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionGroup {
    items: Vec<(Connective, Condition)>,
    open: Vec<OpenGroup>,
}

impl ConditionGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, connective: Connective, condition: Condition) {
        match self.open.last_mut() {
            Some(group) => group.items.push((connective, condition)),
            None => self.items.push((connective, condition)),
        }
    }

    /// Open a parenthesized group joined to what precedes it by `connective`.
    pub fn open(&mut self, connective: Connective, negated: bool) {
        self.open.push(OpenGroup {
            connective,
            negated,
            items: Vec::new(),
        });
    }

    /// Close the innermost open group. Returns `false` if none was open.
    pub fn close(&mut self) -> bool {
        let Some(group) = self.open.pop() else {
            return false;
        };
        self.push(
            group.connective,
            Condition::Group {
                negated: group.negated,
                items: group.items,
            },
        );
        true
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.open.iter().all(|g| g.items.is_empty())
    }

    /// Parenthesize everything accumulated so far, so conditions added later
    /// cannot bind into an OR chain written by the caller.
    pub fn wrap(&mut self) {
        while !self.open.is_empty() {
            self.close();
        }
        if self.items.is_empty() {
            return;
        }
        let items = std::mem::take(&mut self.items);
        self.items.push((
            Connective::And,
            Condition::Group {
                negated: false,
                items,
            },
        ));
    }

    /// Render all conditions. Groups still open are closed implicitly.
    pub fn render(&self, db: &dyn Database) -> Option<String> {
        let mut closed = self.clone();
        while closed.close() {}
        render_items(&closed.items, db)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.open.clear();
    }
}
