//! SQL identifier handling.
//!
//! [`Ident`] parses dotted, optionally quoted identifiers (`posts.title`,
//! `"Post"."Title"`). [`protect_identifiers`] is the lenient entry point used
//! when rendering user supplied column references: identifiers that need it
//! are quoted, anything that is not a plain identifier (function calls,
//! literals, expressions) is returned untouched.
//!
//! - Unquoted parts match `[A-Za-z_][A-Za-z0-9_$]*`
//! - Quoted parts allow any characters except NUL and escape `"` as `""`

use crate::error::{OrmError, OrmResult};

/// A part of a SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentPart {
    Unquoted(String),
    Quoted(String),
    /// The `*` in `table.*`.
    Wildcard,
}

/// A SQL identifier (column, table, or `table.*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub parts: Vec<IdentPart>,
}

const RESERVED: &[&str] = &[
    "all", "and", "as", "asc", "by", "case", "check", "column", "default", "desc", "distinct",
    "else", "end", "from", "group", "having", "in", "join", "limit", "not", "null", "offset",
    "on", "or", "order", "select", "table", "then", "to", "union", "user", "when", "where",
];

impl Ident {
    /// Parse an identifier string: `col`, `table.col`, `table.*`, `"Quoted".col`.
    pub fn parse(s: &str) -> OrmResult<Self> {
        if s.is_empty() {
            return Err(OrmError::query_build("Identifier cannot be empty"));
        }
        if s.contains('\0') {
            return Err(OrmError::query_build(
                "Identifier cannot contain NUL character",
            ));
        }

        let mut parts = Vec::new();
        let mut chars = s.chars().peekable();

        while chars.peek().is_some() {
            if !parts.is_empty() {
                match chars.next() {
                    Some('.') if chars.peek().is_some() => {}
                    Some('.') => return Err(OrmError::query_build("Trailing '.' in identifier")),
                    Some(c) => {
                        return Err(OrmError::query_build(format!(
                            "Expected '.' between identifier parts, got '{c}'"
                        )));
                    }
                    None => break,
                }
            }

            match chars.peek() {
                Some('"') => {
                    chars.next();
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('"') if chars.peek() == Some(&'"') => {
                                chars.next();
                                name.push('"');
                            }
                            Some('"') => break,
                            Some(c) => name.push(c),
                            None => {
                                return Err(OrmError::query_build("Unclosed quoted identifier"));
                            }
                        }
                    }
                    if name.is_empty() {
                        return Err(OrmError::query_build("Empty quoted identifier"));
                    }
                    parts.push(IdentPart::Quoted(name));
                }
                Some('*') => {
                    chars.next();
                    if chars.peek().is_some() {
                        return Err(OrmError::query_build("'*' must be the last identifier part"));
                    }
                    parts.push(IdentPart::Wildcard);
                }
                _ => {
                    let mut name = String::new();
                    while let Some(&c) = chars.peek() {
                        if c == '.' {
                            break;
                        }
                        let ok = if name.is_empty() {
                            c == '_' || c.is_ascii_alphabetic()
                        } else {
                            c == '_' || c == '$' || c.is_ascii_alphanumeric()
                        };
                        if !ok {
                            return Err(OrmError::query_build(format!(
                                "Invalid character in identifier: '{c}'"
                            )));
                        }
                        name.push(c);
                        chars.next();
                    }
                    if name.is_empty() {
                        return Err(OrmError::query_build("Empty identifier segment"));
                    }
                    parts.push(IdentPart::Unquoted(name));
                }
            }
        }

        Ok(Self { parts })
    }

    /// Render exactly as parsed.
    pub fn to_sql(&self) -> String {
        self.render(false)
    }

    /// Render with quotes added to unquoted parts that are reserved words or
    /// contain upper-case letters (which the backend would otherwise fold).
    pub fn to_protected_sql(&self) -> String {
        self.render(true)
    }

    fn render(&self, protect: bool) -> String {
        let mut out = String::new();
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            match part {
                IdentPart::Wildcard => out.push('*'),
                IdentPart::Unquoted(s) if !(protect && needs_quotes(s)) => out.push_str(s),
                IdentPart::Unquoted(s) | IdentPart::Quoted(s) => {
                    out.push('"');
                    out.push_str(&s.replace('"', "\"\""));
                    out.push('"');
                }
            }
        }
        out
    }
}

fn needs_quotes(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase() || c == '$')
        || RESERVED.contains(&name.to_ascii_lowercase().as_str())
}

/// Quote the identifier at the start of `item` where needed.
///
/// `posts.title` stays as is, `posts.Title` becomes `posts."Title"`, and
/// `title AS t` protects only `title`. Inputs that do not start with an
/// identifier (`COUNT(*)`, `'literal'`, `1 + 2`) are returned unchanged.
pub fn protect_identifiers(item: &str) -> String {
    let trimmed = item.trim();
    let (head, rest) = match trimmed.find(char::is_whitespace) {
        Some(pos) => trimmed.split_at(pos),
        None => (trimmed, ""),
    };
    match Ident::parse(head) {
        Ok(ident) => format!("{}{}", ident.to_protected_sql(), rest),
        Err(_) => item.to_string(),
    }
}
