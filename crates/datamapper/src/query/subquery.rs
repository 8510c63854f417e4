//! Subquery alias rewriting.
//!
//! A subquery built from the same model as the outer query would otherwise
//! refer to the same table name. Every reference to `table` inside the
//! subquery is moved to `table_subquery`, then `${parent}` is replaced with the
//! outer table so correlated conditions can point at the outer row.

use regex::Regex;

/// Token standing for the enclosing query's table.
pub const PARENT_TOKEN: &str = "${parent}";

/// Rewrite compiled subquery SQL for embedding in a query on `outer_table`.
pub fn rewrite_subquery(sql: &str, outer_table: &str) -> String {
    let table = regex::escape(outer_table);
    let alias = format!("{outer_table}_subquery");
    let mut sql = sql.to_string();

    // column references: `table.col` and `table.*`, but not `other_table.col`
    if let Ok(re) = Regex::new(&format!(r"(?i)([^_\w])({table})\.([-\w]+|\*)")) {
        sql = re
            .replace_all(&sql, |caps: &regex::Captures<'_>| {
                format!("{}{alias}.{}", &caps[1], &caps[3])
            })
            .into_owned();
    }
    // joins that alias the table as itself
    if let Ok(re) = Regex::new(&format!(r"\b{table} {table} ")) {
        sql = re
            .replace_all(&sql, format!("{outer_table} {alias} ").as_str())
            .into_owned();
    }
    // the FROM clause
    if let Ok(re) = Regex::new(&format!(r"(?i)FROM {table}([,\s)]|$)")) {
        sql = re
            .replace_all(&sql, |caps: &regex::Captures<'_>| {
                format!("FROM {outer_table} {alias}{}", &caps[1])
            })
            .into_owned();
    }

    sql.replace('\n', "\n\t").replace(PARENT_TOKEN, outer_table)
}

/// Wrap compiled SQL in parentheses and rewrite it for `outer_table`.
pub fn embed_subquery(sql: &str, outer_table: &str) -> String {
    rewrite_subquery(&format!("({sql})"), outer_table)
}
