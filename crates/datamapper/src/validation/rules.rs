//! Built-in validation and prep rules.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Mutex, OnceLock, PoisonError};

use chrono::{NaiveDate, NaiveDateTime};

use super::{RuleContext, RuleFn, RuleOutcome};
use crate::error::OrmResult;
use crate::query::compile_get_where;
use crate::registry::RuleParam;
use crate::value::Value;

/// The built-in rule registered under `name`.
pub(crate) fn builtin(name: &str) -> Option<RuleFn> {
    let rule: RuleFn = match name {
        "required" => required,
        "always_validate" | "allow_null" => pass,
        "matches" => matches,
        "min_length" => min_length,
        "max_length" => max_length,
        "exact_length" => exact_length,
        "alpha" => alpha,
        "alpha_numeric" => alpha_numeric,
        "alpha_dash" => alpha_dash,
        "alpha_dash_dot" => alpha_dash_dot,
        "alpha_slash_dot" => alpha_slash_dot,
        "numeric" => numeric,
        "integer" => integer,
        "is_natural" => is_natural,
        "is_natural_no_zero" => is_natural_no_zero,
        "valid_email" => valid_email,
        "valid_ip" => valid_ip,
        "valid_url" => valid_url,
        "valid_uuid" => valid_uuid,
        "min_size" => min_size,
        "max_size" => max_size,
        "min_date" => min_date,
        "max_date" => max_date,
        "valid_date" => valid_date,
        "valid_date_group" => valid_date_group,
        "valid_match" => valid_match,
        "unique" => unique,
        "unique_pair" => unique_pair,
        "trim" => trim,
        "boolean" => boolean,
        "intval" => intval,
        "strtolower" => strtolower,
        "strtoupper" => strtoupper,
        "related_required" => related_required,
        "related_min_size" => related_min_size,
        "related_max_size" => related_max_size,
        _ => return None,
    };
    Some(rule)
}

fn outcome(ok: bool) -> OrmResult<RuleOutcome> {
    Ok(if ok { RuleOutcome::Pass } else { RuleOutcome::Fail })
}

fn regex_is_match(pattern: &'static str, value: &str) -> bool {
    static CACHE: OnceLock<Mutex<HashMap<&'static str, regex::Regex>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let regex = {
        let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .entry(pattern)
            .or_insert_with(|| regex::Regex::new(pattern).expect("invalid built-in rule regex"))
            .clone()
    };
    regex.is_match(value)
}

fn text_matches(ctx: &RuleContext<'_>, pattern: &'static str) -> OrmResult<RuleOutcome> {
    outcome(regex_is_match(pattern, &ctx.value().to_text()))
}

fn param_len(param: &RuleParam) -> Option<usize> {
    param.as_i64().and_then(|n| usize::try_from(n).ok())
}

fn pass(_: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    Ok(RuleOutcome::Pass)
}

fn required(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    outcome(!ctx.value().to_text().trim().is_empty())
}

fn matches(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    let Some(other) = ctx.param.as_text() else {
        return Ok(RuleOutcome::Fail);
    };
    outcome(ctx.value() == ctx.entity.value(&other))
}

fn min_length(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    let Some(min) = param_len(ctx.param) else {
        return Ok(RuleOutcome::Fail);
    };
    outcome(ctx.value().to_text().chars().count() >= min)
}

fn max_length(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    let Some(max) = param_len(ctx.param) else {
        return Ok(RuleOutcome::Fail);
    };
    outcome(ctx.value().to_text().chars().count() <= max)
}

fn exact_length(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    let Some(len) = param_len(ctx.param) else {
        return Ok(RuleOutcome::Fail);
    };
    outcome(ctx.value().to_text().chars().count() == len)
}

fn alpha(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    text_matches(ctx, r"(?i)^[a-z]+$")
}

fn alpha_numeric(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    text_matches(ctx, r"(?i)^[a-z0-9]+$")
}

fn alpha_dash(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    text_matches(ctx, r"(?i)^[-a-z0-9_]+$")
}

fn alpha_dash_dot(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    text_matches(ctx, r"(?i)^[-a-z0-9_.]+$")
}

fn alpha_slash_dot(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    text_matches(ctx, r"(?i)^[-a-z0-9_./]+$")
}

fn numeric(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    text_matches(ctx, r"^[\-+]?[0-9]*\.?[0-9]+$")
}

fn integer(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    text_matches(ctx, r"^[\-+]?[0-9]+$")
}

fn is_natural(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    text_matches(ctx, r"^[0-9]+$")
}

fn is_natural_no_zero(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    let text = ctx.value().to_text();
    outcome(regex_is_match(r"^[0-9]+$", &text) && text.trim_start_matches('0') != "")
}

fn valid_email(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    text_matches(ctx, r"^[^\s@]+@[^\s@]+\.[^\s@]+$")
}

fn valid_ip(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    outcome(ctx.value().to_text().trim().parse::<IpAddr>().is_ok())
}

fn valid_url(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    outcome(url::Url::parse(ctx.value().to_text().trim()).is_ok())
}

fn valid_uuid(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    outcome(uuid::Uuid::parse_str(ctx.value().to_text().trim()).is_ok())
}

fn compare_size(ctx: &RuleContext<'_>, ok: fn(f64, f64) -> bool) -> OrmResult<RuleOutcome> {
    let (Some(value), Some(limit)) = (
        ctx.value().as_f64(),
        ctx.param.as_value().and_then(Value::as_f64),
    ) else {
        return Ok(RuleOutcome::Fail);
    };
    outcome(ok(value, limit))
}

fn min_size(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    compare_size(ctx, |v, min| v >= min)
}

fn max_size(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    compare_size(ctx, |v, max| v <= max)
}

/// Parse a date or timestamp in the formats the mapper writes and accepts.
pub(crate) fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn compare_date(
    ctx: &RuleContext<'_>,
    ok: fn(NaiveDateTime, NaiveDateTime) -> bool,
) -> OrmResult<RuleOutcome> {
    let value = parse_datetime(&ctx.value().to_text());
    let limit = ctx.param.as_text().as_deref().and_then(parse_datetime);
    match (value, limit) {
        (Some(value), Some(limit)) => outcome(ok(value, limit)),
        _ => Ok(RuleOutcome::Fail),
    }
}

fn min_date(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    compare_date(ctx, |v, min| v >= min)
}

fn max_date(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    compare_date(ctx, |v, max| v <= max)
}

fn valid_date(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    let value = ctx.value();
    if value.is_empty_input() {
        return Ok(RuleOutcome::Pass);
    }
    outcome(parse_datetime(&value.to_text()).is_some())
}

/// `[year, month, day]` fields combined into this field as `YYYY-MM-DD`.
fn valid_date_group(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    let parts = ctx.param.values();
    let [year, month, day] = parts.as_slice() else {
        return Ok(RuleOutcome::Fail);
    };
    let component = |field: &Value| ctx.entity.value(&field.to_text()).as_i64();
    let date = match (component(year), component(month), component(day)) {
        (Some(y), Some(m), Some(d)) => i32::try_from(y)
            .ok()
            .zip(u32::try_from(m).ok())
            .zip(u32::try_from(d).ok())
            .and_then(|((y, m), d)| NaiveDate::from_ymd_opt(y, m, d)),
        _ => None,
    };
    match date {
        Some(date) => {
            ctx.set_value(date.format("%Y-%m-%d").to_string());
            Ok(RuleOutcome::Pass)
        }
        None => Ok(RuleOutcome::Fail),
    }
}

fn valid_match(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    let value = ctx.value();
    outcome(ctx.param.values().iter().any(|v| v.loose_eq(&value)))
}

fn unique(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    let value = ctx.value();
    if value.is_empty_input() {
        return Ok(RuleOutcome::Pass);
    }
    let filter = [(ctx.field.to_string(), value)];
    taken_by_other(ctx, &filter)
}

fn unique_pair(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    let Some(other) = ctx.param.as_text() else {
        return Ok(RuleOutcome::Fail);
    };
    let value = ctx.value();
    let other_value = ctx.entity.value(&other);
    if value.is_blank() || other_value.is_blank() {
        return Ok(RuleOutcome::Pass);
    }
    let filter = [(ctx.field.to_string(), value), (other, other_value)];
    taken_by_other(ctx, &filter)
}

fn taken_by_other(ctx: &RuleContext<'_>, filter: &[(String, Value)]) -> OrmResult<RuleOutcome> {
    let db = ctx.entity.db();
    let sql = compile_get_where(db.as_ref(), ctx.entity.table(), filter, Some(1), None);
    let result = db.query(&sql)?;
    let Some(row) = result.row() else {
        return Ok(RuleOutcome::Pass);
    };
    let found = row.get("id").cloned().unwrap_or_default();
    outcome(found.loose_eq(&ctx.entity.id()))
}

fn trim(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    if let Value::Text(s) = ctx.value() {
        ctx.set_value(s.trim().to_string());
    }
    Ok(RuleOutcome::Pass)
}

fn boolean(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    let value = ctx.value();
    if !value.is_null() {
        ctx.set_value(!value.is_blank());
    }
    Ok(RuleOutcome::Pass)
}

fn intval(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    let value = ctx.value();
    ctx.set_value(value.to_int());
    Ok(RuleOutcome::Pass)
}

fn strtolower(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    if let Value::Text(s) = ctx.value() {
        ctx.set_value(s.to_lowercase());
    }
    Ok(RuleOutcome::Pass)
}

fn strtoupper(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    if let Value::Text(s) = ctx.value() {
        ctx.set_value(s.to_uppercase());
    }
    Ok(RuleOutcome::Pass)
}

fn related_required(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    let count = ctx.entity.count_related(ctx.field, ctx.related)?;
    outcome(count > 0)
}

fn related_min_size(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    let min = ctx.param.as_i64().unwrap_or(0);
    let count = ctx.entity.count_related(ctx.field, ctx.related)?;
    outcome(count >= min)
}

fn related_max_size(ctx: &mut RuleContext<'_>) -> OrmResult<RuleOutcome> {
    let max = ctx.param.as_i64().unwrap_or(i64::MAX);
    let count = ctx.entity.count_related(ctx.field, ctx.related)?;
    outcome(count <= max)
}
