//! Default English message templates.
//!
//! Templates use `%s` placeholders: the first is the field label, the
//! second the rule parameter.

/// Built-in template for `rule`.
pub fn default_template(rule: &str) -> Option<&'static str> {
    let line = match rule {
        "required" => "The %s field is required.",
        "matches" => "The %s field does not match the %s field.",
        "min_length" => "The %s field must be at least %s characters in length.",
        "max_length" => "The %s field can not exceed %s characters in length.",
        "exact_length" => "The %s field must be exactly %s characters in length.",
        "alpha" => "The %s field may only contain alphabetical characters.",
        "alpha_numeric" => "The %s field may only contain alpha-numeric characters.",
        "alpha_dash" => {
            "The %s field may only contain alpha-numeric characters, underscores, and dashes."
        }
        "alpha_dash_dot" => {
            "The %s field may only contain alpha-numeric characters, underscores, dashes, and full stops."
        }
        "alpha_slash_dot" => {
            "The %s field may only contain alpha-numeric characters, underscores, dashes, slashes, and full stops."
        }
        "numeric" => "The %s field must contain only numbers.",
        "integer" => "The %s field must contain an integer.",
        "is_natural" => "The %s field must contain only positive numbers.",
        "is_natural_no_zero" => "The %s field must contain a number greater than zero.",
        "valid_email" => "The %s field must contain a valid email address.",
        "valid_ip" => "The %s field must contain a valid IP.",
        "valid_url" => "The %s field must contain a valid URL.",
        "valid_uuid" => "The %s field must contain a valid UUID.",
        "min_size" => "The %s field must be at least %s.",
        "max_size" => "The %s field can not exceed %s.",
        "min_date" => "The %s field must be at least %s.",
        "max_date" => "The %s field can not exceed %s.",
        "valid_date" => "The %s field must contain a valid date.",
        "valid_date_group" => "The %s fields must contain a valid date.",
        "valid_match" => "The %s field may only be %s.",
        "unique" => "The %s you supplied is already taken.",
        "unique_pair" => "The combination of %s and %s you supplied is already taken.",
        "related_required" => "The %s relationship is required.",
        "related_min_size" => "The %s relationship must be at least %s.",
        "related_max_size" => "The %s relationship can not exceed %s.",
        "transaction" => "The %s failed to complete, so the transaction was rolled back.",
        "dm_save_rel_failed" => "The %s relationship is not properly defined.",
        "dm_save_rel_nothis" => "Unable to save the %s relationship: This object is not saved.",
        "dm_save_rel_noobj" => "Unable to save the %s relationship: The related object was not saved.",
        _ => return None,
    };
    Some(line)
}

/// Fallback when a rule has no template.
pub fn missing_template(rule: &str) -> String {
    format!("Unable to access an error message corresponding to your rule name: {rule}.")
}

/// Substitute `%s` placeholders in order. Missing arguments become empty.
pub fn format_message(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut rest = template;
    while let Some(pos) = rest.find("%s") {
        out.push_str(&rest[..pos]);
        out.push_str(args.next().copied().unwrap_or(""));
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

/// Join list parameters for display: `a, b or c`.
pub fn join_param(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [head @ .., last] => format!("{} or {last}", head.join(", ")),
    }
}
