//! English inflection used to derive table and model names.

use heck::ToSnakeCase;

const UNCOUNTABLE: &[&str] = &[
    "equipment", "information", "rice", "money", "species", "series", "fish", "sheep", "news",
    "status", "data", "metadata",
];

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("man", "men"),
    ("woman", "women"),
    ("child", "children"),
    ("mouse", "mice"),
    ("foot", "feet"),
    ("tooth", "teeth"),
];

/// Normalize a class name to the key used by the registry (`BlogPost` -> `blog_post`).
pub fn class_key(class: &str) -> String {
    class.trim().to_snake_case()
}

/// Pluralize the last word of a snake_case name.
pub fn plural(word: &str) -> String {
    let word = word.trim().to_lowercase();
    let (head, last) = split_last_word(&word);
    format!("{head}{}", plural_word(last))
}

/// Singularize the last word of a snake_case name.
pub fn singular(word: &str) -> String {
    let word = word.trim().to_lowercase();
    let (head, last) = split_last_word(&word);
    format!("{head}{}", singular_word(last))
}

fn split_last_word(word: &str) -> (&str, &str) {
    match word.rfind('_') {
        Some(pos) => word.split_at(pos + 1),
        None => ("", word),
    }
}

fn plural_word(word: &str) -> String {
    if word.is_empty() || UNCOUNTABLE.contains(&word) {
        return word.to_string();
    }
    if let Some((_, many)) = IRREGULAR.iter().find(|(one, _)| *one == word) {
        return (*many).to_string();
    }
    if IRREGULAR.iter().any(|(_, many)| *many == word) {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix('y') {
        return match stem.chars().last() {
            Some('a' | 'e' | 'i' | 'o' | 'u') => format!("{word}s"),
            _ => format!("{stem}ies"),
        };
    }
    if word.ends_with("ch") || word.ends_with("sh") || word.ends_with('x') || word.ends_with('z') {
        return format!("{word}es");
    }
    if word.ends_with("ss") || word.ends_with("us") {
        return format!("{word}es");
    }
    if word.ends_with('s') {
        return word.to_string();
    }
    format!("{word}s")
}

fn singular_word(word: &str) -> String {
    if word.is_empty() || UNCOUNTABLE.contains(&word) {
        return word.to_string();
    }
    if let Some((one, _)) = IRREGULAR.iter().find(|(_, many)| *many == word) {
        return (*one).to_string();
    }
    if IRREGULAR.iter().any(|(one, _)| *one == word) {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["sses", "shes", "ches", "xes", "zes", "uses"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with("ss") || word.ends_with("us") {
        return word.to_string();
    }
    match word.strip_suffix('s') {
        Some(stem) => stem.to_string(),
        None => word.to_string(),
    }
}
