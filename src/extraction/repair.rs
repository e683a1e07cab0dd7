//! JSON repair (spec §4.2): best-effort fixer for malformed LLM output,
//! applied before parsing. Fixes doubled braces, unquoted keys, unquoted
//! string values, trailing commas, and unbalanced closing braces/brackets —
//! in that order, since later fixes assume the earlier ones already ran.

use lazy_regex::*;

/// Attempt to repair `raw` into valid JSON text. Returns `None` if the
/// result still doesn't parse as JSON after every fix is applied.
pub fn repair_json(raw: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str(raw) {
        return Some(value);
    }

    let mut text = raw.trim().to_string();
    text = fix_doubled_braces(&text);
    text = quote_unquoted_keys(&text);
    text = quote_unquoted_values(&text);
    text = strip_trailing_commas(&text);
    text = balance_braces(&text);

    serde_json::from_str(&text).ok()
}

fn fix_doubled_braces(text: &str) -> String {
    text.replace("{{", "{").replace("}}", "}")
}

fn quote_unquoted_keys(text: &str) -> String {
    UNQUOTED_KEY_RE
        .replace_all(text, |caps: &regex::Captures| format!("{}\"{}\":", &caps[1], &caps[2]))
        .into_owned()
}

/// Quote bare-word values (`name: Acme,` -> `name: "Acme",`), leaving
/// numbers, booleans, null, and already-quoted/structured values alone.
fn quote_unquoted_values(text: &str) -> String {
    UNQUOTED_VALUE_RE
        .replace_all(text, |caps: &regex::Captures| {
            let value = caps[1].trim();
            if value.is_empty()
                || value.eq_ignore_ascii_case("true")
                || value.eq_ignore_ascii_case("false")
                || value.eq_ignore_ascii_case("null")
                || value.parse::<f64>().is_ok()
            {
                format!(": {}{}", value, &caps[2])
            } else {
                format!(": \"{}\"{}", value, &caps[2])
            }
        })
        .into_owned()
}

fn strip_trailing_commas(text: &str) -> String {
    TRAILING_COMMA_RE.replace_all(text, "$1").into_owned()
}

fn balance_braces(text: &str) -> String {
    let mut result = text.to_string();
    let opens = result.matches('{').count();
    let closes = result.matches('}').count();
    if opens > closes {
        result.push_str(&"}".repeat(opens - closes));
    }
    let open_brackets = result.matches('[').count();
    let close_brackets = result.matches(']').count();
    if open_brackets > close_brackets {
        result.push_str(&"]".repeat(open_brackets - close_brackets));
    }
    result
}

mod lazy_regex {
    use regex::Regex;
    use std::sync::OnceLock;

    pub static UNQUOTED_KEY_RE: Lazy = Lazy::new(|| {
        Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:"#).unwrap()
    });
    pub static UNQUOTED_VALUE_RE: Lazy = Lazy::new(|| {
        Regex::new(r#":\s*([A-Za-z][A-Za-z0-9_ ]*?)\s*([,}\n])"#).unwrap()
    });
    pub static TRAILING_COMMA_RE: Lazy = Lazy::new(|| {
        Regex::new(r#",(\s*[}\]])"#).unwrap()
    });

    pub struct Lazy {
        cell: OnceLock<Regex>,
        init: fn() -> Regex,
    }

    impl Lazy {
        pub const fn new(init: fn() -> Regex) -> Self {
            Self {
                cell: OnceLock::new(),
                init,
            }
        }
    }

    impl std::ops::Deref for Lazy {
        type Target = Regex;
        fn deref(&self) -> &Regex {
            self.cell.get_or_init(self.init)
        }
    }
}
