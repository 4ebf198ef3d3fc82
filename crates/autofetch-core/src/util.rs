/// Interpret a yes/no style flag value (`1`, `true`, `yes`, `on` and their
/// negatives, any case). Anything else is `None`.
pub fn parse_bool_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Boolean environment override; unset or unparsable values are ignored.
pub fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().and_then(|raw| parse_bool_flag(&raw))
}

/// First `max` characters of `text`, counted in chars rather than bytes.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
