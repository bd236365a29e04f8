use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static ID_DISALLOWED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9_-]").unwrap());
static NAME_DISALLOWED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9_]").unwrap());
static DASH_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{2,}").unwrap());
static UNDERSCORE_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{2,}").unwrap());
static HEX_COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").unwrap());
static LENGTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(-?[0-9]+(?:\.[0-9]+)?)\s*(px|%|rem|em)?$").unwrap());

/// Normalize arbitrary text into the internal-id grammar: lowercase letters,
/// digits, `-`/`_`, starting with a letter. Total and idempotent; empty
/// input degrades to `"field"`.
pub fn sanitize_identifier(input: &str) -> String {
    sanitize_with(input, '-', &ID_DISALLOWED_RE, &DASH_RUN_RE, "f-")
}

/// Same shape as [`sanitize_identifier`] with `_` as the separator, for the
/// HTML-safe field-name namespace.
pub fn sanitize_name(input: &str) -> String {
    sanitize_with(input, '_', &NAME_DISALLOWED_RE, &UNDERSCORE_RUN_RE, "f_")
}

fn sanitize_with(
    input: &str,
    separator: char,
    disallowed: &Regex,
    runs: &Regex,
    prefix: &str,
) -> String {
    let sep = separator.to_string();
    let lowered = input.trim().to_ascii_lowercase();
    let collapsed = WHITESPACE_RE.replace_all(&lowered, sep.as_str());
    let replaced = disallowed.replace_all(&collapsed, sep.as_str());
    let collapsed = runs.replace_all(&replaced, sep.as_str());
    let stripped = collapsed.trim_matches(|c| c == '-' || c == '_');
    let base = if stripped.is_empty() { "field" } else { stripped };
    if base.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        base.to_string()
    } else {
        format!("{prefix}{base}")
    }
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Attribute-context variant; same minimal entity set.
pub fn escape_attr(input: &str) -> String {
    escape_html(input)
}

/// Lenient boolean coercion for loosely-typed attribute values. Booleans pass
/// through, truthy strings are `"true" | "1" | "yes" | "on"` (any case),
/// numbers are nonzero-true; missing, null, or empty falls back to `default`.
pub fn coerce_boolean(value: Option<&Value>, default: bool) -> bool {
    match value {
        None | Some(Value::Null) => default,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(default),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return default;
            }
            matches!(
                trimmed.to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "on"
            )
        }
        Some(_) => default,
    }
}

pub fn parse_percent(input: &str, fallback: f64) -> f64 {
    let trimmed = input.trim().trim_end_matches('%').trim();
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => fallback,
    }
}

pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if max < min {
        return min;
    }
    value.max(min).min(max)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LengthUnit {
    Px,
    Percent,
    Rem,
    Em,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Length {
    pub value: f64,
    pub unit: LengthUnit,
}

/// Parse a CSS-ish length (`120px`, `30%`, `2rem`, bare number = px). Anything
/// unparseable becomes `fallback_px` pixels.
pub fn parse_length(input: &str, fallback_px: f64) -> Length {
    if let Some(caps) = LENGTH_RE.captures(input.trim()) {
        if let Ok(value) = caps[1].parse::<f64>() {
            if value.is_finite() {
                let unit = match caps.get(2).map(|m| m.as_str()) {
                    Some("%") => LengthUnit::Percent,
                    Some("rem") => LengthUnit::Rem,
                    Some("em") => LengthUnit::Em,
                    _ => LengthUnit::Px,
                };
                return Length { value, unit };
            }
        }
    }
    Length {
        value: fallback_px,
        unit: LengthUnit::Px,
    }
}

pub fn parse_hex_color(input: &str, fallback: &str) -> String {
    let trimmed = input.trim();
    if HEX_COLOR_RE.is_match(trimmed) {
        trimmed.to_string()
    } else {
        fallback.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifier_grammar() {
        assert_eq!(sanitize_identifier("  My  Field! "), "my-field");
        assert_eq!(sanitize_identifier("--hello--"), "hello");
        assert_eq!(sanitize_identifier(""), "field");
        assert_eq!(sanitize_identifier("   "), "field");
        assert_eq!(sanitize_identifier("123abc"), "f-123abc");
        assert_eq!(sanitize_identifier("a---b"), "a-b");
    }

    #[test]
    fn identifier_is_idempotent() {
        for input in ["  My  Field! ", "123", "", "é@#", "a_b-c", "-9-"] {
            let once = sanitize_identifier(input);
            assert_eq!(sanitize_identifier(&once), once, "input: {input:?}");
            assert!(
                once.chars().next().unwrap().is_ascii_alphabetic(),
                "input: {input:?} -> {once}"
            );
        }
    }

    #[test]
    fn name_grammar_uses_underscores() {
        assert_eq!(sanitize_name("First Name"), "first_name");
        assert_eq!(sanitize_name("e-mail"), "e_mail");
        assert_eq!(sanitize_name("42"), "f_42");
        assert_eq!(sanitize_name("___"), "field");
        let once = sanitize_name("First Name");
        assert_eq!(sanitize_name(&once), once);
    }

    #[test]
    fn html_escaping() {
        assert_eq!(
            escape_html("<a href=\"x\">&'</a>"),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn boolean_coercion() {
        assert!(coerce_boolean(Some(&json!(true)), false));
        assert!(coerce_boolean(Some(&json!("Yes")), false));
        assert!(coerce_boolean(Some(&json!("1")), false));
        assert!(coerce_boolean(Some(&json!("on")), false));
        assert!(!coerce_boolean(Some(&json!("off")), true));
        assert!(coerce_boolean(Some(&json!("")), true));
        assert!(coerce_boolean(None, true));
        assert!(!coerce_boolean(Some(&json!(0)), true));
    }

    #[test]
    fn percent_and_clamp() {
        assert_eq!(parse_percent("25%", 0.0), 25.0);
        assert_eq!(parse_percent(" 33.4 ", 0.0), 33.4);
        assert_eq!(parse_percent("oops", 50.0), 50.0);
        assert_eq!(clamp(5.0, 0.0, 3.0), 3.0);
        assert_eq!(clamp(-1.0, 0.0, 3.0), 0.0);
    }

    #[test]
    fn lengths() {
        assert_eq!(
            parse_length("120px", 0.0),
            Length { value: 120.0, unit: LengthUnit::Px }
        );
        assert_eq!(
            parse_length("30%", 0.0),
            Length { value: 30.0, unit: LengthUnit::Percent }
        );
        assert_eq!(
            parse_length("2rem", 0.0),
            Length { value: 2.0, unit: LengthUnit::Rem }
        );
        assert_eq!(
            parse_length("80", 0.0),
            Length { value: 80.0, unit: LengthUnit::Px }
        );
        assert_eq!(
            parse_length("wide", 64.0),
            Length { value: 64.0, unit: LengthUnit::Px }
        );
    }

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex_color("#fff", "#000000"), "#fff");
        assert_eq!(parse_hex_color("#A1B2C3", "#000000"), "#A1B2C3");
        assert_eq!(parse_hex_color("red", "#000000"), "#000000");
        assert_eq!(parse_hex_color("#12345", "#000000"), "#000000");
    }
}
