// src/bindings/substitute.rs

//! `$NAME` substitution inside script text.
//!
//! Only names present in the variable map are replaced; any other `$...`
//! sequence is left as written, so regular Perl variables survive.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("variable pattern is a valid regex")
    })
}

/// Replace `$NAME` occurrences with `variables[NAME]`.
pub fn substitute_variables<'a>(
    script: &'a str,
    variables: &BTreeMap<String, String>,
) -> Cow<'a, str> {
    if variables.is_empty() {
        return Cow::Borrowed(script);
    }

    variable_pattern().replace_all(script, |caps: &Captures<'_>| match variables.get(&caps[1]) {
        Some(value) => value.clone(),
        None => caps[0].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> BTreeMap<String, String> {
        let mut m = BTreeMap::new();
        m.insert("name".to_string(), "EchoUbuntu".to_string());
        m.insert("key".to_string(), "value".to_string());
        m.insert("greetings".to_string(), "Hello World".to_string());
        m
    }

    #[test]
    fn replaces_known_variables() {
        let script = "$name:\n    image: $key\n    command: echo \"$greetings\"";
        let out = substitute_variables(script, &vars());
        assert_eq!(
            out,
            "EchoUbuntu:\n    image: value\n    command: echo \"Hello World\""
        );
    }

    #[test]
    fn leaves_unknown_variables_alone() {
        let out = substitute_variables("my $x = $key; print $];", &vars());
        assert_eq!(out, "my $x = value; print $];");
    }

    #[test]
    fn empty_map_borrows_input() {
        let script = "print $name;";
        let out = substitute_variables(script, &BTreeMap::new());
        assert!(matches!(out, Cow::Borrowed(_)));
    }
}
