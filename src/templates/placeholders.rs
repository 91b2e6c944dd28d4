use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::warn;

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^}]+)\}").expect("placeholder pattern is valid"));

/// Placeholder names in `template`, deduplicated, in first-seen order.
///
/// A placeholder is `{` followed by one or more characters other than `}` and
/// then `}`. An unmatched `{` is ignored.
pub fn extract_variables(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER_RE.captures_iter(template) {
        let name = &caps[1];
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Replaces every `{key}` for each key of `values`.
///
/// Substitution is a single left-to-right pass over `template`: text coming
/// from a value is never scanned again, so a value containing `{other}` stays
/// literal. Names without a value are left in place.
pub fn replace_variables(template: &str, values: &HashMap<String, String>) -> String {
    if values.is_empty() {
        return template.to_string();
    }

    let mut keys: Vec<&String> = values.keys().collect();
    // Longest first so a key that extends another wins at the same offset.
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let alternation = keys
        .iter()
        .map(|key| regex::escape(key))
        .collect::<Vec<_>>()
        .join("|");

    let matcher = match Regex::new(&format!(r"\{{(?:{alternation})\}}")) {
        Ok(matcher) => matcher,
        Err(err) => {
            warn!("Falling back to sequential substitution: {err}");
            return values.iter().fold(template.to_string(), |acc, (key, value)| {
                acc.replace(&format!("{{{key}}}"), value)
            });
        }
    };

    matcher
        .replace_all(template, |caps: &Captures| {
            let whole = &caps[0];
            let key = &whole[1..whole.len() - 1];
            values.get(key).cloned().unwrap_or_else(|| whole.to_string())
        })
        .into_owned()
}

/// Names referenced by `template` that `values` does not cover.
pub fn unresolved_variables(template: &str, values: &HashMap<String, String>) -> Vec<String> {
    extract_variables(template)
        .into_iter()
        .filter(|name| !values.contains_key(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn extracts_in_first_seen_order_without_duplicates() {
        let names = extract_variables("{name} is {age}. {name} likes {hobby} and {age}.");
        assert_eq!(names, vec!["name", "age", "hobby"]);
    }

    #[test]
    fn malformed_placeholders_are_not_matched() {
        assert!(extract_variables("empty {} and unclosed {tail").is_empty());
        assert_eq!(extract_variables("{a{b} c}"), vec!["a{b"]);
        assert_eq!(extract_variables("{ spaced name }"), vec![" spaced name "]);
    }

    #[test]
    fn unknown_names_remain_literal() {
        let out = replace_variables("Hi {name}, meet {friend}.", &values(&[("name", "Ava")]));
        assert_eq!(out, "Hi Ava, meet {friend}.");
    }

    #[test]
    fn every_occurrence_is_replaced() {
        let out = replace_variables("{x}-{x}-{x}", &values(&[("x", "1")]));
        assert_eq!(out, "1-1-1");
    }

    #[test]
    fn substituted_text_is_not_substituted_again() {
        let out = replace_variables(
            "{first} and {second}",
            &values(&[("first", "{second}"), ("second", "B")]),
        );
        assert_eq!(out, "{second} and B");
    }

    #[test]
    fn regex_metacharacters_in_names_are_literal() {
        let out = replace_variables("{a.b} {a+b}", &values(&[("a.b", "dot"), ("a+b", "plus")]));
        assert_eq!(out, "dot plus");
    }

    #[test]
    fn nested_braces_still_resolve_inner_placeholder() {
        let out = replace_variables("{{name}}", &values(&[("name", "Ava")]));
        assert_eq!(out, "{Ava}");
    }

    #[test]
    fn longer_key_wins_at_same_offset() {
        let out = replace_variables("{a}b}", &values(&[("a", "1"), ("a}b", "2")]));
        assert_eq!(out, "2");
    }

    #[test]
    fn reports_unresolved_names() {
        let missing = unresolved_variables("{a} {b} {c}", &values(&[("b", "x")]));
        assert_eq!(missing, vec!["a", "c"]);
    }

    proptest! {
        #[test]
        fn extracted_names_are_unique(template in "[a-c{} ]{0,40}") {
            let names = extract_variables(&template);
            for (i, name) in names.iter().enumerate() {
                prop_assert!(!names[i + 1..].contains(name));
                let placeholder = format!("{{{name}}}");
                prop_assert!(template.contains(&placeholder));
            }
        }

        #[test]
        fn substituted_keys_leave_no_placeholder(
            template in "[ab{} xy]{0,40}",
            a in "[xy]{1,5}",
            b in "[xy]{1,5}",
        ) {
            let map = values(&[("a", a.as_str()), ("b", b.as_str())]);
            let out = replace_variables(&template, &map);
            let (a_placeholder, b_placeholder) = ("{a}", "{b}");
            prop_assert!(!out.contains(a_placeholder));
            prop_assert!(!out.contains(b_placeholder));
        }
    }
}
