//! Schema-node paths used to describe config fragments.
//!
//! A path such as
//! `/ocif:interfaces/ocif:interface[ocif:name="Gi1"]/ocif:config/ocif:mtu`
//! is split into [`Step`]s; list entries are addressed with key predicates.
//! Positional predicates and other XPath axes are rejected.

use once_cell::sync::Lazy;
use regex::Regex;

use super::RpcInputError;

static QNAME: Lazy<Regex> = Lazy::new(|| {
    match Regex::new(r"^(?:([A-Za-z_][A-Za-z0-9_.\-]*):)?([A-Za-z_][A-Za-z0-9_.\-]*)$") {
        Ok(re) => re,
        Err(err) => panic!("invalid QNAME regex: {err}"),
    }
});

static KEY_PREDICATE: Lazy<Regex> = Lazy::new(|| {
    match Regex::new(
        r#"^\s*(?:([A-Za-z_][A-Za-z0-9_.\-]*):)?([A-Za-z_][A-Za-z0-9_.\-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')\s*$"#,
    ) {
        Ok(re) => re,
        Err(err) => panic!("invalid KEY_PREDICATE regex: {err}"),
    }
});

/// One node along a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub prefix: Option<String>,
    pub name: String,
    pub keys: Vec<KeyPredicate>,
}

/// A `[name="value"]` list-key predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPredicate {
    pub prefix: Option<String>,
    pub name: String,
    pub value: String,
}

fn invalid(xpath: &str, rule: impl Into<String>) -> RpcInputError {
    RpcInputError::new("xpath", xpath, rule)
}

/// Splits an absolute path into steps.
pub fn parse(xpath: &str) -> Result<Vec<Step>, RpcInputError> {
    if !xpath.starts_with('/') {
        return Err(invalid(xpath, "must start with '/'"));
    }

    let chars: Vec<char> = xpath.chars().collect();
    let mut steps = Vec::new();
    let mut pos = 1;

    loop {
        let start = pos;
        while pos < chars.len() && chars[pos] != '/' && chars[pos] != '[' {
            pos += 1;
        }
        let name: String = chars[start..pos].iter().collect();
        if name.is_empty() {
            return Err(invalid(xpath, "contains an empty node name"));
        }
        let caps = QNAME
            .captures(&name)
            .ok_or_else(|| invalid(xpath, format!("'{name}' is not a valid node name")))?;
        let mut step = Step {
            prefix: caps.get(1).map(|m| m.as_str().to_string()),
            name: caps[2].to_string(),
            keys: Vec::new(),
        };

        while pos < chars.len() && chars[pos] == '[' {
            let close = find_predicate_end(&chars, pos)
                .ok_or_else(|| invalid(xpath, "has an unterminated '[' predicate"))?;
            let body: String = chars[pos + 1..close].iter().collect();
            step.keys.push(parse_predicate(xpath, &body)?);
            pos = close + 1;
        }
        steps.push(step);

        if pos >= chars.len() {
            break;
        }
        if chars[pos] != '/' {
            return Err(invalid(
                xpath,
                format!("unexpected character '{}' after predicate", chars[pos]),
            ));
        }
        pos += 1;
    }

    Ok(steps)
}

/// Index of the `]` closing the predicate opened at `open`, skipping quoted
/// text.
fn find_predicate_end(chars: &[char], open: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (idx, c) in chars.iter().enumerate().skip(open + 1) {
        match (quote, *c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(*c),
            (None, ']') => return Some(idx),
            (None, '[') => return None,
            _ => {}
        }
    }
    None
}

fn parse_predicate(xpath: &str, body: &str) -> Result<KeyPredicate, RpcInputError> {
    let caps = KEY_PREDICATE.captures(body).ok_or_else(|| {
        invalid(
            xpath,
            format!("predicate [{body}] must have the form [name=\"value\"]"),
        )
    })?;
    let value = caps
        .get(3)
        .or_else(|| caps.get(4))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    Ok(KeyPredicate {
        prefix: caps.get(1).map(|m| m.as_str().to_string()),
        name: caps[2].to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_steps_with_keys() {
        let steps =
            parse(r#"/ocif:interfaces/ocif:interface[ocif:name="Gi1/0/1"]/ocif:config/ocif:mtu"#)
                .expect("valid path");
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[1].name, "interface");
        assert_eq!(steps[1].keys.len(), 1);
        assert_eq!(steps[1].keys[0].name, "name");
        assert_eq!(steps[1].keys[0].value, "Gi1/0/1");
        assert_eq!(steps[3].prefix.as_deref(), Some("ocif"));
    }

    #[test]
    fn single_quotes_and_multiple_keys() {
        let steps = parse("/a:routes/a:route[a:prefix='10.0.0.0/8'][vrf='blue']").expect("valid");
        assert_eq!(steps[1].keys.len(), 2);
        assert_eq!(steps[1].keys[1].prefix, None);
        assert_eq!(steps[1].keys[1].value, "blue");
    }

    #[test]
    fn relative_path_names_the_rule() {
        let err = parse("foo/").expect_err("relative path");
        assert_eq!(err.to_string(), "Invalid xpath:\nfoo/\n  must start with '/'");
    }

    #[test]
    fn trailing_slash_is_rejected() {
        let err = parse("/a:b/").expect_err("trailing slash");
        assert!(err.rule.contains("empty node name"));
    }

    #[test]
    fn positional_predicate_is_rejected() {
        let err = parse("/a:b[1]").expect_err("positional");
        assert!(err.rule.contains("must have the form"));
    }

    #[test]
    fn unterminated_predicate_is_rejected() {
        let err = parse("/a:b[a:c='x'").expect_err("unterminated");
        assert!(err.rule.contains("unterminated"));
    }
}
