// src/command/shell.rs

//! Shell quoting and `$NAME$` placeholder substitution.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::errors::{ProcpoolError, Result};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z0-9_-]+)\$").expect("placeholder regex is valid"));

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '=' | ':' | ',' | '+' | '@' | '%')
}

/// Quote `s` for POSIX `sh`, leaving plain words untouched.
pub fn quote(s: &str) -> Cow<'_, str> {
    if !s.is_empty() && s.chars().all(is_safe) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    Cow::Owned(out)
}

/// Replace every `$NAME$` in `line` with its binding, verbatim.
pub fn substitute_variables(line: &str, variables: &BTreeMap<String, String>) -> Result<String> {
    let mut missing: Option<String> = None;
    let out = PLACEHOLDER.replace_all(line, |caps: &Captures<'_>| {
        let name = &caps[1];
        match variables.get(name) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                caps[0].to_string()
            }
        }
    });

    match missing {
        Some(name) => Err(ProcpoolError::UnresolvedVariable(name)),
        None => Ok(out.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_leaves_plain_words() {
        assert_eq!(quote("hello"), "hello");
        assert_eq!(quote("/usr/bin/env"), "/usr/bin/env");
        assert_eq!(quote("--flag=a,b"), "--flag=a,b");
    }

    #[test]
    fn quote_wraps_special_characters() {
        assert_eq!(quote(""), "''");
        assert_eq!(quote("a b"), "'a b'");
        assert_eq!(quote("it's"), "'it'\\''s'");
        assert_eq!(quote("$HOME"), "'$HOME'");
    }

    #[test]
    fn substitutes_known_variables() {
        let mut vars = BTreeMap::new();
        vars.insert("VALUE".to_string(), "a".to_string());
        vars.insert("OK-1".to_string(), "42".to_string());
        let out = substitute_variables("echo '$VALUE$' $OK-1$", &vars).unwrap();
        assert_eq!(out, "echo 'a' 42");
    }

    #[test]
    fn unresolved_variable_is_an_error() {
        let err = substitute_variables("echo $NOPE$", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ProcpoolError::UnresolvedVariable(name) if name == "NOPE"));
    }

    #[test]
    fn single_dollar_is_left_alone() {
        let out = substitute_variables("echo $HOME and $?", &BTreeMap::new()).unwrap();
        assert_eq!(out, "echo $HOME and $?");
    }
}
