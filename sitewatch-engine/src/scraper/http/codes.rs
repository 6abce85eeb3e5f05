use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One entry of an allowed/blocked status code list: an exact code such as
/// `204` or a class such as `2XX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePattern {
    Exact(u16),
    Class(u16),
}

impl CodePattern {
    pub fn matches(self, code: u16) -> bool {
        match self {
            CodePattern::Exact(expected) => code == expected,
            CodePattern::Class(class) => code / 100 == class,
        }
    }
}

impl FromStr for CodePattern {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let bytes = raw.as_bytes();
        if bytes.len() != 3 || !raw.is_ascii() {
            return Err(format!("status code pattern {raw:?} must have three characters"));
        }
        if raw[1..].eq_ignore_ascii_case("xx") {
            return match bytes[0] {
                digit @ b'1'..=b'5' => Ok(CodePattern::Class(u16::from(digit - b'0'))),
                _ => Err(format!("status code class {raw:?} must start with 1-5")),
            };
        }
        match raw.parse::<u16>() {
            Ok(code) if (100..=599).contains(&code) => Ok(CodePattern::Exact(code)),
            _ => Err(format!("invalid status code pattern {raw:?}")),
        }
    }
}

impl fmt::Display for CodePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodePattern::Exact(code) => write!(f, "{code}"),
            CodePattern::Class(class) => write!(f, "{class}XX"),
        }
    }
}

/// Parsed code list. Written in configuration as a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CodeList(Vec<CodePattern>);

impl CodeList {
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, String> {
        entries
            .iter()
            .map(|entry| entry.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()
            .map(CodeList)
    }

    pub fn matches(&self, code: u16) -> bool {
        self.0.iter().any(|pattern| pattern.matches(code))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn allowed_default() -> Self {
        CodeList(vec![CodePattern::Class(2)])
    }

    pub fn blocked_default() -> Self {
        CodeList(vec![CodePattern::Class(4), CodePattern::Class(5)])
    }
}

impl TryFrom<Vec<String>> for CodeList {
    type Error = String;

    fn try_from(entries: Vec<String>) -> Result<Self, Self::Error> {
        CodeList::parse(&entries)
    }
}

impl From<CodeList> for Vec<String> {
    fn from(list: CodeList) -> Self {
        list.0.iter().map(ToString::to_string).collect()
    }
}

/// Applies the allowed list, then the blocked list, which wins on overlap.
pub fn classify(code: u16, allowed: &CodeList, blocked: &CodeList) -> Result<(), String> {
    if !allowed.matches(code) {
        return Err(format!("status {code} not in allowed codes"));
    }
    if blocked.matches(code) {
        return Err(format!("status {code} is blocked"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(204, &["2XX"], true ; "class matches 204")]
    #[test_case(404, &["4XX", "5XX"], true ; "blocked list matches 404")]
    #[test_case(200, &["4XX", "5XX"], false ; "blocked list skips 200")]
    #[test_case(301, &["301"], true ; "exact code")]
    #[test_case(302, &["301", "2xx"], false ; "neither exact nor class")]
    fn list_matching(code: u16, entries: &[&str], expected: bool) {
        assert_eq!(CodeList::parse(entries).unwrap().matches(code), expected);
    }

    #[test_case("6XX" ; "class out of range")]
    #[test_case("20" ; "too short")]
    #[test_case("abc" ; "not numeric")]
    #[test_case("099" ; "exact out of range")]
    fn rejects_bad_patterns(raw: &str) {
        assert!(raw.parse::<CodePattern>().is_err());
    }

    #[test]
    fn blocked_overrides_allowed() {
        let allowed = CodeList::parse(&["2XX", "5XX"]).unwrap();
        let blocked = CodeList::parse(&["503"]).unwrap();
        assert!(classify(500, &allowed, &blocked).is_ok());
        assert!(classify(503, &allowed, &blocked).is_err());
        assert!(classify(404, &allowed, &blocked).is_err());
    }

    #[test]
    fn decodes_from_strings() {
        let list: CodeList = serde_json::from_str(r#"["2XX", "418"]"#).unwrap();
        assert!(list.matches(418));
        assert!(serde_json::from_str::<CodeList>(r#"["2X"]"#).is_err());
        assert_eq!(
            serde_json::to_string(&CodeList::blocked_default()).unwrap(),
            r#"["4XX","5XX"]"#
        );
    }
}
