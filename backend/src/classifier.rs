//! Line classification
//!
//! Decides whether a line of a scripture document is a delimiter, a section
//! heading (PHẨM / PHẦN / CHƯƠNG), a sub-scripture heading (KINH) or plain
//! content. The rules are tried in list order and the first match wins, so a
//! line which could be read both as a section and a sub-scripture heading is
//! always a section heading.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::types::{Classification, SectionKind};

lazy_static! {
    /// "---o0o---", "--- O0O ---", "o0o"
    static ref RE_DELIMITER: Regex = Regex::new(r"(?i)^-*\s*o\s*0\s*o\s*-*$").unwrap();

    /// "PHẨM IV: Tên", "PHẦN 2", "CHƯƠNG THỨ XII. Tên", "3. PHẨM II: Tên"
    static ref RE_SECTION_KEYWORD_FIRST: Regex = Regex::new(
        r"(?i)^(?:\d{1,3}\.\s*)?(PHẨM|PHẦN|CHƯƠNG)\s+(?:THỨ\s+)?([IVXLCDM]+\b|\d+\b)\s*(?:[:.]\s*)?(.*)$"
    ).unwrap();

    /// "PHẨM MỞ ĐẦU", "CHƯƠNG THỨ MỘT". Keyword upper case only, so prose
    /// like "Phần lớn..." stays content.
    static ref RE_SECTION_WORD_TOKEN: Regex = Regex::new(
        r"^(PHẨM|PHẦN|CHƯƠNG)\s+(?:THỨ\s+)?(\p{Lu}[\p{Lu}\p{Ll}]*)\s*(?:[:.]\s*)?(.*)$"
    ).unwrap();

    /// "3. PHẨM Tên"
    static ref RE_SECTION_ORDINAL_FIRST: Regex = Regex::new(
        r"(?i)^(\d{1,3})\.\s*(PHẨM|PHẦN|CHƯƠNG)\s+(.+)$"
    ).unwrap();

    /// "1. KINH Alpha"
    static ref RE_SUB_NUMBERED: Regex = Regex::new(r"(?i)^(\d{1,3})\.\s*KINH\s+(.+)$").unwrap();

    /// "KINH Phạm Võng". Upper case only, prose lines often start with "Kinh".
    static ref RE_SUB_KEYWORD: Regex = Regex::new(r"^KINH\s+(.+)$").unwrap();

    /// "12. Tên" or "12 Tên"
    static ref RE_SUB_PERMISSIVE: Regex = Regex::new(r"^(\d+)(?:\.|\s)\s*(.+)$").unwrap();
}

/// True if the whole trimmed line is a delimiter marker.
pub fn is_delimiter(text: &str) -> bool {
    RE_DELIMITER.is_match(text.trim())
}

type MatchFn = fn(&str) -> Option<Classification>;

/// One named pattern matcher
#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    matcher: MatchFn,
}

impl Rule {
    pub fn apply(&self, text: &str) -> Option<Classification> {
        (self.matcher)(text)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish()
    }
}

fn non_empty(m: Option<regex::Match<'_>>) -> Option<String> {
    m.map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn section_kind(caps: &Captures<'_>, idx: usize) -> Option<SectionKind> {
    caps.get(idx).and_then(|m| SectionKind::from_keyword(m.as_str()))
}

fn match_delimiter(text: &str) -> Option<Classification> {
    if is_delimiter(text) {
        Some(Classification::Delimiter)
    } else {
        None
    }
}

fn match_section_keyword_first(text: &str) -> Option<Classification> {
    let caps = RE_SECTION_KEYWORD_FIRST.captures(text)?;
    Some(Classification::SectionHeader {
        kind: section_kind(&caps, 1)?,
        number: caps[2].to_string(),
        title: non_empty(caps.get(3)),
        text: text.to_string(),
    })
}

fn match_section_ordinal_first(text: &str) -> Option<Classification> {
    let caps = RE_SECTION_ORDINAL_FIRST.captures(text)?;
    Some(Classification::SectionHeader {
        kind: section_kind(&caps, 2)?,
        number: caps[1].to_string(),
        title: non_empty(caps.get(3)),
        text: text.to_string(),
    })
}

fn match_section_word_token(text: &str) -> Option<Classification> {
    let caps = RE_SECTION_WORD_TOKEN.captures(text)?;
    Some(Classification::SectionHeader {
        kind: section_kind(&caps, 1)?,
        number: caps[2].to_string(),
        title: non_empty(caps.get(3)),
        text: text.to_string(),
    })
}

fn match_sub_numbered(text: &str) -> Option<Classification> {
    let caps = RE_SUB_NUMBERED.captures(text)?;
    Some(Classification::SubHeader {
        number: Some(caps[1].to_string()),
        title: caps[2].trim().to_string(),
        text: text.to_string(),
    })
}

fn match_sub_keyword(text: &str) -> Option<Classification> {
    let caps = RE_SUB_KEYWORD.captures(text)?;
    Some(Classification::SubHeader {
        number: None,
        title: caps[1].trim().to_string(),
        text: text.to_string(),
    })
}

fn match_sub_permissive(text: &str) -> Option<Classification> {
    let caps = RE_SUB_PERMISSIVE.captures(text)?;
    Some(Classification::SubHeader {
        number: Some(caps[1].to_string()),
        title: caps[2].trim().to_string(),
        text: text.to_string(),
    })
}

pub const DELIMITER_RULE: Rule = Rule { name: "delimiter", matcher: match_delimiter };
pub const SECTION_KEYWORD_FIRST_RULE: Rule = Rule { name: "section_keyword_first", matcher: match_section_keyword_first };
pub const SECTION_ORDINAL_FIRST_RULE: Rule = Rule { name: "section_ordinal_first", matcher: match_section_ordinal_first };
pub const SECTION_WORD_TOKEN_RULE: Rule = Rule { name: "section_word_token", matcher: match_section_word_token };
pub const SUB_NUMBERED_RULE: Rule = Rule { name: "sub_numbered", matcher: match_sub_numbered };
pub const SUB_KEYWORD_RULE: Rule = Rule { name: "sub_keyword", matcher: match_sub_keyword };
pub const SUB_PERMISSIVE_RULE: Rule = Rule { name: "sub_permissive", matcher: match_sub_permissive };

/// Ordered list of rules. Precedence is the list order.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Classifier::new(false)
    }
}

impl Classifier {
    /// The standard rule set. With `permissive_sub_headers` any line starting
    /// with digits and a separator is also read as a sub-scripture heading.
    pub fn new(permissive_sub_headers: bool) -> Self {
        let mut rules = vec![
            DELIMITER_RULE,
            SECTION_KEYWORD_FIRST_RULE,
            SECTION_ORDINAL_FIRST_RULE,
            SECTION_WORD_TOKEN_RULE,
            SUB_NUMBERED_RULE,
            SUB_KEYWORD_RULE,
        ];
        if permissive_sub_headers {
            rules.push(SUB_PERMISSIVE_RULE);
        }
        Classifier { rules }
    }

    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Classifier { rules }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }

    pub fn classify(&self, line: &str) -> Classification {
        let text = line.trim();
        self.rules
            .iter()
            .find_map(|rule| rule.apply(text))
            .unwrap_or_else(|| Classification::Content(text.to_string()))
    }
}
