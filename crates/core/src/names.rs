//! Best-effort candidate name detection from the top of a resume.
//!
//! Names almost always sit in the first handful of lines, so only those are
//! inspected. The rules are ordered and the first match wins; see
//! [`NameHeuristic::guess`].

use crate::error::IngestError;
use crate::models::UNKNOWN_CANDIDATE;
use regex::Regex;

const SCAN_LINES: usize = 10;
const FALLBACK_LINES: usize = 5;
const FALLBACK_MAX_CHARS: usize = 50;
const HEADER_MAX_WORDS: usize = 4;

const HEADER_WORDS: [&str; 10] = [
    "resume",
    "cv",
    "curriculum",
    "contact",
    "email",
    "phone",
    "address",
    "linkedin",
    "objective",
    "summary",
];

#[derive(Debug, Clone)]
pub struct NameHeuristic {
    all_caps: Regex,
    capitalized_pair: Regex,
    resume_of: Regex,
}

impl NameHeuristic {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            all_caps: Regex::new(r"^[A-Z\s]{4,30}$")?,
            capitalized_pair: Regex::new(r"^[A-Z][a-z]+\s+[A-Z][a-z]+")?,
            resume_of: Regex::new(r"(?i)resume of\s*")?,
        })
    }

    /// Returns the display name for `text`, or `"Unknown"`.
    pub fn guess(&self, text: &str) -> String {
        let lines: Vec<&str> = text
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        for line in lines.iter().take(SCAN_LINES) {
            if let Some(name) = self.match_line(line) {
                return name;
            }
        }

        lines
            .iter()
            .take(FALLBACK_LINES)
            .find(|line| {
                let words = word_count(line);
                (2..=4).contains(&words) && line.chars().count() < FALLBACK_MAX_CHARS
            })
            .map(|line| title_case(line))
            .unwrap_or_else(|| UNKNOWN_CANDIDATE.to_string())
    }

    fn match_line(&self, line: &str) -> Option<String> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let lowered = line.to_lowercase();

        let looks_like_header = HEADER_WORDS.iter().any(|word| lowered.contains(word));
        if looks_like_header && words.len() > HEADER_MAX_WORDS {
            return None;
        }

        if self.all_caps.is_match(line) && (2..=4).contains(&words.len()) {
            return Some(title_case(line));
        }

        if self.capitalized_pair.is_match(line)
            && (2..=4).contains(&words.len())
            && words.iter().take(2).all(|word| word.chars().count() > 1)
        {
            return Some(words.iter().take(3).copied().collect::<Vec<_>>().join(" "));
        }

        if lowered.contains("resume of") {
            let remainder = self.resume_of.replace_all(line, "");
            let remainder = remainder.trim();
            if !remainder.is_empty() {
                return Some(title_case(remainder));
            }
        }

        None
    }
}

fn word_count(line: &str) -> usize {
    line.split_whitespace().count()
}

/// Upper-cases the first letter of every run of letters and lower-cases the rest.
pub fn title_case(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut previous_cased = false;

    for ch in text.chars() {
        let cased = ch.is_lowercase() || ch.is_uppercase();
        if cased && !previous_cased {
            output.extend(ch.to_uppercase());
        } else if cased {
            output.extend(ch.to_lowercase());
        } else {
            output.push(ch);
        }
        previous_cased = cased;
    }

    output
}
