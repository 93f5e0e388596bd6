//! Parsing free-text completions into structured assistant fields.
//!
//! The model is asked to answer with `Answer:`, `Related topics:`,
//! `Confidence:` and `Suggestions:` line prefixes. Models decorate those
//! lines freely (bullets, numbering, bold), so prefixes are matched after
//! stripping that decoration and ignoring case.

/// Confidence used when the reply has none or it does not parse.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Upper bound on suggestions returned by [`parse_suggestions`].
pub const MAX_SUGGESTIONS: usize = 5;

/// Structured view of an answer completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    pub answer: String,
    pub suggestions: Vec<String>,
    pub related_topics: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Answer,
    Topics,
    Confidence,
    Suggestions,
}

/// Longer labels first so `confidence level` wins over `confidence`.
const LABELS: [(&str, Section); 5] = [
    ("answer", Section::Answer),
    ("related topics", Section::Topics),
    ("confidence level", Section::Confidence),
    ("confidence", Section::Confidence),
    ("suggestions", Section::Suggestions),
];

/// Parse an answer completion.
pub fn parse_reply(reply: &str) -> ParsedReply {
    let mut answer_lines: Vec<&str> = Vec::new();
    let mut saw_answer = false;
    let mut related_topics = Vec::new();
    let mut confidence = None;
    let mut suggestions = Vec::new();
    let mut section = None;

    for line in reply.lines() {
        if let Some((label, rest)) = match_label(line) {
            section = Some(label);
            match label {
                Section::Answer => {
                    saw_answer = true;
                    if !rest.is_empty() {
                        answer_lines.push(rest);
                    }
                }
                Section::Topics => related_topics.extend(split_topics(rest)),
                Section::Confidence => {
                    if confidence.is_none() {
                        confidence = parse_confidence(rest);
                    }
                }
                Section::Suggestions => {
                    if !rest.is_empty() {
                        suggestions.push(rest.to_string());
                    }
                }
            }
            continue;
        }

        match section {
            Some(Section::Answer) => answer_lines.push(line.trim_end()),
            Some(Section::Topics) => {
                if let Some(item) = list_item(line) {
                    related_topics.extend(split_topics(item));
                }
            }
            Some(Section::Suggestions) => {
                if let Some(item) = list_item(line) {
                    suggestions.push(item.to_string());
                }
            }
            _ => {}
        }
    }

    let answer = if saw_answer {
        answer_lines.join("\n").trim().to_string()
    } else {
        reply.trim().to_string()
    };

    ParsedReply {
        answer,
        suggestions,
        related_topics,
        confidence: confidence.unwrap_or(DEFAULT_CONFIDENCE),
    }
}

/// Parse a suggestions-only completion: one suggestion per non-empty line.
pub fn parse_suggestions(reply: &str) -> Vec<String> {
    reply
        .lines()
        .filter_map(|line| match match_label(line) {
            Some((Section::Suggestions, rest)) => Some(rest),
            Some(_) => None,
            None => Some(list_item(line).unwrap_or_else(|| line.trim())),
        })
        .map(|s| s.trim_matches(|c| c == '*' || c == '_').trim())
        .filter(|s| !s.is_empty())
        .take(MAX_SUGGESTIONS)
        .map(String::from)
        .collect()
}

/// The text after a bullet (`-`, `*`, `•`, `+`) or numbering (`1.`, `2)`).
fn list_item(line: &str) -> Option<&str> {
    let trimmed = line.trim();

    for bullet in ['-', '*', '•', '+'] {
        if let Some(rest) = trimmed.strip_prefix(bullet) {
            if rest.starts_with(char::is_whitespace) {
                return Some(rest.trim());
            }
        }
    }

    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &trimmed[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return Some(rest.trim());
        }
    }

    None
}

/// Recognize a section label and return the text after its colon.
fn match_label(line: &str) -> Option<(Section, &str)> {
    let trimmed = line.trim();
    let body = list_item(trimmed)
        .unwrap_or(trimmed)
        .trim_start_matches(['*', '_', '#'])
        .trim_start();

    for (label, section) in LABELS {
        let Some(head) = body.get(..label.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(label) {
            continue;
        }
        let after = body[label.len()..].trim_start_matches(['*', '_']);
        if let Some(rest) = after.strip_prefix(':') {
            return Some((section, rest.trim_start_matches(['*', '_']).trim()));
        }
    }
    None
}

fn split_topics(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(',')
        .map(|t| t.trim().trim_end_matches('.').trim())
        .filter(|t| !t.is_empty())
        .map(String::from)
}

/// Parse `0.8`, `85%` or `0.9/1`-style values, clamped to `[0, 1]`.
fn parse_confidence(text: &str) -> Option<f64> {
    let token = text
        .split_whitespace()
        .next()?
        .trim_end_matches(['.', ',', ')', '*']);

    let value = match token.split_once('/') {
        Some((numerator, denominator)) => {
            let denominator = parse_number(denominator)?;
            if denominator == 0.0 {
                return None;
            }
            parse_number(numerator)? / denominator
        }
        None => match token.strip_suffix('%') {
            Some(percent) => parse_number(percent)? / 100.0,
            None => parse_number(token)?,
        },
    };
    Some(value.clamp(0.0, 1.0))
}

fn parse_number(text: &str) -> Option<f64> {
    let value: f64 = text.parse().ok()?;
    value.is_finite().then_some(value)
}
