//! Line-oriented grammar for the step listing returned by the AI service.
//!
//! ```text
//! RESUME: optional summary, may span
//!   several lines
//! ---
//! TITRE: Open menu
//! DESC: Click File
//! TIME: [00:05]
//! ---
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::timestamp::normalize;
use super::{ParseResult, StepRecord};

/// Block delimiter
pub const SEPARATOR: &str = "---";

/// Summary used when the response has no RESUME block
pub const DEFAULT_SUMMARY: &str = "No summary produced.";

static LABEL_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(TITRE|DESC|TIME|RESUME|RÉSUMÉ)\s*:(.*)$").expect("label pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Title,
    Description,
    Time,
    Summary,
}

impl Label {
    fn from_token(token: &str) -> Option<Self> {
        match token.to_uppercase().as_str() {
            "TITRE" => Some(Label::Title),
            "DESC" => Some(Label::Description),
            "TIME" => Some(Label::Time),
            "RESUME" | "RÉSUMÉ" => Some(Label::Summary),
            _ => None,
        }
    }
}

/// One tokenized line of a block
#[derive(Debug)]
struct Token<'a> {
    line: &'a str,
    field: Option<(Label, &'a str)>,
}

impl<'a> Token<'a> {
    fn lex(line: &'a str) -> Self {
        let field = LABEL_LINE.captures(line).and_then(|caps| {
            let label = Label::from_token(caps.get(1)?.as_str())?;
            Some((label, caps.get(2)?.as_str()))
        });
        Token { line, field }
    }
}

/// Named fields found in one block, first occurrence wins
#[derive(Debug, Default)]
struct Fields<'a> {
    title: Option<&'a str>,
    description: Option<&'a str>,
    time: Option<&'a str>,
}

impl<'a> Fields<'a> {
    fn collect(tokens: &[Token<'a>]) -> Self {
        let mut fields = Fields::default();
        for token in tokens {
            if let Some((label, value)) = token.field {
                let slot = match label {
                    Label::Title => &mut fields.title,
                    Label::Description => &mut fields.description,
                    Label::Time => &mut fields.time,
                    Label::Summary => continue,
                };
                if slot.is_none() {
                    *slot = Some(value.trim());
                }
            }
        }
        fields
    }

    /// The only place the "title and time are mandatory" rule lives
    fn into_step(self) -> Option<StepRecord> {
        let title = self.title.filter(|t| !t.is_empty())?;
        let time = self.time.map(normalize).filter(|t| !t.is_empty())?;
        Some(StepRecord::new(title, self.description.unwrap_or(""), time))
    }
}

fn tokenize(block: &str) -> Vec<Token<'_>> {
    block.lines().map(Token::lex).collect()
}

/// Text after the RESUME label up to the end of the block
fn extract_summary(tokens: &[Token<'_>]) -> Option<String> {
    let start = tokens
        .iter()
        .position(|t| matches!(t.field, Some((Label::Summary, _))))?;

    let first = tokens[start].field.map(|(_, value)| value).unwrap_or_default();
    let text = std::iter::once(first)
        .chain(tokens[start + 1..].iter().map(|t| t.line))
        .collect::<Vec<_>>()
        .join("\n");

    Some(text.trim().to_string())
}

/// Parse a raw AI response into its summary and ordered steps.
///
/// Blocks lacking a title or a time are dropped without error. Only the first
/// block may carry the summary.
pub fn parse(raw_text: &str) -> ParseResult {
    let mut summary = None;
    let mut steps = Vec::new();

    for (index, block) in raw_text.split(SEPARATOR).enumerate() {
        let tokens = tokenize(block);

        if index == 0 {
            if let Some(text) = extract_summary(&tokens) {
                summary = Some(text).filter(|s| !s.is_empty());
                continue;
            }
        }

        match Fields::collect(&tokens).into_step() {
            Some(step) => steps.push(step),
            None if block.trim().is_empty() => {}
            None => debug!("Skipping block {} without title/time", index),
        }
    }

    debug!("Parsed {} steps from {} chars", steps.len(), raw_text.len());

    ParseResult {
        summary: summary.unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
        steps,
    }
}
