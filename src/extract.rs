//! Free-text activity extraction.
//!
//! The text is scanned left to right. At each position the longest keyword
//! from [`KEYWORDS`] wins; a keyword may be followed by a quantity (ASCII or
//! full-width digits) and a unit marker. Matches never overlap.

use crate::models::{ActivityInput, ActivitySource, ActivityType, ExtractedActivity};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keyword {
    pub text: &'static str,
    pub kind: ActivityType,
}

pub const KEYWORDS: &[Keyword] = &[
    Keyword { text: "散歩", kind: ActivityType::Walk },
    Keyword { text: "おさんぽ", kind: ActivityType::Walk },
    Keyword { text: "さんぽ", kind: ActivityType::Walk },
    Keyword { text: "ウォーク", kind: ActivityType::Walk },
    Keyword { text: "walking", kind: ActivityType::Walk },
    Keyword { text: "walk", kind: ActivityType::Walk },
    Keyword { text: "遊び", kind: ActivityType::Play },
    Keyword { text: "あそび", kind: ActivityType::Play },
    Keyword { text: "play", kind: ActivityType::Play },
    Keyword { text: "おやつ", kind: ActivityType::Treat },
    Keyword { text: "treats", kind: ActivityType::Treat },
    Keyword { text: "treat", kind: ActivityType::Treat },
    Keyword { text: "ケア", kind: ActivityType::Care },
];

// Longest first so "minutes" is not cut short at "min".
const UNIT_MARKERS: &[&str] = &["minutes", "mins", "min", "分", "回"];

pub fn extract_activities(text: &str) -> Vec<ExtractedActivity> {
    let mut found = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        let rest = &text[pos..];
        let Some(keyword) = match_keyword(rest) else {
            pos += rest.chars().next().map_or(1, char::len_utf8);
            continue;
        };

        let mut cursor = pos + keyword.text.len();
        let (quantity, consumed) = read_quantity(&text[cursor..]);
        cursor += consumed;
        if quantity.is_some() {
            cursor += read_unit_marker(&text[cursor..]);
        }

        let amount = match quantity {
            Some(value) if value > 0 => value as f64,
            _ => 1.0,
        };
        found.push(ExtractedActivity {
            kind: keyword.kind,
            amount,
            unit: keyword.kind.expected_unit(),
        });
        pos = cursor;
    }

    found
}

fn match_keyword(rest: &str) -> Option<&'static Keyword> {
    KEYWORDS
        .iter()
        .filter(|keyword| starts_with_ignore_ascii_case(rest, keyword.text))
        .max_by_key(|keyword| keyword.text.len())
}

fn starts_with_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    haystack
        .get(..needle.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(needle))
}

fn skip_spaces(text: &str) -> usize {
    text.char_indices()
        .find(|(_, c)| *c != ' ' && *c != '\u{3000}')
        .map_or(text.len(), |(idx, _)| idx)
}

fn digit_value(c: char) -> Option<u64> {
    match c {
        '0'..='9' => Some(u64::from(c as u32 - '0' as u32)),
        '０'..='９' => Some(u64::from(c as u32 - '０' as u32)),
        _ => None,
    }
}

/// Returns the parsed number and how many bytes it used, leading spaces
/// included. Nothing is consumed when no digit follows.
fn read_quantity(text: &str) -> (Option<u64>, usize) {
    let start = skip_spaces(text);
    let mut value: Option<u64> = None;
    let mut end = start;

    for (idx, c) in text[start..].char_indices() {
        let Some(digit) = digit_value(c) else {
            break;
        };
        value = Some(value.unwrap_or(0).saturating_mul(10).saturating_add(digit));
        end = start + idx + c.len_utf8();
    }

    match value {
        Some(number) => (Some(number), end),
        None => (None, 0),
    }
}

fn read_unit_marker(text: &str) -> usize {
    let start = skip_spaces(text);
    UNIT_MARKERS
        .iter()
        .find(|marker| starts_with_ignore_ascii_case(&text[start..], marker))
        .map_or(0, |marker| start + marker.len())
}

impl ExtractedActivity {
    /// A manual logging request carrying the source text as its note.
    pub fn into_input(
        self,
        pet_id: Option<i64>,
        started_at: DateTime<Utc>,
        note: &str,
    ) -> ActivityInput {
        ActivityInput {
            pet_id,
            kind: self.kind,
            amount: self.amount,
            unit: Some(self.unit),
            started_at: Some(started_at),
            ended_at: Some(started_at),
            note: Some(note.to_string()),
            source: ActivitySource::Manual,
        }
    }
}
