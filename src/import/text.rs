//! Segments recognised text into multiple-choice questions.
//!
//! Input is whatever an OCR pass produced from a photographed question
//! sheet: numbered question lines (`1.`, `2)`, `Q3:`) followed by lettered
//! options (`a)`, `B.`, `①`). Wrapped question lines are re-joined and
//! option lines the OCR lost the label of are recovered where possible.

use std::sync::LazyLock;

use regex::Regex;

pub const DEFAULT_CATEGORY: &str = "General";

static QUESTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:\d+[.):]|Q\d+[.):])\s*(.+)").expect("question pattern compiles")
});

static OPTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-dA-D][.):]|[①-④])\s*(.+)").expect("option pattern compiles")
});

/// Shortest line accepted as an unlabeled option once labeled ones have started.
const MIN_UNLABELED_OPTION_CHARS: usize = 6;
/// Unstructured text longer than this is kept as a single raw question.
const MIN_FALLBACK_CHARS: usize = 11;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuestion {
    pub question_text: String,
    pub options: [String; 4],
    pub correct_option_index: usize,
    pub category: String,
}

impl ParsedQuestion {
    fn new(question_text: String, options: [String; 4]) -> Self {
        Self {
            question_text,
            options,
            correct_option_index: 0,
            category: DEFAULT_CATEGORY.to_owned(),
        }
    }

    /// True when every field needed to store the question was recovered.
    pub fn is_complete(&self) -> bool {
        !self.question_text.is_empty() && self.options.iter().all(|o| !o.is_empty())
    }
}

struct OpenQuestion {
    text: String,
    options: Vec<String>,
}

impl OpenQuestion {
    fn close(self) -> ParsedQuestion {
        let options = if self.options.len() >= 2 {
            let mut slots: [String; 4] = Default::default();
            for (slot, option) in slots.iter_mut().zip(self.options) {
                *slot = option;
            }
            slots
        } else {
            Default::default()
        };
        ParsedQuestion::new(self.text, options)
    }
}

pub fn parse_questions_from_text(text: &str) -> Vec<ParsedQuestion> {
    let mut questions = Vec::new();
    let mut current: Option<OpenQuestion> = None;

    for line in text.split('\n').map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(caps) = QUESTION_LINE.captures(line) {
            if let Some(open) = current.take() {
                if !open.text.is_empty() {
                    questions.push(open.close());
                }
            }
            current = Some(OpenQuestion {
                text: caps[1].trim().to_owned(),
                options: Vec::new(),
            });
            continue;
        }

        let Some(open) = current.as_mut() else {
            continue;
        };

        if let Some(caps) = OPTION_LINE.captures(line) {
            open.options.push(caps[1].trim().to_owned());
            continue;
        }

        if open.options.is_empty() {
            if !open.text.is_empty() {
                open.text.push(' ');
                open.text.push_str(line);
            }
        } else if open.options.len() < 4 && line.chars().count() >= MIN_UNLABELED_OPTION_CHARS {
            open.options.push(line.to_owned());
        }
    }

    if let Some(open) = current {
        if !open.text.is_empty() {
            questions.push(open.close());
        }
    }

    let trimmed = text.trim();
    if questions.is_empty() && trimmed.chars().count() >= MIN_FALLBACK_CHARS {
        tracing::debug!("no numbered questions found, keeping raw text");
        return vec![ParsedQuestion::new(trimmed.to_owned(), Default::default())];
    }

    questions
}
