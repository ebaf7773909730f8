pub mod ocr;
pub mod sheet;
pub mod text;

use crate::database::model::{OptionLetter, QuestionDraft, QuestionSource};

pub use text::ParsedQuestion;

/// Turns a recognised question into a draft once its correct option is known.
pub fn draft_from_parsed(parsed: &ParsedQuestion, correct: OptionLetter) -> QuestionDraft {
    QuestionDraft {
        text: parsed.question_text.clone(),
        options: parsed.options.clone(),
        correct,
        difficulty: Default::default(),
        topic: parsed.category.clone(),
        source: QuestionSource::Ocr,
    }
}
