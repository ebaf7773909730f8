//! Field rules shared by manual authoring, imports and signup.

use crate::{
    database::model::{OptionLetter, QuestionDraft},
    error::ValidationError,
};

pub const MIN_QUESTION_LENGTH: usize = 5;
pub const MAX_QUESTION_LENGTH: usize = 500;
pub const MAX_OPTION_LENGTH: usize = 200;
pub const MIN_SUBJECT_NAME_LENGTH: usize = 3;
pub const MIN_DISPLAY_NAME_LENGTH: usize = 3;
pub const MAX_DISPLAY_NAME_LENGTH: usize = 50;

/// Trims and strips angle brackets so user text can be echoed back in HTML mode.
pub fn sanitize_input(input: &str) -> String {
    input.trim().replace(['<', '>'], "")
}

pub fn question_text(raw: &str) -> Result<String, ValidationError> {
    let text = sanitize_input(raw);
    let len = text.chars().count();
    if len < MIN_QUESTION_LENGTH {
        return Err(ValidationError::new(
            "question",
            format!("Question must be at least {MIN_QUESTION_LENGTH} characters"),
        ));
    }
    if len > MAX_QUESTION_LENGTH {
        return Err(ValidationError::new(
            "question",
            format!("Question must not exceed {MAX_QUESTION_LENGTH} characters"),
        ));
    }
    Ok(text)
}

pub fn option_text(letter: OptionLetter, raw: &str) -> Result<String, ValidationError> {
    let text = sanitize_input(raw);
    let field = match letter {
        OptionLetter::A => "option A",
        OptionLetter::B => "option B",
        OptionLetter::C => "option C",
        OptionLetter::D => "option D",
    };
    if text.is_empty() {
        return Err(ValidationError::new(field, format!("Option {letter} is required")));
    }
    if text.chars().count() > MAX_OPTION_LENGTH {
        return Err(ValidationError::new(
            field,
            format!("Option {letter} must not exceed {MAX_OPTION_LENGTH} characters"),
        ));
    }
    Ok(text)
}

pub fn subject_name(raw: &str) -> Result<String, ValidationError> {
    let name = sanitize_input(raw);
    if name.chars().count() < MIN_SUBJECT_NAME_LENGTH {
        return Err(ValidationError::new(
            "subject",
            format!("Subject name must be at least {MIN_SUBJECT_NAME_LENGTH} characters"),
        ));
    }
    Ok(name)
}

pub fn display_name(raw: &str) -> Result<String, ValidationError> {
    let name = sanitize_input(raw);
    let len = name.chars().count();
    if len < MIN_DISPLAY_NAME_LENGTH {
        return Err(ValidationError::new(
            "display name",
            format!("Name must be at least {MIN_DISPLAY_NAME_LENGTH} characters"),
        ));
    }
    if len > MAX_DISPLAY_NAME_LENGTH {
        return Err(ValidationError::new(
            "display name",
            format!("Name must not exceed {MAX_DISPLAY_NAME_LENGTH} characters"),
        ));
    }
    Ok(name)
}

/// Sanitises every field of a draft in place, returning the first rule it breaks.
pub fn question_draft(mut draft: QuestionDraft) -> Result<QuestionDraft, ValidationError> {
    draft.text = question_text(&draft.text)?;
    for letter in OptionLetter::ALL {
        let idx = letter.index();
        draft.options[idx] = option_text(letter, &draft.options[idx])?;
    }
    let topic = sanitize_input(&draft.topic);
    draft.topic = if topic.is_empty() {
        "General".to_owned()
    } else {
        topic
    };
    Ok(draft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::model::{Difficulty, QuestionSource};

    fn draft(text: &str, options: [&str; 4]) -> QuestionDraft {
        QuestionDraft {
            text: text.to_owned(),
            options: options.map(str::to_owned),
            correct: OptionLetter::A,
            difficulty: Difficulty::Medium,
            topic: String::new(),
            source: QuestionSource::Manual,
        }
    }

    #[test]
    fn sanitize_strips_brackets_and_whitespace() {
        assert_eq!(sanitize_input("  <b>bold</b> "), "bbold/b");
    }

    #[test]
    fn question_length_bounds() {
        assert!(question_text("Why?").is_err());
        assert_eq!(question_text(" Why so? ").unwrap(), "Why so?");
        assert!(question_text(&"x".repeat(501)).is_err());
        assert!(question_text(&"x".repeat(500)).is_ok());
    }

    #[test]
    fn display_name_bounds() {
        assert!(display_name("al").is_err());
        assert!(display_name("alice").is_ok());
        assert!(display_name(&"n".repeat(51)).is_err());
    }

    #[test]
    fn draft_validation_reports_missing_option() {
        let err = question_draft(draft("What is 2 + 2?", ["3", "4", " ", "5"])).unwrap_err();
        assert_eq!(err.field, "option C");
    }

    #[test]
    fn draft_validation_defaults_topic() {
        let ok = question_draft(draft("What is 2 + 2?", ["3", "4", "6", "5"])).unwrap();
        assert_eq!(ok.topic, "General");
    }
}
