use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One of the four answer slots every question carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptionLetter {
    A,
    B,
    C,
    D,
}

impl OptionLetter {
    pub const ALL: [OptionLetter; 4] = [
        OptionLetter::A,
        OptionLetter::B,
        OptionLetter::C,
        OptionLetter::D,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    pub fn letter(self) -> char {
        (b'A' + self as u8) as char
    }

    /// Accepts `a`, `B`, `c)`, `(D)` and the like.
    pub fn from_letter(raw: &str) -> Option<Self> {
        let trimmed = raw
            .trim()
            .trim_matches(|c| matches!(c, '(' | ')' | '[' | ']' | '.' | ':'));
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => match c.to_ascii_uppercase() {
                'A' => Some(OptionLetter::A),
                'B' => Some(OptionLetter::B),
                'C' => Some(OptionLetter::C),
                'D' => Some(OptionLetter::D),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for OptionLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty '{other}'")),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a question came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuestionSource {
    #[default]
    Manual,
    Ocr,
    Excel,
}

impl QuestionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionSource::Manual => "manual",
            QuestionSource::Ocr => "ocr",
            QuestionSource::Excel => "excel",
        }
    }
}

impl FromStr for QuestionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(QuestionSource::Manual),
            "ocr" => Ok(QuestionSource::Ocr),
            "excel" => Ok(QuestionSource::Excel),
            other => Err(format!("unknown question source '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Student,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    pub uuid: Uuid,
    pub name: String,
    pub created_by: i64,
    pub question_count: i64,
}

/// A question that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionDraft {
    pub text: String,
    pub options: [String; 4],
    pub correct: OptionLetter,
    pub difficulty: Difficulty,
    pub topic: String,
    pub source: QuestionSource,
}

impl QuestionDraft {
    pub fn option(&self, letter: OptionLetter) -> &str {
        &self.options[letter.index()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub uuid: Uuid,
    pub subject_id: Uuid,
    pub text: String,
    pub options: [String; 4],
    pub correct: OptionLetter,
    pub difficulty: Difficulty,
    pub topic: String,
    pub source: QuestionSource,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl Question {
    pub fn from_draft(draft: QuestionDraft, subject_id: Uuid, created_by: i64) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            subject_id,
            text: draft.text,
            options: draft.options,
            correct: draft.correct,
            difficulty: draft.difficulty,
            topic: draft.topic,
            source: draft.source,
            created_by,
            created_at: Utc::now(),
        }
    }

    pub fn option(&self, letter: OptionLetter) -> &str {
        &self.options[letter.index()]
    }

    pub fn is_correct(&self, letter: OptionLetter) -> bool {
        self.correct == letter
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.text)?;
        for letter in OptionLetter::ALL {
            let mark = if self.is_correct(letter) { 'V' } else { 'X' };
            writeln!(f, "{}) {} ({})", letter, self.option(letter), mark)?;
        }
        write!(f, "[{} · {}]", self.difficulty, self.topic)
    }
}

/// What a user picked for one question of an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    pub question_id: Uuid,
    pub selected: Option<OptionLetter>,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub uuid: Uuid,
    pub user_id: i64,
    pub subject_id: Uuid,
    pub subject_name: String,
    pub score: f64,
    pub correct_answers: i32,
    pub total_questions: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_parse_leniently() {
        assert_eq!(OptionLetter::from_letter("b"), Some(OptionLetter::B));
        assert_eq!(OptionLetter::from_letter(" (D) "), Some(OptionLetter::D));
        assert_eq!(OptionLetter::from_letter("c)"), Some(OptionLetter::C));
        assert_eq!(OptionLetter::from_letter("E"), None);
        assert_eq!(OptionLetter::from_letter("AB"), None);
        assert_eq!(OptionLetter::from_letter(""), None);
    }

    #[test]
    fn letters_map_to_indices() {
        for (idx, letter) in OptionLetter::ALL.into_iter().enumerate() {
            assert_eq!(letter.index(), idx);
            assert_eq!(OptionLetter::from_index(idx), Some(letter));
        }
        assert_eq!(OptionLetter::from_index(4), None);
        assert_eq!(OptionLetter::C.letter(), 'C');
    }

    #[test]
    fn difficulty_is_case_insensitive() {
        assert_eq!("HARD".parse::<Difficulty>(), Ok(Difficulty::Hard));
        assert_eq!(" easy ".parse::<Difficulty>(), Ok(Difficulty::Easy));
        assert!("extreme".parse::<Difficulty>().is_err());
        assert_eq!(Difficulty::default(), Difficulty::Medium);
    }
}
