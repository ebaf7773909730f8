use uuid::Uuid;

use crate::{
    database::model::{Difficulty, OptionLetter, QuestionDraft, Subject},
    import::ParsedQuestion,
    session::QuizSession,
};

/// What an admin picked a subject for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authoring {
    Create,
    Upload,
    Ocr,
    Manage,
}

/// Which per-subject report a user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    Leaderboard,
    Stats,
}

#[derive(Debug, Clone)]
pub struct QuestionData {
    pub(crate) subject: Subject,
    pub(crate) text: String,
    pub(crate) options: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub enum QuizState {
    #[default]
    Start,
    // PART FOR --- ACCOUNT ---
    ReceiveDisplayName,

    // PART FOR --- RUNNING QUIZ ---
    Selection,
    ReadyToRun {
        subject: Subject,
    },
    Running {
        session: QuizSession,
    },
    SelectReport {
        report: Report,
    },

    // PART FOR --- AUTHORING ---
    SelectSubject {
        purpose: Authoring,
    },
    ReceiveSubjectName {
        purpose: Authoring,
    },
    ReceiveQuestionText {
        subject: Subject,
    },
    ReceiveOption {
        question: QuestionData,
    },
    ReceiveCorrectOption {
        question: QuestionData,
    },
    ReceiveDifficulty {
        question: QuestionData,
        correct: OptionLetter,
    },
    ReceiveTopic {
        question: QuestionData,
        correct: OptionLetter,
        difficulty: Difficulty,
    },
    ReceiveAddAnotherQuestion {
        subject: Subject,
    },

    // PART FOR --- IMPORT ---
    AwaitSheet {
        subject: Subject,
    },
    ConfirmSheet {
        subject: Subject,
        drafts: Vec<QuestionDraft>,
    },
    AwaitImage {
        subject: Subject,
    },
    ReviewDraft {
        subject: Subject,
        pending: Vec<ParsedQuestion>,
        accepted: Vec<QuestionDraft>,
    },

    // PART FOR --- EDITING ---
    SelectQuestion {
        subject: Subject,
        questions: Vec<Uuid>,
        page: usize,
    },
    HandleQuestion {
        subject: Subject,
        question_id: Uuid,
    },
    EditQuestionText {
        subject: Subject,
        question_id: Uuid,
    },
    EditCorrectOption {
        subject: Subject,
        question_id: Uuid,
    },
    DeleteQuestion {
        subject: Subject,
        question_id: Uuid,
    },
}
