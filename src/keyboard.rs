use std::ops::RangeInclusive;

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};

use crate::{
    database::model::{Difficulty, OptionLetter, Subject},
    session::QuizSession,
};

pub(crate) const TAKE_QUIZ: &str = "Take a quiz📝";
pub(crate) const LEADERBOARD: &str = "Leaderboard🏆";
pub(crate) const MY_STATS: &str = "My stats📊";
pub(crate) const CREATE_QUESTION: &str = "Create a question🏗️";
pub(crate) const UPLOAD_SHEET: &str = "Upload a spreadsheet📄";
pub(crate) const IMPORT_IMAGE: &str = "Import from an image📷";
pub(crate) const MANAGE_QUESTIONS: &str = "Manage questions✏️";
pub(crate) const NEW_SUBJECT: &str = "New subject➕";
pub(crate) const SKIP: &str = "Skip⏭️";
pub(crate) const PREV_PAGE: &str = "⬅️ Previous page";
pub(crate) const NEXT_PAGE: &str = "Next page ➡️";

pub(crate) fn is_yes(text: &str) -> bool {
    matches!(text, "Yes" | "Yes✔️" | "yes")
}

pub(crate) fn is_no(text: &str) -> bool {
    matches!(text, "No" | "No❌" | "no")
}

pub(crate) fn yes_no_keyboard() -> KeyboardMarkup {
    let keyboard: Vec<Vec<KeyboardButton>> = vec![vec![
        KeyboardButton::new("Yes✔️"),
        KeyboardButton::new("No❌"),
    ]];

    KeyboardMarkup::new(keyboard)
}

pub(crate) fn action_keyboard(admin: bool) -> KeyboardMarkup {
    let mut keyboard = vec![
        vec![KeyboardButton::new(TAKE_QUIZ)],
        vec![
            KeyboardButton::new(LEADERBOARD),
            KeyboardButton::new(MY_STATS),
        ],
    ];

    if admin {
        keyboard.push(vec![KeyboardButton::new(CREATE_QUESTION)]);
        keyboard.push(vec![
            KeyboardButton::new(UPLOAD_SHEET),
            KeyboardButton::new(IMPORT_IMAGE),
        ]);
        keyboard.push(vec![KeyboardButton::new(MANAGE_QUESTIONS)]);
    }

    KeyboardMarkup::new(keyboard)
}

pub(crate) fn subjects_keyboard(subjects: &[Subject], allow_new: bool) -> KeyboardMarkup {
    let mut keyboard: Vec<Vec<KeyboardButton>> = subjects
        .iter()
        .map(|subject| vec![KeyboardButton::new(&subject.name)])
        .collect();

    if allow_new {
        keyboard.push(vec![KeyboardButton::new(NEW_SUBJECT)]);
    }

    KeyboardMarkup::new(keyboard)
}

pub(crate) fn letters_keyboard(with_skip: bool) -> KeyboardMarkup {
    let mut row: Vec<KeyboardButton> = OptionLetter::ALL
        .iter()
        .map(|letter| KeyboardButton::new(letter.to_string()))
        .collect();

    if with_skip {
        row.push(KeyboardButton::new(SKIP));
    }

    KeyboardMarkup::new(vec![row])
}

pub(crate) fn difficulty_keyboard() -> KeyboardMarkup {
    let row = Difficulty::ALL
        .iter()
        .map(|difficulty| KeyboardButton::new(difficulty.as_str()))
        .collect::<Vec<_>>();

    KeyboardMarkup::new(vec![row])
}

pub(crate) fn questions_keyboard(
    numbers: RangeInclusive<usize>,
    prev_page: bool,
    next_page: bool,
) -> KeyboardMarkup {
    let mut keyboard = numbers
        .collect::<Vec<_>>()
        .chunks(5)
        .map(|chunk| {
            chunk
                .iter()
                .map(|n| KeyboardButton::new(n.to_string()))
                .collect()
        })
        .collect::<Vec<Vec<_>>>();

    let mut paging = Vec::new();
    if prev_page {
        paging.push(KeyboardButton::new(PREV_PAGE));
    }
    if next_page {
        paging.push(KeyboardButton::new(NEXT_PAGE));
    }
    if !paging.is_empty() {
        keyboard.push(paging);
    }

    KeyboardMarkup::new(keyboard)
}

pub(crate) fn edit_question_keyboard() -> KeyboardMarkup {
    let keyboard = vec![
        vec![
            KeyboardButton::new("Edit text"),
            KeyboardButton::new("Edit correct option"),
        ],
        vec![KeyboardButton::new("Delete question🗑️")],
        vec![KeyboardButton::new("Back")],
    ];

    KeyboardMarkup::new(keyboard)
}

/// Answer buttons for the current question followed by the navigation row.
pub(crate) fn session_keyboard(session: &QuizSession) -> InlineKeyboardMarkup {
    let selected = session.answer_for(session.current_index());

    let answers = OptionLetter::ALL
        .iter()
        .map(|letter| {
            let label = if selected == Some(*letter) {
                format!("✅ {letter}")
            } else {
                letter.to_string()
            };
            InlineKeyboardButton::callback(label, format!("ans:{}", letter.index()))
        })
        .collect::<Vec<_>>();

    let mut navigation = Vec::new();
    if !session.is_first() {
        navigation.push(InlineKeyboardButton::callback("⬅️ Previous", "nav:prev"));
    }
    if session.is_last() {
        navigation.push(InlineKeyboardButton::callback("Finish 🏁", "nav:finish"));
    } else {
        navigation.push(InlineKeyboardButton::callback("Next ➡️", "nav:next"));
    }

    InlineKeyboardMarkup::new(vec![answers, navigation])
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use teloxide::types::InlineKeyboardButtonKind;
    use uuid::Uuid;

    use super::*;
    use crate::database::model::{Question, QuestionSource};

    fn session(questions: usize) -> QuizSession {
        let subject = Subject {
            uuid: Uuid::new_v4(),
            name: "History".into(),
            created_by: 1,
            question_count: questions as i64,
        };
        let questions = (0..questions)
            .map(|_| Question {
                uuid: Uuid::new_v4(),
                subject_id: subject.uuid,
                text: "When?".into(),
                options: ["a".into(), "b".into(), "c".into(), "d".into()],
                correct: OptionLetter::A,
                difficulty: Difficulty::Medium,
                topic: "General".into(),
                source: QuestionSource::Manual,
                created_by: 1,
                created_at: Utc::now(),
            })
            .collect();
        QuizSession::start(&subject, questions, Utc::now(), std::time::Duration::from_secs(60))
    }

    fn callbacks(markup: &InlineKeyboardMarkup, row: usize) -> Vec<String> {
        markup.inline_keyboard[row]
            .iter()
            .filter_map(|button| match &button.kind {
                InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn session_keyboard_follows_position() {
        let mut s = session(2);
        let first = session_keyboard(&s);
        assert_eq!(callbacks(&first, 0), ["ans:0", "ans:1", "ans:2", "ans:3"]);
        assert_eq!(callbacks(&first, 1), ["nav:next"]);

        s.next_question();
        s.submit_answer(2).unwrap();
        let last = session_keyboard(&s);
        assert_eq!(callbacks(&last, 1), ["nav:prev", "nav:finish"]);
        assert_eq!(last.inline_keyboard[0][2].text, "✅ C");
    }

    #[test]
    fn question_numbers_wrap_every_five() {
        let markup = questions_keyboard(1..=7, false, false);
        assert_eq!(markup.keyboard.len(), 2);
        assert_eq!(markup.keyboard[1][1].text, "7");
    }

    #[test]
    fn middle_page_offers_both_directions() {
        let markup = questions_keyboard(21..=40, true, true);
        assert_eq!(markup.keyboard.len(), 5);
        assert_eq!(markup.keyboard[0][0].text, "21");
        let paging: Vec<_> = markup.keyboard[4].iter().map(|b| b.text.as_str()).collect();
        assert_eq!(paging, [PREV_PAGE, NEXT_PAGE]);
    }
}
