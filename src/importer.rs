use std::{error::Error, sync::Arc};

use teloxide::{
    net::Download,
    payloads::SendMessageSetters,
    prelude::Requester,
    types::{ChatId, FileMeta, Message, ReplyMarkup},
    Bot,
};
use tracing::instrument;

use crate::{
    commands::show_menu,
    database::{
        connection::CreateQuestions,
        model::{OptionLetter, QuestionDraft, Subject},
    },
    import::{
        draft_from_parsed,
        ocr::TextRecognizer,
        sheet::{parse_sheet, SheetReport, MAX_SHEET_BYTES},
        text::parse_questions_from_text,
        ParsedQuestion,
    },
    keyboard::{is_no, is_yes, letters_keyboard, yes_no_keyboard, SKIP},
    state::QuizState,
    validation, HandlerResult, UserDialogue,
};

/// Row errors listed in a bulk upload report; the rest are only counted.
const REPORTED_ROW_ERRORS: usize = 10;

async fn download(bot: &Bot, meta: &FileMeta) -> Result<Vec<u8>, Box<dyn Error + Send + Sync>> {
    let file = bot.get_file(meta.id.clone()).await?;
    let mut bytes = Vec::new();
    bot.download_file(&file.path, &mut bytes).await?;
    tracing::debug!(size = bytes.len(), "file downloaded");
    Ok(bytes)
}

pub(crate) fn render_sheet_report(report: &SheetReport) -> String {
    let mut text = format!(
        "Rows: {}\nValid: {}\nInvalid: {}",
        report.total_rows,
        report.valid_rows,
        report.invalid_rows()
    );

    for error in report.errors.iter().take(REPORTED_ROW_ERRORS) {
        text.push_str(&format!(
            "\nRow {} · {}: {}",
            error.row, error.field, error.message
        ));
    }
    if report.errors.len() > REPORTED_ROW_ERRORS {
        text.push_str(&format!(
            "\n…and {} more errors.",
            report.errors.len() - REPORTED_ROW_ERRORS
        ));
    }
    text
}

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0, subject = %subject.name))]
pub(crate) async fn receive_sheet(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    subject: Subject,
) -> HandlerResult {
    let Some(document) = msg.document() else {
        bot.send_message(msg.chat.id, "Please, send a spreadsheet file or /cancel.")
            .await?;
        return Ok(());
    };

    if document.file.size as usize > MAX_SHEET_BYTES {
        bot.send_message(msg.chat.id, "The file is too large. The limit is 5 MB.")
            .await?;
        return Ok(());
    }

    let file_name = document.file_name.clone().unwrap_or_default();
    let bytes = download(&bot, &document.file).await?;
    let parsed = {
        let file_name = file_name.clone();
        tokio::task::spawn_blocking(move || parse_sheet(&file_name, bytes)).await?
    };

    let report = match parsed {
        Ok(report) => report,
        Err(err) => {
            tracing::info!(%err, file = %file_name, "spreadsheet rejected");
            bot.send_message(msg.chat.id, format!("Could not read the file: {err}"))
                .await?;
            return Ok(());
        }
    };

    tracing::info!(
        file = %file_name,
        total = report.total_rows,
        valid = report.valid_rows,
        "spreadsheet parsed"
    );
    bot.send_message(msg.chat.id, render_sheet_report(&report))
        .await?;

    if report.questions.is_empty() {
        bot.send_message(
            msg.chat.id,
            "Nothing to import. Fix the file and send it again.",
        )
        .await?;
        return Ok(());
    }

    bot.send_message(
        msg.chat.id,
        format!(
            "Save {} questions to {}? (Yes/No)",
            report.questions.len(),
            subject.name
        ),
    )
    .reply_markup(yes_no_keyboard())
    .await?;
    dialogue
        .update(QuizState::ConfirmSheet {
            subject,
            drafts: report.questions,
        })
        .await?;

    Ok(())
}

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0, subject = %subject.name))]
pub(crate) async fn confirm_sheet<Creator: CreateQuestions>(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    (subject, drafts): (Subject, Vec<QuestionDraft>),
    connection: Arc<Creator>,
) -> HandlerResult {
    match msg.text() {
        Some(text) if is_yes(text) => {
            let saved = connection
                .create_questions(subject.uuid, drafts, msg.chat.id.0)
                .await?;
            dialogue.update(QuizState::Start).await?;
            show_menu(
                &bot,
                msg.chat.id,
                true,
                &format!("Saved {} questions to {}.", saved, subject.name),
            )
            .await?;
        }
        Some(text) if is_no(text) => {
            dialogue.update(QuizState::Start).await?;
            show_menu(&bot, msg.chat.id, true, "Upload cancelled.").await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Please, answer Yes or No.")
                .reply_markup(yes_no_keyboard())
                .await?;
        }
    }

    Ok(())
}

fn image_of(msg: &Message) -> Option<&FileMeta> {
    if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        return Some(&photo.file);
    }

    msg.document()
        .filter(|document| {
            document
                .mime_type
                .as_ref()
                .is_some_and(|mime| mime.essence_str().starts_with("image/"))
        })
        .map(|document| &document.file)
}

fn review_prompt(parsed: &ParsedQuestion, remaining: usize) -> String {
    let mut text = format!("{}\n", parsed.question_text);
    for letter in OptionLetter::ALL {
        text.push_str(&format!("\n{}) {}", letter, parsed.options[letter.index()]));
    }
    text.push_str(&format!(
        "\n\nWhich option is correct? ({} left to review)",
        remaining
    ));
    text
}

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0, subject = %subject.name))]
pub(crate) async fn receive_image<Recognizer: TextRecognizer>(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    subject: Subject,
    recognizer: Arc<Recognizer>,
) -> HandlerResult {
    let Some(image) = image_of(&msg) else {
        bot.send_message(msg.chat.id, "Please, send a photo or an image file, or /cancel.")
            .await?;
        return Ok(());
    };

    let bytes = download(&bot, image).await?;
    let text = match recognizer.recognize(bytes).await {
        Ok(text) => text,
        Err(err) => {
            tracing::error!(%err, "text recognition failed");
            bot.send_message(msg.chat.id, format!("Could not read text from the image: {err}"))
                .await?;
            return Ok(());
        }
    };

    let parsed = parse_questions_from_text(&text);
    let found = parsed.len();
    let pending: Vec<ParsedQuestion> = parsed.into_iter().filter(ParsedQuestion::is_complete).collect();
    tracing::info!(found, complete = pending.len(), "questions recognised");

    if pending.is_empty() {
        bot.send_message(
            msg.chat.id,
            "No complete questions found. Try a clearer photo or /cancel.",
        )
        .await?;
        return Ok(());
    }

    bot.send_message(
        msg.chat.id,
        format!(
            "Found {} questions, {} incomplete were skipped.",
            pending.len(),
            found - pending.len()
        ),
    )
    .await?;
    ask_review(&bot, msg.chat.id, &pending).await?;
    dialogue
        .update(QuizState::ReviewDraft {
            subject,
            pending,
            accepted: Vec::new(),
        })
        .await?;

    Ok(())
}

async fn ask_review(bot: &Bot, chat_id: ChatId, pending: &[ParsedQuestion]) -> HandlerResult {
    if let Some(next) = pending.first() {
        bot.send_message(chat_id, review_prompt(next, pending.len()))
            .reply_markup(letters_keyboard(true))
            .await?;
    }
    Ok(())
}

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0, subject = %subject.name))]
pub(crate) async fn review_draft<Creator: CreateQuestions>(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    (subject, mut pending, mut accepted): (Subject, Vec<ParsedQuestion>, Vec<QuestionDraft>),
    connection: Arc<Creator>,
) -> HandlerResult {
    if pending.is_empty() {
        dialogue.update(QuizState::Start).await?;
        return show_menu(&bot, msg.chat.id, true, "Nothing left to review.").await;
    }

    match msg.text() {
        Some(SKIP) => {
            pending.remove(0);
        }
        Some(text) => match OptionLetter::from_letter(text) {
            Some(correct) => {
                let parsed = pending.remove(0);
                match validation::question_draft(draft_from_parsed(&parsed, correct)) {
                    Ok(draft) => accepted.push(draft),
                    Err(err) => {
                        bot.send_message(
                            msg.chat.id,
                            format!("Skipped: {}.", err.message),
                        )
                        .await?;
                    }
                }
            }
            None => {
                bot.send_message(msg.chat.id, "Please, choose A, B, C, D or Skip.")
                    .reply_markup(letters_keyboard(true))
                    .await?;
                return Ok(());
            }
        },
        None => {
            bot.send_message(msg.chat.id, "Please, choose A, B, C, D or Skip.")
                .reply_markup(letters_keyboard(true))
                .await?;
            return Ok(());
        }
    }

    if !pending.is_empty() {
        ask_review(&bot, msg.chat.id, &pending).await?;
        dialogue
            .update(QuizState::ReviewDraft {
                subject,
                pending,
                accepted,
            })
            .await?;
        return Ok(());
    }

    dialogue.update(QuizState::Start).await?;
    if accepted.is_empty() {
        return show_menu(&bot, msg.chat.id, true, "No questions were saved.").await;
    }

    let saved = connection
        .create_questions(subject.uuid, accepted, msg.chat.id.0)
        .await?;
    tracing::info!(saved, "recognised questions saved");
    bot.send_message(msg.chat.id, "Review finished.")
        .reply_markup(ReplyMarkup::kb_remove())
        .await?;
    show_menu(
        &bot,
        msg.chat.id,
        true,
        &format!("Saved {} questions to {}.", saved, subject.name),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::sheet::RowError;

    #[test]
    fn sheet_report_lists_first_errors_only() {
        let errors = (0..12)
            .map(|i| RowError {
                row: i + 2,
                field: "question",
                message: "Question is required".into(),
            })
            .collect();
        let report = SheetReport {
            questions: vec![],
            errors,
            total_rows: 12,
            valid_rows: 0,
        };

        let text = render_sheet_report(&report);
        assert!(text.starts_with("Rows: 12\nValid: 0\nInvalid: 12"));
        assert!(text.contains("Row 2 · question: Question is required"));
        assert!(!text.contains("Row 13 "));
        assert!(text.ends_with("…and 2 more errors."));
    }

    #[test]
    fn review_prompt_shows_options_in_order() {
        let parsed = ParsedQuestion {
            question_text: "Capital of France?".into(),
            options: ["Paris".into(), "Rome".into(), "Madrid".into(), "Berlin".into()],
            correct_option_index: 0,
            category: "General".into(),
        };
        let text = review_prompt(&parsed, 3);
        assert!(text.contains("A) Paris\nB) Rome\nC) Madrid\nD) Berlin"));
        assert!(text.ends_with("(3 left to review)"));
    }
}
