use std::sync::Arc;

use teloxide::{
    payloads::SendMessageSetters,
    prelude::Requester,
    types::{ChatId, Message, ReplyMarkup},
    Bot,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    commands::show_menu,
    database::{
        connection::{EditQuestions, RetrieveQuestions},
        model::{OptionLetter, Subject},
    },
    keyboard::{
        edit_question_keyboard, is_no, is_yes, letters_keyboard, questions_keyboard,
        yes_no_keyboard, NEXT_PAGE, PREV_PAGE,
    },
    state::QuizState,
    validation, HandlerResult, UserDialogue,
};

const PREVIEW_CHARS: usize = 60;

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        text.to_owned()
    } else {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}…")
    }
}

/// Questions per message. Telegram caps a message at 4096 characters.
const QUESTIONS_PER_PAGE: usize = 20;

fn page_count(total: usize) -> usize {
    total.div_ceil(QUESTIONS_PER_PAGE).max(1)
}

/// Numbered previews of one page, numbering continues across pages.
fn render_page(subject: &str, texts: &[&str], page: usize) -> String {
    let pages = page_count(texts.len());
    let start = page * QUESTIONS_PER_PAGE;

    let mut text = format!("Questions of {} (page {}/{}):", subject, page + 1, pages);
    for (idx, question) in texts.iter().enumerate().skip(start).take(QUESTIONS_PER_PAGE) {
        text.push_str(&format!("\n{}. {}", idx + 1, preview(question)));
    }
    text.push_str("\n\nSend the number of a question.");
    text
}

/// Shows one page of a subject's numbered questions and waits for a number.
pub(crate) async fn list_questions<Retriever: RetrieveQuestions>(
    bot: &Bot,
    dialogue: &UserDialogue,
    chat_id: ChatId,
    subject: Subject,
    page: usize,
    connection: &Retriever,
) -> HandlerResult {
    let questions = connection.questions_of_subject(subject.uuid).await?;
    if questions.is_empty() {
        dialogue.update(QuizState::Start).await?;
        return show_menu(
            bot,
            chat_id,
            true,
            &format!("{} has no questions yet.", subject.name),
        )
        .await;
    }

    let pages = page_count(questions.len());
    let page = page.min(pages - 1);
    let texts: Vec<&str> = questions.iter().map(|q| q.text.as_str()).collect();
    let first = page * QUESTIONS_PER_PAGE + 1;
    let last = (first + QUESTIONS_PER_PAGE - 1).min(questions.len());

    bot.send_message(chat_id, render_page(&subject.name, &texts, page))
        .reply_markup(questions_keyboard(first..=last, page > 0, page + 1 < pages))
        .await?;
    dialogue
        .update(QuizState::SelectQuestion {
            subject,
            questions: questions.into_iter().map(|q| q.uuid).collect(),
            page,
        })
        .await?;
    Ok(())
}

async fn show_question<Retriever: RetrieveQuestions>(
    bot: &Bot,
    dialogue: &UserDialogue,
    chat_id: ChatId,
    subject: Subject,
    question_id: Uuid,
    connection: &Retriever,
) -> HandlerResult {
    match connection.find_question(question_id).await? {
        Some(question) => {
            bot.send_message(chat_id, question.to_string())
                .reply_markup(edit_question_keyboard())
                .await?;
            dialogue
                .update(QuizState::HandleQuestion {
                    subject,
                    question_id,
                })
                .await?;
            Ok(())
        }
        None => {
            bot.send_message(chat_id, "That question no longer exists.")
                .await?;
            list_questions(bot, dialogue, chat_id, subject, 0, connection).await
        }
    }
}

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0))]
pub(crate) async fn select_question<Retriever: RetrieveQuestions>(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    (subject, questions, page): (Subject, Vec<Uuid>, usize),
    connection: Arc<Retriever>,
) -> HandlerResult {
    match msg.text() {
        Some(PREV_PAGE) => {
            let page = page.saturating_sub(1);
            return list_questions(&bot, &dialogue, msg.chat.id, subject, page, connection.as_ref())
                .await;
        }
        Some(NEXT_PAGE) => {
            return list_questions(&bot, &dialogue, msg.chat.id, subject, page + 1, connection.as_ref())
                .await;
        }
        _ => {}
    }

    let picked = msg
        .text()
        .and_then(|text| text.trim().parse::<usize>().ok())
        .and_then(|n| n.checked_sub(1))
        .and_then(|idx| questions.get(idx).copied());

    match picked {
        Some(question_id) => {
            show_question(&bot, &dialogue, msg.chat.id, subject, question_id, connection.as_ref())
                .await
        }
        None => {
            bot.send_message(
                msg.chat.id,
                format!("Please, send a number from 1 to {}.", questions.len()),
            )
            .await?;
            Ok(())
        }
    }
}

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0, question = %question_id))]
pub(crate) async fn handle_question<Retriever: RetrieveQuestions>(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    (subject, question_id): (Subject, Uuid),
    connection: Arc<Retriever>,
) -> HandlerResult {
    match msg.text() {
        Some("Edit text") => {
            bot.send_message(msg.chat.id, "What's the new question text?")
                .reply_markup(ReplyMarkup::kb_remove())
                .await?;
            dialogue
                .update(QuizState::EditQuestionText {
                    subject,
                    question_id,
                })
                .await?;
        }
        Some("Edit correct option") => {
            bot.send_message(msg.chat.id, "Which option is correct now?")
                .reply_markup(letters_keyboard(false))
                .await?;
            dialogue
                .update(QuizState::EditCorrectOption {
                    subject,
                    question_id,
                })
                .await?;
        }
        Some("Delete question🗑️") => {
            bot.send_message(msg.chat.id, "Are you sure you want to delete it?")
                .reply_markup(yes_no_keyboard())
                .await?;
            dialogue
                .update(QuizState::DeleteQuestion {
                    subject,
                    question_id,
                })
                .await?;
        }
        Some("Back") | Some("/back") => {
            list_questions(&bot, &dialogue, msg.chat.id, subject, 0, connection.as_ref()).await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Invalid input. Please try again.")
                .reply_markup(edit_question_keyboard())
                .await?;
        }
    }

    Ok(())
}

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0, question = %question_id))]
pub(crate) async fn edit_question_text<Connect: EditQuestions + RetrieveQuestions>(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    (subject, question_id): (Subject, Uuid),
    connection: Arc<Connect>,
) -> HandlerResult {
    let Some(raw) = msg.text() else {
        bot.send_message(msg.chat.id, "Invalid input. Please try again.")
            .await?;
        return Ok(());
    };

    match validation::question_text(raw) {
        Ok(text) => {
            connection.edit_question_text(question_id, &text).await?;
            tracing::info!("question text updated");
            bot.send_message(msg.chat.id, "Question text updated.")
                .await?;
            show_question(&bot, &dialogue, msg.chat.id, subject, question_id, connection.as_ref())
                .await?;
        }
        Err(err) => {
            bot.send_message(msg.chat.id, format!("{}. Try again.", err.message))
                .await?;
        }
    }

    Ok(())
}

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0, question = %question_id))]
pub(crate) async fn edit_correct_option<Connect: EditQuestions + RetrieveQuestions>(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    (subject, question_id): (Subject, Uuid),
    connection: Arc<Connect>,
) -> HandlerResult {
    match msg.text().and_then(OptionLetter::from_letter) {
        Some(correct) => {
            connection.edit_correct_option(question_id, correct).await?;
            tracing::info!(%correct, "correct option updated");
            bot.send_message(msg.chat.id, format!("Option {correct} is now correct."))
                .await?;
            show_question(&bot, &dialogue, msg.chat.id, subject, question_id, connection.as_ref())
                .await?;
        }
        None => {
            bot.send_message(msg.chat.id, "Please, choose one of A, B, C or D.")
                .reply_markup(letters_keyboard(false))
                .await?;
        }
    }

    Ok(())
}

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0, question = %question_id))]
pub(crate) async fn delete_question<Connect: EditQuestions + RetrieveQuestions>(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    (subject, question_id): (Subject, Uuid),
    connection: Arc<Connect>,
) -> HandlerResult {
    match msg.text() {
        Some(text) if is_yes(text) => {
            if connection.delete_question(question_id).await? {
                tracing::info!("question deleted");
                bot.send_message(msg.chat.id, "Question deleted.").await?;
            } else {
                bot.send_message(msg.chat.id, "Question was already gone.")
                    .await?;
            }
            list_questions(&bot, &dialogue, msg.chat.id, subject, 0, connection.as_ref()).await?;
        }
        Some(text) if is_no(text) => {
            show_question(&bot, &dialogue, msg.chat.id, subject, question_id, connection.as_ref())
                .await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Please, answer Yes or No.")
                .reply_markup(yes_no_keyboard())
                .await?;
        }
    }

    Ok(())
}
