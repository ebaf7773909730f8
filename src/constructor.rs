use std::sync::Arc;

use teloxide::{
    payloads::SendMessageSetters,
    prelude::Requester,
    types::{ChatId, Message, ReplyMarkup},
    Bot,
};
use tracing::instrument;

use crate::{
    commands::show_menu,
    database::{
        connection::{CreateQuestions, ManageSubjects, RetrieveQuestions},
        model::{Difficulty, OptionLetter, QuestionDraft, QuestionSource, Subject},
    },
    editor,
    import::sheet::TEMPLATE_HEADERS,
    keyboard::{difficulty_keyboard, is_no, is_yes, letters_keyboard, yes_no_keyboard, NEW_SUBJECT},
    state::{Authoring, QuestionData, QuizState},
    validation, HandlerResult, UserDialogue,
};

pub(crate) fn upload_prompt(subject: &str) -> String {
    format!(
        "Send a spreadsheet (xlsx, xls, ods or csv) with questions for {}.\n\
         The first row names the columns: {}.\n\
         Send /template for an example.",
        subject,
        TEMPLATE_HEADERS.join(", ")
    )
}

/// Moves an admin into the flow they picked a subject for.
async fn begin<Connect: RetrieveQuestions>(
    bot: &Bot,
    dialogue: &UserDialogue,
    chat_id: ChatId,
    purpose: Authoring,
    subject: Subject,
    connection: &Connect,
) -> HandlerResult {
    tracing::info!(subject = %subject.name, ?purpose, "subject chosen for authoring");
    match purpose {
        Authoring::Create => {
            bot.send_message(
                chat_id,
                format!("Let's create a question for {}. Send the question text.", subject.name),
            )
            .reply_markup(ReplyMarkup::kb_remove())
            .await?;
            dialogue
                .update(QuizState::ReceiveQuestionText { subject })
                .await?;
        }
        Authoring::Upload => {
            bot.send_message(
                chat_id,
                upload_prompt(&subject.name),
            )
            .reply_markup(ReplyMarkup::kb_remove())
            .await?;
            dialogue.update(QuizState::AwaitSheet { subject }).await?;
        }
        Authoring::Ocr => {
            bot.send_message(
                chat_id,
                format!("Send a photo of the questions for {}.", subject.name),
            )
            .reply_markup(ReplyMarkup::kb_remove())
            .await?;
            dialogue.update(QuizState::AwaitImage { subject }).await?;
        }
        Authoring::Manage => {
            editor::list_questions(bot, dialogue, chat_id, subject, 0, connection).await?;
        }
    }

    Ok(())
}

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0))]
pub(crate) async fn select_subject<Connect: ManageSubjects + RetrieveQuestions>(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    purpose: Authoring,
    connection: Arc<Connect>,
) -> HandlerResult {
    match msg.text() {
        Some(NEW_SUBJECT) if purpose != Authoring::Manage => {
            bot.send_message(msg.chat.id, "OK. What's the name of the new subject?")
                .reply_markup(ReplyMarkup::kb_remove())
                .await?;
            dialogue
                .update(QuizState::ReceiveSubjectName { purpose })
                .await?;
        }
        Some(name) => match connection.find_subject(name).await? {
            Some(subject) => {
                begin(&bot, &dialogue, msg.chat.id, purpose, subject, connection.as_ref()).await?;
            }
            None => {
                bot.send_message(msg.chat.id, format!("Subject '{}' not found.", name))
                    .await?;
            }
        },
        None => {
            bot.send_message(msg.chat.id, "Please, choose a subject.")
                .await?;
        }
    }

    Ok(())
}

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0))]
pub(crate) async fn receive_subject_name<Connect: ManageSubjects + RetrieveQuestions>(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    purpose: Authoring,
    connection: Arc<Connect>,
) -> HandlerResult {
    let Some(raw) = msg.text() else {
        bot.send_message(msg.chat.id, "Please, send a name of the new subject.")
            .await?;
        return Ok(());
    };

    let name = match validation::subject_name(raw) {
        Ok(name) => name,
        Err(err) => {
            bot.send_message(msg.chat.id, format!("{}. Try again.", err.message))
                .await?;
            return Ok(());
        }
    };

    if connection.find_subject(&name).await?.is_some() {
        bot.send_message(msg.chat.id, "Subject already exists. Try again.")
            .await?;
        return Ok(());
    }

    let subject = connection.create_subject(&name, msg.chat.id.0).await?;
    begin(&bot, &dialogue, msg.chat.id, purpose, subject, connection.as_ref()).await
}

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0))]
pub(crate) async fn receive_question_text(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    subject: Subject,
) -> HandlerResult {
    let Some(raw) = msg.text() else {
        bot.send_message(msg.chat.id, "Please, send the question text.")
            .await?;
        return Ok(());
    };

    match validation::question_text(raw) {
        Ok(text) => {
            bot.send_message(msg.chat.id, "Great. Now send option A.")
                .await?;
            dialogue
                .update(QuizState::ReceiveOption {
                    question: QuestionData {
                        subject,
                        text,
                        options: Vec::with_capacity(4),
                    },
                })
                .await?;
        }
        Err(err) => {
            bot.send_message(msg.chat.id, format!("{}. Try again.", err.message))
                .await?;
        }
    }

    Ok(())
}

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0))]
pub(crate) async fn receive_option(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    mut question: QuestionData,
) -> HandlerResult {
    let Some(letter) = OptionLetter::from_index(question.options.len()) else {
        dialogue
            .update(QuizState::ReceiveCorrectOption { question })
            .await?;
        return Ok(());
    };

    let Some(raw) = msg.text() else {
        bot.send_message(msg.chat.id, format!("Please, send option {letter}."))
            .await?;
        return Ok(());
    };

    let option = match validation::option_text(letter, raw) {
        Ok(option) => option,
        Err(err) => {
            bot.send_message(msg.chat.id, format!("{}. Try again.", err.message))
                .await?;
            return Ok(());
        }
    };
    question.options.push(option);

    match OptionLetter::from_index(question.options.len()) {
        Some(next) => {
            bot.send_message(msg.chat.id, format!("Send option {next}."))
                .await?;
            dialogue
                .update(QuizState::ReceiveOption { question })
                .await?;
        }
        None => {
            bot.send_message(msg.chat.id, "Which option is correct?")
                .reply_markup(letters_keyboard(false))
                .await?;
            dialogue
                .update(QuizState::ReceiveCorrectOption { question })
                .await?;
        }
    }

    Ok(())
}

pub(crate) async fn receive_correct_option(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    question: QuestionData,
) -> HandlerResult {
    match msg.text().and_then(OptionLetter::from_letter) {
        Some(correct) => {
            bot.send_message(msg.chat.id, "How difficult is it?")
                .reply_markup(difficulty_keyboard())
                .await?;
            dialogue
                .update(QuizState::ReceiveDifficulty { question, correct })
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

pub(crate) async fn receive_difficulty(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    (question, correct): (QuestionData, OptionLetter),
) -> HandlerResult {
    match msg.text().map(str::parse::<Difficulty>) {
        Some(Ok(difficulty)) => {
            bot.send_message(
                msg.chat.id,
                "What topic does it cover? Send - to use \"General\".",
            )
            .reply_markup(ReplyMarkup::kb_remove())
            .await?;
            dialogue
                .update(QuizState::ReceiveTopic {
                    question,
                    correct,
                    difficulty,
                })
                .await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Please, choose easy, medium or hard.")
                .reply_markup(difficulty_keyboard())
                .await?;
        }
    }

    Ok(())
}

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0))]
pub(crate) async fn receive_topic<Creator: CreateQuestions>(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    (question, correct, difficulty): (QuestionData, OptionLetter, Difficulty),
    connection: Arc<Creator>,
) -> HandlerResult {
    let Some(raw) = msg.text() else {
        bot.send_message(msg.chat.id, "Please, send a topic or -.")
            .await?;
        return Ok(());
    };
    let topic = if raw.trim() == "-" { "" } else { raw };

    let QuestionData {
        subject,
        text,
        options,
    } = question;
    let Ok(options) = <[String; 4]>::try_from(options) else {
        bot.send_message(msg.chat.id, "Some options went missing. Let's start over: send the question text.")
            .await?;
        dialogue
            .update(QuizState::ReceiveQuestionText { subject })
            .await?;
        return Ok(());
    };

    let draft = validation::question_draft(QuestionDraft {
        text,
        options,
        correct,
        difficulty,
        topic: topic.to_owned(),
        source: QuestionSource::Manual,
    })?;

    let created = connection
        .create_question(subject.uuid, draft, msg.chat.id.0)
        .await?;
    tracing::info!(question = %created.uuid, subject = %subject.name, "question saved");

    bot.send_message(msg.chat.id, format!("Question saved:\n{}", created))
        .await?;
    bot.send_message(msg.chat.id, "Do you want to add another question? (Yes/No)")
        .reply_markup(yes_no_keyboard())
        .await?;
    dialogue
        .update(QuizState::ReceiveAddAnotherQuestion { subject })
        .await?;

    Ok(())
}

pub(crate) async fn receive_add_another_question(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    subject: Subject,
) -> HandlerResult {
    match msg.text() {
        Some(text) if is_yes(text) => {
            bot.send_message(msg.chat.id, "Great. Please enter a question.")
                .reply_markup(ReplyMarkup::kb_remove())
                .await?;
            dialogue
                .update(QuizState::ReceiveQuestionText { subject })
                .await?;
        }
        Some(text) if is_no(text) => {
            dialogue.update(QuizState::Start).await?;
            show_menu(&bot, msg.chat.id, true, "Done. What do you want to do now?").await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Please, answer Yes or No.")
                .reply_markup(yes_no_keyboard())
                .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::sheet::parse_sheet;

    #[test]
    fn upload_prompt_lists_columns_the_parser_accepts() {
        let prompt = upload_prompt("Math");
        let columns = prompt
            .split_once("columns: ")
            .and_then(|(_, rest)| rest.split_once(".\n"))
            .map(|(columns, _)| columns.replace(", ", ","))
            .unwrap();

        let sheet = format!("{columns}\n2 + 2?,3,4,5,6,B,easy,Math\n");
        let report = parse_sheet("questions.csv", sheet.into_bytes()).unwrap();
        assert_eq!(report.valid_rows, 1);
        assert_eq!(report.questions[0].correct, OptionLetter::B);
    }
}
