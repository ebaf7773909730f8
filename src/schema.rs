use std::{error::Error, sync::Arc};

use teloxide::{
    dispatching::{
        dialogue::{self, InMemStorage},
        DpHandlerDescription, UpdateFilterExt, UpdateHandler,
    },
    dptree::{self, Handler},
    payloads::SendMessageSetters,
    prelude::{DependencyMap, Requester},
    types::{ChatId, Message, Update},
    Bot,
};
use tracing::instrument;

use crate::{
    account,
    commands::{self, cancel, help, start, Command},
    config::Config,
    constructor,
    database::connection::{Connection, ManageSubjects, ManageUsers},
    editor, importer,
    import::ocr::TesseractCli,
    keyboard::{
        action_keyboard, subjects_keyboard, CREATE_QUESTION, IMPORT_IMAGE, LEADERBOARD,
        MANAGE_QUESTIONS, MY_STATS, TAKE_QUIZ, UPLOAD_SHEET,
    },
    runner,
    state::{Authoring, QuizState},
    HandlerResult, UserDialogue,
};

type SchemeHandler = Handler<
    'static,
    DependencyMap,
    Result<(), Box<dyn Error + Send + Sync + 'static>>,
    DpHandlerDescription,
>;

pub fn schema() -> UpdateHandler<Box<dyn Error + Send + Sync + 'static>> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Help].endpoint(help))
        .branch(case![Command::Start].endpoint(start::<Connection>))
        .branch(case![Command::Cancel].endpoint(cancel))
        .branch(case![Command::Leaderboard].endpoint(commands::leaderboard::<Connection>))
        .branch(case![Command::History].endpoint(commands::history::<Connection>))
        .branch(case![Command::Stats].endpoint(commands::stats::<Connection>))
        .branch(case![Command::Profile].endpoint(account::profile::<Connection>))
        .branch(case![Command::Template].endpoint(commands::template));

    let handler = Update::filter_message()
        .branch(command_handler)
        .branch(case![QuizState::Start].endpoint(choose_what_to_do::<Connection>))
        .branch(
            case![QuizState::ReceiveDisplayName]
                .endpoint(account::receive_display_name::<Connection>),
        )
        .branch(constructor_scheme())
        .branch(importer_scheme())
        .branch(running_scheme())
        .branch(editor_scheme())
        .endpoint(invalid_state);

    dialogue::enter::<Update, InMemStorage<QuizState>, QuizState, _>()
        .branch(handler)
        .branch(callback_query_scheme())
}

async fn ask_subject<Subjects: ManageSubjects>(
    bot: &Bot,
    dialogue: &UserDialogue,
    chat_id: ChatId,
    purpose: Authoring,
    connection: &Subjects,
) -> HandlerResult {
    let subjects = connection.all_subjects().await?;
    let allow_new = purpose != Authoring::Manage;

    if subjects.is_empty() && !allow_new {
        bot.send_message(chat_id, "No subjects yet.").await?;
        return Ok(());
    }

    bot.send_message(chat_id, "Please, choose a subject:")
        .reply_markup(subjects_keyboard(&subjects, allow_new))
        .await?;
    dialogue.update(QuizState::SelectSubject { purpose }).await?;
    Ok(())
}

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0))]
async fn choose_what_to_do<Connect: ManageSubjects + ManageUsers>(
    bot: Bot,
    msg: Message,
    dialogue: UserDialogue,
    connection: Arc<Connect>,
    config: Arc<Config>,
) -> HandlerResult {
    if connection.find_user(msg.chat.id.0).await?.is_none() {
        bot.send_message(msg.chat.id, "Please, send /start to sign up first.")
            .await?;
        return Ok(());
    }

    let admin = config.is_admin(msg.chat.username());
    let authoring = match msg.text() {
        Some(TAKE_QUIZ) => {
            let subjects: Vec<_> = connection
                .all_subjects()
                .await?
                .into_iter()
                .filter(|subject| subject.question_count > 0)
                .collect();
            if subjects.is_empty() {
                bot.send_message(msg.chat.id, "No available quizzes.")
                    .await?;
            } else {
                tracing::info!("user chooses to take a quiz");
                bot.send_message(msg.chat.id, "Please, choose a subject:")
                    .reply_markup(subjects_keyboard(&subjects, false))
                    .await?;
                dialogue.update(QuizState::Selection).await?;
            }
            return Ok(());
        }
        Some(LEADERBOARD) => {
            return commands::leaderboard(bot, msg, dialogue, connection).await;
        }
        Some(MY_STATS) => {
            return commands::stats(bot, msg, dialogue, connection).await;
        }
        Some(CREATE_QUESTION) if admin => Authoring::Create,
        Some(UPLOAD_SHEET) if admin => Authoring::Upload,
        Some(IMPORT_IMAGE) if admin => Authoring::Ocr,
        Some(MANAGE_QUESTIONS) if admin => Authoring::Manage,
        other => {
            tracing::info!(input = ?other, "invalid menu choice");
            bot.send_message(msg.chat.id, "Invalid input. Please try again.")
                .reply_markup(action_keyboard(admin))
                .await?;
            return Ok(());
        }
    };

    tracing::info!(purpose = ?authoring, "admin starts authoring");
    ask_subject(&bot, &dialogue, msg.chat.id, authoring, connection.as_ref()).await
}

#[instrument(level = "debug")]
fn constructor_scheme() -> SchemeHandler {
    use dptree::case;
    tracing::debug!("Building a dispatch tree for constructor");
    Update::filter_message()
        .branch(
            case![QuizState::SelectSubject { purpose }]
                .endpoint(constructor::select_subject::<Connection>),
        )
        .branch(
            case![QuizState::ReceiveSubjectName { purpose }]
                .endpoint(constructor::receive_subject_name::<Connection>),
        )
        .branch(
            case![QuizState::ReceiveQuestionText { subject }]
                .endpoint(constructor::receive_question_text),
        )
        .branch(case![QuizState::ReceiveOption { question }].endpoint(constructor::receive_option))
        .branch(
            case![QuizState::ReceiveCorrectOption { question }]
                .endpoint(constructor::receive_correct_option),
        )
        .branch(
            case![QuizState::ReceiveDifficulty { question, correct }]
                .endpoint(constructor::receive_difficulty),
        )
        .branch(
            case![QuizState::ReceiveTopic {
                question,
                correct,
                difficulty
            }]
            .endpoint(constructor::receive_topic::<Connection>),
        )
        .branch(
            case![QuizState::ReceiveAddAnotherQuestion { subject }]
                .endpoint(constructor::receive_add_another_question),
        )
}

#[instrument(level = "debug")]
fn importer_scheme() -> SchemeHandler {
    use dptree::case;
    tracing::debug!("Building a dispatch tree for importer");
    Update::filter_message()
        .branch(case![QuizState::AwaitSheet { subject }].endpoint(importer::receive_sheet))
        .branch(
            case![QuizState::ConfirmSheet { subject, drafts }]
                .endpoint(importer::confirm_sheet::<Connection>),
        )
        .branch(
            case![QuizState::AwaitImage { subject }]
                .endpoint(importer::receive_image::<TesseractCli>),
        )
        .branch(
            case![QuizState::ReviewDraft {
                subject,
                pending,
                accepted
            }]
            .endpoint(importer::review_draft::<Connection>),
        )
}

#[instrument(level = "debug")]
fn running_scheme() -> SchemeHandler {
    use dptree::case;
    tracing::debug!("Building a dispatch tree for runner");
    Update::filter_message()
        .branch(case![QuizState::Selection].endpoint(runner::selection::<Connection>))
        .branch(case![QuizState::ReadyToRun { subject }].endpoint(runner::running_ready::<Connection>))
        .branch(case![QuizState::SelectReport { report }].endpoint(runner::select_report::<Connection>))
}

#[instrument(level = "debug")]
fn callback_query_scheme() -> SchemeHandler {
    use dptree::case;
    tracing::debug!("Building a dispatch tree for callback queries");
    Update::filter_callback_query()
        .branch(case![QuizState::Running { session }].endpoint(runner::take_answer::<Connection>))
        .endpoint(runner::stale_callback)
}

#[instrument(level = "debug")]
fn editor_scheme() -> SchemeHandler {
    use dptree::case;
    tracing::debug!("Building a dispatch tree for editor");
    Update::filter_message()
        .branch(
            case![QuizState::SelectQuestion {
                subject,
                questions,
                page
            }]
                .endpoint(editor::select_question::<Connection>),
        )
        .branch(
            case![QuizState::HandleQuestion {
                subject,
                question_id
            }]
            .endpoint(editor::handle_question::<Connection>),
        )
        .branch(
            case![QuizState::EditQuestionText {
                subject,
                question_id
            }]
            .endpoint(editor::edit_question_text::<Connection>),
        )
        .branch(
            case![QuizState::EditCorrectOption {
                subject,
                question_id
            }]
            .endpoint(editor::edit_correct_option::<Connection>),
        )
        .branch(
            case![QuizState::DeleteQuestion {
                subject,
                question_id
            }]
            .endpoint(editor::delete_question::<Connection>),
        )
}

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0))]
async fn invalid_state(bot: Bot, msg: Message) -> HandlerResult {
    tracing::info!(input = ?msg.text(), "unable to handle the message");
    bot.send_message(
        msg.chat.id,
        "Unable to handle the message. Enter /help to see usages.",
    )
    .await?;
    Ok(())
}
