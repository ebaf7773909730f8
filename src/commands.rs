use std::sync::Arc;

use teloxide::{
    payloads::{SendDocumentSetters, SendMessageSetters},
    prelude::Requester,
    types::{ChatId, InputFile, Message, ReplyMarkup},
    utils::command::BotCommands,
    Bot,
};
use tracing::instrument;

use crate::{
    config::Config,
    database::{
        connection::{ManageSubjects, ManageUsers, RetrieveStandings},
        model::Role,
    },
    import::sheet::template_csv,
    keyboard::{action_keyboard, subjects_keyboard},
    runner::render_history,
    state::{QuizState, Report},
    HandlerResult, UserDialogue,
};

pub(crate) const HISTORY_LIMIT: i64 = 20;

#[derive(Debug, Clone, BotCommands)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    #[command(description = "display help.")]
    Help,
    #[command(description = "sign up or log in.")]
    Start,
    #[command(description = "cancel the current action.")]
    Cancel,
    #[command(description = "show the leaderboard of a subject.")]
    Leaderboard,
    #[command(description = "show your recent attempts.")]
    History,
    #[command(description = "show your performance in a subject.")]
    Stats,
    #[command(description = "show your profile.")]
    Profile,
    #[command(description = "download the bulk upload template.")]
    Template,
}

pub(crate) async fn show_menu(bot: &Bot, chat_id: ChatId, admin: bool, text: &str) -> HandlerResult {
    bot.send_message(chat_id, text)
        .reply_markup(action_keyboard(admin))
        .await?;
    Ok(())
}

pub(crate) async fn help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .await?;
    Ok(())
}

pub(crate) async fn cancel(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    config: Arc<Config>,
) -> HandlerResult {
    bot.send_message(msg.chat.id, "Cancelling dialogue").await?;
    dialogue.update(QuizState::Start).await?;
    show_menu(
        &bot,
        msg.chat.id,
        config.is_admin(msg.chat.username()),
        "What do you want to do now?",
    )
    .await
}

/// Logs a known user in, or begins signup for a new one.
#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0))]
pub(crate) async fn start<Users: ManageUsers>(
    bot: Bot,
    msg: Message,
    dialogue: UserDialogue,
    connection: Arc<Users>,
    config: Arc<Config>,
) -> HandlerResult {
    let username = msg.chat.username();
    let role = if config.is_admin(username) {
        Role::Admin
    } else {
        Role::Student
    };

    match connection.touch_login(msg.chat.id.0, username, role).await? {
        Some(user) => {
            tracing::info!(user = user.id, role = user.role.as_str(), "user logged in");
            dialogue.update(QuizState::Start).await?;
            show_menu(
                &bot,
                msg.chat.id,
                user.is_admin(),
                &format!("Welcome back, {}! Please choose what to do:", user.display_name),
            )
            .await?;
        }
        None => {
            tracing::info!("new user starts signup");
            bot.send_message(
                msg.chat.id,
                "Welcome to quizdeck! How should we call you? Send a display name.",
            )
            .reply_markup(ReplyMarkup::kb_remove())
            .await?;
            dialogue.update(QuizState::ReceiveDisplayName).await?;
        }
    }

    Ok(())
}

pub(crate) async fn history<Standings: RetrieveStandings>(
    bot: Bot,
    msg: Message,
    connection: Arc<Standings>,
) -> HandlerResult {
    let attempts = connection.history(msg.chat.id.0, HISTORY_LIMIT).await?;
    bot.send_message(msg.chat.id, render_history(&attempts))
        .await?;
    Ok(())
}

pub(crate) async fn template(bot: Bot, msg: Message) -> HandlerResult {
    let csv = template_csv()?;
    bot.send_document(
        msg.chat.id,
        InputFile::memory(csv.into_bytes()).file_name("questions_template.csv"),
    )
    .caption("Fill in one question per row and send the file back with \"Upload a spreadsheet\".")
    .await?;
    Ok(())
}

/// Entry point of `/leaderboard` and `/stats`: asks which subject to report on.
async fn choose_report<Subjects: ManageSubjects>(
    bot: Bot,
    msg: Message,
    dialogue: UserDialogue,
    report: Report,
    connection: Arc<Subjects>,
) -> HandlerResult {
    let subjects = connection.all_subjects().await?;
    if subjects.is_empty() {
        bot.send_message(msg.chat.id, "No subjects yet.").await?;
        return Ok(());
    }

    bot.send_message(msg.chat.id, "Please, choose a subject:")
        .reply_markup(subjects_keyboard(&subjects, false))
        .await?;
    dialogue.update(QuizState::SelectReport { report }).await?;
    Ok(())
}

pub(crate) async fn leaderboard<Subjects: ManageSubjects>(
    bot: Bot,
    msg: Message,
    dialogue: UserDialogue,
    connection: Arc<Subjects>,
) -> HandlerResult {
    choose_report(bot, msg, dialogue, Report::Leaderboard, connection).await
}

pub(crate) async fn stats<Subjects: ManageSubjects>(
    bot: Bot,
    msg: Message,
    dialogue: UserDialogue,
    connection: Arc<Subjects>,
) -> HandlerResult {
    choose_report(bot, msg, dialogue, Report::Stats, connection).await
}
