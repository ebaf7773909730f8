use std::sync::Arc;

use teloxide::{prelude::Requester, types::Message, Bot};
use tracing::instrument;

use crate::{
    commands::{show_menu, HISTORY_LIMIT},
    config::Config,
    database::{
        connection::{ManageUsers, RetrieveStandings},
        model::Role,
    },
    state::QuizState,
    validation, HandlerResult, UserDialogue,
};

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0))]
pub(crate) async fn receive_display_name<Users: ManageUsers>(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    connection: Arc<Users>,
    config: Arc<Config>,
) -> HandlerResult {
    let Some(raw) = msg.text() else {
        bot.send_message(msg.chat.id, "Please, send your display name as text.")
            .await?;
        return Ok(());
    };

    let display_name = match validation::display_name(raw) {
        Ok(name) => name,
        Err(err) => {
            bot.send_message(msg.chat.id, format!("{}. Try again.", err.message))
                .await?;
            return Ok(());
        }
    };

    let username = msg.chat.username();
    let role = if config.is_admin(username) {
        Role::Admin
    } else {
        Role::Student
    };

    let user = connection
        .register_user(msg.chat.id.0, username, &display_name, role)
        .await?;
    tracing::info!(user = user.id, role = user.role.as_str(), "user signed up");

    dialogue.update(QuizState::Start).await?;
    show_menu(
        &bot,
        msg.chat.id,
        user.is_admin(),
        &format!("Nice to meet you, {}! Please choose what to do:", user.display_name),
    )
    .await
}

pub(crate) async fn profile<Connect: ManageUsers + RetrieveStandings>(
    bot: Bot,
    msg: Message,
    connection: Arc<Connect>,
) -> HandlerResult {
    let Some(user) = connection.find_user(msg.chat.id.0).await? else {
        bot.send_message(msg.chat.id, "You are not signed up yet. Send /start.")
            .await?;
        return Ok(());
    };

    let attempts = connection.history(user.id, HISTORY_LIMIT).await?;
    let username = user
        .username
        .as_deref()
        .map(|name| format!("@{name}"))
        .unwrap_or_else(|| "-".to_owned());

    bot.send_message(
        msg.chat.id,
        format!(
            "👤 {}\nUsername: {}\nRole: {}\nJoined: {}\nLast login: {}\nRecent attempts: {}",
            user.display_name,
            username,
            user.role.as_str(),
            user.created_at.format("%Y-%m-%d"),
            user.last_login.format("%Y-%m-%d %H:%M UTC"),
            attempts.len(),
        ),
    )
    .await?;
    Ok(())
}
