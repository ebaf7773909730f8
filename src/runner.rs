use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use teloxide::{
    dispatching::dialogue::GetChatId,
    payloads::{AnswerCallbackQuerySetters, EditMessageTextSetters, SendMessageSetters},
    prelude::Requester,
    types::{CallbackQuery, Message, ParseMode, ReplyMarkup},
    Bot,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    analytics::PerformanceAnalytics,
    commands::show_menu,
    config::Config,
    database::{
        connection::{ManageSubjects, ManageUsers, RecordAttempts, RetrieveQuestions, RetrieveStandings},
        model::{Attempt, OptionLetter, Subject},
    },
    keyboard::{is_no, is_yes, session_keyboard, yes_no_keyboard},
    leaderboard::{rank, RankedEntry},
    session::{format_clock, FinishClaims, QuizSession, SessionOutcome},
    state::{QuizState, Report},
    HandlerResult, UserDialogue,
};

/// How many recent attempts feed the stats report.
pub(crate) const ANALYTICS_ATTEMPTS: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionAction {
    Answer(usize),
    Prev,
    Next,
    Finish,
}

pub(crate) fn parse_action(data: &str) -> Option<SessionAction> {
    match data.split_once(':')? {
        ("ans", option) => option.parse().ok().map(SessionAction::Answer),
        ("nav", "prev") => Some(SessionAction::Prev),
        ("nav", "next") => Some(SessionAction::Next),
        ("nav", "finish") => Some(SessionAction::Finish),
        _ => None,
    }
}

pub(crate) fn render_question(session: &QuizSession, now: DateTime<Utc>) -> String {
    let Some(question) = session.current() else {
        return "No questions left.".to_owned();
    };

    let mut text = format!(
        "{} · Q {} / {} · ⏱ {}\n\n{}\n",
        session.subject_name(),
        session.current_index() + 1,
        session.len(),
        format_clock(session.remaining(now).as_secs()),
        question.text
    );
    for letter in OptionLetter::ALL {
        text.push_str(&format!("\n{}) {}", letter, question.option(letter)));
    }
    text.push_str(&format!(
        "\n\nAnswered {}/{}",
        session.answered_count(),
        session.len()
    ));
    text
}

pub(crate) fn render_outcome(session: &QuizSession, outcome: &SessionOutcome) -> String {
    let mut text = format!(
        "🏁 {} finished\nScore: {}/{} ({:.2}%)\nTime: {}\n{}\n",
        outcome.subject_name,
        outcome.correct,
        outcome.total,
        outcome.percentage,
        format_clock(outcome.duration_secs.max(0) as u64),
        outcome.verdict()
    );

    for (idx, (question, answer)) in session.questions().iter().zip(&outcome.answers).enumerate() {
        let selected = answer
            .selected
            .map(|letter| letter.to_string())
            .unwrap_or_else(|| "-".to_owned());
        if answer.is_correct {
            text.push_str(&format!("\n{}. ✅ {}", idx + 1, selected));
        } else {
            text.push_str(&format!(
                "\n{}. ❌ {} (correct: {})",
                idx + 1,
                selected,
                question.correct
            ));
        }
    }
    text
}

pub(crate) fn render_leaderboard(subject: &Subject, ranked: &[RankedEntry], viewer: i64) -> String {
    if ranked.is_empty() {
        return format!("🏆 {}\nNobody has taken this quiz yet.", subject.name);
    }

    let mut text = format!("🏆 {}", subject.name);
    for RankedEntry { rank, entry } in ranked {
        let marker = if entry.user_id == viewer { "👉 " } else { "" };
        text.push_str(&format!(
            "\n{}{}. {} · best {:.1}% · avg {:.1}% · {} attempts",
            marker,
            rank,
            entry.display_name,
            entry.best_score,
            entry.average_score,
            entry.total_attempts
        ));
    }
    text
}

pub(crate) fn render_history(attempts: &[Attempt]) -> String {
    if attempts.is_empty() {
        return "You have not taken any quiz yet.".to_owned();
    }

    let mut text = "📜 Recent attempts".to_owned();
    for attempt in attempts {
        text.push_str(&format!(
            "\n{} · {}: {}/{} ({:.2}%) in {}",
            attempt.completed_at.format("%Y-%m-%d %H:%M"),
            attempt.subject_name,
            attempt.correct_answers,
            attempt.total_questions,
            attempt.score,
            format_clock(attempt.duration_secs.max(0) as u64)
        ));
    }
    text
}

pub(crate) fn render_stats(subject: &Subject, analytics: &PerformanceAnalytics) -> String {
    if analytics.total_attempts == 0 {
        return format!("📊 {}\nNo attempts yet.", subject.name);
    }

    let mut text = format!(
        "📊 {}\nAttempts: {}\nAverage: {:.2}%\nBest: {:.2}%\nWorst: {:.2}%\n\nBy difficulty:",
        subject.name,
        analytics.total_attempts,
        analytics.average_score,
        analytics.best_score,
        analytics.worst_score
    );
    for bucket in &analytics.difficulty_performance {
        text.push_str(&format!(
            "\n{}: {}/{} ({:.1}%)",
            bucket.key, bucket.correct_answers, bucket.total_questions, bucket.accuracy
        ));
    }

    if !analytics.topic_performance.is_empty() {
        text.push_str("\n\nBy topic:");
        for bucket in &analytics.topic_performance {
            text.push_str(&format!(
                "\n{}: {}/{} ({:.1}%)",
                bucket.key, bucket.correct_answers, bucket.total_questions, bucket.accuracy
            ));
        }
    }
    text
}

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0))]
pub(crate) async fn selection<Subjects: ManageSubjects>(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    connection: Arc<Subjects>,
    config: Arc<Config>,
) -> HandlerResult {
    let Some(name) = msg.text() else {
        bot.send_message(msg.chat.id, "Please, choose a subject.")
            .await?;
        return Ok(());
    };

    match connection.find_subject(name).await? {
        Some(subject) if subject.question_count == 0 => {
            bot.send_message(
                msg.chat.id,
                "Sorry, no questions for that subject available. Choose another one.",
            )
            .await?;
        }
        Some(subject) => {
            tracing::info!(subject = %subject.name, "subject selected");
            let count = usize::try_from(subject.question_count)
                .unwrap_or(0)
                .min(config.quiz_question_count);
            bot.send_message(
                msg.chat.id,
                format!(
                    "Subject: {}\nQuestions: {}\nTime limit: {}\nAre you ready to begin? (Yes/No)",
                    subject.name,
                    count,
                    format_clock(config.quiz_duration.as_secs())
                ),
            )
            .reply_markup(yes_no_keyboard())
            .await?;
            dialogue.update(QuizState::ReadyToRun { subject }).await?;
        }
        None => {
            bot.send_message(msg.chat.id, format!("Subject '{}' not found.", name))
                .await?;
        }
    }

    Ok(())
}

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0, subject = %subject.name))]
pub(crate) async fn running_ready<Connect>(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    subject: Subject,
    connection: Arc<Connect>,
    config: Arc<Config>,
    claims: Arc<FinishClaims>,
) -> HandlerResult
where
    Connect: RetrieveQuestions + RecordAttempts + ManageUsers + Send + Sync + 'static,
{
    let admin = config.is_admin(msg.chat.username());

    match msg.text() {
        Some(text) if is_yes(text) => {
            let questions = connection
                .sample_questions(subject.uuid, config.quiz_question_count)
                .await?;
            if questions.is_empty() {
                dialogue.update(QuizState::Start).await?;
                return show_menu(
                    &bot,
                    msg.chat.id,
                    admin,
                    "Sorry, no questions for that subject available.",
                )
                .await;
            }

            let now = Utc::now();
            let session = QuizSession::start(&subject, questions, now, config.quiz_duration);
            let session_id = session.id();
            tracing::info!(session = %session_id, questions = session.len(), "quiz started");

            bot.send_message(msg.chat.id, "Let's begin!")
                .reply_markup(ReplyMarkup::kb_remove())
                .await?;
            bot.send_message(msg.chat.id, render_question(&session, now))
                .reply_markup(session_keyboard(&session))
                .await?;

            dialogue.update(QuizState::Running { session }).await?;
            watch_deadline(
                bot,
                dialogue,
                session_id,
                config.quiz_duration,
                connection,
                claims,
                admin,
            );
        }
        Some(text) if is_no(text) => {
            tracing::info!("user quits before starting");
            dialogue.update(QuizState::Start).await?;
            show_menu(&bot, msg.chat.id, admin, "OK. What do you want to do now?").await?;
        }
        _ => {
            bot.send_message(
                msg.chat.id,
                "Please, enter a valid answer <b>Yes</b> or <b>No</b>.",
            )
            .parse_mode(ParseMode::Html)
            .await?;
        }
    }

    Ok(())
}

#[instrument(level = "info", skip_all, fields(session = %session.id()))]
pub(crate) async fn take_answer<Connect: RecordAttempts + ManageUsers>(
    bot: Bot,
    dialogue: UserDialogue,
    q: CallbackQuery,
    mut session: QuizSession,
    connection: Arc<Connect>,
    config: Arc<Config>,
    claims: Arc<FinishClaims>,
) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(chat_id) = q.chat_id() else {
        return Ok(());
    };
    let admin = config.is_admin(q.from.username.as_deref());
    let now = Utc::now();

    if session.is_expired(now) {
        if !claims.claim(session.id(), now) {
            return Ok(());
        }
        bot.send_message(chat_id, "⏰ Time is up!").await?;
        return finish_session(&bot, &dialogue, session, connection.as_ref(), admin).await;
    }

    match q.data.as_deref().and_then(parse_action) {
        Some(SessionAction::Answer(option)) => {
            let letter = session.submit_answer(option)?;
            tracing::debug!(question = session.current_index() + 1, %letter, "answer recorded");
        }
        Some(SessionAction::Prev) => session.prev_question(),
        Some(SessionAction::Next) => session.next_question(),
        Some(SessionAction::Finish) => {
            if !claims.claim(session.id(), now) {
                tracing::debug!("quiz is already being finished");
                return Ok(());
            }
            return finish_session(&bot, &dialogue, session, connection.as_ref(), admin).await;
        }
        None => {
            tracing::warn!(data = ?q.data, "unknown callback data");
            return Ok(());
        }
    }

    let text = render_question(&session, now);
    let keyboard = session_keyboard(&session);
    dialogue.update(QuizState::Running { session }).await?;

    if let Some(message) = &q.message {
        if let Err(err) = bot
            .edit_message_text(chat_id, message.id(), text)
            .reply_markup(keyboard)
            .await
        {
            tracing::warn!(%err, "failed to refresh the question");
        }
    }

    Ok(())
}

/// Buttons of a quiz that is no longer running.
pub(crate) async fn stale_callback(bot: Bot, q: CallbackQuery) -> HandlerResult {
    bot.answer_callback_query(q.id.clone())
        .text("This quiz is already over.")
        .await?;
    Ok(())
}

async fn finish_session<Connect: RecordAttempts + ManageUsers>(
    bot: &Bot,
    dialogue: &UserDialogue,
    mut session: QuizSession,
    connection: &Connect,
    admin: bool,
) -> HandlerResult {
    let chat_id = dialogue.chat_id();
    let outcome = session.finish(Utc::now());
    dialogue.update(QuizState::Start).await?;

    tracing::info!(
        session = %outcome.session_id,
        correct = outcome.correct,
        total = outcome.total,
        percentage = outcome.percentage,
        "quiz finished"
    );
    show_menu(bot, chat_id, admin, &render_outcome(&session, &outcome)).await?;

    match connection.find_user(chat_id.0).await? {
        Some(user) => {
            let entry = connection.record_attempt(&user, &outcome).await?;
            tracing::debug!(
                attempts = entry.total_attempts,
                best = entry.best_score,
                "leaderboard updated"
            );
        }
        None => tracing::warn!("attempt of an unregistered user is not recorded"),
    }

    Ok(())
}

/// Finishes the session once its time is up unless the user finished it first.
fn watch_deadline<Connect>(
    bot: Bot,
    dialogue: UserDialogue,
    session_id: Uuid,
    wait: Duration,
    connection: Arc<Connect>,
    claims: Arc<FinishClaims>,
    admin: bool,
) where
    Connect: RecordAttempts + ManageUsers + Send + Sync + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(wait).await;

        let session = match dialogue.get().await {
            Ok(Some(QuizState::Running { session })) if session.id() == session_id => session,
            Ok(_) => return,
            Err(err) => {
                tracing::error!(%err, "failed to read dialogue state");
                return;
            }
        };

        if !claims.claim(session_id, Utc::now()) {
            tracing::debug!(session = %session_id, "quiz was finished by the user");
            return;
        }

        tracing::info!(session = %session_id, "quiz deadline reached");
        if let Err(err) = bot.send_message(dialogue.chat_id(), "⏰ Time is up!").await {
            tracing::warn!(%err, "failed to announce the deadline");
        }
        if let Err(err) = finish_session(&bot, &dialogue, session, connection.as_ref(), admin).await {
            tracing::error!(%err, "failed to finish an expired quiz");
        }
    });
}

#[instrument(level = "info", skip_all, fields(chat = msg.chat.id.0))]
pub(crate) async fn select_report<Connect: ManageSubjects + RetrieveStandings>(
    bot: Bot,
    dialogue: UserDialogue,
    msg: Message,
    report: Report,
    connection: Arc<Connect>,
    config: Arc<Config>,
) -> HandlerResult {
    let Some(name) = msg.text() else {
        bot.send_message(msg.chat.id, "Please, choose a subject.")
            .await?;
        return Ok(());
    };

    let Some(subject) = connection.find_subject(name).await? else {
        bot.send_message(msg.chat.id, format!("Subject '{}' not found.", name))
            .await?;
        return Ok(());
    };

    let user_id = msg.chat.id.0;
    let text = match report {
        Report::Leaderboard => {
            let entries = connection.leaderboard(subject.uuid).await?;
            render_leaderboard(&subject, &rank(entries, config.leaderboard_size), user_id)
        }
        Report::Stats => {
            let attempts = connection
                .attempts_in_subject(user_id, subject.uuid, ANALYTICS_ATTEMPTS)
                .await?;
            let facts = connection
                .answer_facts(user_id, subject.uuid, ANALYTICS_ATTEMPTS)
                .await?;
            let analytics =
                PerformanceAnalytics::from_attempts(user_id, subject.uuid, attempts, &facts);
            render_stats(&subject, &analytics)
        }
    };

    dialogue.update(QuizState::Start).await?;
    show_menu(&bot, msg.chat.id, config.is_admin(msg.chat.username()), &text).await
}
