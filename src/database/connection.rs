use std::future::Future;

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPool, FromRow};
use uuid::Uuid;

use crate::{
    analytics::AnswerFact,
    error::StoreError,
    leaderboard::LeaderboardEntry,
    session::SessionOutcome,
};

use super::model::{
    Attempt, OptionLetter, Question, QuestionDraft, Role, Subject, User,
};

type StoreResult<T> = Result<T, StoreError>;

pub struct Connection {
    pool: PgPool,
}

impl Connection {
    pub async fn connect(connection_string: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(connection_string).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }
}

pub trait ManageUsers {
    fn find_user(&self, id: i64) -> impl Future<Output = StoreResult<Option<User>>> + Send;

    fn register_user(
        &self,
        id: i64,
        username: Option<&str>,
        display_name: &str,
        role: Role,
    ) -> impl Future<Output = StoreResult<User>> + Send;

    /// Records a login and refreshes the username and role; `None` for unknown users.
    fn touch_login(
        &self,
        id: i64,
        username: Option<&str>,
        role: Role,
    ) -> impl Future<Output = StoreResult<Option<User>>> + Send;
}

pub trait ManageSubjects {
    fn all_subjects(&self) -> impl Future<Output = StoreResult<Vec<Subject>>> + Send;

    fn find_subject(&self, name: &str) -> impl Future<Output = StoreResult<Option<Subject>>> + Send;

    fn create_subject(
        &self,
        name: &str,
        created_by: i64,
    ) -> impl Future<Output = StoreResult<Subject>> + Send;
}

pub trait CreateQuestions {
    fn create_question(
        &self,
        subject_id: Uuid,
        draft: QuestionDraft,
        created_by: i64,
    ) -> impl Future<Output = StoreResult<Question>> + Send;

    /// Inserts every draft or none of them.
    fn create_questions(
        &self,
        subject_id: Uuid,
        drafts: Vec<QuestionDraft>,
        created_by: i64,
    ) -> impl Future<Output = StoreResult<usize>> + Send;
}

pub trait RetrieveQuestions {
    fn questions_of_subject(
        &self,
        subject_id: Uuid,
    ) -> impl Future<Output = StoreResult<Vec<Question>>> + Send;

    fn sample_questions(
        &self,
        subject_id: Uuid,
        count: usize,
    ) -> impl Future<Output = StoreResult<Vec<Question>>> + Send;

    fn find_question(&self, id: Uuid) -> impl Future<Output = StoreResult<Option<Question>>> + Send;
}

pub trait EditQuestions {
    fn edit_question_text(&self, id: Uuid, text: &str)
        -> impl Future<Output = StoreResult<bool>> + Send;

    fn edit_correct_option(
        &self,
        id: Uuid,
        correct: OptionLetter,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    fn delete_question(&self, id: Uuid) -> impl Future<Output = StoreResult<bool>> + Send;
}

pub trait RecordAttempts {
    /// Stores the attempt with its answers and folds it into the leaderboard.
    fn record_attempt(
        &self,
        user: &User,
        outcome: &SessionOutcome,
    ) -> impl Future<Output = StoreResult<LeaderboardEntry>> + Send;
}

pub trait RetrieveStandings {
    fn leaderboard(
        &self,
        subject_id: Uuid,
    ) -> impl Future<Output = StoreResult<Vec<LeaderboardEntry>>> + Send;

    fn history(&self, user_id: i64, limit: i64)
        -> impl Future<Output = StoreResult<Vec<Attempt>>> + Send;

    fn attempts_in_subject(
        &self,
        user_id: i64,
        subject_id: Uuid,
        limit: i64,
    ) -> impl Future<Output = StoreResult<Vec<Attempt>>> + Send;

    fn answer_facts(
        &self,
        user_id: i64,
        subject_id: Uuid,
        limit: i64,
    ) -> impl Future<Output = StoreResult<Vec<AnswerFact>>> + Send;
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    username: Option<String>,
    display_name: String,
    role: String,
    created_at: DateTime<Utc>,
    last_login: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            username: row.username,
            display_name: row.display_name,
            role: row.role.parse().map_err(StoreError::Corrupt)?,
            created_at: row.created_at,
            last_login: row.last_login,
        })
    }
}

#[derive(FromRow)]
struct SubjectRow {
    uuid: Uuid,
    name: String,
    created_by: i64,
    question_count: i64,
}

impl From<SubjectRow> for Subject {
    fn from(row: SubjectRow) -> Self {
        Subject {
            uuid: row.uuid,
            name: row.name,
            created_by: row.created_by,
            question_count: row.question_count,
        }
    }
}

#[derive(FromRow)]
struct QuestionRow {
    uuid: Uuid,
    subject_id: Uuid,
    text: String,
    option_a: String,
    option_b: String,
    option_c: String,
    option_d: String,
    correct_option: i16,
    difficulty: String,
    topic: String,
    source: String,
    created_by: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = StoreError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        let correct = usize::try_from(row.correct_option)
            .ok()
            .and_then(OptionLetter::from_index)
            .ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "question {} has correct option {}",
                    row.uuid, row.correct_option
                ))
            })?;

        Ok(Question {
            uuid: row.uuid,
            subject_id: row.subject_id,
            text: row.text,
            options: [row.option_a, row.option_b, row.option_c, row.option_d],
            correct,
            difficulty: row.difficulty.parse().map_err(StoreError::Corrupt)?,
            topic: row.topic,
            source: row.source.parse().map_err(StoreError::Corrupt)?,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct AttemptRow {
    uuid: Uuid,
    user_id: i64,
    subject_id: Uuid,
    subject_name: String,
    score: f64,
    correct_answers: i32,
    total_questions: i32,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    duration_secs: i64,
}

impl From<AttemptRow> for Attempt {
    fn from(row: AttemptRow) -> Self {
        Attempt {
            uuid: row.uuid,
            user_id: row.user_id,
            subject_id: row.subject_id,
            subject_name: row.subject_name,
            score: row.score,
            correct_answers: row.correct_answers,
            total_questions: row.total_questions,
            started_at: row.started_at,
            completed_at: row.completed_at,
            duration_secs: row.duration_secs,
        }
    }
}

#[derive(FromRow)]
struct LeaderboardRow {
    user_id: i64,
    subject_id: Uuid,
    display_name: String,
    total_attempts: i32,
    average_score: f64,
    best_score: f64,
    total_correct: i32,
    total_questions: i32,
    last_attempt_at: DateTime<Utc>,
}

impl From<LeaderboardRow> for LeaderboardEntry {
    fn from(row: LeaderboardRow) -> Self {
        LeaderboardEntry {
            user_id: row.user_id,
            subject_id: row.subject_id,
            display_name: row.display_name,
            total_attempts: row.total_attempts,
            average_score: row.average_score,
            best_score: row.best_score,
            total_correct: row.total_correct,
            total_questions: row.total_questions,
            last_attempt_at: row.last_attempt_at,
        }
    }
}

#[derive(FromRow)]
struct AnswerFactRow {
    topic: String,
    difficulty: String,
    is_correct: bool,
}

const QUESTION_COLUMNS: &str = "uuid, subject_id, text, option_a, option_b, option_c, option_d, \
     correct_option, difficulty, topic, source, created_by, created_at";

const SUBJECT_SELECT: &str = "SELECT subjects.uuid, subjects.name, subjects.created_by, \
     (SELECT COUNT(*) FROM questions WHERE questions.subject_id = subjects.uuid) AS question_count \
     FROM subjects";

const ATTEMPT_SELECT: &str = "SELECT quiz_attempts.uuid, quiz_attempts.user_id, quiz_attempts.subject_id, \
     subjects.name AS subject_name, quiz_attempts.score, quiz_attempts.correct_answers, \
     quiz_attempts.total_questions, quiz_attempts.started_at, quiz_attempts.completed_at, \
     quiz_attempts.duration_secs \
     FROM quiz_attempts INNER JOIN subjects ON subjects.uuid = quiz_attempts.subject_id";

fn questions_from_rows(rows: Vec<QuestionRow>) -> StoreResult<Vec<Question>> {
    rows.into_iter().map(Question::try_from).collect()
}

impl ManageUsers for Connection {
    async fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, display_name, role, created_at, last_login FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn register_user(
        &self,
        id: i64,
        username: Option<&str>,
        display_name: &str,
        role: Role,
    ) -> StoreResult<User> {
        tracing::debug!(id, display_name, role = role.as_str(), "registering user");
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (id, username, display_name, role) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET username = EXCLUDED.username, \
             display_name = EXCLUDED.display_name, role = EXCLUDED.role, last_login = now() \
             RETURNING id, username, display_name, role, created_at, last_login",
        )
        .bind(id)
        .bind(username)
        .bind(display_name)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await?;

        User::try_from(row)
    }

    async fn touch_login(
        &self,
        id: i64,
        username: Option<&str>,
        role: Role,
    ) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "UPDATE users SET last_login = now(), username = $2, role = $3 WHERE id = $1 \
             RETURNING id, username, display_name, role, created_at, last_login",
        )
        .bind(id)
        .bind(username)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }
}

impl ManageSubjects for Connection {
    async fn all_subjects(&self) -> StoreResult<Vec<Subject>> {
        let rows = sqlx::query_as::<_, SubjectRow>(&format!("{SUBJECT_SELECT} ORDER BY subjects.name"))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Subject::from).collect())
    }

    async fn find_subject(&self, name: &str) -> StoreResult<Option<Subject>> {
        let row = sqlx::query_as::<_, SubjectRow>(&format!(
            "{SUBJECT_SELECT} WHERE lower(subjects.name) = lower($1)"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Subject::from))
    }

    async fn create_subject(&self, name: &str, created_by: i64) -> StoreResult<Subject> {
        let uuid = Uuid::new_v4();
        sqlx::query("INSERT INTO subjects (uuid, name, created_by) VALUES ($1, $2, $3)")
            .bind(uuid)
            .bind(name)
            .bind(created_by)
            .execute(&self.pool)
            .await?;

        tracing::info!(%uuid, name, "subject created");
        Ok(Subject {
            uuid,
            name: name.to_owned(),
            created_by,
            question_count: 0,
        })
    }
}

async fn insert_question<'e, E>(executor: E, question: &Question) -> StoreResult<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(&format!(
        "INSERT INTO questions ({QUESTION_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
    ))
    .bind(question.uuid)
    .bind(question.subject_id)
    .bind(&question.text)
    .bind(&question.options[0])
    .bind(&question.options[1])
    .bind(&question.options[2])
    .bind(&question.options[3])
    .bind(question.correct.index() as i16)
    .bind(question.difficulty.as_str())
    .bind(&question.topic)
    .bind(question.source.as_str())
    .bind(question.created_by)
    .bind(question.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

impl CreateQuestions for Connection {
    async fn create_question(
        &self,
        subject_id: Uuid,
        draft: QuestionDraft,
        created_by: i64,
    ) -> StoreResult<Question> {
        let question = Question::from_draft(draft, subject_id, created_by);
        insert_question(&self.pool, &question).await?;
        tracing::debug!(uuid = %question.uuid, %subject_id, "question created");
        Ok(question)
    }

    async fn create_questions(
        &self,
        subject_id: Uuid,
        drafts: Vec<QuestionDraft>,
        created_by: i64,
    ) -> StoreResult<usize> {
        tracing::debug!("Creating transaction");
        let mut tx = self.pool.begin().await?;

        let count = drafts.len();
        for draft in drafts {
            let question = Question::from_draft(draft, subject_id, created_by);
            tracing::debug!(uuid = %question.uuid, "Adding question");
            insert_question(&mut *tx, &question).await?;
        }

        tracing::debug!("Closing transaction");
        tx.commit().await?;

        tracing::info!(%subject_id, count, "bulk questions created");
        Ok(count)
    }
}

impl RetrieveQuestions for Connection {
    async fn questions_of_subject(&self, subject_id: Uuid) -> StoreResult<Vec<Question>> {
        let rows = sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE subject_id = $1 ORDER BY created_at"
        ))
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;

        questions_from_rows(rows)
    }

    async fn sample_questions(&self, subject_id: Uuid, count: usize) -> StoreResult<Vec<Question>> {
        let rows = sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE subject_id = $1 ORDER BY random() LIMIT $2"
        ))
        .bind(subject_id)
        .bind(i64::try_from(count).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        questions_from_rows(rows)
    }

    async fn find_question(&self, id: Uuid) -> StoreResult<Option<Question>> {
        let row = sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE uuid = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Question::try_from).transpose()
    }
}

impl EditQuestions for Connection {
    async fn edit_question_text(&self, id: Uuid, text: &str) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE questions SET text = $1 WHERE uuid = $2")
            .bind(text)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn edit_correct_option(&self, id: Uuid, correct: OptionLetter) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE questions SET correct_option = $1 WHERE uuid = $2")
            .bind(correct.index() as i16)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_question(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM questions WHERE uuid = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl RecordAttempts for Connection {
    async fn record_attempt(
        &self,
        user: &User,
        outcome: &SessionOutcome,
    ) -> StoreResult<LeaderboardEntry> {
        tracing::debug!("Creating transaction");
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO quiz_attempts (uuid, user_id, subject_id, score, correct_answers, \
             total_questions, started_at, completed_at, duration_secs) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(outcome.session_id)
        .bind(user.id)
        .bind(outcome.subject_id)
        .bind(outcome.percentage)
        .bind(outcome.correct as i32)
        .bind(outcome.total as i32)
        .bind(outcome.started_at)
        .bind(outcome.finished_at)
        .bind(outcome.duration_secs)
        .execute(&mut *tx)
        .await?;

        for (position, answer) in outcome.answers.iter().enumerate() {
            sqlx::query(
                "INSERT INTO attempt_answers (attempt_id, position, question_id, selected_option, is_correct) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(outcome.session_id)
            .bind(position as i32)
            .bind(answer.question_id)
            .bind(answer.selected.map(|letter| letter.index() as i16))
            .bind(answer.is_correct)
            .execute(&mut *tx)
            .await?;
        }

        let existing = sqlx::query_as::<_, LeaderboardRow>(
            "SELECT leaderboard.user_id, leaderboard.subject_id, users.display_name, \
             leaderboard.total_attempts, leaderboard.average_score, leaderboard.best_score, \
             leaderboard.total_correct, leaderboard.total_questions, leaderboard.last_attempt_at \
             FROM leaderboard INNER JOIN users ON users.id = leaderboard.user_id \
             WHERE leaderboard.user_id = $1 AND leaderboard.subject_id = $2 \
             FOR UPDATE OF leaderboard",
        )
        .bind(user.id)
        .bind(outcome.subject_id)
        .fetch_optional(&mut *tx)
        .await?;

        let entry = match existing {
            Some(row) => {
                let mut entry = LeaderboardEntry::from(row);
                entry.record(outcome);
                entry
            }
            None => LeaderboardEntry::first(user.id, user.display_name.clone(), outcome),
        };

        sqlx::query(
            "INSERT INTO leaderboard (user_id, subject_id, total_attempts, average_score, best_score, \
             total_correct, total_questions, last_attempt_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (user_id, subject_id) DO UPDATE SET \
             total_attempts = EXCLUDED.total_attempts, average_score = EXCLUDED.average_score, \
             best_score = EXCLUDED.best_score, total_correct = EXCLUDED.total_correct, \
             total_questions = EXCLUDED.total_questions, last_attempt_at = EXCLUDED.last_attempt_at",
        )
        .bind(entry.user_id)
        .bind(entry.subject_id)
        .bind(entry.total_attempts)
        .bind(entry.average_score)
        .bind(entry.best_score)
        .bind(entry.total_correct)
        .bind(entry.total_questions)
        .bind(entry.last_attempt_at)
        .execute(&mut *tx)
        .await?;

        tracing::debug!("Closing transaction");
        tx.commit().await?;

        Ok(entry)
    }
}

impl RetrieveStandings for Connection {
    async fn leaderboard(&self, subject_id: Uuid) -> StoreResult<Vec<LeaderboardEntry>> {
        let rows = sqlx::query_as::<_, LeaderboardRow>(
            "SELECT leaderboard.user_id, leaderboard.subject_id, users.display_name, \
             leaderboard.total_attempts, leaderboard.average_score, leaderboard.best_score, \
             leaderboard.total_correct, leaderboard.total_questions, leaderboard.last_attempt_at \
             FROM leaderboard INNER JOIN users ON users.id = leaderboard.user_id \
             WHERE leaderboard.subject_id = $1",
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LeaderboardEntry::from).collect())
    }

    async fn history(&self, user_id: i64, limit: i64) -> StoreResult<Vec<Attempt>> {
        let rows = sqlx::query_as::<_, AttemptRow>(&format!(
            "{ATTEMPT_SELECT} WHERE quiz_attempts.user_id = $1 \
             ORDER BY quiz_attempts.completed_at DESC LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Attempt::from).collect())
    }

    async fn attempts_in_subject(
        &self,
        user_id: i64,
        subject_id: Uuid,
        limit: i64,
    ) -> StoreResult<Vec<Attempt>> {
        let rows = sqlx::query_as::<_, AttemptRow>(&format!(
            "{ATTEMPT_SELECT} WHERE quiz_attempts.user_id = $1 AND quiz_attempts.subject_id = $2 \
             ORDER BY quiz_attempts.completed_at DESC LIMIT $3"
        ))
        .bind(user_id)
        .bind(subject_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Attempt::from).collect())
    }

    async fn answer_facts(
        &self,
        user_id: i64,
        subject_id: Uuid,
        limit: i64,
    ) -> StoreResult<Vec<AnswerFact>> {
        let rows = sqlx::query_as::<_, AnswerFactRow>(
            "SELECT questions.topic, questions.difficulty, attempt_answers.is_correct \
             FROM attempt_answers \
             INNER JOIN questions ON questions.uuid = attempt_answers.question_id \
             WHERE attempt_answers.attempt_id IN ( \
                 SELECT uuid FROM quiz_attempts WHERE user_id = $1 AND subject_id = $2 \
                 ORDER BY completed_at DESC LIMIT $3)",
        )
        .bind(user_id)
        .bind(subject_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(AnswerFact {
                    difficulty: row.difficulty.parse().map_err(StoreError::Corrupt)?,
                    topic: row.topic,
                    is_correct: row.is_correct,
                })
            })
            .collect()
    }
}
