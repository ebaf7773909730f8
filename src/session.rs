//! State of one user's run through a quiz.
//!
//! A [`QuizSession`] is plain owned data: it lives inside the dialogue state
//! and is moved from handler to handler. Every time-dependent operation takes
//! `now` explicitly so the timer can be driven from the bot, from the
//! deadline watch, or from tests.

use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{Mutex, PoisonError},
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::{
    database::model::{AnswerRecord, OptionLetter, Question, Subject},
    error::SessionError,
};

/// Percentage at or above which a run counts as passed.
pub const PASS_PERCENTAGE: f64 = 70.0;

#[derive(Debug, Clone)]
pub struct QuizSession {
    id: Uuid,
    subject_id: Uuid,
    subject_name: String,
    questions: Vec<Question>,
    current: usize,
    answers: Vec<Option<OptionLetter>>,
    score: u32,
    started_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub session_id: Uuid,
    pub subject_id: Uuid,
    pub subject_name: String,
    pub correct: u32,
    pub total: u32,
    pub percentage: f64,
    pub answers: Vec<AnswerRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: i64,
}

impl SessionOutcome {
    pub fn passed(&self) -> bool {
        self.percentage >= PASS_PERCENTAGE
    }

    pub fn verdict(&self) -> &'static str {
        if self.passed() {
            "Great Job!"
        } else {
            "Keep Practicing!"
        }
    }
}

/// `correct / total` as a percentage rounded to two decimals.
pub fn percentage(correct: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = f64::from(correct) / f64::from(total) * 100.0;
    (raw * 100.0).round() / 100.0
}

/// Formats whole seconds as `M:SS`.
pub fn format_clock(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

impl QuizSession {
    pub fn start(
        subject: &Subject,
        questions: Vec<Question>,
        now: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let limit = TimeDelta::from_std(duration).unwrap_or_else(|_| TimeDelta::days(1));
        let answers = vec![None; questions.len()];
        Self {
            id: Uuid::new_v4(),
            subject_id: subject.uuid,
            subject_name: subject.name.clone(),
            questions,
            current: 0,
            answers,
            score: 0,
            started_at: now,
            deadline: now.checked_add_signed(limit).unwrap_or(DateTime::<Utc>::MAX_UTC),
            finished_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subject_name(&self) -> &str {
        &self.subject_name
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn current(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    pub fn answer_for(&self, idx: usize) -> Option<OptionLetter> {
        self.answers.get(idx).copied().flatten()
    }

    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_some()).count()
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn is_first(&self) -> bool {
        self.current == 0
    }

    pub fn is_last(&self) -> bool {
        self.current + 1 >= self.questions.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Fraction of the quiz reached, counting the current question.
    pub fn progress(&self) -> f64 {
        if self.questions.is_empty() {
            return 0.0;
        }
        (self.current + 1) as f64 / self.questions.len() as f64
    }

    pub fn submit_answer(&mut self, option: usize) -> Result<OptionLetter, SessionError> {
        if self.is_finished() {
            return Err(SessionError::Finished);
        }
        let letter = OptionLetter::from_index(option).ok_or(SessionError::InvalidOption(option))?;
        if let Some(slot) = self.answers.get_mut(self.current) {
            *slot = Some(letter);
        }
        Ok(letter)
    }

    pub fn next_question(&mut self) {
        if self.current + 1 < self.questions.len() {
            self.current += 1;
        }
    }

    pub fn prev_question(&mut self) {
        self.current = self.current.saturating_sub(1);
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.deadline - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }

    /// Scores the session. Calling it again returns the same outcome.
    pub fn finish(&mut self, now: DateTime<Utc>) -> SessionOutcome {
        let finished_at = *self.finished_at.get_or_insert(now.min(self.deadline));

        let answers: Vec<AnswerRecord> = self
            .questions
            .iter()
            .zip(&self.answers)
            .map(|(question, selected)| AnswerRecord {
                question_id: question.uuid,
                selected: *selected,
                is_correct: *selected == Some(question.correct),
            })
            .collect();

        let correct = answers.iter().filter(|a| a.is_correct).count() as u32;
        self.score = correct;
        let total = self.questions.len() as u32;

        SessionOutcome {
            session_id: self.id,
            subject_id: self.subject_id,
            subject_name: self.subject_name.clone(),
            correct,
            total,
            percentage: percentage(correct, total),
            answers,
            started_at: self.started_at,
            finished_at,
            duration_secs: (finished_at - self.started_at).num_seconds().max(0),
        }
    }
}

/// How long a finished session id is remembered.
const CLAIM_RETENTION_HOURS: i64 = 24;

/// Sessions that some task has already started finishing.
///
/// A running quiz can be finished by the Finish button and by the deadline
/// watch at about the same time. Whoever claims the session id first
/// finishes it.
#[derive(Debug, Default)]
pub struct FinishClaims {
    claimed: Mutex<HashMap<Uuid, DateTime<Utc>>>,
}

impl FinishClaims {
    /// Returns `true` for the first caller with this session id.
    pub fn claim(&self, session_id: Uuid, now: DateTime<Utc>) -> bool {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        claimed.retain(|_, at| now - *at < TimeDelta::hours(CLAIM_RETENTION_HOURS));
        match claimed.entry(session_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::database::model::{Difficulty, QuestionSource};

    fn subject() -> Subject {
        Subject {
            uuid: Uuid::new_v4(),
            name: "Geography".into(),
            created_by: 1,
            question_count: 3,
        }
    }

    fn question(correct: OptionLetter) -> Question {
        Question {
            uuid: Uuid::new_v4(),
            subject_id: Uuid::nil(),
            text: "Which one?".into(),
            options: ["a".into(), "b".into(), "c".into(), "d".into()],
            correct,
            difficulty: Difficulty::Medium,
            topic: "General".into(),
            source: QuestionSource::Manual,
            created_by: 1,
            created_at: Utc::now(),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn session() -> QuizSession {
        QuizSession::start(
            &subject(),
            vec![
                question(OptionLetter::A),
                question(OptionLetter::C),
                question(OptionLetter::D),
            ],
            t0(),
            Duration::from_secs(600),
        )
    }

    #[test]
    fn navigation_saturates_at_both_ends() {
        let mut s = session();
        assert!(s.is_first());
        s.prev_question();
        assert_eq!(s.current_index(), 0);

        s.next_question();
        s.next_question();
        assert!(s.is_last());
        s.next_question();
        assert_eq!(s.current_index(), 2);
        assert!((s.progress() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn answers_can_be_changed_before_finishing() {
        let mut s = session();
        s.submit_answer(1).unwrap();
        s.submit_answer(0).unwrap();
        assert_eq!(s.answer_for(0), Some(OptionLetter::A));
        assert_eq!(s.answered_count(), 1);
    }

    #[test]
    fn out_of_range_option_is_rejected() {
        let mut s = session();
        assert_eq!(s.submit_answer(4), Err(SessionError::InvalidOption(4)));
    }

    #[test]
    fn finish_scores_and_treats_unanswered_as_wrong() {
        let mut s = session();
        s.submit_answer(0).unwrap();
        s.next_question();
        s.submit_answer(1).unwrap();

        let outcome = s.finish(t0() + TimeDelta::seconds(95));
        assert_eq!(outcome.correct, 1);
        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.percentage, 33.33);
        assert_eq!(outcome.duration_secs, 95);
        assert_eq!(outcome.answers[2].selected, None);
        assert!(!outcome.answers[2].is_correct);
        assert!(!outcome.passed());
        assert_eq!(outcome.verdict(), "Keep Practicing!");
        assert_eq!(s.score(), 1);
    }

    #[test]
    fn finish_is_idempotent_and_locks_answers() {
        let mut s = session();
        s.submit_answer(0).unwrap();
        let first = s.finish(t0() + TimeDelta::seconds(10));
        let second = s.finish(t0() + TimeDelta::seconds(500));
        assert_eq!(first, second);
        assert_eq!(s.submit_answer(2), Err(SessionError::Finished));
    }

    #[test]
    fn late_finish_is_clamped_to_deadline() {
        let mut s = session();
        assert!(!s.is_expired(t0() + TimeDelta::seconds(599)));
        assert!(s.is_expired(t0() + TimeDelta::seconds(600)));
        let outcome = s.finish(t0() + TimeDelta::seconds(900));
        assert_eq!(outcome.duration_secs, 600);
    }

    #[test]
    fn remaining_time_saturates() {
        let s = session();
        assert_eq!(s.remaining(t0() + TimeDelta::seconds(15)), Duration::from_secs(585));
        assert_eq!(s.remaining(t0() + TimeDelta::seconds(700)), Duration::ZERO);
    }

    #[test]
    fn empty_quiz_scores_zero_percent() {
        let mut s = QuizSession::start(&subject(), vec![], t0(), Duration::from_secs(60));
        let outcome = s.finish(t0());
        assert_eq!(outcome.total, 0);
        assert_eq!(outcome.percentage, 0.0);
        assert!(s.is_last());
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(600), "10:00");
        assert_eq!(format_clock(59), "0:59");
        assert_eq!(format_clock(61), "1:01");
    }

    #[test]
    fn percentage_rounds_to_two_decimals() {
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(7, 10), 70.0);
        assert_eq!(percentage(0, 0), 0.0);
    }

    #[test]
    fn only_the_first_finisher_wins() {
        let claims = FinishClaims::default();
        let id = Uuid::new_v4();
        assert!(claims.claim(id, t0()));
        assert!(!claims.claim(id, t0() + TimeDelta::seconds(1)));
        assert!(claims.claim(Uuid::new_v4(), t0()));
    }

    #[test]
    fn old_claims_are_forgotten() {
        let claims = FinishClaims::default();
        let id = Uuid::new_v4();
        assert!(claims.claim(id, t0()));
        claims.claim(Uuid::new_v4(), t0() + TimeDelta::hours(25));
        assert_eq!(claims.claimed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_finishers_claim_once() {
        let claims = std::sync::Arc::new(FinishClaims::default());
        let id = Uuid::new_v4();
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let claims = claims.clone();
                tokio::spawn(async move { claims.claim(id, Utc::now()) })
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
