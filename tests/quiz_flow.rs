use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use quizdeck::{
    analytics::{AnswerFact, PerformanceAnalytics},
    database::model::{Attempt, Difficulty, OptionLetter, Question, QuestionSource, Subject},
    leaderboard::{rank, LeaderboardEntry},
    session::{QuizSession, SessionOutcome},
};
use uuid::Uuid;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap()
}

fn subject() -> Subject {
    Subject {
        uuid: Uuid::new_v4(),
        name: "Chemistry".into(),
        created_by: 1,
        question_count: 4,
    }
}

fn questions(subject: &Subject) -> Vec<Question> {
    [
        ("Symbol of gold?", OptionLetter::C, Difficulty::Easy, "Elements"),
        ("pH of pure water?", OptionLetter::B, Difficulty::Easy, "Acids"),
        ("Avogadro's number?", OptionLetter::A, Difficulty::Hard, "Moles"),
        ("Strongest acid listed?", OptionLetter::D, Difficulty::Medium, "Acids"),
    ]
    .into_iter()
    .map(|(text, correct, difficulty, topic)| Question {
        uuid: Uuid::new_v4(),
        subject_id: subject.uuid,
        text: text.into(),
        options: ["w".into(), "x".into(), "y".into(), "z".into()],
        correct,
        difficulty,
        topic: topic.into(),
        source: QuestionSource::Manual,
        created_by: 1,
        created_at: t0(),
    })
    .collect()
}

/// Answers the questions in order with `picks`, then finishes at `t0 + secs`.
fn play(subject: &Subject, picks: &[Option<usize>], secs: i64) -> (QuizSession, SessionOutcome) {
    let mut session = QuizSession::start(subject, questions(subject), t0(), Duration::from_secs(600));
    for (idx, pick) in picks.iter().enumerate() {
        if let Some(option) = pick {
            session.submit_answer(*option).unwrap();
        }
        if idx + 1 < picks.len() {
            session.next_question();
        }
    }
    let outcome = session.finish(t0() + TimeDelta::seconds(secs));
    (session, outcome)
}

fn facts(session: &QuizSession, outcome: &SessionOutcome) -> Vec<AnswerFact> {
    session
        .questions()
        .iter()
        .zip(&outcome.answers)
        .map(|(question, answer)| AnswerFact {
            topic: question.topic.clone(),
            difficulty: question.difficulty,
            is_correct: answer.is_correct,
        })
        .collect()
}

fn attempt(user_id: i64, outcome: &SessionOutcome) -> Attempt {
    Attempt {
        uuid: outcome.session_id,
        user_id,
        subject_id: outcome.subject_id,
        subject_name: outcome.subject_name.clone(),
        score: outcome.percentage,
        correct_answers: outcome.correct as i32,
        total_questions: outcome.total as i32,
        started_at: outcome.started_at,
        completed_at: outcome.finished_at,
        duration_secs: outcome.duration_secs,
    }
}

#[test]
fn answers_can_be_revisited_before_finishing() {
    let subject = subject();
    let mut session = QuizSession::start(&subject, questions(&subject), t0(), Duration::from_secs(600));

    session.submit_answer(0).unwrap();
    session.next_question();
    session.submit_answer(1).unwrap();
    session.prev_question();
    session.submit_answer(2).unwrap();

    assert_eq!(session.answer_for(0), Some(OptionLetter::C));
    assert_eq!(session.answer_for(1), Some(OptionLetter::B));
    assert_eq!(session.answered_count(), 2);

    let outcome = session.finish(t0() + TimeDelta::seconds(42));
    assert_eq!(outcome.correct, 2);
    assert_eq!(outcome.percentage, 50.0);
    assert_eq!(outcome.duration_secs, 42);
}

#[test]
fn timed_out_session_scores_unanswered_as_wrong() {
    let subject = subject();
    let mut session = QuizSession::start(&subject, questions(&subject), t0(), Duration::from_secs(600));
    session.submit_answer(2).unwrap();

    let late = t0() + TimeDelta::seconds(601);
    assert!(session.is_expired(late));
    assert_eq!(session.remaining(late), Duration::ZERO);

    let outcome = session.finish(late);
    assert_eq!(outcome.correct, 1);
    assert_eq!(outcome.total, 4);
    assert_eq!(outcome.duration_secs, 600);
    assert_eq!(outcome.answers.iter().filter(|a| a.selected.is_none()).count(), 3);
}

#[test]
fn attempts_feed_leaderboard_and_analytics() {
    let subject = subject();

    // alice: perfect run, then a half run
    let (s1, perfect) = play(&subject, &[Some(2), Some(1), Some(0), Some(3)], 120);
    let (s2, half) = play(&subject, &[Some(2), Some(1), Some(1), None], 200);
    assert!(perfect.passed());
    assert_eq!(perfect.verdict(), "Great Job!");
    assert!(!half.passed());

    let mut alice = LeaderboardEntry::first(1, "Alice", &perfect);
    alice.record(&half);
    assert_eq!(alice.total_attempts, 2);
    assert_eq!(alice.best_score, 100.0);
    assert_eq!(alice.average_score, 75.0);

    // bob and carol tie on best score, carol got there first
    let (_, bob_run) = play(&subject, &[Some(2), Some(1), Some(0), Some(0)], 300);
    let mut carol_run = bob_run.clone();
    carol_run.finished_at = bob_run.finished_at - TimeDelta::seconds(60);
    let bob = LeaderboardEntry::first(2, "Bob", &bob_run);
    let carol = LeaderboardEntry::first(3, "Carol", &carol_run);

    let ranked = rank(vec![bob, alice, carol], 50);
    let standings: Vec<(usize, &str)> = ranked
        .iter()
        .map(|r| (r.rank, r.entry.display_name.as_str()))
        .collect();
    assert_eq!(standings, vec![(1, "Alice"), (2, "Carol"), (2, "Bob")]);

    let mut answer_facts = facts(&s2, &half);
    answer_facts.extend(facts(&s1, &perfect));
    let analytics = PerformanceAnalytics::from_attempts(
        1,
        subject.uuid,
        vec![attempt(1, &half), attempt(1, &perfect)],
        &answer_facts,
    );

    assert_eq!(analytics.total_attempts, 2);
    assert_eq!(analytics.average_score, 75.0);
    assert_eq!(analytics.best_score, 100.0);
    assert_eq!(analytics.worst_score, 50.0);
    assert_eq!(analytics.recent_attempts[0].score, 50.0);

    let acids = analytics
        .topic_performance
        .iter()
        .find(|t| t.key == "Acids")
        .unwrap();
    assert_eq!((acids.correct_answers, acids.total_questions), (3, 4));

    let hard = analytics
        .difficulty_performance
        .iter()
        .find(|d| d.key == Difficulty::Hard)
        .unwrap();
    assert_eq!((hard.correct_answers, hard.total_questions), (1, 2));
    assert_eq!(hard.accuracy, 50.0);
}
