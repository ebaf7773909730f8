use std::collections::BTreeMap;

use uuid::Uuid;

use crate::{
    database::model::{Attempt, Difficulty},
    session::percentage,
};

pub const RECENT_ATTEMPTS: usize = 10;

/// One answered question, joined with what is known about the question.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerFact {
    pub topic: String,
    pub difficulty: Difficulty,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Accuracy<K> {
    pub key: K,
    pub correct_answers: u32,
    pub total_questions: u32,
    pub accuracy: f64,
}

impl<K> Accuracy<K> {
    fn new(key: K, correct_answers: u32, total_questions: u32) -> Self {
        Self {
            key,
            correct_answers,
            total_questions,
            accuracy: percentage(correct_answers, total_questions),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceAnalytics {
    pub user_id: i64,
    pub subject_id: Uuid,
    pub total_attempts: usize,
    pub average_score: f64,
    pub best_score: f64,
    pub worst_score: f64,
    pub topic_performance: Vec<Accuracy<String>>,
    pub difficulty_performance: Vec<Accuracy<Difficulty>>,
    pub recent_attempts: Vec<Attempt>,
}

impl PerformanceAnalytics {
    pub fn empty(user_id: i64, subject_id: Uuid) -> Self {
        Self {
            user_id,
            subject_id,
            total_attempts: 0,
            average_score: 0.0,
            best_score: 0.0,
            worst_score: 0.0,
            topic_performance: Vec::new(),
            difficulty_performance: Difficulty::ALL
                .into_iter()
                .map(|d| Accuracy::new(d, 0, 0))
                .collect(),
            recent_attempts: Vec::new(),
        }
    }

    /// `attempts` are expected newest first.
    pub fn from_attempts(
        user_id: i64,
        subject_id: Uuid,
        attempts: Vec<Attempt>,
        facts: &[AnswerFact],
    ) -> Self {
        if attempts.is_empty() {
            return Self::empty(user_id, subject_id);
        }

        let scores: Vec<f64> = attempts.iter().map(|a| a.score).collect();
        let average = scores.iter().sum::<f64>() / scores.len() as f64;
        let best = scores.iter().copied().fold(f64::MIN, f64::max);
        let worst = scores.iter().copied().fold(f64::MAX, f64::min);

        let mut topics: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
        let mut difficulties: BTreeMap<Difficulty, (u32, u32)> = Difficulty::ALL
            .into_iter()
            .map(|d| (d, (0, 0)))
            .collect();

        for fact in facts {
            let hit = u32::from(fact.is_correct);
            let topic = topics.entry(fact.topic.as_str()).or_default();
            topic.0 += hit;
            topic.1 += 1;
            let bucket = difficulties.entry(fact.difficulty).or_default();
            bucket.0 += hit;
            bucket.1 += 1;
        }

        Self {
            user_id,
            subject_id,
            total_attempts: attempts.len(),
            average_score: (average * 100.0).round() / 100.0,
            best_score: best,
            worst_score: worst,
            topic_performance: topics
                .into_iter()
                .map(|(topic, (correct, total))| Accuracy::new(topic.to_owned(), correct, total))
                .collect(),
            difficulty_performance: Difficulty::ALL
                .into_iter()
                .map(|d| {
                    let (correct, total) = difficulties.get(&d).copied().unwrap_or_default();
                    Accuracy::new(d, correct, total)
                })
                .collect(),
            recent_attempts: attempts.into_iter().take(RECENT_ATTEMPTS).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn attempt(score: f64) -> Attempt {
        Attempt {
            uuid: Uuid::new_v4(),
            user_id: 1,
            subject_id: Uuid::nil(),
            subject_name: "Science".into(),
            score,
            correct_answers: 0,
            total_questions: 0,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            duration_secs: 0,
        }
    }

    fn fact(topic: &str, difficulty: Difficulty, is_correct: bool) -> AnswerFact {
        AnswerFact {
            topic: topic.into(),
            difficulty,
            is_correct,
        }
    }

    #[test]
    fn empty_analytics_lists_every_difficulty() {
        let a = PerformanceAnalytics::from_attempts(1, Uuid::nil(), vec![], &[]);
        assert_eq!(a.total_attempts, 0);
        assert_eq!(a.difficulty_performance.len(), 3);
        assert!(a.topic_performance.is_empty());
    }

    #[test]
    fn aggregates_scores_topics_and_difficulties() {
        let attempts = vec![attempt(50.0), attempt(100.0), attempt(20.0)];
        let facts = vec![
            fact("Physics", Difficulty::Easy, true),
            fact("Physics", Difficulty::Hard, false),
            fact("Biology", Difficulty::Easy, true),
            fact("Biology", Difficulty::Easy, false),
        ];

        let a = PerformanceAnalytics::from_attempts(1, Uuid::nil(), attempts, &facts);

        assert_eq!(a.total_attempts, 3);
        assert_eq!(a.average_score, 56.67);
        assert_eq!(a.best_score, 100.0);
        assert_eq!(a.worst_score, 20.0);

        let biology = &a.topic_performance[0];
        assert_eq!(biology.key, "Biology");
        assert_eq!(biology.accuracy, 50.0);

        let easy = &a.difficulty_performance[0];
        assert_eq!((easy.key, easy.correct_answers, easy.total_questions), (Difficulty::Easy, 2, 3));
        let medium = &a.difficulty_performance[1];
        assert_eq!(medium.total_questions, 0);
        assert_eq!(medium.accuracy, 0.0);
    }

    #[test]
    fn recent_attempts_are_capped() {
        let attempts = (0..15).map(|i| attempt(i as f64)).collect();
        let a = PerformanceAnalytics::from_attempts(1, Uuid::nil(), attempts, &[]);
        assert_eq!(a.recent_attempts.len(), RECENT_ATTEMPTS);
        assert_eq!(a.recent_attempts[0].score, 0.0);
    }
}
