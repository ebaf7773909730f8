use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::session::{percentage, SessionOutcome};

/// Running totals of one user in one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub user_id: i64,
    pub subject_id: Uuid,
    pub display_name: String,
    pub total_attempts: i32,
    pub average_score: f64,
    pub best_score: f64,
    pub total_correct: i32,
    pub total_questions: i32,
    pub last_attempt_at: DateTime<Utc>,
}

impl LeaderboardEntry {
    pub fn first(user_id: i64, display_name: impl Into<String>, outcome: &SessionOutcome) -> Self {
        Self {
            user_id,
            subject_id: outcome.subject_id,
            display_name: display_name.into(),
            total_attempts: 1,
            average_score: outcome.percentage,
            best_score: outcome.percentage,
            total_correct: outcome.correct as i32,
            total_questions: outcome.total as i32,
            last_attempt_at: outcome.finished_at,
        }
    }

    /// Folds another finished attempt into the totals.
    ///
    /// The average is taken over all questions ever answered, not over
    /// attempt percentages.
    pub fn record(&mut self, outcome: &SessionOutcome) {
        self.total_attempts += 1;
        self.total_correct += outcome.correct as i32;
        self.total_questions += outcome.total as i32;
        self.average_score = percentage(
            self.total_correct.max(0) as u32,
            self.total_questions.max(0) as u32,
        );
        self.best_score = self.best_score.max(outcome.percentage);
        self.last_attempt_at = self.last_attempt_at.max(outcome.finished_at);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    pub rank: usize,
    pub entry: LeaderboardEntry,
}

fn standing(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.best_score
        .total_cmp(&a.best_score)
        .then_with(|| b.average_score.total_cmp(&a.average_score))
}

/// Orders entries best-first and assigns competition ranks (1, 2, 2, 4).
///
/// Entries tie when both best and average scores are equal; among tied
/// entries whoever got there first is listed first.
pub fn rank(mut entries: Vec<LeaderboardEntry>, size: usize) -> Vec<RankedEntry> {
    entries.sort_by(|a, b| standing(a, b).then_with(|| a.last_attempt_at.cmp(&b.last_attempt_at)));

    let mut ranked: Vec<RankedEntry> = Vec::with_capacity(entries.len().min(size));
    for (position, entry) in entries.into_iter().take(size).enumerate() {
        let rank = match ranked.last() {
            Some(prev) if standing(&prev.entry, &entry) == Ordering::Equal => prev.rank,
            _ => position + 1,
        };
        ranked.push(RankedEntry { rank, entry });
    }
    ranked
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + TimeDelta::minutes(minute)
    }

    fn outcome(correct: u32, total: u32, minute: i64) -> SessionOutcome {
        SessionOutcome {
            session_id: Uuid::new_v4(),
            subject_id: Uuid::nil(),
            subject_name: "Math".into(),
            correct,
            total,
            percentage: percentage(correct, total),
            answers: vec![],
            started_at: at(minute),
            finished_at: at(minute),
            duration_secs: 0,
        }
    }

    fn entry(user_id: i64, best: f64, average: f64, minute: i64) -> LeaderboardEntry {
        LeaderboardEntry {
            user_id,
            subject_id: Uuid::nil(),
            display_name: format!("user{user_id}"),
            total_attempts: 1,
            average_score: average,
            best_score: best,
            total_correct: 0,
            total_questions: 0,
            last_attempt_at: at(minute),
        }
    }

    #[test]
    fn record_accumulates_totals_and_keeps_best() {
        let mut e = LeaderboardEntry::first(7, "alice", &outcome(8, 10, 0));
        assert_eq!(e.average_score, 80.0);

        e.record(&outcome(2, 10, 5));
        assert_eq!(e.total_attempts, 2);
        assert_eq!(e.total_correct, 10);
        assert_eq!(e.total_questions, 20);
        assert_eq!(e.average_score, 50.0);
        assert_eq!(e.best_score, 80.0);
        assert_eq!(e.last_attempt_at, at(5));
    }

    #[test]
    fn average_weighs_by_question_count() {
        let mut e = LeaderboardEntry::first(7, "alice", &outcome(1, 1, 0));
        e.record(&outcome(0, 3, 1));
        assert_eq!(e.average_score, 25.0);
    }

    #[test]
    fn ranks_use_competition_numbering() {
        let ranked = rank(
            vec![
                entry(1, 60.0, 50.0, 0),
                entry(2, 90.0, 70.0, 3),
                entry(3, 90.0, 70.0, 1),
                entry(4, 90.0, 80.0, 9),
            ],
            50,
        );

        let order: Vec<(usize, i64)> = ranked.iter().map(|r| (r.rank, r.entry.user_id)).collect();
        assert_eq!(order, vec![(1, 4), (2, 3), (2, 2), (4, 1)]);
    }

    #[test]
    fn ranking_truncates_to_size() {
        let entries = (0..10).map(|i| entry(i, i as f64, 0.0, 0)).collect();
        let ranked = rank(entries, 3);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].entry.user_id, 9);
    }
}
