use std::collections::{BTreeMap, BTreeSet};

use crate::models::{AnswerRecord, Letter, QuestionId, Stats};

/// Recorded answers keyed by question id, with live aggregate counters.
#[derive(Debug, Clone, Default)]
pub struct AnswerStore {
    records: BTreeMap<QuestionId, AnswerRecord>,
    stats: Stats,
}

impl AnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts the answer for `question_id`. A prior record's contribution is
    /// retracted before the new one is applied.
    pub fn submit(
        &mut self,
        question_id: QuestionId,
        selected: BTreeSet<Letter>,
        correct: &BTreeSet<Letter>,
    ) -> AnswerRecord {
        let record = AnswerRecord::evaluate(selected, correct);
        if let Some(previous) = self.records.insert(question_id, record.clone()) {
            self.stats.retract(&previous);
        }
        self.stats.apply(&record);
        record
    }

    pub fn get(&self, question_id: QuestionId) -> Option<&AnswerRecord> {
        self.records.get(&question_id)
    }

    pub fn is_answered(&self, question_id: QuestionId) -> bool {
        self.get(question_id).is_some_and(AnswerRecord::is_attempted)
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn records(&self) -> &BTreeMap<QuestionId, AnswerRecord> {
        &self.records
    }

    /// Recounts the statistics from the stored records.
    pub fn recompute(&self) -> Stats {
        self.records.values().fold(Stats::default(), |mut stats, record| {
            stats.apply(record);
            stats
        })
    }

    pub fn restore(&mut self, records: BTreeMap<QuestionId, AnswerRecord>) {
        self.records = records;
        self.stats = self.recompute();
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.stats = Stats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn letters(s: &str) -> BTreeSet<Letter> {
        s.chars().filter_map(Letter::from_char).collect()
    }

    #[test]
    fn submit_is_idempotent() {
        let correct = letters("B");
        let mut once = AnswerStore::new();
        once.submit(1, letters("A"), &correct);

        let mut twice = AnswerStore::new();
        twice.submit(1, letters("A"), &correct);
        twice.submit(1, letters("A"), &correct);

        assert_eq!(once.stats(), twice.stats());
        assert_eq!(
            twice.stats(),
            Stats {
                correct: 0,
                incorrect: 1,
                total_attempted: 1
            }
        );
    }

    #[test]
    fn revision_moves_the_contribution() {
        let correct = letters("AC");
        let mut store = AnswerStore::new();
        let first = store.submit(1, letters("A"), &correct);
        assert!(!first.is_correct);
        let revised = store.submit(1, letters("AC"), &correct);
        assert!(revised.is_correct);
        assert_eq!(
            store.stats(),
            Stats {
                correct: 1,
                incorrect: 0,
                total_attempted: 1
            }
        );
    }

    #[test]
    fn emptied_selection_stops_counting() {
        let correct = letters("AC");
        let mut store = AnswerStore::new();
        store.submit(4, letters("A"), &correct);
        store.submit(4, BTreeSet::new(), &correct);
        assert_eq!(store.stats(), Stats::default());
        assert!(store.get(4).is_some());
        assert!(!store.is_answered(4));
    }

    #[test]
    fn live_counters_never_drift() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut store = AnswerStore::new();
        let correct = letters("BD");
        for _ in 0..500 {
            let id = rng.gen_range(1..=10);
            let selected: BTreeSet<Letter> = Letter::ALL
                .into_iter()
                .filter(|_| rng.gen_bool(0.5))
                .collect();
            store.submit(id, selected, &correct);
            let stats = store.stats();
            assert_eq!(stats, store.recompute());
            assert_eq!(stats.correct + stats.incorrect, stats.total_attempted);
        }
    }

    #[test]
    fn restore_recomputes_and_clear_zeroes() {
        let correct = letters("A");
        let mut source = AnswerStore::new();
        source.submit(1, letters("A"), &correct);
        source.submit(2, letters("B"), &correct);

        let mut store = AnswerStore::new();
        store.restore(source.records().clone());
        assert_eq!(store.stats(), source.stats());

        store.clear();
        assert!(store.records().is_empty());
        assert_eq!(store.stats(), Stats::default());
    }
}
