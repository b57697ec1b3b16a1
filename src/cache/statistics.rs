//! Belief Statistics Engine
//!
//! Learns pairwise access transitions and turns them into belief-scored
//! cache candidates.
//!
//! # Model
//!
//! ```text
//!   history:  ... p3 p2 p1 [obj]
//!                 └──┬───┘
//!        transition window (history_window_size)
//!
//!   access_counts[p][obj] += 1      for every p in the window
//!   row_sums[p], column_sums[obj]   maintained incrementally
//!
//!   probabilities[i][j] = count(i,j) * column_sums[j]
//!                         ───────────────────────────
//!                         row_sums[i] * column_sums[i]
//! ```
//!
//! Scores are relative significance values, not normalized probabilities.
//! A row is only scored once its sum exceeds
//! `min_history_windows * history_window_size`; until then, and whenever a
//! marginal is zero, the previous score stays in place.
//!
//! Candidates are the highest-scoring successors of the accessed object,
//! joined by the currently resident elements. Each candidate's final belief
//! is the maximum score any voter (recent history entry) assigns to it.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use super::element::{Element, ObjectId};
use super::history::HistoryLog;
use super::matrix::SparseMatrix;
use super::params::CacheParameters;
use crate::error::Result;

/// Transition statistics and candidate selection
#[derive(Debug, Clone)]
pub struct BeliefStatistics {
    params: CacheParameters,
    history: HistoryLog,
    access_counts: SparseMatrix<u64>,
    probabilities: SparseMatrix<f64>,
    row_sums: HashMap<ObjectId, u64>,
    column_sums: HashMap<ObjectId, u64>,
}

impl BeliefStatistics {
    /// Create an empty model
    pub fn new(params: CacheParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            history: HistoryLog::with_capacity(params.history_capacity()),
            params,
            access_counts: SparseMatrix::new(),
            probabilities: SparseMatrix::new(),
            row_sums: HashMap::new(),
            column_sums: HashMap::new(),
        })
    }

    /// Current parameters
    pub fn parameters(&self) -> &CacheParameters {
        &self.params
    }

    /// Replace the parameters. Learned transitions are kept.
    pub fn set_parameters(&mut self, params: CacheParameters) -> Result<()> {
        params.validate()?;
        self.history.ensure_capacity(params.history_capacity());
        self.params = params;
        Ok(())
    }

    /// Observe `object_id` and return the candidates to merge.
    ///
    /// `resident` is the current resident set of the cache being fed; those
    /// elements are re-scored alongside the fresh candidates. An empty
    /// result means there is nothing to merge.
    pub fn update(&mut self, object_id: ObjectId, resident: &[Element]) -> Result<Vec<Element>> {
        self.params.check_id(object_id)?;

        let first = self.history.is_empty();
        self.history.push(object_id);
        if first {
            return Ok(Vec::new());
        }

        self.record_transitions(object_id);
        self.score_row(object_id);

        let mut candidates = self.rank_successors(object_id);
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let proposed: HashSet<ObjectId> = candidates.iter().map(|c| c.id).collect();
        candidates.extend(
            resident
                .iter()
                .filter(|e| !proposed.contains(&e.id))
                .map(|e| Element::new(e.id, 0.0)),
        );

        let window = self.params.voter_window_size;
        let rescoring: Vec<ObjectId> = self.history.preceding(window - 1).collect();
        self.rescore_voters(&rescoring, &candidates);

        let voters: Vec<ObjectId> = self.history.recent(window).collect();
        let survivors = self.vote(candidates, &voters);

        trace!(
            object_id,
            survivors = survivors.len(),
            "Belief statistics updated"
        );

        Ok(survivors)
    }

    /// Credit every object in the transition window with a transition to `object_id`
    fn record_transitions(&mut self, object_id: ObjectId) {
        let priors: Vec<ObjectId> = self
            .history
            .preceding(self.params.history_window_size)
            .collect();

        for prior in priors {
            *self.access_counts.cell_mut(prior, object_id) += 1;
            *self.row_sums.entry(prior).or_insert(0) += 1;
            *self.column_sums.entry(object_id).or_insert(0) += 1;
        }
    }

    /// Marginal guard shared by row scoring and voter re-scoring
    fn row_is_significant(&self, row: ObjectId) -> bool {
        let row_sum = self.row_sum(row);
        row_sum > self.params.significance_guard() && self.column_sum(row) != 0
    }

    /// Score of one cell from the current counts
    fn significance(&self, row: ObjectId, col: ObjectId) -> f64 {
        let count = self.access_counts.get(row, col) as f64;
        let numerator = count * self.column_sum(col) as f64;
        let denominator = self.row_sum(row) as f64 * self.column_sum(row) as f64;
        numerator / denominator
    }

    /// Recompute every stored transition out of `row`
    fn score_row(&mut self, row: ObjectId) {
        if !self.row_is_significant(row) {
            return;
        }

        let successors: Vec<ObjectId> = self.access_counts.row(row).map(|(col, _)| col).collect();
        for col in successors {
            let score = self.significance(row, col);
            self.probabilities.set(row, col, score);
        }
    }

    /// Highest-scoring successors of `row`, truncated to the candidate set size
    fn rank_successors(&self, row: ObjectId) -> Vec<Element> {
        let mut ranked: Vec<Element> = self
            .probabilities
            .row(row)
            .filter(|&(_, score)| score > 0.0)
            .map(|(col, score)| Element::new(col, score))
            .collect();

        ranked.sort_by(|a, b| b.belief.total_cmp(&a.belief).then(a.id.cmp(&b.id)));
        ranked.truncate(self.params.candidate_set_size);
        ranked
    }

    /// Refresh each voter's score for every candidate
    fn rescore_voters(&mut self, voters: &[ObjectId], candidates: &[Element]) {
        let mut seen = HashSet::new();
        for &voter in voters {
            if !seen.insert(voter) || !self.row_is_significant(voter) {
                continue;
            }
            for candidate in candidates {
                let score = self.significance(voter, candidate.id);
                self.probabilities.set(voter, candidate.id, score);
            }
        }
    }

    /// Max-belief voting followed by the strict threshold cut
    fn vote(&self, candidates: Vec<Element>, voters: &[ObjectId]) -> Vec<Element> {
        let threshold = self.params.belief_threshold;
        candidates
            .into_iter()
            .filter_map(|mut candidate| {
                for &voter in voters {
                    let score = self.probabilities.get(voter, candidate.id);
                    if score > candidate.belief {
                        candidate.belief = score;
                    }
                }
                (candidate.belief > threshold).then_some(candidate)
            })
            .collect()
    }

    /// Current score of the `from -> to` transition
    pub fn probability(&self, from: ObjectId, to: ObjectId) -> f64 {
        self.probabilities.get(from, to)
    }

    /// Observed `from -> to` transitions
    pub fn access_count(&self, from: ObjectId, to: ObjectId) -> u64 {
        self.access_counts.get(from, to)
    }

    /// Transitions out of `id`
    pub fn row_sum(&self, id: ObjectId) -> u64 {
        self.row_sums.get(&id).copied().unwrap_or(0)
    }

    /// Transitions into `id`
    pub fn column_sum(&self, id: ObjectId) -> u64 {
        self.column_sums.get(&id).copied().unwrap_or(0)
    }

    /// Access history
    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Number of scored transitions
    pub fn scored_transitions(&self) -> usize {
        self.probabilities.cell_count()
    }

    #[cfg(test)]
    pub(crate) fn set_probability(&mut self, from: ObjectId, to: ObjectId, score: f64) {
        self.probabilities.set(from, to, score);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use assert_matches::assert_matches;

    fn params(window: usize, voters: usize, min_windows: u64) -> CacheParameters {
        CacheParameters {
            cache_size: 8,
            candidate_set_size: 4,
            voter_window_size: voters,
            history_window_size: window,
            belief_threshold: 0.0,
            max_tracked_objects: 100,
            min_history_windows: min_windows,
        }
    }

    fn feed(stats: &mut BeliefStatistics, stream: &[ObjectId]) {
        for &id in stream {
            stats.update(id, &[]).unwrap();
        }
    }

    #[test]
    fn test_first_access_yields_nothing() {
        let mut stats = BeliefStatistics::new(params(3, 3, 1)).unwrap();
        assert!(stats.update(1, &[]).unwrap().is_empty());
        assert_eq!(stats.history().len(), 1);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let bad = CacheParameters {
            cache_size: 0,
            ..Default::default()
        };
        assert_matches!(BeliefStatistics::new(bad), Err(Error::InvalidConfig(_)));
    }

    #[test]
    fn test_out_of_range_id_rejected_without_side_effects() {
        let mut stats = BeliefStatistics::new(params(3, 3, 1)).unwrap();
        stats.update(1, &[]).unwrap();

        let err = stats.update(100, &[]).unwrap_err();
        assert_matches!(err, Error::ObjectIdOutOfRange { id: 100, max: 100 });
        assert_eq!(stats.history().observed(), 1);
        assert_eq!(stats.column_sum(100), 0);
    }

    #[test]
    fn test_transition_window_counts() {
        let mut stats = BeliefStatistics::new(params(1, 1, 1)).unwrap();
        feed(&mut stats, &[1, 2, 3]);
        assert_eq!(stats.access_count(1, 2), 1);
        assert_eq!(stats.access_count(2, 3), 1);
        assert_eq!(stats.access_count(1, 3), 0);

        let mut wide = BeliefStatistics::new(params(2, 1, 1)).unwrap();
        feed(&mut wide, &[1, 2, 3]);
        assert_eq!(wide.access_count(1, 3), 1);
        assert_eq!(wide.row_sum(1), 2);
        assert_eq!(wide.column_sum(3), 2);
    }

    #[test]
    fn test_guard_blocks_scoring_until_enough_history() {
        let mut stats = BeliefStatistics::new(params(1, 1, 1)).unwrap();
        // B A B A: row A has a single transition, guard is 1
        feed(&mut stats, &[2, 1, 2, 1]);
        assert_eq!(stats.probability(1, 2), 0.0);

        feed(&mut stats, &[2, 1]);
        assert!(stats.probability(1, 2) > 0.0);
    }

    #[test]
    fn test_significance_rises_with_repetition() {
        let mut stats = BeliefStatistics::new(params(1, 1, 1)).unwrap();
        let (a, b) = (1, 2);
        let mut scores = Vec::new();

        for _ in 0..10 {
            stats.update(b, &[]).unwrap();
            stats.update(a, &[]).unwrap();
            let score = stats.probability(a, b);
            if score > 0.0 {
                scores.push(score);
            }
        }

        assert_eq!(scores.len(), 8);
        assert!((scores[0] - 2.0 / 3.0).abs() < 1e-12);
        for pair in scores.windows(2) {
            assert!(pair[1] > pair[0], "{} !> {}", pair[1], pair[0]);
        }
        assert!(scores.iter().all(|&s| s < 1.0));
    }

    #[test]
    fn test_candidates_ranked_and_truncated() {
        let mut stats = BeliefStatistics::new(CacheParameters {
            candidate_set_size: 1,
            ..params(1, 1, 0)
        })
        .unwrap();

        // 1 is followed by 2 twice and by 3 once
        feed(&mut stats, &[1, 2, 1, 2, 1, 3]);
        let candidates = stats.update(1, &[]).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, 2);
    }

    #[test]
    fn test_resident_elements_are_rescored() {
        let mut stats = BeliefStatistics::new(CacheParameters {
            candidate_set_size: 1,
            ..params(1, 2, 0)
        })
        .unwrap();

        feed(&mut stats, &[1, 2, 1, 2, 1, 3, 2]);
        let mut resident = Element::new(3, 0.9);
        resident.hits = 4;

        let candidates = stats.update(1, &[resident]).unwrap();
        let ids: Vec<_> = candidates.iter().map(|c| c.id).collect();
        assert!(ids.contains(&2));
        assert!(ids.contains(&3));

        let rescored = candidates.iter().find(|c| c.id == 3).unwrap();
        assert_eq!(rescored.hits, 0);
        assert!(rescored.belief > 0.0 && rescored.belief < 0.9);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let threshold = 0.15;

        let mut strict = BeliefStatistics::new(CacheParameters {
            belief_threshold: threshold,
            ..params(1, 1, 0)
        })
        .unwrap();
        strict.set_probability(7, 9, threshold);
        let kept = strict.vote(vec![Element::new(9, 0.0)], &[7]);
        assert!(kept.is_empty());

        let mut lenient = BeliefStatistics::new(CacheParameters {
            belief_threshold: threshold - 1e-9,
            ..params(1, 1, 0)
        })
        .unwrap();
        lenient.set_probability(7, 9, threshold);
        let kept = lenient.vote(vec![Element::new(9, 0.0)], &[7]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].belief, threshold);
    }

    #[test]
    fn test_vote_takes_maximum_over_voters() {
        let mut stats = BeliefStatistics::new(params(1, 3, 0)).unwrap();
        stats.set_probability(1, 9, 0.2);
        stats.set_probability(2, 9, 0.7);
        stats.set_probability(3, 9, 0.4);

        let voted = stats.vote(vec![Element::new(9, 0.1)], &[1, 2, 3]);
        assert_eq!(voted[0].belief, 0.7);
    }

    #[test]
    fn test_set_parameters_keeps_transitions() {
        let mut stats = BeliefStatistics::new(params(1, 1, 1)).unwrap();
        feed(&mut stats, &[1, 2, 1, 2]);

        let mut wider = params(40, 35, 1);
        wider.belief_threshold = 0.1;
        stats.set_parameters(wider).unwrap();

        assert_eq!(stats.access_count(1, 2), 2);
        assert_eq!(stats.parameters().history_window_size, 40);
        assert!(stats.history().capacity() >= 41);

        let invalid = CacheParameters {
            voter_window_size: 0,
            ..params(1, 1, 1)
        };
        assert!(stats.set_parameters(invalid).is_err());
        assert_eq!(stats.parameters().history_window_size, 40);
    }
}
