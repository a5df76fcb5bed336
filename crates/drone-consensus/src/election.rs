//! Vote collection and timeout-driven finalization.
//!
//! Lifecycle:
//! 1. `start()` - open an election (triggered by the controller)
//! 2. `participate()` - cast our own vote once, on start or on the first
//!    `ELECT_MASTER` seen afterwards
//! 3. `record_vote()` - collect votes from peers while the election is open
//! 4. `finalize()` - once `should_finalize()` holds, tally and assign roles
//!
//! There is no early quorum termination: an election always runs for the
//! full timeout.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use drone_protocol::{DroneId, ElectMasterParams, ELECTION_TIMEOUT_SECS};
use drone_state::NetworkView;

use crate::scoring::select_candidate;
use crate::ConsensusError;

/// Configuration for the election engine.
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    /// How long an election collects votes before it is tallied.
    pub election_timeout: Duration,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            election_timeout: Duration::from_secs_f64(ELECTION_TIMEOUT_SECS),
        }
    }
}

/// Result of a finalized election.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionOutcome {
    pub winner: DroneId,
    /// Votes per candidate, as observed locally.
    pub tallies: HashMap<DroneId, usize>,
    pub total_votes: usize,
}

#[derive(Debug, Clone)]
struct ElectionState {
    started_at: Instant,
    /// voter -> candidate. A later vote from the same voter replaces the
    /// earlier one.
    votes: HashMap<DroneId, DroneId>,
    has_voted: bool,
}

/// Runs at most one election at a time.
#[derive(Debug, Clone, Default)]
pub struct ElectionEngine {
    config: ElectionConfig,
    state: Option<ElectionState>,
}

impl ElectionEngine {
    pub fn new(config: ElectionConfig) -> Self {
        Self { config, state: None }
    }

    pub fn config(&self) -> &ElectionConfig {
        &self.config
    }

    pub fn is_in_progress(&self) -> bool {
        self.state.is_some()
    }

    pub fn has_voted(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.has_voted)
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.state.as_ref().map(|s| s.started_at)
    }

    pub fn vote_count(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.votes.len())
    }

    /// Open a new election. Returns `false` if one is already running.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.state.is_some() {
            return false;
        }
        self.state = Some(ElectionState {
            started_at: now,
            votes: HashMap::new(),
            has_voted: false,
        });
        tracing::info!("Starting master election");
        true
    }

    /// Drop the running election without a result. Returns whether one was
    /// running.
    pub fn abort(&mut self) -> bool {
        let aborted = self.state.take().is_some();
        if aborted {
            tracing::info!("Election aborted");
        }
        aborted
    }

    /// Cast our own vote for the best online candidate.
    ///
    /// The returned params are what the caller broadcasts as `ELECT_MASTER`.
    pub fn participate(
        &mut self,
        view: &NetworkView,
        now: Instant,
    ) -> Result<ElectMasterParams, ConsensusError> {
        let self_id = view.self_id();
        let state = self.state.as_mut().ok_or(ConsensusError::NoElection)?;
        if state.has_voted {
            return Err(ConsensusError::AlreadyVoted(self_id));
        }

        let (candidate_id, criteria) = select_candidate(view, now);
        state.votes.insert(self_id, candidate_id);
        state.has_voted = true;

        tracing::info!(
            candidate_id,
            battery_level = criteria.battery_level,
            "Voting for master candidate"
        );
        Ok(ElectMasterParams {
            candidate_id,
            criteria,
        })
    }

    /// Record a vote received from `voter`. Votes arriving while no election
    /// is running are refused.
    pub fn record_vote(&mut self, voter: DroneId, candidate: DroneId) -> Result<(), ConsensusError> {
        let state = self.state.as_mut().ok_or(ConsensusError::NoElection)?;
        state.votes.insert(voter, candidate);
        tracing::debug!(voter, candidate, votes = state.votes.len(), "Recorded vote");
        Ok(())
    }

    /// Whether the running election has collected votes for the full timeout.
    pub fn should_finalize(&self, now: Instant) -> bool {
        self.state.as_ref().is_some_and(|s| {
            now.saturating_duration_since(s.started_at) >= self.config.election_timeout
        })
    }

    /// Tally the votes, install the winner in `view` and close the election.
    ///
    /// Most votes wins, ties go to the lowest id. An election that saw no
    /// votes at all elects the local drone.
    pub fn finalize(
        &mut self,
        view: &mut NetworkView,
        now: Instant,
    ) -> Result<ElectionOutcome, ConsensusError> {
        let state = self.state.take().ok_or(ConsensusError::NoElection)?;

        let mut tallies: HashMap<DroneId, usize> = HashMap::new();
        for &candidate in state.votes.values() {
            *tallies.entry(candidate).or_insert(0) += 1;
        }

        let winner = tallies
            .iter()
            .max_by(|(a_id, a_count), (b_id, b_count)| {
                a_count.cmp(b_count).then_with(|| b_id.cmp(a_id))
            })
            .map(|(&id, _)| id)
            .unwrap_or_else(|| view.self_id());

        view.assign_roles(winner, now);

        tracing::info!(
            winner,
            total_votes = state.votes.len(),
            tallies = ?tallies,
            "Election finalized"
        );

        Ok(ElectionOutcome {
            winner,
            total_votes: state.votes.len(),
            tallies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ElectionEngine {
        ElectionEngine::new(ElectionConfig {
            election_timeout: Duration::from_secs(10),
        })
    }

    #[test]
    fn test_start_is_exclusive() {
        let now = Instant::now();
        let mut engine = engine();
        assert!(engine.start(now));
        assert!(!engine.start(now + Duration::from_secs(1)));
        assert_eq!(engine.started_at(), Some(now));
    }

    #[test]
    fn test_votes_refused_without_election() {
        let mut engine = engine();
        assert_eq!(engine.record_vote(3, 4), Err(ConsensusError::NoElection));
        assert_eq!(engine.vote_count(), 0);
    }

    #[test]
    fn test_participates_once() {
        let now = Instant::now();
        let view = NetworkView::new(5, now);
        let mut engine = engine();
        engine.start(now);

        let vote = engine.participate(&view, now).unwrap();
        assert_eq!(vote.candidate_id, 5);
        assert!(engine.has_voted());
        assert_eq!(
            engine.participate(&view, now),
            Err(ConsensusError::AlreadyVoted(5))
        );
    }

    #[test]
    fn test_finalize_waits_for_full_timeout() {
        let now = Instant::now();
        let mut engine = engine();
        engine.start(now);
        assert!(!engine.should_finalize(now + Duration::from_millis(9_999)));
        assert!(engine.should_finalize(now + Duration::from_secs(10)));
    }

    #[test]
    fn test_tie_goes_to_lowest_id() {
        let now = Instant::now();
        let mut view = NetworkView::new(5, now);
        let mut engine = engine();
        engine.start(now);
        engine.record_vote(1, 9).unwrap();
        engine.record_vote(2, 7).unwrap();

        let outcome = engine.finalize(&mut view, now).unwrap();
        assert_eq!(outcome.winner, 7);
        assert!(!engine.is_in_progress());
    }

    #[test]
    fn test_empty_election_elects_self() {
        let now = Instant::now();
        let mut view = NetworkView::new(5, now);
        let mut engine = engine();
        engine.start(now);

        let outcome = engine.finalize(&mut view, now).unwrap();
        assert_eq!(outcome.winner, 5);
        assert_eq!(outcome.total_votes, 0);
        assert_eq!(view.master_id(), Some(5));
    }

    #[test]
    fn test_abort_discards_votes() {
        let now = Instant::now();
        let mut engine = engine();
        engine.start(now);
        engine.record_vote(1, 2).unwrap();
        assert!(engine.abort());
        assert!(!engine.abort());
        assert_eq!(engine.vote_count(), 0);
    }
}
