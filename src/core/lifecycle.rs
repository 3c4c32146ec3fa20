//! Match lifecycle: state machine, expiry and the outcome archive.
//!
//! ```text
//! proposed ─► viewed ─► contacted ─► completed
//!     │                     ▲   └──► declined
//!     └─────────────────────┘
//! any non-terminal state ──(ttl)──► expired
//! ```

use crate::core::error::{MatchingError, Result};
use crate::core::filters::CandidateExclusions;
use crate::models::{
    ListingId, ListingPair, Match, MatchEvent, MatchId, MatchState, OutcomeSample, Transition,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Days without user action before a match expires
    pub ttl_days: i64,
    /// Period of the background expiry sweep
    pub sweep_interval_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            ttl_days: 14,
            sweep_interval_secs: 3600,
        }
    }
}

/// Resolve the state an event leads to
///
/// `Ok(None)` means the event is a repeat of progress already recorded and
/// changes nothing.
pub fn next_state(from: MatchState, event: MatchEvent) -> Result<Option<MatchState>> {
    use MatchState::*;

    if from.is_terminal() {
        return Err(MatchingError::InvalidTransition { from, event });
    }

    let to = match (from, event) {
        (_, MatchEvent::Expire) => Expired,
        (Proposed, MatchEvent::Viewed) => Viewed,
        (Proposed | Viewed, MatchEvent::Contacted) => Contacted,
        (Contacted, MatchEvent::Completed) => Completed,
        (Contacted, MatchEvent::Declined) => Declined,
        (Viewed | Contacted, MatchEvent::Viewed) | (Contacted, MatchEvent::Contacted) => {
            return Ok(None)
        }
        _ => return Err(MatchingError::InvalidTransition { from, event }),
    };

    Ok(Some(to))
}

#[derive(Debug, Default)]
struct LifecycleState {
    active: HashMap<MatchId, Match>,
    active_pairs: HashMap<ListingPair, MatchId>,
    archive: HashMap<MatchId, Match>,
    terminal_pairs: HashSet<ListingPair>,
    outcomes: Vec<OutcomeSample>,
    /// Archived since the last drain, waiting to be persisted
    outbox: Vec<Match>,
}

impl LifecycleState {
    fn apply(&mut self, id: MatchId, to: MatchState, now: DateTime<Utc>) -> Option<Match> {
        let m = self.active.get_mut(&id)?;
        m.transitions.push(Transition {
            from: m.state,
            to,
            at: now,
        });
        m.state = to;
        m.updated_at = now;

        if !to.is_terminal() {
            return Some(m.clone());
        }

        let archived = self.active.remove(&id)?;
        self.archive_terminal(archived.clone(), true);
        Some(archived)
    }

    fn archive_terminal(&mut self, m: Match, publish: bool) {
        let pair = m.pair();
        if self.active_pairs.get(&pair) == Some(&m.id) {
            self.active_pairs.remove(&pair);
        }
        self.terminal_pairs.insert(pair);
        self.outcomes.push(OutcomeSample::from_archived(&m));
        if publish {
            self.outbox.push(m.clone());
        }
        self.archive.insert(m.id, m);
    }
}

/// Records user actions on matches and archives terminal outcomes
///
/// The manager never infers intent; it only applies events it is given,
/// plus time-based expiry. Every operation takes the current time so expiry
/// is evaluated against a caller-controlled clock.
#[derive(Debug)]
pub struct LifecycleManager {
    ttl: Duration,
    state: RwLock<LifecycleState>,
}

impl LifecycleManager {
    pub fn new(config: &LifecycleConfig) -> Self {
        Self {
            ttl: Duration::days(config.ttl_days.max(0)),
            state: RwLock::new(LifecycleState::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_stale(&self, m: &Match, now: DateTime<Utc>) -> bool {
        !m.state.is_terminal() && now >= m.updated_at + self.ttl
    }

    /// Track a freshly proposed match
    ///
    /// If the unordered pair already has a live match, that match's id is
    /// returned and `proposal` is dropped. A pair that is closed, or whose
    /// live match turns out to be past its TTL, is never re-opened: the stale
    /// match expires and `None` is returned.
    pub fn register(&self, proposal: Match, now: DateTime<Utc>) -> Option<MatchId> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let pair = proposal.pair();

        if let Some(existing) = state.active_pairs.get(&pair).copied() {
            let stale = state
                .active
                .get(&existing)
                .map(|m| self.is_stale(m, now))
                .unwrap_or(true);
            if !stale {
                return Some(existing);
            }
            if state.apply(existing, MatchState::Expired, now).is_none() {
                state.active_pairs.remove(&pair);
            }
            tracing::debug!("Match {} expired while re-proposing its pair", existing);
            return None;
        }

        if state.terminal_pairs.contains(&pair) {
            return None;
        }

        let id = proposal.id;
        state.active_pairs.insert(pair, id);
        state.active.insert(id, proposal);
        Some(id)
    }

    /// Fetch a match, expiring it first if its TTL has passed
    pub fn get(&self, id: MatchId, now: DateTime<Utc>) -> Result<Match> {
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(m) = state.archive.get(&id) {
                return Ok(m.clone());
            }
            match state.active.get(&id) {
                Some(m) if !self.is_stale(m, now) => return Ok(m.clone()),
                Some(_) => {}
                None => return Err(MatchingError::UnknownMatch(id)),
            }
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        self.expire_if_stale(&mut state, id, now);
        state
            .active
            .get(&id)
            .or_else(|| state.archive.get(&id))
            .cloned()
            .ok_or(MatchingError::UnknownMatch(id))
    }

    /// Apply a user event and return the match as it stands afterwards
    pub fn record_event(
        &self,
        id: MatchId,
        event: MatchEvent,
        now: DateTime<Utc>,
    ) -> Result<Match> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        self.expire_if_stale(&mut state, id, now);

        let current = match (state.active.get(&id), state.archive.get(&id)) {
            (Some(m), _) | (None, Some(m)) => m.state,
            (None, None) => return Err(MatchingError::UnknownMatch(id)),
        };

        match next_state(current, event)? {
            Some(to) => {
                let updated = state
                    .apply(id, to, now)
                    .ok_or(MatchingError::UnknownMatch(id))?;
                tracing::debug!("Match {} moved {} -> {} on '{}'", id, current, to, event);
                Ok(updated)
            }
            None => {
                tracing::trace!("Ignoring repeated '{}' on match {} ({})", event, id, current);
                state
                    .active
                    .get(&id)
                    .cloned()
                    .ok_or(MatchingError::UnknownMatch(id))
            }
        }
    }

    fn expire_if_stale(&self, state: &mut LifecycleState, id: MatchId, now: DateTime<Utc>) {
        let stale = state
            .active
            .get(&id)
            .map(|m| self.is_stale(m, now))
            .unwrap_or(false);
        if stale {
            state.apply(id, MatchState::Expired, now);
            tracing::debug!("Match {} expired on access", id);
        }
    }

    /// Expire every live match whose TTL has passed; returns the expired matches
    pub fn expire_stale(&self, now: DateTime<Utc>) -> Vec<Match> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let stale: Vec<MatchId> = state
            .active
            .values()
            .filter(|m| self.is_stale(m, now))
            .map(|m| m.id)
            .collect();

        stale
            .into_iter()
            .filter_map(|id| state.apply(id, MatchState::Expired, now))
            .collect()
    }

    /// Candidates that already have a closed match with `listing_id`
    pub fn exclusions_for(&self, listing_id: ListingId) -> CandidateExclusions {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        CandidateExclusions::new(
            state
                .terminal_pairs
                .iter()
                .filter_map(|pair| pair.other(listing_id)),
        )
    }

    /// Outcome samples of matches closed at or after `since`
    pub fn outcomes_since(&self, since: DateTime<Utc>) -> Vec<OutcomeSample> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .outcomes
            .iter()
            .filter(|o| o.closed_at >= since)
            .cloned()
            .collect()
    }

    /// Take the matches archived since the previous call
    pub fn drain_archived(&self) -> Vec<Match> {
        std::mem::take(
            &mut self
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .outbox,
        )
    }

    /// Re-seed the archive from persisted terminal matches
    ///
    /// Non-terminal or already known matches are skipped.
    pub fn restore_archived(&self, matches: Vec<Match>) -> usize {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut restored = 0;
        for m in matches {
            if !m.state.is_terminal() || state.archive.contains_key(&m.id) {
                continue;
            }
            state.archive_terminal(m, false);
            restored += 1;
        }
        restored
    }

    /// Mark pairs closed in an earlier run so they are never proposed again
    ///
    /// Live matches on a restored pair are left alone; returns how many pairs
    /// were not already known.
    pub fn restore_closed_pairs(&self, pairs: impl IntoIterator<Item = ListingPair>) -> usize {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        pairs
            .into_iter()
            .filter(|pair| state.terminal_pairs.insert(*pair))
            .count()
    }

    pub fn active_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .len()
    }

    pub fn archived_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .archive
            .len()
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new(&LifecycleConfig::default())
    }
}
