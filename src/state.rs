//! Match state reconstruction.
//!
//! [`MatchStore`] folds an ordered stream of [`GameEvent`]s into one
//! [`MatchState`] per match. Folding is atomic: the next state is computed
//! from a copy and only committed if every check passes, so a rejected event
//! leaves the store exactly as it was.
//!
//! ```text
//! Unknown ──MatchCreated──▶ Created ──ShipsPlaced──▶ PlacementPhase
//!                                                        │
//!                                      ShotProposed / ShotFired
//!                                                        ▼
//!        Concluded ◀──Winner / MatchEnded──────────── InProgress
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{Conflict, FoldError};
use crate::event::{Coordinate, EventKind, GameEvent, MatchId, ShotResult};

// ── Phase ───────────────────────────────────────────────────────────

/// Lifecycle phase of a match as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MatchPhase {
    /// No `MatchCreated` has been seen for this match.
    #[default]
    Unknown,
    Created,
    /// At least one player has placed their fleet.
    PlacementPhase,
    /// At least one shot has been proposed or fired.
    InProgress,
    /// A winner was declared or the match ended.
    Concluded,
}

impl MatchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Created => "created",
            Self::PlacementPhase => "placement",
            Self::InProgress => "in_progress",
            Self::Concluded => "concluded",
        }
    }
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Winner resolution ───────────────────────────────────────────────

/// The declared winner of a match.
///
/// `Winner` events carry no payload; the winning side is resolved from
/// player context the client holds out of band.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Winner {
    Player(String),
    /// A winner was declared but the context could not say who.
    Undetermined,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player(p) => f.write_str(p),
            Self::Undetermined => f.write_str("<undetermined>"),
        }
    }
}

/// Out-of-band player knowledge used to resolve `Winner` events.
///
/// Any `Fn(&MatchId, &MatchState) -> Winner + Send` closure works.
pub trait PlayerContext: Send {
    /// Resolve who won `match_id`, given the state just before the
    /// `Winner` event is applied.
    fn resolve_winner(&self, match_id: &MatchId, state: &MatchState) -> Winner;
}

impl<F> PlayerContext for F
where
    F: Fn(&MatchId, &MatchState) -> Winner + Send,
{
    fn resolve_winner(&self, match_id: &MatchId, state: &MatchState) -> Winner {
        self(match_id, state)
    }
}

/// A context with no player knowledge; every winner is [`Winner::Undetermined`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UnresolvedPlayers;

impl PlayerContext for UnresolvedPlayers {
    fn resolve_winner(&self, _match_id: &MatchId, _state: &MatchState) -> Winner {
        Winner::Undetermined
    }
}

// ── Match state ─────────────────────────────────────────────────────

/// Reconstructed state of one match.
///
/// Instances handed to observers are snapshots; mutating a clone has no
/// effect on the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchState {
    match_id: MatchId,
    phase: MatchPhase,
    board: BTreeMap<Coordinate, ShotResult>,
    pending_shot: Option<Coordinate>,
    winner: Option<Winner>,
    placements: u32,
    ended: bool,
}

impl MatchState {
    fn created(match_id: MatchId) -> Self {
        Self {
            match_id,
            phase: MatchPhase::Created,
            board: BTreeMap::new(),
            pending_shot: None,
            winner: None,
            placements: 0,
            ended: false,
        }
    }

    pub fn match_id(&self) -> &MatchId {
        &self.match_id
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Resolved shot results, ordered by coordinate.
    pub fn board(&self) -> &BTreeMap<Coordinate, ShotResult> {
        &self.board
    }

    pub fn result_at(&self, at: Coordinate) -> Option<&ShotResult> {
        self.board.get(&at)
    }

    /// The most recent proposal that has not been resolved yet.
    pub fn pending_shot(&self) -> Option<Coordinate> {
        self.pending_shot
    }

    pub fn winner(&self) -> Option<&Winner> {
        self.winner.as_ref()
    }

    /// Number of `ShipsPlaced` events seen.
    pub fn placements(&self) -> u32 {
        self.placements
    }

    /// `true` once `MatchEnded` has been applied.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Number of resolved shots that struck a ship.
    pub fn hits(&self) -> usize {
        self.board.values().filter(|r| r.is_hit()).count()
    }
}

// ── Fold results ────────────────────────────────────────────────────

/// A committed state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    /// State before the fold; `None` when the event created the match.
    pub previous: Option<MatchState>,
    pub current: MatchState,
    pub event: GameEvent,
    /// Envelope timestamp of the triggering event, if any.
    pub timestamp: Option<u64>,
}

impl StateChange {
    pub fn match_id(&self) -> &MatchId {
        self.current.match_id()
    }

    pub fn previous_phase(&self) -> MatchPhase {
        self.previous
            .as_ref()
            .map_or(MatchPhase::Unknown, MatchState::phase)
    }
}

/// Result of a successful fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoldOutcome {
    Changed(StateChange),
    /// The event repeated something already recorded.
    Unchanged,
}

// ── Store ───────────────────────────────────────────────────────────

/// Owns every [`MatchState`] and applies events to them.
pub struct MatchStore {
    matches: HashMap<MatchId, MatchState>,
    context: Box<dyn PlayerContext>,
}

impl MatchStore {
    pub fn new(context: impl PlayerContext + 'static) -> Self {
        Self {
            matches: HashMap::new(),
            context: Box::new(context),
        }
    }

    /// Apply one event.
    ///
    /// # Errors
    ///
    /// - [`FoldError::OutOfOrderEvent`] if the match is unknown and the event
    ///   is not `MatchCreated`, or the event is not valid in the current phase.
    /// - [`FoldError::ConflictingResult`] if the event contradicts a recorded
    ///   shot result or winner.
    /// - [`FoldError::MatchAlreadyEnded`] if the match has ended.
    pub fn fold(&mut self, event: &GameEvent) -> Result<FoldOutcome, FoldError> {
        let match_id = event.match_id();
        let previous = self.matches.get(match_id);

        let next = match previous {
            Some(state) => transition(state, event, self.context.as_ref())?,
            None => match event {
                GameEvent::MatchCreated { match_id } => MatchState::created(match_id.clone()),
                _ => {
                    return Err(FoldError::OutOfOrderEvent {
                        match_id: match_id.clone(),
                        kind: event.kind(),
                        phase: MatchPhase::Unknown,
                    })
                }
            },
        };

        if previous == Some(&next) {
            tracing::trace!(match_id = %match_id, kind = %event.kind(), "idempotent repeat");
            return Ok(FoldOutcome::Unchanged);
        }

        let previous = self.matches.insert(match_id.clone(), next.clone());
        tracing::debug!(
            match_id = %match_id,
            kind = %event.kind(),
            phase = %next.phase,
            "event folded"
        );
        Ok(FoldOutcome::Changed(StateChange {
            previous,
            current: next,
            event: event.clone(),
            timestamp: None,
        }))
    }

    pub fn current_state(&self, match_id: &MatchId) -> Option<&MatchState> {
        self.matches.get(match_id)
    }

    /// Phase of `match_id`, or [`MatchPhase::Unknown`] if it was never created.
    pub fn phase_of(&self, match_id: &MatchId) -> MatchPhase {
        self.matches
            .get(match_id)
            .map_or(MatchPhase::Unknown, MatchState::phase)
    }

    pub fn match_ids(&self) -> impl Iterator<Item = &MatchId> {
        self.matches.keys()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Drop every ended match and return how many were removed.
    ///
    /// Events for a pruned match are treated as events for an unknown match.
    pub fn prune_ended(&mut self) -> usize {
        let before = self.matches.len();
        self.matches.retain(|_, state| !state.ended);
        before - self.matches.len()
    }
}

impl Default for MatchStore {
    fn default() -> Self {
        Self::new(UnresolvedPlayers)
    }
}

impl fmt::Debug for MatchStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchStore")
            .field("matches", &self.matches)
            .finish_non_exhaustive()
    }
}

/// Compute the state that follows `state` after `event`.
fn transition(
    state: &MatchState,
    event: &GameEvent,
    context: &dyn PlayerContext,
) -> Result<MatchState, FoldError> {
    let match_id = &state.match_id;
    if state.ended {
        return Err(FoldError::MatchAlreadyEnded {
            match_id: match_id.clone(),
            kind: event.kind(),
        });
    }

    let out_of_order = |kind: EventKind| FoldError::OutOfOrderEvent {
        match_id: match_id.clone(),
        kind,
        phase: state.phase,
    };

    let mut next = state.clone();
    match event {
        GameEvent::MatchCreated { .. } => {}

        GameEvent::ShipsPlaced { .. } => match state.phase {
            MatchPhase::Created | MatchPhase::PlacementPhase => {
                next.phase = MatchPhase::PlacementPhase;
                next.placements = next.placements.saturating_add(1);
            }
            _ => return Err(out_of_order(EventKind::ShipsPlaced)),
        },

        GameEvent::ShotProposed { x, y, .. } => match state.phase {
            MatchPhase::PlacementPhase | MatchPhase::InProgress => {
                next.phase = MatchPhase::InProgress;
                next.pending_shot = Some(Coordinate::new(*x, *y));
            }
            _ => return Err(out_of_order(EventKind::ShotProposed)),
        },

        GameEvent::ShotFired { x, y, result, .. } => {
            match state.phase {
                MatchPhase::PlacementPhase => next.phase = MatchPhase::InProgress,
                // The engine may resolve the winning shot after declaring the winner.
                MatchPhase::InProgress | MatchPhase::Concluded => {}
                MatchPhase::Unknown | MatchPhase::Created => {
                    return Err(out_of_order(EventKind::ShotFired))
                }
            }

            let at = Coordinate::new(*x, *y);
            if let Some(recorded) = state.board.get(&at) {
                if recorded != result {
                    return Err(FoldError::ConflictingResult {
                        match_id: match_id.clone(),
                        conflict: Conflict::Shot {
                            at,
                            recorded: recorded.clone(),
                            incoming: result.clone(),
                        },
                    });
                }
            }
            next.board.insert(at, result.clone());
            if next.pending_shot == Some(at) {
                next.pending_shot = None;
            }
        }

        GameEvent::Winner { .. } => {
            let incoming = context.resolve_winner(match_id, state);
            if let Some(recorded) = &state.winner {
                if *recorded != incoming {
                    return Err(FoldError::ConflictingResult {
                        match_id: match_id.clone(),
                        conflict: Conflict::Winner {
                            recorded: recorded.clone(),
                            incoming,
                        },
                    });
                }
            }
            next.phase = MatchPhase::Concluded;
            next.winner = Some(incoming);
        }

        GameEvent::MatchEnded { .. } => {
            next.phase = MatchPhase::Concluded;
            next.ended = true;
        }
    }

    Ok(next)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn id() -> MatchId {
        MatchId::new("m1")
    }

    fn created() -> GameEvent {
        GameEvent::MatchCreated { match_id: id() }
    }

    fn placed() -> GameEvent {
        GameEvent::ShipsPlaced { match_id: id() }
    }

    fn proposed(x: u8, y: u8) -> GameEvent {
        GameEvent::ShotProposed {
            match_id: id(),
            x,
            y,
        }
    }

    fn fired(x: u8, y: u8, result: &str) -> GameEvent {
        GameEvent::ShotFired {
            match_id: id(),
            x,
            y,
            result: result.into(),
        }
    }

    fn store_in_progress() -> MatchStore {
        let mut store = MatchStore::default();
        for event in [created(), placed(), proposed(0, 0)] {
            store.fold(&event).unwrap();
        }
        store
    }

    fn changed(outcome: FoldOutcome) -> StateChange {
        match outcome {
            FoldOutcome::Changed(change) => change,
            FoldOutcome::Unchanged => panic!("expected a state change"),
        }
    }

    #[test]
    fn match_created_starts_in_created_phase() {
        let mut store = MatchStore::default();
        let change = changed(store.fold(&created()).unwrap());
        assert!(change.previous.is_none());
        assert_eq!(change.previous_phase(), MatchPhase::Unknown);
        assert_eq!(change.current.phase(), MatchPhase::Created);
        assert_eq!(store.phase_of(&id()), MatchPhase::Created);
    }

    #[test]
    fn repeated_match_created_is_unchanged() {
        let mut store = MatchStore::default();
        store.fold(&created()).unwrap();
        assert_eq!(store.fold(&created()).unwrap(), FoldOutcome::Unchanged);
    }

    #[test]
    fn ships_placed_counts_each_player() {
        let mut store = MatchStore::default();
        store.fold(&created()).unwrap();
        store.fold(&placed()).unwrap();
        let change = changed(store.fold(&placed()).unwrap());
        assert_eq!(change.current.phase(), MatchPhase::PlacementPhase);
        assert_eq!(change.current.placements(), 2);
    }

    #[test]
    fn shot_proposed_sets_pending_without_touching_board() {
        let store = store_in_progress();
        let state = store.current_state(&id()).unwrap();
        assert_eq!(state.phase(), MatchPhase::InProgress);
        assert_eq!(state.pending_shot(), Some(Coordinate::new(0, 0)));
        assert!(state.board().is_empty());
    }

    #[test]
    fn shot_fired_resolves_matching_proposal() {
        let mut store = store_in_progress();
        let change = changed(store.fold(&fired(0, 0, "miss")).unwrap());
        assert_eq!(change.current.pending_shot(), None);
        assert_eq!(
            change.current.result_at(Coordinate::new(0, 0)),
            Some(&ShotResult::Miss)
        );
    }

    #[test]
    fn shot_fired_elsewhere_keeps_pending_proposal() {
        let mut store = store_in_progress();
        let change = changed(store.fold(&fired(5, 5, "hit")).unwrap());
        assert_eq!(change.current.pending_shot(), Some(Coordinate::new(0, 0)));
        assert_eq!(change.current.hits(), 1);
    }

    #[test]
    fn shot_fired_from_placement_enters_in_progress() {
        let mut store = MatchStore::default();
        store.fold(&created()).unwrap();
        store.fold(&placed()).unwrap();
        let change = changed(store.fold(&fired(1, 1, "sunk")).unwrap());
        assert_eq!(change.current.phase(), MatchPhase::InProgress);
    }

    #[test]
    fn shots_before_placement_are_out_of_order() {
        let mut store = MatchStore::default();
        store.fold(&created()).unwrap();
        for event in [proposed(1, 1), fired(1, 1, "hit")] {
            let err = store.fold(&event).unwrap_err();
            assert!(
                matches!(
                    err,
                    FoldError::OutOfOrderEvent {
                        phase: MatchPhase::Created,
                        ..
                    }
                ),
                "{err:?}"
            );
        }
    }

    #[test]
    fn ships_placed_after_shots_is_out_of_order() {
        let mut store = store_in_progress();
        let err = store.fold(&placed()).unwrap_err();
        assert_eq!(err.code(), crate::FailureCode::OutOfOrderEvent);
    }

    #[test]
    fn conflicting_shot_result_leaves_state_untouched() {
        let mut store = store_in_progress();
        store.fold(&fired(2, 3, "hit")).unwrap();
        let before = store.current_state(&id()).cloned();

        let err = store.fold(&fired(2, 3, "miss")).unwrap_err();
        match err {
            FoldError::ConflictingResult {
                conflict:
                    Conflict::Shot {
                        at,
                        recorded,
                        incoming,
                    },
                ..
            } => {
                assert_eq!(at, Coordinate::new(2, 3));
                assert_eq!(recorded, ShotResult::Hit);
                assert_eq!(incoming, ShotResult::Miss);
            }
            other => panic!("expected shot conflict, got {other:?}"),
        }
        assert_eq!(store.current_state(&id()).cloned(), before);
    }

    #[test]
    fn winner_is_resolved_through_context() {
        let mut store = MatchStore::new(|_: &MatchId, state: &MatchState| {
            Winner::Player(format!("scored-{}", state.hits()))
        });
        for event in [created(), placed(), fired(0, 0, "sunk")] {
            store.fold(&event).unwrap();
        }
        let change = changed(store.fold(&GameEvent::Winner { match_id: id() }).unwrap());
        assert_eq!(change.current.phase(), MatchPhase::Concluded);
        assert_eq!(
            change.current.winner(),
            Some(&Winner::Player("scored-1".into()))
        );
    }

    #[test]
    fn repeated_winner_with_same_value_is_unchanged() {
        let mut store = store_in_progress();
        let winner = GameEvent::Winner { match_id: id() };
        store.fold(&winner).unwrap();
        assert_eq!(store.fold(&winner).unwrap(), FoldOutcome::Unchanged);
    }

    #[test]
    fn winner_with_different_value_conflicts() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let mut store = MatchStore::new(move |_: &MatchId, _: &MatchState| {
            let n = calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            Winner::Player(format!("player-{n}"))
        });
        for event in [created(), placed()] {
            store.fold(&event).unwrap();
        }
        let winner = GameEvent::Winner { match_id: id() };
        store.fold(&winner).unwrap();
        let err = store.fold(&winner).unwrap_err();
        assert!(matches!(
            err,
            FoldError::ConflictingResult {
                conflict: Conflict::Winner { .. },
                ..
            }
        ));
        assert_eq!(
            store.current_state(&id()).unwrap().winner(),
            Some(&Winner::Player("player-0".into()))
        );
    }

    #[test]
    fn shot_fired_after_winner_is_recorded() {
        let mut store = store_in_progress();
        store.fold(&GameEvent::Winner { match_id: id() }).unwrap();
        let change = changed(store.fold(&fired(0, 0, "sunk")).unwrap());
        assert_eq!(change.current.phase(), MatchPhase::Concluded);
        assert_eq!(change.current.pending_shot(), None);
    }

    #[test]
    fn proposals_after_winner_are_out_of_order() {
        let mut store = store_in_progress();
        store.fold(&GameEvent::Winner { match_id: id() }).unwrap();
        assert!(matches!(
            store.fold(&proposed(3, 3)).unwrap_err(),
            FoldError::OutOfOrderEvent {
                phase: MatchPhase::Concluded,
                ..
            }
        ));
    }

    #[test]
    fn match_ended_rejects_everything_after() {
        let mut store = store_in_progress();
        let ended = GameEvent::MatchEnded { match_id: id() };
        let change = changed(store.fold(&ended).unwrap());
        assert!(change.current.is_ended());
        assert_eq!(change.current.phase(), MatchPhase::Concluded);

        for event in [created(), fired(0, 0, "hit"), ended.clone()] {
            let err = store.fold(&event).unwrap_err();
            assert!(err.is_recoverable());
            assert_eq!(err.match_id(), &id());
        }
    }

    #[test]
    fn unknown_match_rejects_non_creation_events() {
        let mut store = MatchStore::default();
        let err = store
            .fold(&GameEvent::Winner {
                match_id: "ghost".into(),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            FoldError::OutOfOrderEvent {
                kind: EventKind::Winner,
                phase: MatchPhase::Unknown,
                ..
            }
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn prune_ended_removes_only_retired_matches() {
        let mut store = MatchStore::default();
        store.fold(&created()).unwrap();
        store
            .fold(&GameEvent::MatchEnded { match_id: id() })
            .unwrap();
        store
            .fold(&GameEvent::MatchCreated {
                match_id: "m2".into(),
            })
            .unwrap();
        assert_eq!(store.prune_ended(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.phase_of(&id()), MatchPhase::Unknown);
    }
}
