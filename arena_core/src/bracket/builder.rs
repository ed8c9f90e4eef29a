//! Bracket construction.
//!
//! Participants are ordered deterministically, padded to a power of two and
//! placed with the standard interleave so seed k meets seed `size + 1 - k` in
//! the first round. The full routing table is built up front; round-one byes
//! and dead losers-bracket matches are settled before anything is stored.

use super::arena::BracketArena;
use super::errors::{BracketError, BracketResult};
use crate::matches::{BracketSide, Match, MatchId, MatchSlot, SlotRef, SlotState};
use crate::tournament::{BracketKind, Participant, ParticipantId, TournamentId};
use chrono::{DateTime, Utc};

/// Output of [`build_bracket`]
#[derive(Debug, Clone)]
pub struct BracketPlan {
    /// Matches with provisional ids `1..=len`
    pub matches: Vec<Match>,
    /// (participant, final seed) in seed order
    pub seeds: Vec<(ParticipantId, i32)>,
}

impl BracketPlan {
    /// Number of winners-side rounds
    pub fn winners_rounds(&self) -> i32 {
        self.matches
            .iter()
            .filter(|m| m.side == BracketSide::Winners)
            .map(|m| m.round)
            .max()
            .unwrap_or(0)
    }
}

/// Seed order: explicit seed ascending (unseeded last), then registration
/// time, then id
pub fn seed_order(participants: &[Participant]) -> Vec<&Participant> {
    let mut ordered: Vec<&Participant> = participants.iter().collect();
    ordered.sort_by_key(|p| (p.seed.is_none(), p.seed, p.registered_at, p.id));
    ordered
}

/// Bracket positions for a power-of-two field: `[1] -> [1,2] -> [1,4,2,3]`
pub fn seed_positions(size: usize) -> Vec<usize> {
    let mut seeds = vec![1usize];
    while seeds.len() < size {
        let n = seeds.len();
        let mut next = Vec::with_capacity(n * 2);
        for seed in seeds.iter().copied() {
            next.push(seed);
            next.push(n * 2 + 1 - seed);
        }
        seeds = next;
    }
    seeds
}

/// Build the match graph for the given eligible participants
///
/// # Errors
///
/// * `BracketError::InsufficientParticipants` - Fewer than two participants
pub fn build_bracket(
    tournament_id: TournamentId,
    kind: BracketKind,
    participants: &[Participant],
    grand_final_reset: bool,
    now: DateTime<Utc>,
) -> BracketResult<BracketPlan> {
    if participants.len() < 2 {
        return Err(BracketError::InsufficientParticipants(participants.len()));
    }

    let ordered = seed_order(participants);
    let size = ordered.len().next_power_of_two();
    let rounds = size.trailing_zeros() as usize;

    let mut draft = Draft::new(tournament_id, now);
    let winners = draft.winners_rounds(size, rounds);
    if kind == BracketKind::DoubleElimination {
        draft.losers_and_grand_final(&winners, grand_final_reset);
    }

    let positions = seed_positions(size);
    let seat = |seed: usize| match ordered.get(seed - 1) {
        Some(p) => SlotState::Filled(p.id),
        None => SlotState::Vacant,
    };
    for (i, &match_id) in winners[0].iter().enumerate() {
        let m = draft.get_mut(match_id);
        m.slot1 = seat(positions[i * 2]);
        m.slot2 = seat(positions[i * 2 + 1]);
    }

    let mut arena = BracketArena::new(draft.matches, now);
    for &match_id in &winners[0] {
        arena.refresh(match_id)?;
    }

    let seeds = ordered
        .iter()
        .zip(1..)
        .map(|(p, seed)| (p.id, seed))
        .collect();
    Ok(BracketPlan {
        matches: arena.into_matches(),
        seeds,
    })
}

struct Draft {
    tournament_id: TournamentId,
    now: DateTime<Utc>,
    matches: Vec<Match>,
}

impl Draft {
    fn new(tournament_id: TournamentId, now: DateTime<Utc>) -> Self {
        Self {
            tournament_id,
            now,
            matches: Vec::new(),
        }
    }

    fn push(&mut self, side: BracketSide, round: usize, index: usize) -> MatchId {
        let id = self.matches.len() as MatchId + 1;
        self.matches.push(Match::blank(
            id,
            self.tournament_id,
            side,
            round as i32,
            index as i32,
            self.now,
        ));
        id
    }

    // Ids are dense from 1, so the index is always in range.
    fn get_mut(&mut self, id: MatchId) -> &mut Match {
        &mut self.matches[(id - 1) as usize]
    }

    fn link(&mut self, from: MatchId, to: MatchId, slot: MatchSlot) {
        self.get_mut(from).next_match = Some(SlotRef::new(to, slot));
    }

    fn link_loser(&mut self, from: MatchId, to: MatchId, slot: MatchSlot) {
        self.get_mut(from).next_loser_match = Some(SlotRef::new(to, slot));
    }

    /// Winners rounds; match `i` feeds match `i / 2` of the next round
    fn winners_rounds(&mut self, size: usize, rounds: usize) -> Vec<Vec<MatchId>> {
        let mut all: Vec<Vec<MatchId>> = Vec::with_capacity(rounds);
        for round in 1..=rounds {
            let ids: Vec<MatchId> = (0..size >> round)
                .map(|index| self.push(BracketSide::Winners, round, index))
                .collect();
            if let Some(prev) = all.last() {
                for (i, &from) in prev.iter().enumerate() {
                    self.link(from, ids[i / 2], slot_for(i));
                }
            }
            all.push(ids);
        }
        all
    }

    /// Losers bracket and grand final(s)
    ///
    /// Losers round 1 pairs the losers of winners-round-1 matches `2j` and
    /// `2j + 1`. Each even losers round meets the survivors of the previous
    /// odd round with the losers dropping from the next winners round; each
    /// later odd round halves the field.
    fn losers_and_grand_final(&mut self, winners: &[Vec<MatchId>], grand_final_reset: bool) {
        let rounds = winners.len();
        let mut last_even: Vec<MatchId> = Vec::new();

        for i in 1..rounds {
            let count = winners[i].len();
            let odd_round = i * 2 - 1;
            let odd: Vec<MatchId> = (0..count)
                .map(|j| self.push(BracketSide::Losers, odd_round, j))
                .collect();

            if i == 1 {
                for (k, &from) in winners[0].iter().enumerate() {
                    self.link_loser(from, odd[k / 2], slot_for(k));
                }
            } else {
                for (k, &from) in last_even.iter().enumerate() {
                    self.link(from, odd[k / 2], slot_for(k));
                }
            }

            let even: Vec<MatchId> = (0..count)
                .map(|j| self.push(BracketSide::Losers, odd_round + 1, j))
                .collect();
            for j in 0..count {
                self.link(odd[j], even[j], MatchSlot::First);
                self.link_loser(winners[i][j], even[j], MatchSlot::Second);
            }
            last_even = even;
        }

        let Some(&winners_final) = winners.last().and_then(|r| r.first()) else {
            return;
        };
        let gf1 = self.push(BracketSide::GrandFinal, 1, 0);
        self.link(winners_final, gf1, MatchSlot::First);
        match last_even.first() {
            Some(&losers_final) => self.link(losers_final, gf1, MatchSlot::Second),
            None => self.link_loser(winners_final, gf1, MatchSlot::Second),
        }

        if grand_final_reset {
            let gf2 = self.push(BracketSide::GrandFinal, 2, 0);
            self.link(gf1, gf2, MatchSlot::First);
            self.link_loser(gf1, gf2, MatchSlot::Second);
        }
    }
}

fn slot_for(index: usize) -> MatchSlot {
    if index % 2 == 0 {
        MatchSlot::First
    } else {
        MatchSlot::Second
    }
}
