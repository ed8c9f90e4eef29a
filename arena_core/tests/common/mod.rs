//! Shared fixtures for the engine integration tests.
#![allow(dead_code)]

use arena_core::matches::{BracketSide, Match, MatchSlot, Scoreline};
use arena_core::tournament::{
    LifecycleReport, NewTournament, Participant, ParticipantRef, Tournament, TournamentId,
};
use arena_core::wallet::{Amount, TransactionKind};
use arena_core::{Engine, EngineConfig};
use chrono::{Duration, Utc};

pub fn engine() -> Engine {
    Engine::in_memory(EngineConfig::default())
}

/// Open a wallet for `user_id` holding `major` whole units
pub async fn fund(engine: &Engine, user_id: i64, major: i64) {
    let wallet = engine.ledger().create_wallet(user_id, None).await.unwrap();
    if major > 0 {
        engine
            .credit(
                wallet.id,
                Amount::from_major(major),
                TransactionKind::Deposit,
                Some(&format!("deposit-{user_id}")),
                None,
            )
            .await
            .unwrap();
    }
}

pub async fn balance(engine: &Engine, user_id: i64) -> Amount {
    engine.ledger().wallet_for_owner(user_id).await.unwrap().balance
}

/// Single-elimination cup starting in an hour
pub fn cup(max: i32, fee: i64, prize: i64) -> NewTournament {
    NewTournament::single_elimination(
        "Test Cup",
        max,
        Amount::from_major(fee),
        Amount::from_major(prize),
        Utc::now() + Duration::hours(1),
    )
}

pub async fn create(engine: &Engine, request: NewTournament) -> Tournament {
    engine
        .tournaments()
        .create_tournament(request, Utc::now())
        .await
        .unwrap()
}

/// Fund and register users, each paying for itself
pub async fn register_users(engine: &Engine, tournament_id: TournamentId, users: &[i64]) -> Vec<Participant> {
    let mut registered = Vec::new();
    for &user in users {
        fund(engine, user, 50).await;
        registered.push(
            engine
                .register_participant(tournament_id, ParticipantRef::user(user), user)
                .await
                .unwrap(),
        );
    }
    registered
}

/// Run a lifecycle tick just after the tournament's scheduled start
pub async fn tick_at_start(engine: &Engine, tournament_id: TournamentId) -> LifecycleReport {
    let t = engine.tournaments().get_tournament(tournament_id).await.unwrap();
    engine.run_lifecycle_tick(t.start_date + Duration::seconds(1)).await
}

pub async fn matches(engine: &Engine, tournament_id: TournamentId) -> Vec<Match> {
    engine
        .matches()
        .tournament_matches(tournament_id)
        .await
        .unwrap()
}

/// The match at a bracket position
pub async fn match_at(
    engine: &Engine,
    tournament_id: TournamentId,
    side: BracketSide,
    round: i32,
    index: i32,
) -> Match {
    matches(engine, tournament_id)
        .await
        .into_iter()
        .find(|m| m.side == side && m.round == round && m.index_in_round == index)
        .unwrap_or_else(|| panic!("no {side:?} match at round {round} index {index}"))
}

/// Both participants report the same scoreline
pub async fn play(engine: &Engine, m: &Match, score: Scoreline) -> Match {
    let first = m.participant(MatchSlot::First).unwrap();
    let second = m.participant(MatchSlot::Second).unwrap();
    engine
        .submit_match_result(m.id, first, score, None)
        .await
        .unwrap();
    engine
        .submit_match_result(m.id, second, score, None)
        .await
        .unwrap()
}

/// Scoreline in which `winner` takes the match
pub fn win_for(m: &Match, winner: i64) -> Scoreline {
    match m.slot_of(winner) {
        Some(MatchSlot::First) => Scoreline::new(2, 0),
        Some(MatchSlot::Second) => Scoreline::new(0, 2),
        None => panic!("participant {winner} is not in match {}", m.id),
    }
}
