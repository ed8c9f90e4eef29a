//! Integration tests for the tournament lifecycle.
//!
//! Registration with entry fees, the start decision taken by the lifecycle
//! tick, cancellation refunds and completion with prize payout.

mod common;

use arena_core::matches::{BracketSide, MatchStatus, Scoreline};
use arena_core::tournament::{
    NewTournament, ParticipantRef, ParticipantStatus, StartOutcome, TournamentError,
    TournamentStatus,
};
use arena_core::matches::Match;
use arena_core::tournament::TournamentId;
use arena_core::wallet::{Amount, TransactionKind, TransactionStatus};
use arena_core::{Engine, EngineConfig, EngineError, Entity, ErrorKind};
use chrono::Utc;
use common::*;
use std::sync::Arc;

fn engine_with_tick_limit(limit: i64) -> Engine {
    Engine::in_memory(EngineConfig {
        max_tournaments_per_tick: limit,
        ..EngineConfig::default()
    })
}

/// Started two-player cup with a prize and no fee; nobody needs a wallet
async fn prize_final(engine: &Engine, users: [i64; 2]) -> (TournamentId, Match) {
    let t = create(engine, cup(2, 0, 20)).await;
    for user in users {
        engine
            .register_participant(t.id, ParticipantRef::user(user), user)
            .await
            .unwrap();
    }
    engine
        .tournaments()
        .begin_tournament(t.id, Utc::now())
        .await
        .unwrap();
    let m = match_at(engine, t.id, BracketSide::Winners, 1, 0).await;
    (t.id, m)
}

async fn status(engine: &Engine, tournament_id: TournamentId) -> TournamentStatus {
    engine
        .tournaments()
        .get_tournament(tournament_id)
        .await
        .unwrap()
        .status
}

#[tokio::test]
async fn test_four_player_cup_pays_the_champion() {
    let engine = engine();
    let t = create(&engine, cup(4, 10, 30)).await;
    let [a, b, c, d]: [_; 4] = register_users(&engine, t.id, &[1, 2, 3, 4])
        .await
        .try_into()
        .unwrap();

    let seeds = [(a.id, 1), (b.id, 4), (d.id, 2), (c.id, 3)];
    for (participant_id, seed) in seeds {
        engine
            .tournaments()
            .set_seed(participant_id, Some(seed))
            .await
            .unwrap();
    }
    assert_eq!(engine.tournaments().get_tournament(t.id).await.unwrap().current_participants, 4);
    assert_eq!(balance(&engine, 1).await, Amount::from_major(40));

    let report = tick_at_start(&engine, t.id).await;
    assert_eq!(report.started, vec![t.id]);
    assert_eq!(matches(&engine, t.id).await.len(), 3);

    // Seed 1 meets seed 4, seed 2 meets seed 3
    let semi1 = match_at(&engine, t.id, BracketSide::Winners, 1, 0).await;
    let semi2 = match_at(&engine, t.id, BracketSide::Winners, 1, 1).await;
    assert!(semi1.slot_of(a.id).is_some() && semi1.slot_of(b.id).is_some());
    assert!(semi2.slot_of(d.id).is_some() && semi2.slot_of(c.id).is_some());

    let done = play(&engine, &semi1, win_for(&semi1, a.id)).await;
    assert_eq!(done.status, MatchStatus::Confirmed);
    assert_eq!(done.winner_id, Some(a.id));
    play(&engine, &semi2, win_for(&semi2, c.id)).await;

    let final_match = match_at(&engine, t.id, BracketSide::Winners, 2, 0).await;
    assert_eq!(final_match.status, MatchStatus::Scheduled);
    assert!(final_match.slot_of(a.id).is_some() && final_match.slot_of(c.id).is_some());

    play(&engine, &final_match, win_for(&final_match, a.id)).await;

    let finished = engine.tournaments().get_tournament(t.id).await.unwrap();
    assert_eq!(finished.status, TournamentStatus::Completed);
    assert!(finished.end_date.is_some());
    assert_eq!(
        engine.tournaments().get_participant(a.id).await.unwrap().status,
        ParticipantStatus::Champion
    );
    assert_eq!(balance(&engine, 1).await, Amount::from_major(70));
    for user in [2, 3, 4] {
        assert_eq!(balance(&engine, user).await, Amount::from_major(40));
    }

    // A later tick neither pays again nor reports the tournament
    let later = engine.run_lifecycle_tick(Utc::now()).await;
    assert!(later.is_idle());
    assert_eq!(balance(&engine, 1).await, Amount::from_major(70));
}

#[tokio::test]
async fn test_too_few_participants_cancels_and_refunds() {
    let engine = engine();
    let t = create(&engine, cup(8, 10, 0).with_min_participants(3)).await;
    register_users(&engine, t.id, &[1, 2]).await;
    assert_eq!(balance(&engine, 1).await, Amount::from_major(40));

    let report = tick_at_start(&engine, t.id).await;
    assert_eq!(report.canceled, vec![t.id]);
    assert!(report.started.is_empty());

    let canceled = engine.tournaments().get_tournament(t.id).await.unwrap();
    assert_eq!(canceled.status, TournamentStatus::Canceled);
    assert!(!canceled.refund_pending);
    assert!(matches(&engine, t.id).await.is_empty());
    assert_eq!(balance(&engine, 1).await, Amount::from_major(50));
    assert_eq!(balance(&engine, 2).await, Amount::from_major(50));

    let mut refunds = Vec::new();
    for user in [1, 2] {
        let wallet = engine.ledger().wallet_for_owner(user).await.unwrap();
        refunds.extend(
            engine
                .ledger()
                .transactions(wallet.id, 10)
                .await
                .unwrap()
                .into_iter()
                .filter(|tx| tx.kind == TransactionKind::Refund),
        );
    }
    assert_eq!(refunds.len(), 2);
    for (user, refund) in [1, 2].into_iter().zip(&refunds) {
        assert_eq!(refund.amount, Amount::from_major(10));
        assert_eq!(refund.status, TransactionStatus::Completed);
        assert_eq!(refund.tournament_id, Some(t.id));
        assert_eq!(
            refund.idempotency_key,
            Some(format!("tournament:{}:user:{}:refund", t.id, user))
        );
    }
}

#[tokio::test]
async fn test_start_decision_is_taken_once() {
    let engine = engine();
    let t = create(&engine, cup(4, 0, 0)).await;
    register_users(&engine, t.id, &[1, 2]).await;

    let first = tick_at_start(&engine, t.id).await;
    assert_eq!(first.started, vec![t.id]);
    let second = tick_at_start(&engine, t.id).await;
    assert!(second.is_idle(), "unexpected work: {second:?}");

    let err = engine
        .tournaments()
        .begin_tournament(t.id, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, TournamentError::InvalidState { .. }));
}

#[tokio::test]
async fn test_tick_before_start_date_does_nothing() {
    let engine = engine();
    let t = create(&engine, cup(4, 0, 0)).await;
    register_users(&engine, t.id, &[1, 2]).await;

    let report = engine.run_lifecycle_tick(Utc::now()).await;
    assert!(report.is_idle());
    assert_eq!(
        engine.tournaments().get_tournament(t.id).await.unwrap().status,
        TournamentStatus::Upcoming
    );
}

#[tokio::test]
async fn test_capacity_is_enforced() {
    let engine = engine();
    let t = create(&engine, cup(2, 10, 0)).await;
    register_users(&engine, t.id, &[1, 2]).await;
    fund(&engine, 3, 50).await;

    let err = engine
        .register_participant(t.id, ParticipantRef::user(3), 3)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Tournament(TournamentError::TournamentFull(_))));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(balance(&engine, 3).await, Amount::from_major(50));
    assert_eq!(engine.tournaments().get_tournament(t.id).await.unwrap().current_participants, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_respect_capacity() {
    let engine = Arc::new(engine());
    let tournament_id = create(&engine, cup(3, 10, 0)).await.id;
    let users: Vec<i64> = (1..=10).collect();
    for &user in &users {
        fund(&engine, user, 50).await;
    }

    let handles: Vec<_> = users
        .iter()
        .map(|&user| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .register_participant(tournament_id, ParticipantRef::user(user), user)
                    .await
            })
        })
        .collect();

    let mut admitted = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::Conflict, "unexpected error: {e}");
                refused += 1;
            }
        }
    }
    assert_eq!(admitted, 3);
    assert_eq!(refused, 7);

    let stored = engine.tournaments().get_tournament(tournament_id).await.unwrap();
    assert_eq!(stored.current_participants, 3);
    assert_eq!(
        engine.tournaments().list_participants(tournament_id).await.unwrap().len(),
        3
    );

    // Only admitted users paid
    let mut charged = 0;
    for &user in &users {
        if balance(&engine, user).await == Amount::from_major(40) {
            charged += 1;
        } else {
            assert_eq!(balance(&engine, user).await, Amount::from_major(50));
        }
    }
    assert_eq!(charged, 3);
}

#[tokio::test]
async fn test_unaffordable_fee_leaves_no_registration() {
    let engine = engine();
    let t = create(&engine, cup(4, 10, 0)).await;
    fund(&engine, 1, 5).await;

    let err = engine
        .register_participant(t.id, ParticipantRef::user(1), 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);

    assert!(engine.tournaments().list_participants(t.id).await.unwrap().is_empty());
    assert_eq!(engine.tournaments().get_tournament(t.id).await.unwrap().current_participants, 0);
    assert_eq!(balance(&engine, 1).await, Amount::from_major(5));
}

#[tokio::test]
async fn test_missing_wallet_refuses_paid_registration() {
    let engine = engine();
    let t = create(&engine, cup(4, 10, 0)).await;

    let err = engine
        .register_participant(t.id, ParticipantRef::user(1), 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_duplicate_registration_charges_once() {
    let engine = engine();
    let t = create(&engine, cup(4, 10, 0)).await;
    register_users(&engine, t.id, &[1]).await;

    let err = engine
        .register_participant(t.id, ParticipantRef::user(1), 1)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Tournament(TournamentError::AlreadyRegistered { .. })
    ));
    assert_eq!(balance(&engine, 1).await, Amount::from_major(40));
}

#[tokio::test]
async fn test_user_must_pay_for_itself() {
    let engine = engine();
    let t = create(&engine, cup(4, 10, 0)).await;
    fund(&engine, 1, 50).await;

    let err = engine
        .register_participant(t.id, ParticipantRef::user(2), 1)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Tournament(TournamentError::PayerMismatch { .. })
    ));
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn test_team_registration_paid_by_captain() {
    let engine = engine();
    let t = create(&engine, cup(4, 10, 0)).await;
    fund(&engine, 1, 50).await;

    let team = engine
        .register_participant(t.id, ParticipantRef::team(900), 1)
        .await
        .unwrap();
    assert_eq!(team.identity, ParticipantRef::team(900));
    assert_eq!(team.payer_id, 1);
    assert_eq!(balance(&engine, 1).await, Amount::from_major(40));

    let fee = engine
        .ledger()
        .transactions(engine.ledger().wallet_for_owner(1).await.unwrap().id, 1)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(
        fee.idempotency_key,
        Some(format!("tournament:{}:team:900:fee", t.id))
    );
}

#[tokio::test]
async fn test_withdrawal_refunds_and_frees_the_slot() {
    let engine = engine();
    let t = create(&engine, cup(2, 10, 0)).await;
    let entries = register_users(&engine, t.id, &[1, 2]).await;

    let withdrawn = engine
        .tournaments()
        .withdraw_participant(entries[0].id)
        .await
        .unwrap();
    assert_eq!(withdrawn.status, ParticipantStatus::Withdrawn);
    assert_eq!(balance(&engine, 1).await, Amount::from_major(50));
    assert_eq!(engine.tournaments().get_tournament(t.id).await.unwrap().current_participants, 1);

    // The freed slot is open to someone else
    fund(&engine, 3, 50).await;
    engine
        .register_participant(t.id, ParticipantRef::user(3), 3)
        .await
        .unwrap();

    // A second withdrawal of the same entry is refused and refunds nothing
    let err = engine
        .tournaments()
        .withdraw_participant(entries[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, TournamentError::InvalidParticipantState { .. }));
    assert_eq!(balance(&engine, 1).await, Amount::from_major(50));
}

#[tokio::test]
async fn test_check_in_required_marks_absentees() {
    let engine = engine();
    let t = create(&engine, cup(4, 0, 0).with_check_in()).await;
    let entries = register_users(&engine, t.id, &[1, 2, 3]).await;
    for entry in &entries[..2] {
        engine.tournaments().check_in(entry.id).await.unwrap();
    }

    let report = tick_at_start(&engine, t.id).await;
    assert_eq!(report.started, vec![t.id]);

    let statuses: Vec<_> = engine
        .tournaments()
        .list_participants(t.id)
        .await
        .unwrap()
        .into_iter()
        .map(|p| (p.id, p.status, p.seed))
        .collect();
    assert_eq!(statuses[0], (entries[0].id, ParticipantStatus::Active, Some(1)));
    assert_eq!(statuses[1], (entries[1].id, ParticipantStatus::Active, Some(2)));
    assert_eq!(statuses[2], (entries[2].id, ParticipantStatus::NoShow, None));
    assert_eq!(matches(&engine, t.id).await.len(), 1);
}

#[tokio::test]
async fn test_three_players_top_seed_gets_a_bye() {
    let engine = engine();
    let t = create(&engine, cup(4, 0, 0)).await;
    let entries = register_users(&engine, t.id, &[1, 2, 3]).await;

    let outcome = engine
        .tournaments()
        .begin_tournament(t.id, Utc::now())
        .await
        .unwrap();
    assert_eq!(outcome, StartOutcome::Started { matches: 3 });

    let bye = match_at(&engine, t.id, BracketSide::Winners, 1, 0).await;
    assert!(bye.is_bye());
    assert_eq!(bye.winner_id, Some(entries[0].id));

    let final_match = match_at(&engine, t.id, BracketSide::Winners, 2, 0).await;
    assert!(final_match.slot_of(entries[0].id).is_some());
    assert_eq!(final_match.status, MatchStatus::Pending);
}

#[tokio::test]
async fn test_registration_closes_at_start() {
    let engine = engine();
    let t = create(&engine, cup(4, 0, 0)).await;
    register_users(&engine, t.id, &[1, 2]).await;
    tick_at_start(&engine, t.id).await;
    fund(&engine, 3, 0).await;

    let err = engine
        .register_participant(t.id, ParticipantRef::user(3), 3)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn test_canceling_a_running_tournament_refunds_and_freezes_matches() {
    let engine = engine();
    let t = create(&engine, cup(4, 10, 0)).await;
    register_users(&engine, t.id, &[1, 2]).await;
    tick_at_start(&engine, t.id).await;

    let cancellation = engine
        .tournaments()
        .cancel_tournament(t.id, "venue unavailable", Utc::now())
        .await
        .unwrap();
    assert_eq!(cancellation.tournament.status, TournamentStatus::Canceled);
    assert_eq!(cancellation.refunds.refunded.len(), 2);
    assert!(!cancellation.tournament.refund_pending);
    assert_eq!(balance(&engine, 1).await, Amount::from_major(50));

    let m = match_at(&engine, t.id, BracketSide::Winners, 1, 0).await;
    let player = m.participant(arena_core::matches::MatchSlot::First).unwrap();
    let err = engine
        .submit_match_result(m.id, player, Scoreline::new(1, 0), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    // Canceling twice is refused
    assert!(
        engine
            .tournaments()
            .cancel_tournament(t.id, "again", Utc::now())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_unreachable_refund_keeps_tournament_pending() {
    let engine = engine();
    let t = create(&engine, cup(8, 10, 0).with_min_participants(3)).await;
    fund(&engine, 1, 10).await;
    engine
        .register_participant(t.id, ParticipantRef::user(1), 1)
        .await
        .unwrap();
    register_users(&engine, t.id, &[2]).await;

    // User 1 spent everything on the fee and closed the wallet
    let wallet = engine.ledger().wallet_for_owner(1).await.unwrap();
    engine.ledger().delete_wallet(wallet.id).await.unwrap();

    let report = tick_at_start(&engine, t.id).await;
    assert_eq!(report.canceled, vec![t.id]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].entity, Entity::Tournament);
    assert_eq!(report.failures[0].id, t.id);

    let pending = engine.tournaments().get_tournament(t.id).await.unwrap();
    assert_eq!(pending.status, TournamentStatus::Canceled);
    assert!(pending.refund_pending);
    assert_eq!(balance(&engine, 2).await, Amount::from_major(50));

    // Retrying does not refund the reachable participant twice
    let retry = engine.tournaments().resume_refunds(t.id).await.unwrap();
    assert_eq!(retry.refunds.already_refunded.len(), 1);
    assert_eq!(retry.refunds.failed.len(), 1);
    assert_eq!(balance(&engine, 2).await, Amount::from_major(50));
}

#[tokio::test]
async fn test_failed_payout_does_not_block_other_completions() {
    let engine = engine_with_tick_limit(1);
    let (undecided, _) = prize_final(&engine, [1, 2]).await;
    let (stuck, stuck_final) = prize_final(&engine, [3, 4]).await;
    let (late, late_final) = prize_final(&engine, [5, 6]).await;

    // Both finals end while no winner has a wallet, so neither prize is paid
    let stuck_winner = play(&engine, &stuck_final, Scoreline::new(2, 0)).await;
    let late_winner = play(&engine, &late_final, Scoreline::new(2, 0)).await;
    assert_eq!(status(&engine, stuck).await, TournamentStatus::Ongoing);
    assert_eq!(status(&engine, late).await, TournamentStatus::Ongoing);

    let late_payer = engine
        .tournaments()
        .get_participant(late_winner.winner_id.unwrap())
        .await
        .unwrap()
        .payer_id;
    fund(&engine, late_payer, 0).await;

    // The undecided cup takes no slot; the stuck one fails and moves back
    let first = engine.run_lifecycle_tick(Utc::now()).await;
    assert!(first.completed.is_empty());
    assert_eq!(first.failures.len(), 1);
    assert_eq!(first.failures[0].id, stuck);

    let second = engine.run_lifecycle_tick(Utc::now()).await;
    assert_eq!(second.completed, vec![late]);
    assert_eq!(balance(&engine, late_payer).await, Amount::from_major(20));

    let stuck_payer = engine
        .tournaments()
        .get_participant(stuck_winner.winner_id.unwrap())
        .await
        .unwrap()
        .payer_id;
    fund(&engine, stuck_payer, 0).await;
    let third = engine.run_lifecycle_tick(Utc::now()).await;
    assert_eq!(third.completed, vec![stuck]);
    assert_eq!(balance(&engine, stuck_payer).await, Amount::from_major(20));
    assert_eq!(status(&engine, undecided).await, TournamentStatus::Ongoing);
}

#[tokio::test]
async fn test_unrecoverable_refunds_take_turns() {
    let engine = engine_with_tick_limit(1);
    let mut canceled = Vec::new();
    for user in [1, 2] {
        let t = create(&engine, cup(4, 10, 0)).await;
        fund(&engine, user, 10).await;
        engine
            .register_participant(t.id, ParticipantRef::user(user), user)
            .await
            .unwrap();
        let wallet = engine.ledger().wallet_for_owner(user).await.unwrap();
        engine.ledger().delete_wallet(wallet.id).await.unwrap();

        let cancellation = engine
            .tournaments()
            .cancel_tournament(t.id, "sponsor pulled out", Utc::now())
            .await
            .unwrap();
        assert!(cancellation.tournament.refund_pending);
        canceled.push(t.id);
    }

    let mut visited = Vec::new();
    for _ in 0..4 {
        let report = engine.run_lifecycle_tick(Utc::now()).await;
        assert_eq!(report.failures.len(), 1);
        visited.push(report.failures[0].id);
    }
    assert_eq!(
        visited,
        vec![canceled[0], canceled[1], canceled[0], canceled[1]]
    );
}

#[tokio::test]
async fn test_invalid_tournament_request_rejected() {
    let engine = engine();
    let request = NewTournament {
        max_participants: 1,
        ..cup(4, 0, 0)
    };
    let err = engine
        .tournaments()
        .create_tournament(request, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, TournamentError::InvalidRequest(_)));
}
