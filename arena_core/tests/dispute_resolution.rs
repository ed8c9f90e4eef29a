//! Integration tests for dispute tickets and moderator verdicts.

mod common;

use arena_core::dispute::{DisputeError, DisputeStatus, Verdict};
use arena_core::matches::{BracketSide, MatchSlot, MatchStatus, Scoreline, SlotState};
use arena_core::tournament::{ParticipantStatus, TournamentId, TournamentStatus};
use arena_core::{Engine, EngineError, ErrorKind};
use chrono::{Duration, Utc};
use common::*;

const MODERATOR: i64 = 500;

/// Four-player cup whose first semifinal carries conflicting reports
async fn disputed_semifinal(engine: &Engine) -> (TournamentId, arena_core::matches::Match) {
    let t = create(engine, cup(4, 0, 0)).await;
    register_users(engine, t.id, &[1, 2, 3, 4]).await;
    tick_at_start(engine, t.id).await;
    let semi = match_at(engine, t.id, BracketSide::Winners, 1, 0).await;
    let first = semi.participant(MatchSlot::First).unwrap();
    let second = semi.participant(MatchSlot::Second).unwrap();

    engine
        .submit_match_result(semi.id, first, Scoreline::new(3, 1), None)
        .await
        .unwrap();
    let disputed = engine
        .submit_match_result(semi.id, second, Scoreline::new(1, 4), None)
        .await
        .unwrap();
    assert_eq!(disputed.status, MatchStatus::Disputed);
    (t.id, disputed)
}

async fn only_ticket(engine: &Engine, match_id: i64) -> arena_core::dispute::DisputeTicket {
    let mut tickets = engine.disputes().tickets_for_match(match_id).await.unwrap();
    assert_eq!(tickets.len(), 1);
    tickets.remove(0)
}

#[tokio::test]
async fn test_win_verdict_resolves_with_agreeing_score() {
    let engine = engine();
    let (tid, semi) = disputed_semifinal(&engine).await;
    let ticket = only_ticket(&engine, semi.id).await;

    let outcome = engine
        .resolve_dispute(ticket.id, MODERATOR, Verdict::Participant2Wins, "video shows 4-1")
        .await
        .unwrap();
    let second = semi.participant(MatchSlot::Second).unwrap();
    assert_eq!(outcome.status, MatchStatus::Resolved);
    assert_eq!(outcome.winner_id, Some(second));
    assert_eq!(outcome.score, Some(Scoreline::new(1, 4)));

    let final_match = match_at(&engine, tid, BracketSide::Winners, 2, 0).await;
    assert_eq!(final_match.slot1, SlotState::Filled(second));

    let closed = engine.disputes().get_ticket(ticket.id).await.unwrap();
    assert_eq!(closed.status, DisputeStatus::ResolvedParticipant2Win);
    assert_eq!(closed.verdict, Some(Verdict::Participant2Wins));
    assert_eq!(closed.moderator_id, Some(MODERATOR));
    assert_eq!(closed.resolution.as_deref(), Some("video shows 4-1"));
    assert!(closed.resolved_at.is_some());

    let err = engine
        .resolve_dispute(ticket.id, MODERATOR, Verdict::Participant1Wins, "again")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Dispute(DisputeError::AlreadyResolved { .. })));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_void_semifinal_hands_the_title_over() {
    let engine = engine();
    let (tid, semi) = disputed_semifinal(&engine).await;
    let ticket = only_ticket(&engine, semi.id).await;

    let voided = engine
        .resolve_dispute(ticket.id, MODERATOR, Verdict::Void, "both cheated")
        .await
        .unwrap();
    assert_eq!(voided.status, MatchStatus::Resolved);
    assert!(voided.winner_id.is_none());

    let other = match_at(&engine, tid, BracketSide::Winners, 1, 1).await;
    let winner = other.participant(MatchSlot::First).unwrap();
    play(&engine, &other, Scoreline::new(2, 1)).await;

    let final_match = match_at(&engine, tid, BracketSide::Winners, 2, 0).await;
    assert_eq!(final_match.slot1, SlotState::Vacant);
    assert_eq!(final_match.status, MatchStatus::Confirmed);
    assert_eq!(final_match.winner_id, Some(winner));

    let t = engine.tournaments().get_tournament(tid).await.unwrap();
    assert_eq!(t.status, TournamentStatus::Completed);
    assert_eq!(
        engine.tournaments().get_participant(winner).await.unwrap().status,
        ParticipantStatus::Champion
    );
}

#[tokio::test]
async fn test_replay_reopens_the_match() {
    let engine = engine();
    let (_, semi) = disputed_semifinal(&engine).await;
    let ticket = only_ticket(&engine, semi.id).await;

    let reset = engine
        .resolve_dispute(ticket.id, MODERATOR, Verdict::Replay, "play it again")
        .await
        .unwrap();
    assert_eq!(reset.status, MatchStatus::Scheduled);
    assert!(reset.report1.is_none());
    assert!(reset.report2.is_none());
    assert!(reset.winner_id.is_none());
    assert_eq!(
        engine.disputes().get_ticket(ticket.id).await.unwrap().status,
        DisputeStatus::ResolvedReplay
    );

    let replayed = play(&engine, &reset, Scoreline::new(2, 0)).await;
    assert_eq!(replayed.status, MatchStatus::Confirmed);
    assert_eq!(replayed.winner_id, semi.participant(MatchSlot::First));
}

#[tokio::test]
async fn test_awaiting_match_can_be_contested_once() {
    let engine = engine();
    let t = create(&engine, cup(2, 0, 0)).await;
    let entries = register_users(&engine, t.id, &[1, 2]).await;
    tick_at_start(&engine, t.id).await;
    let m = match_at(&engine, t.id, BracketSide::Winners, 1, 0).await;
    engine
        .submit_match_result(m.id, entries[0].id, win_for(&m, entries[0].id), None)
        .await
        .unwrap();

    let ticket = engine
        .open_dispute(m.id, entries[1].id, "  score was reversed  ")
        .await
        .unwrap();
    assert_eq!(ticket.status, DisputeStatus::Open);
    assert_eq!(ticket.reason, "score was reversed");
    assert_eq!(
        engine.matches().get_match(m.id).await.unwrap().status,
        MatchStatus::Disputed
    );

    let err = engine
        .open_dispute(m.id, entries[0].id, "me too")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let err = engine
        .disputes()
        .dismiss_dispute(ticket.id, MODERATOR, "nothing to see", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, DisputeError::VerdictRequired(_)));

    let reviewing = engine.disputes().begin_review(ticket.id, MODERATOR).await.unwrap();
    assert_eq!(reviewing.status, DisputeStatus::UnderReview);
    let err = engine
        .disputes()
        .begin_review(ticket.id, MODERATOR)
        .await
        .unwrap_err();
    assert!(matches!(err, DisputeError::InvalidTicketState { .. }));

    let outcome = engine
        .resolve_dispute(ticket.id, MODERATOR, Verdict::Participant1Wins, "reporter was right")
        .await
        .unwrap();
    assert_eq!(outcome.status, MatchStatus::Resolved);
    assert_eq!(
        engine.tournaments().get_tournament(t.id).await.unwrap().status,
        TournamentStatus::Completed
    );
}

#[tokio::test]
async fn test_confirmed_result_disputed_within_window() {
    let engine = engine();
    let t = create(&engine, cup(4, 0, 0)).await;
    register_users(&engine, t.id, &[1, 2, 3, 4]).await;
    tick_at_start(&engine, t.id).await;
    let semi = match_at(&engine, t.id, BracketSide::Winners, 1, 0).await;
    let first = semi.participant(MatchSlot::First).unwrap();
    let second = semi.participant(MatchSlot::Second).unwrap();
    play(&engine, &semi, Scoreline::new(2, 0)).await;

    let late = engine
        .disputes()
        .open_dispute(semi.id, second, "too late", Utc::now() + Duration::hours(49))
        .await
        .unwrap_err();
    assert!(matches!(late, DisputeError::WindowClosed(_)));

    let ticket = engine
        .open_dispute(semi.id, second, "opponent used a banned item")
        .await
        .unwrap();
    // A confirmed result stands until a verdict
    let still = engine.matches().get_match(semi.id).await.unwrap();
    assert_eq!(still.status, MatchStatus::Confirmed);
    assert_eq!(still.winner_id, Some(first));

    let overturned = engine
        .resolve_dispute(ticket.id, MODERATOR, Verdict::Participant2Wins, "ban confirmed")
        .await
        .unwrap();
    assert_eq!(overturned.winner_id, Some(second));
    // No report favoured the second slot
    assert_eq!(overturned.score, None);

    let final_match = match_at(&engine, t.id, BracketSide::Winners, 2, 0).await;
    assert_eq!(final_match.slot1, SlotState::Filled(second));
}

#[tokio::test]
async fn test_dismissal_leaves_confirmed_match_alone() {
    let engine = engine();
    let t = create(&engine, cup(4, 0, 0)).await;
    register_users(&engine, t.id, &[1, 2, 3, 4]).await;
    tick_at_start(&engine, t.id).await;
    let semi = match_at(&engine, t.id, BracketSide::Winners, 1, 0).await;
    let confirmed = play(&engine, &semi, Scoreline::new(0, 2)).await;
    let reporter = semi.participant(MatchSlot::First).unwrap();

    let ticket = engine.open_dispute(semi.id, reporter, "lag").await.unwrap();
    let closed = engine
        .disputes()
        .dismiss_dispute(ticket.id, MODERATOR, "lag is not grounds", Utc::now())
        .await
        .unwrap();
    assert_eq!(closed.status, DisputeStatus::Closed);
    assert!(closed.verdict.is_none());

    let after = engine.matches().get_match(semi.id).await.unwrap();
    assert_eq!(after.winner_id, confirmed.winner_id);
    assert_eq!(after.status, MatchStatus::Confirmed);

    // A closed ticket frees the match for a new one
    let again = engine.open_dispute(semi.id, reporter, "new evidence").await.unwrap();
    assert_ne!(again.id, ticket.id);
}

#[tokio::test]
async fn test_open_ticket_holds_completion_until_closed() {
    let engine = engine();
    let t = create(&engine, cup(4, 0, 0)).await;
    register_users(&engine, t.id, &[1, 2, 3, 4]).await;
    tick_at_start(&engine, t.id).await;
    let semi = match_at(&engine, t.id, BracketSide::Winners, 1, 0).await;
    play(&engine, &semi, Scoreline::new(2, 1)).await;
    let reporter = semi.participant(MatchSlot::Second).unwrap();
    let ticket = engine.open_dispute(semi.id, reporter, "smurf account").await.unwrap();

    let other = match_at(&engine, t.id, BracketSide::Winners, 1, 1).await;
    play(&engine, &other, Scoreline::new(2, 0)).await;
    let final_match = match_at(&engine, t.id, BracketSide::Winners, 2, 0).await;
    let final_match = play(&engine, &final_match, Scoreline::new(2, 0)).await;
    assert_eq!(final_match.status, MatchStatus::Confirmed);

    let waiting = engine.tournaments().get_tournament(t.id).await.unwrap();
    assert_eq!(waiting.status, TournamentStatus::Ongoing);
    let report = engine.run_lifecycle_tick(Utc::now()).await;
    assert!(report.completed.is_empty());
    assert!(report.failures.is_empty());

    engine
        .disputes()
        .dismiss_dispute(ticket.id, MODERATOR, "account verified", Utc::now())
        .await
        .unwrap();
    let report = engine.run_lifecycle_tick(Utc::now()).await;
    assert_eq!(report.completed, vec![t.id]);
    let finished = engine.tournaments().get_tournament(t.id).await.unwrap();
    assert_eq!(finished.status, TournamentStatus::Completed);
}

#[tokio::test]
async fn test_invalid_dispute_requests() {
    let engine = engine();
    let t = create(&engine, cup(4, 0, 0)).await;
    let entries = register_users(&engine, t.id, &[1, 2, 3]).await;
    tick_at_start(&engine, t.id).await;

    // Top seed got a bye in the first semifinal
    let bye = match_at(&engine, t.id, BracketSide::Winners, 1, 0).await;
    assert!(bye.is_bye());
    let err = engine.open_dispute(bye.id, entries[0].id, "where is my opponent").await.unwrap_err();
    assert!(matches!(err, EngineError::Dispute(DisputeError::ByeMatch(_))));

    let err = engine.open_dispute(bye.id, entries[0].id, "   ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let semi = match_at(&engine, t.id, BracketSide::Winners, 1, 1).await;
    let err = engine.open_dispute(semi.id, entries[0].id, "not my match").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    // Scheduled and pending matches have no result to contest
    let reporter = semi.participant(MatchSlot::First).unwrap();
    let err = engine.open_dispute(semi.id, reporter, "early").await.unwrap_err();
    assert!(matches!(err, EngineError::Dispute(DisputeError::NotDisputable { .. })));

    let final_match = match_at(&engine, t.id, BracketSide::Winners, 2, 0).await;
    assert_eq!(final_match.status, MatchStatus::Pending);
    let err = engine
        .open_dispute(final_match.id, entries[0].id, "early")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let err = engine
        .resolve_dispute(404, MODERATOR, Verdict::Void, "missing")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
