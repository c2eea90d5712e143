mod common;

use std::time::Duration as StdDuration;

use chrono::Duration;
use classroom_quiz::{
    error::SessionError,
    store::Table,
    sync::{FeedMode, Phase, ViewUpdate},
};
use common::{drain, harness, wait_for, SESSION_CODE};

#[tokio::test]
async fn countdown_follows_the_shared_start_stamp() {
    let h = harness().await;
    let session_id = h.create_session().await;
    h.ctx.lifecycle.advance_to_started(&session_id).await.unwrap();
    h.ctx.lifecycle.push_question(&session_id, 0).await.unwrap();

    // The student shows up ten seconds into a thirty second question.
    h.clock.advance(Duration::seconds(10));
    let (mut engine, mut updates) = h.engine();
    engine.initialize(&session_id).await.unwrap();

    let remaining = engine.snapshot().unwrap().remaining.unwrap();
    assert!((19..=20).contains(&remaining), "remaining was {}", remaining);
    assert_eq!(engine.time_taken(), Some(10.0));

    h.clock.advance(Duration::seconds(10));
    wait_for(&mut updates, |update| matches!(update, ViewUpdate::Tick { remaining: 10 })).await;

    // Twenty seconds after joining, thirty after the push.
    h.clock.advance(Duration::seconds(10));
    wait_for(&mut updates, |update| matches!(update, ViewUpdate::Tick { remaining: 0 })).await;
    wait_for(&mut updates, |update| {
        matches!(update, ViewUpdate::TimeUp { question_index: 0 })
    })
    .await;
    assert_eq!(engine.snapshot().unwrap().remaining, Some(0));

    engine.cleanup().await;
}

#[tokio::test]
async fn time_up_fires_once_per_push() {
    let h = harness().await;
    let session_id = h.create_session().await;
    h.ctx.lifecycle.advance_to_started(&session_id).await.unwrap();
    h.ctx.lifecycle.push_question(&session_id, 0).await.unwrap();

    let (mut engine, mut updates) = h.engine();
    engine.initialize(&session_id).await.unwrap();
    h.clock.advance(Duration::seconds(31));

    wait_for(&mut updates, |update| {
        matches!(update, ViewUpdate::TimeUp { question_index: 0 })
    })
    .await;
    tokio::time::sleep(StdDuration::from_millis(300)).await;
    assert!(!drain(&mut updates)
        .iter()
        .any(|update| matches!(update, ViewUpdate::TimeUp { .. })));

    // Pushing the same question again starts a new countdown.
    h.ctx.lifecycle.push_question(&session_id, 0).await.unwrap();
    let changed = wait_for(&mut updates, |update| matches!(update, ViewUpdate::QuestionChanged { .. })).await;
    assert_eq!(
        changed,
        ViewUpdate::QuestionChanged {
            index: 0,
            remaining: Some(30)
        }
    );

    engine.cleanup().await;
}

#[tokio::test]
async fn going_back_restores_the_answers_already_given() {
    let h = harness().await;
    let session_id = h.create_session().await;
    let mia = h.ctx.registry.join(SESSION_CODE, "Mia").await.unwrap();
    let noah = h.ctx.registry.join(SESSION_CODE, "Noah").await.unwrap();
    h.ctx.lifecycle.advance_to_started(&session_id).await.unwrap();
    h.ctx.cursor.advance(&session_id, &h.quiz).await.unwrap();

    let (mut engine, mut updates) = h.engine();
    engine.initialize(&session_id).await.unwrap();
    let first = &h.quiz.questions[0].id;
    h.ctx.answers.submit(&session_id, &mia.id, first, "Stockholm", 3.0).await;
    h.ctx.answers.submit(&session_id, &noah.id, first, "Oslo", 4.0).await;
    wait_for(&mut updates, |update| {
        matches!(update, ViewUpdate::TallyChanged(tally) if tally.total_answers == 2)
    })
    .await;

    h.clock.advance(Duration::seconds(10));
    h.ctx.cursor.advance(&session_id, &h.quiz).await.unwrap();
    wait_for(&mut updates, |update| {
        matches!(update, ViewUpdate::QuestionChanged { index: 1, .. })
    })
    .await;
    assert!(engine.view().unwrap().answers().is_empty());

    h.clock.advance(Duration::seconds(10));
    h.ctx.cursor.retreat(&session_id).await.unwrap();
    wait_for(&mut updates, |update| {
        matches!(update, ViewUpdate::QuestionChanged { index: 0, .. })
    })
    .await;
    let restored = wait_for(&mut updates, |update| matches!(update, ViewUpdate::TallyChanged(_))).await;
    match restored {
        ViewUpdate::TallyChanged(tally) => {
            assert_eq!(tally.total_answers, 2);
            assert_eq!(tally.counts.get("Stockholm"), Some(&1));
            assert_eq!(tally.counts.get("Oslo"), Some(&1));
        }
        other => panic!("unexpected update {:?}", other),
    }
    assert_eq!(engine.view().unwrap().answers().len(), 2);

    engine.cleanup().await;
}

#[tokio::test]
async fn roster_ignores_repeated_rows() {
    let h = harness().await;
    let session_id = h.create_session().await;
    let (mut engine, mut updates) = h.engine();
    engine.initialize(&session_id).await.unwrap();

    let mia = h.ctx.registry.join(SESSION_CODE, "Mia").await.unwrap();
    h.ctx.registry.leave(&mia.id).await.unwrap();
    h.ctx.registry.reconnect(&mia.id).await.unwrap();
    h.ctx.registry.reconnect(&mia.id).await.unwrap();
    h.clock.advance(Duration::seconds(1));
    h.ctx.registry.join(SESSION_CODE, "Noah").await.unwrap();

    wait_for(&mut updates, |update| {
        matches!(update, ViewUpdate::RosterChanged(roster) if roster.len() == 2)
    })
    .await;
    let names: Vec<String> = engine
        .view()
        .unwrap()
        .roster()
        .iter()
        .map(|participant| participant.participant_name.clone())
        .collect();
    assert_eq!(names, vec!["Mia", "Noah"]);

    engine.cleanup().await;
}

#[tokio::test]
async fn cleanup_releases_every_subscription() {
    let h = harness().await;
    let session_id = h.create_session().await;
    let (mut engine, _updates) = h.engine();

    engine.initialize(&session_id).await.unwrap();
    assert_eq!(h.store.feed().subscriber_count(), 3);
    assert!(engine.is_connected());

    engine.cleanup().await;
    engine.cleanup().await;

    assert_eq!(h.store.feed().subscriber_count(), 0);
    assert!(!engine.is_connected());
    assert!(engine.view().is_none());
}

#[tokio::test]
async fn initializing_twice_keeps_one_set_of_feeds() {
    let h = harness().await;
    let session_id = h.create_session().await;
    let (mut engine, _updates) = h.engine();

    engine.initialize(&session_id).await.unwrap();
    engine.initialize(&session_id).await.unwrap();

    assert_eq!(h.store.feed().subscriber_count(), 3);
    assert_eq!(engine.session_id(), Some(session_id.as_str()));
    engine.cleanup().await;
}

#[tokio::test]
async fn switching_sessions_drops_the_old_feeds() {
    let h = harness().await;
    let first = h.create_session().await;
    let (mut engine, _updates) = h.engine();
    engine.initialize(&first).await.unwrap();

    // Ending frees the code for the next session.
    h.ctx.lifecycle.end_session(&first).await.unwrap();
    let second = h.create_session().await;
    engine.initialize(&second).await.unwrap();

    assert_eq!(engine.session_id(), Some(second.as_str()));
    assert_eq!(h.store.feed().subscriber_count(), 3);
    assert_eq!(engine.view().unwrap().phase(), Phase::Lobby);
    engine.cleanup().await;
}

#[tokio::test]
async fn unknown_sessions_leave_nothing_behind() {
    let h = harness().await;
    let (mut engine, _updates) = h.engine();

    let result = engine.initialize("no-such-session").await;

    assert!(matches!(result, Err(SessionError::SessionNotFound)));
    assert_eq!(h.store.feed().subscriber_count(), 0);
    assert!(!engine.is_connected());
}

#[tokio::test]
async fn lost_feeds_fall_back_to_polling() {
    let h = harness().await;
    let session_id = h.create_session().await;
    let (mut engine, mut updates) = h.engine();
    engine.initialize(&session_id).await.unwrap();

    h.store.feed().close_all();
    h.ctx.registry.join(SESSION_CODE, "Noah").await.unwrap();

    wait_for(&mut updates, |update| {
        matches!(update, ViewUpdate::RosterChanged(roster) if roster.len() == 1)
    })
    .await;
    assert!(engine
        .active_feeds()
        .contains(&(Table::Participants, FeedMode::Fallback)));
    assert_eq!(engine.view().unwrap().roster().len(), 1);

    engine.cleanup().await;
}
