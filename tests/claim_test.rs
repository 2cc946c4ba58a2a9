mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use validator_config::RejectionPolicy;
use validator_types::{Vote, VoteStatus, Voter, decode};
use vote_validator::claim::{
    ClaimHandler, ExponentialBackoff, ProcessResult, ValidateVoterHandler, run_claim,
};
use vote_validator::error::ClaimError;
use vote_validator::shutdown;

const PACING: Duration = Duration::from_secs(10);

fn normal_handler(
    authority: Arc<ScriptedAuthority>,
    producer: Arc<MemoryProducer>,
) -> ValidateVoterHandler {
    ValidateVoterHandler::builder(CHAIN_TOPIC, authority, producer)
        .hash_salt("test-salt")
        .build()
}

fn dead_letter_handler(
    authority: Arc<ScriptedAuthority>,
    producer: Arc<MemoryProducer>,
) -> ValidateVoterHandler {
    ValidateVoterHandler::builder(CHAIN_TOPIC, authority, producer)
        .dead_letter(PACING)
        .hash_salt("test-salt")
        .build()
}

fn chain_votes(producer: &MemoryProducer) -> Vec<Vote> {
    producer
        .to_topic(CHAIN_TOPIC)
        .iter()
        .map(|r| decode(&r.payload).unwrap())
        .collect()
}

// ============================================================================
// Normal mode
// ============================================================================

#[tokio::test]
async fn test_matching_voter_is_forwarded_unchanged() {
    let authority = Arc::new(ScriptedAuthority::always(Reply::Updated(Voter::new(
        "123", "Jane Doe",
    ))));
    let producer = Arc::new(MemoryProducer::default());
    let handler = normal_handler(authority.clone(), producer.clone());

    let (_trigger, shutdown) = shutdown::channel();
    let (session, mut claim) = MemorySession::new(vec![message(TOPIC, 0, &jane_vote())], shutdown);

    run_claim(&handler, &session, &mut claim).await.unwrap();

    let forwarded = chain_votes(&producer);
    assert_eq!(forwarded, vec![jane_vote()]);
    assert_eq!(forwarded[0].status(), VoteStatus::Unverified);
    // Partitioning key travels with the vote
    assert_eq!(
        producer.to_topic(CHAIN_TOPIC)[0].key.as_deref(),
        Some(&b"key-0"[..])
    );
    assert_eq!(session.commits(), vec![0]);
    assert_eq!(authority.calls(), 1);
}

#[tokio::test]
async fn test_name_mismatch_is_forwarded_as_failed() {
    let authority = Arc::new(ScriptedAuthority::always(Reply::Updated(Voter::new(
        "123",
        "Jane Smith",
    ))));
    let producer = Arc::new(MemoryProducer::default());
    let handler = normal_handler(authority, producer.clone());

    let (_trigger, shutdown) = shutdown::channel();
    let (session, mut claim) = MemorySession::new(vec![message(TOPIC, 0, &jane_vote())], shutdown);

    run_claim(&handler, &session, &mut claim).await.unwrap();

    let forwarded = chain_votes(&producer);
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].status(), VoteStatus::Fail);
    assert_eq!(
        forwarded[0].fail_reason.as_deref(),
        Some("fullnames don't match")
    );
    assert!(forwarded[0].is_consistent());
    assert_eq!(session.commits(), vec![0]);
}

#[tokio::test]
async fn test_not_found_is_rejected_and_never_retried() {
    let authority = Arc::new(ScriptedAuthority::always(Reply::Rejected("not found")));
    let producer = Arc::new(MemoryProducer::default());
    let handler = normal_handler(authority.clone(), producer.clone());

    let (_trigger, shutdown) = shutdown::channel();
    let (session, mut claim) = MemorySession::new(vec![message(TOPIC, 0, &jane_vote())], shutdown);

    run_claim(&handler, &session, &mut claim).await.unwrap();

    let forwarded = chain_votes(&producer);
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].status(), VoteStatus::Fail);
    assert_eq!(forwarded[0].fail_reason.as_deref(), Some("not found"));
    assert!(producer.to_topic(DEAD_TOPIC).is_empty());
    assert!(session.redeliveries().is_empty());
    assert_eq!(authority.calls(), 1);
}

#[tokio::test]
async fn test_drop_policy_commits_without_forwarding() {
    let authority = Arc::new(ScriptedAuthority::always(Reply::Rejected("not found")));
    let producer = Arc::new(MemoryProducer::default());
    let handler = ValidateVoterHandler::builder(CHAIN_TOPIC, authority, producer.clone())
        .rejection_policy(RejectionPolicy::Drop)
        .build();

    let (_trigger, shutdown) = shutdown::channel();
    let (session, mut claim) = MemorySession::new(vec![message(TOPIC, 0, &jane_vote())], shutdown);

    run_claim(&handler, &session, &mut claim).await.unwrap();

    assert!(producer.records().is_empty());
    assert_eq!(session.commits(), vec![0]);
}

#[tokio::test]
async fn test_transient_failure_moves_raw_payload_to_dead_letter() {
    let authority = Arc::new(ScriptedAuthority::always(Reply::Unavailable));
    let producer = Arc::new(MemoryProducer::default());
    let handler = normal_handler(authority, producer.clone());

    let original = message(TOPIC, 0, &jane_vote());
    let (_trigger, shutdown) = shutdown::channel();
    let (session, mut claim) = MemorySession::new(vec![original.clone()], shutdown);

    run_claim(&handler, &session, &mut claim).await.unwrap();

    let dead = producer.to_topic(DEAD_TOPIC);
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].payload, original.payload);
    assert_eq!(dead[0].key, original.key);
    assert!(producer.to_topic(CHAIN_TOPIC).is_empty());
    assert_eq!(session.commits(), vec![0]);
}

#[tokio::test]
async fn test_invalid_input_is_skipped() {
    let authority = Arc::new(ScriptedAuthority::always(Reply::InvalidInput(
        "passport format",
    )));
    let producer = Arc::new(MemoryProducer::default());
    let handler = normal_handler(authority, producer.clone());

    let (_trigger, shutdown) = shutdown::channel();
    let (session, mut claim) = MemorySession::new(vec![message(TOPIC, 0, &jane_vote())], shutdown);

    run_claim(&handler, &session, &mut claim).await.unwrap();

    assert!(producer.records().is_empty());
    assert_eq!(session.commits(), vec![0]);
}

#[tokio::test]
async fn test_malformed_records_are_skipped_before_any_lookup() {
    let authority = Arc::new(ScriptedAuthority::always(Reply::Updated(Voter::new(
        "123", "Jane Doe",
    ))));
    let producer = Arc::new(MemoryProducer::default());
    let handler = normal_handler(authority.clone(), producer.clone());

    let no_candidate = Vote::new(0, Voter::new("123", "Jane Doe"));
    let no_passport = Vote::new(7, Voter::new("", "Jane Doe"));
    let mut no_voter = jane_vote();
    no_voter.voter = None;
    let log = vec![
        raw_message(TOPIC, 0, &[0xff, 0xff, 0xff]),
        message(TOPIC, 1, &no_candidate),
        message(TOPIC, 2, &no_passport),
        message(TOPIC, 3, &no_voter),
        message(TOPIC, 4, &jane_vote()),
    ];
    let (_trigger, shutdown) = shutdown::channel();
    let (session, mut claim) = MemorySession::new(log, shutdown);

    run_claim(&handler, &session, &mut claim).await.unwrap();

    assert_eq!(session.commits(), vec![0, 1, 2, 3, 4]);
    assert_eq!(authority.calls(), 1);
    assert_eq!(chain_votes(&producer), vec![jane_vote()]);
}

#[tokio::test]
async fn test_strict_mode_halts_on_malformed_record() {
    let authority = Arc::new(ScriptedAuthority::always(Reply::Updated(Voter::new(
        "123", "Jane Doe",
    ))));
    let producer = Arc::new(MemoryProducer::default());
    let handler = ValidateVoterHandler::builder(CHAIN_TOPIC, authority.clone(), producer.clone())
        .strict_structural_validation(true)
        .build();

    let log = vec![
        message(TOPIC, 0, &jane_vote()),
        message(TOPIC, 1, &Vote::new(7, Voter::new("123", ""))),
        message(TOPIC, 2, &jane_vote()),
    ];
    let (_trigger, shutdown) = shutdown::channel();
    let (session, mut claim) = MemorySession::new(log, shutdown);

    let err = run_claim(&handler, &session, &mut claim).await.unwrap_err();
    assert!(matches!(err, ClaimError::Malformed { offset: 1, .. }));
    assert_eq!(session.commits(), vec![0]);
    assert_eq!(authority.calls(), 1);
}

#[tokio::test]
async fn test_publish_failure_ends_claim_uncommitted() {
    let authority = Arc::new(ScriptedAuthority::always(Reply::Unavailable));
    let producer = Arc::new(MemoryProducer::failing_on(DEAD_TOPIC));
    let handler = normal_handler(authority, producer.clone());

    let log = vec![message(TOPIC, 0, &jane_vote()), message(TOPIC, 1, &jane_vote())];
    let (_trigger, shutdown) = shutdown::channel();
    let (session, mut claim) = MemorySession::new(log, shutdown);

    let err = run_claim(&handler, &session, &mut claim).await.unwrap_err();
    match err {
        ClaimError::Publish { topic, .. } => assert_eq!(topic, DEAD_TOPIC),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(session.commits().is_empty());
}

#[tokio::test]
async fn test_commit_failure_ends_claim() {
    let authority = Arc::new(ScriptedAuthority::always(Reply::Updated(Voter::new(
        "123", "Jane Doe",
    ))));
    let producer = Arc::new(MemoryProducer::default());
    let handler = normal_handler(authority, producer);

    let (_trigger, shutdown) = shutdown::channel();
    let (session, mut claim) = MemorySession::new(vec![message(TOPIC, 0, &jane_vote())], shutdown);
    let session = session.failing_commits();

    let err = run_claim(&handler, &session, &mut claim).await.unwrap_err();
    assert_eq!(err.error_code(), "COMMIT_FAILED");
}

#[tokio::test]
async fn test_messages_are_processed_in_offset_order() {
    let authority = Arc::new(ScriptedAuthority::new([
        Reply::Updated(Voter::new("123", "Jane Doe")),
        Reply::Unavailable,
        Reply::Rejected("not found"),
    ]));
    let producer = Arc::new(MemoryProducer::default());
    let handler = normal_handler(authority, producer.clone());

    let log: Vec<_> = (0..3).map(|o| message(TOPIC, o, &jane_vote())).collect();
    let (_trigger, shutdown) = shutdown::channel();
    let (session, mut claim) = MemorySession::new(log, shutdown);

    run_claim(&handler, &session, &mut claim).await.unwrap();

    assert_eq!(session.commits(), vec![0, 1, 2]);
    let topics: Vec<_> = producer.records().into_iter().map(|r| r.topic).collect();
    assert_eq!(topics, vec![CHAIN_TOPIC, DEAD_TOPIC, CHAIN_TOPIC]);
}

#[tokio::test]
async fn test_reprocessing_yields_same_result() {
    let mut outputs = Vec::new();
    for _ in 0..2 {
        let authority = Arc::new(ScriptedAuthority::always(Reply::Updated(Voter::new(
            "123",
            "Jane Smith",
        ))));
        let producer = Arc::new(MemoryProducer::default());
        let handler = normal_handler(authority, producer.clone());

        let (_trigger, shutdown) = shutdown::channel();
        let (session, mut claim) =
            MemorySession::new(vec![message(TOPIC, 0, &jane_vote())], shutdown);
        run_claim(&handler, &session, &mut claim).await.unwrap();
        outputs.push(producer.records());
    }
    assert_eq!(outputs[0], outputs[1]);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_shutdown_during_lookup_commits_nothing() {
    let authority = Arc::new(ScriptedAuthority::always(Reply::Hang));
    let producer = Arc::new(MemoryProducer::default());
    let handler = Arc::new(normal_handler(authority.clone(), producer.clone()));

    let (trigger, shutdown) = shutdown::channel();
    let (session, mut claim) = MemorySession::new(vec![message(TOPIC, 0, &jane_vote())], shutdown);
    let session = Arc::new(session);

    let task = tokio::spawn({
        let handler = handler.clone();
        let session = session.clone();
        async move { handler.consume_claim(&*session, &mut claim).await }
    });

    while authority.calls() == 0 {
        tokio::task::yield_now().await;
    }
    trigger.trigger();

    task.await.unwrap().unwrap();
    assert!(session.commits().is_empty());
    assert!(producer.records().is_empty());
}

#[tokio::test]
async fn test_shutdown_before_claiming_processes_nothing() {
    let authority = Arc::new(ScriptedAuthority::always(Reply::Updated(Voter::new(
        "123", "Jane Doe",
    ))));
    let producer = Arc::new(MemoryProducer::default());
    let handler = normal_handler(authority.clone(), producer);

    let (trigger, shutdown) = shutdown::channel();
    trigger.trigger();
    let (session, mut claim) = MemorySession::new(vec![message(TOPIC, 0, &jane_vote())], shutdown);

    handler.consume_claim(&session, &mut claim).await.unwrap();
    assert_eq!(authority.calls(), 0);
    assert!(session.commits().is_empty());
}

// ============================================================================
// Dead-letter mode
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_dead_letter_mode_blocks_then_forwards() {
    let authority = Arc::new(ScriptedAuthority::new([
        Reply::Unavailable,
        Reply::Updated(Voter::new("123", "Jane Doe")),
    ]));
    let producer = Arc::new(MemoryProducer::default());
    let handler = dead_letter_handler(authority.clone(), producer.clone());

    let log = vec![message(DEAD_TOPIC, 0, &jane_vote()), message(DEAD_TOPIC, 1, &jane_vote())];
    let (_trigger, shutdown) = shutdown::channel();
    let (session, mut claim) = MemorySession::new(log, shutdown);

    let started = tokio::time::Instant::now();
    run_claim(&handler, &session, &mut claim).await.unwrap();

    assert_eq!(session.redeliveries(), vec![0]);
    // Stale copy of offset 1 buffered before the rewind is not processed
    assert_eq!(session.commits(), vec![0, 1]);
    assert_eq!(authority.calls(), 3);
    assert_eq!(chain_votes(&producer).len(), 2);
    // Never escalates further
    assert!(producer.to_topic("votes.dead.dead").is_empty());
    // One retry delay plus pacing after each of the two commits
    assert!(started.elapsed() >= PACING * 3);
}

#[tokio::test(start_paused = true)]
async fn test_rewind_to_expired_record_resumes_at_next_offset() {
    let authority = Arc::new(ScriptedAuthority::new([
        Reply::Unavailable,
        Reply::Updated(Voter::new("123", "Jane Doe")),
    ]));
    let producer = Arc::new(MemoryProducer::default());
    let handler = dead_letter_handler(authority.clone(), producer.clone());

    let log: Vec<_> = (0..3).map(|o| message(DEAD_TOPIC, o, &jane_vote())).collect();
    let (_trigger, shutdown) = shutdown::channel();
    let (session, mut claim) = MemorySession::new(log, shutdown);
    let session = session.expiring_head();

    let finished = tokio::time::timeout(
        Duration::from_secs(3600),
        run_claim(&handler, &session, &mut claim),
    )
    .await;

    assert!(finished.is_ok(), "claim stalled waiting for offset 0");
    finished.unwrap().unwrap();
    assert_eq!(session.redeliveries(), vec![0]);
    // The copies of 1 and 2 buffered before the rewind are dropped, the replayed ones are not
    assert_eq!(session.commits(), vec![1, 2]);
    assert_eq!(authority.calls(), 3);
    assert_eq!(chain_votes(&producer).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_dead_letter_mode_paces_every_commit() {
    let authority = Arc::new(ScriptedAuthority::always(Reply::Rejected("not found")));
    let producer = Arc::new(MemoryProducer::default());
    let handler = dead_letter_handler(authority, producer.clone());

    let log: Vec<_> = (0..3).map(|o| message(DEAD_TOPIC, o, &jane_vote())).collect();
    let (_trigger, shutdown) = shutdown::channel();
    let (session, mut claim) = MemorySession::new(log, shutdown);

    let started = tokio::time::Instant::now();
    run_claim(&handler, &session, &mut claim).await.unwrap();

    assert_eq!(session.commits(), vec![0, 1, 2]);
    assert!(session.redeliveries().is_empty());
    assert!(started.elapsed() >= PACING * 3);
}

#[tokio::test(start_paused = true)]
async fn test_dead_letter_mode_uses_configured_backoff() {
    let authority = Arc::new(ScriptedAuthority::new([
        Reply::Unavailable,
        Reply::Unavailable,
        Reply::Updated(Voter::new("123", "Jane Doe")),
    ]));
    let producer = Arc::new(MemoryProducer::default());
    let handler = ValidateVoterHandler::builder(CHAIN_TOPIC, authority.clone(), producer)
        .backoff(Arc::new(ExponentialBackoff::new(
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(60),
        )))
        .dead_letter(PACING)
        .build();

    let (_trigger, shutdown) = shutdown::channel();
    let (session, mut claim) =
        MemorySession::new(vec![message(DEAD_TOPIC, 0, &jane_vote())], shutdown);

    let started = tokio::time::Instant::now();
    run_claim(&handler, &session, &mut claim).await.unwrap();

    assert_eq!(session.redeliveries(), vec![0, 0]);
    assert_eq!(session.commits(), vec![0]);
    // 2s + 4s of retry delay, then 1s pacing
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(7));
    assert!(elapsed < PACING);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_retry_wait() {
    let authority = Arc::new(ScriptedAuthority::always(Reply::Unavailable));
    let producer = Arc::new(MemoryProducer::default());
    let handler = Arc::new(dead_letter_handler(authority.clone(), producer));

    let (trigger, shutdown) = shutdown::channel();
    let (session, mut claim) =
        MemorySession::new(vec![message(DEAD_TOPIC, 0, &jane_vote())], shutdown);
    let session = Arc::new(session);

    let task = tokio::spawn({
        let handler = handler.clone();
        let session = session.clone();
        async move { handler.consume_claim(&*session, &mut claim).await }
    });

    tokio::time::sleep(PACING * 5).await;
    trigger.trigger();
    task.await.unwrap().unwrap();

    assert!(session.commits().is_empty());
    assert!(authority.calls() >= 1);
}

#[tokio::test]
async fn test_process_message_does_not_commit() {
    let authority = Arc::new(ScriptedAuthority::always(Reply::Unavailable));
    let producer = Arc::new(MemoryProducer::default());
    let handler = dead_letter_handler(authority, producer.clone());

    let original = message(DEAD_TOPIC, 0, &jane_vote());
    let (_trigger, shutdown) = shutdown::channel();
    let (session, _claim) = MemorySession::new(vec![original.clone()], shutdown);

    let result = handler.process_message(&session, &original).await.unwrap();
    assert_eq!(result, ProcessResult::Redeliver);
    assert!(session.commits().is_empty());
    assert!(producer.records().is_empty());
}
