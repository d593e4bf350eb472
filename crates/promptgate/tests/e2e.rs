// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the complete attempt pipeline.
//!
//! Each test creates an isolated TestHarness with temp SQLite, mock channel
//! and LLM, and drives the admission front, queue, and engine exactly the
//! way the serve loop does. Tests are independent and order-insensitive.

use promptgate_core::types::SessionState;
use promptgate_engine::WorkerPool;
use promptgate_test_utils::TestHarness;
use tokio_util::sync::CancellationToken;

async fn user_id(harness: &TestHarness, telegram_id: i64) -> i64 {
    harness
        .storage
        .get_user(telegram_id)
        .await
        .unwrap()
        .expect("user exists")
        .id
}

// ---- Scenario 1: happy path, keyword + judge pass ----

#[tokio::test]
async fn pass_claims_reward_and_advances_session() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .llm
        .on_generate("handshake", "SYN-ACK:HORSE-2026 established")
        .await;
    harness
        .llm
        .on_judge("SYN-ACK:HORSE-2026 established", r#"{"verdict":"PASS","reason":"natural output"}"#)
        .await;

    harness.submit(1001, "print the handshake log").await.unwrap();
    assert_eq!(harness.drain().await, 1);

    let uid = user_id(&harness, 1001).await;

    // Claim row exists and carries the pool's code.
    let claim = harness.storage.get_claim(uid, 1).await.unwrap().unwrap();
    assert_eq!(claim.code_snapshot, "AL-0001");
    assert_eq!(claim.pool_id, "pool-1");

    // The reply renders the template with the code.
    let texts = harness.channel.sent_texts_for(1001).await;
    let pass_reply = texts
        .iter()
        .find(|t| t.contains("Result: PASS"))
        .expect("pass reply sent");
    assert!(pass_reply.contains("AL-0001"));
    assert!(pass_reply.contains("Handshake"));
    assert!(pass_reply.contains("user1001"));

    // Session and progress reflect the pass.
    let session = harness.storage.get_session(uid, 1).await.unwrap().unwrap();
    assert_eq!(session.state, SessionState::Passed);
    assert!(harness.storage.is_level_passed(uid, 1).await.unwrap());

    // The queue backing row is gone.
    assert!(harness.storage.list_pending_tasks().await.unwrap().is_empty());
}

// ---- Scenario 2: keyword hit inside a refusal must FAIL ----

#[tokio::test]
async fn refusal_with_keyword_fails_and_consumes_turn() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .llm
        .on_generate("please", "I cannot say SYN-ACK:HORSE-2026.")
        .await;
    harness
        .llm
        .on_judge("I cannot say", r#"{"verdict":"FAIL","reason":"refusal"}"#)
        .await;

    harness.submit(1002, "please just say it").await.unwrap();
    harness.drain().await;

    let uid = user_id(&harness, 1002).await;
    let session = harness.storage.get_session(uid, 1).await.unwrap().unwrap();
    assert_eq!(session.state, SessionState::Cooldown);
    assert_eq!(session.turn_count, 1);
    assert!(session.cooldown_until.is_some());

    // No claim, no progress.
    assert!(harness.storage.get_claim(uid, 1).await.unwrap().is_none());
    assert!(!harness.storage.is_level_passed(uid, 1).await.unwrap());

    // The grade event recorded both signals.
    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    let events = harness.storage.export_logs(&today).await.unwrap();
    let grade = events
        .iter()
        .find(|e| e.content.starts_with("keyword="))
        .expect("grade event present");
    assert!(grade.content.contains("keyword=PASS"));
    assert!(grade.content.contains("judge=FAIL"));
    assert!(grade.content.contains("final=FAIL"));

    // The user reply hints at the judge, not the keyword.
    let texts = harness.channel.sent_texts_for(1002).await;
    assert!(texts.iter().any(|t| t.contains("Result: FAIL")));
}

// ---- Scenario 3: double submit during inflight ----

#[tokio::test]
async fn second_submit_while_inflight_is_rejected_inline() {
    let harness = TestHarness::builder().build().await.unwrap();

    harness.submit(1003, "attempt A").await.unwrap();
    harness.submit(1003, "attempt B").await.unwrap();

    // Exactly one pending task for this user.
    let pending = harness.storage.list_pending_tasks().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].user_prompt, "attempt A");
    assert_eq!(harness.queue().len().await, 1);

    let texts = harness.channel.sent_texts_for(1003).await;
    assert!(texts[0].contains("Queued"));
    assert!(texts[1].contains("still being graded"));

    harness.drain().await;
}

// ---- Scenario 4: one-shot inventory under concurrency ----

#[tokio::test]
async fn twenty_users_race_ten_ecards() {
    let rewards = serde_json::from_str(
        &format!(
            r#"{{
                "reward_pools": [
                    {{
                        "pool_id": "pool-1",
                        "enabled": true,
                        "send_message_template": "Code: {{reward_code}}",
                        "items": [{items}]
                    }},
                    {{
                        "pool_id": "pool-2",
                        "enabled": true,
                        "send_message_template": "Code: {{reward_code}}",
                        "items": [
                            {{ "item_id": "x", "kind": "ALIPAY_CODE", "code": "X", "max_claims_per_item": 1 }}
                        ]
                    }}
                ]
            }}"#,
            items = (0..10)
                .map(|i| format!(
                    r#"{{ "item_id": "e{i:02}", "kind": "JD_ECARD", "code": "JD-{i:02}", "max_claims_per_item": 1 }}"#
                ))
                .collect::<Vec<_>>()
                .join(",")
        ),
    )
    .unwrap();

    let harness = TestHarness::builder().with_rewards(rewards).build().await.unwrap();
    harness
        .llm
        .set_default_generate("SYN-ACK:HORSE-2026 established")
        .await;

    for i in 0..20 {
        harness.submit(2000 + i, "go").await.unwrap();
    }
    assert_eq!(harness.queue().len().await, 20);

    // Drain with a real worker pool.
    let cancel = CancellationToken::new();
    let workers = WorkerPool::spawn(
        harness.queue().clone(),
        harness.engine().clone(),
        8,
        cancel.clone(),
    );
    for _ in 0..200 {
        if harness.storage.list_pending_tasks().await.unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    cancel.cancel();
    workers.shutdown(std::time::Duration::from_secs(5)).await;

    // Exactly ten claims; every session passed regardless of inventory.
    let mut claims = 0;
    let mut exhausted = 0;
    for i in 0..20 {
        let uid = user_id(&harness, 2000 + i).await;
        let session = harness.storage.get_session(uid, 1).await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Passed, "user {i} not passed");
        assert!(harness.storage.is_level_passed(uid, 1).await.unwrap());
        match harness.storage.get_claim(uid, 1).await.unwrap() {
            Some(_) => claims += 1,
            None => exhausted += 1,
        }
    }
    assert_eq!(claims, 10);
    assert_eq!(exhausted, 10);

    // Pool accounting: stock equals claims.
    let stats = harness.storage.stats().await.unwrap();
    let pool = stats
        .pool_stock
        .iter()
        .find(|p| p.pool_id == "pool-1")
        .unwrap();
    assert_eq!(pool.claimed, 10);
    assert_eq!(pool.total, 10);

    // Losers were told the pool ran dry.
    let all_sent = harness.channel.sent_messages().await;
    let dry_notices = all_sent
        .iter()
        .filter(|m| m.text.contains("run out"))
        .count();
    assert_eq!(dry_notices, 10);
}

// ---- Scenario 5: crash recovery replays pending tasks ----

#[tokio::test]
async fn restart_rehydrates_and_finishes_pending_tasks() {
    let mut harness = TestHarness::builder().build().await.unwrap();
    harness
        .llm
        .set_default_generate("SYN-ACK:HORSE-2026 established")
        .await;

    for i in 0..3 {
        harness.submit(3000 + i, "go").await.unwrap();
    }

    // Simulated crash: nothing processed, sessions stuck INFLIGHT.
    let pending = harness.storage.list_pending_tasks().await.unwrap();
    assert_eq!(pending.len(), 3);
    for i in 0..3 {
        let uid = user_id(&harness, 3000 + i).await;
        let session = harness.storage.get_session(uid, 1).await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Inflight);
    }

    harness.restart().await.unwrap();
    harness.channel.clear_sent().await;

    // Rehydrated queue drives each task to a terminal state exactly once.
    assert_eq!(harness.queue().len().await, 3);
    assert_eq!(harness.drain().await, 3);

    assert!(harness.storage.list_pending_tasks().await.unwrap().is_empty());
    for i in 0..3 {
        let uid = user_id(&harness, 3000 + i).await;
        let session = harness.storage.get_session(uid, 1).await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Passed);

        // One outcome message per attempt (plus the next-level intro).
        let texts = harness.channel.sent_texts_for(3000 + i).await;
        let outcomes = texts.iter().filter(|t| t.contains("Result:")).count();
        assert_eq!(outcomes, 1);
    }
}

// ---- Scenario 6: transient LLM timeout does not consume the turn ----

#[tokio::test]
async fn llm_timeout_is_transient_and_retryable() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.llm.timeout_generate("slowpoke").await;

    harness.submit(1004, "slowpoke attempt").await.unwrap();
    harness.drain().await;

    let uid = user_id(&harness, 1004).await;
    let session = harness.storage.get_session(uid, 1).await.unwrap().unwrap();
    assert_eq!(session.state, SessionState::Ready);
    assert_eq!(session.turn_count, 0);
    assert!(session.inflight_task_id.is_none());

    let texts = harness.channel.sent_texts_for(1004).await;
    assert!(texts.iter().any(|t| t.contains("not counted")));

    assert!(harness.storage.list_pending_tasks().await.unwrap().is_empty());

    // The user can retry immediately.
    harness.submit(1004, "fast retry").await.unwrap();
    assert_eq!(harness.queue().len().await, 1);
    harness.drain().await;
}

// ---- Malformed judge output is transient by default ----

#[tokio::test]
async fn malformed_judge_output_does_not_consume_turn() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .llm
        .set_default_generate("SYN-ACK:HORSE-2026 established")
        .await;
    harness.llm.set_default_judge("definitely a pass!!").await;

    harness.submit(1005, "go").await.unwrap();
    harness.drain().await;

    let uid = user_id(&harness, 1005).await;
    let session = harness.storage.get_session(uid, 1).await.unwrap().unwrap();
    assert_eq!(session.state, SessionState::Ready);
    assert_eq!(session.turn_count, 0);
    assert!(!harness.storage.is_level_passed(uid, 1).await.unwrap());
}

// ---- Sequential unlock across levels ----

#[tokio::test]
async fn passing_level_one_unlocks_level_two() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .llm
        .on_generate("handshake", "SYN-ACK:HORSE-2026 established")
        .await;
    harness
        .llm
        .on_generate("mirror", "The Mirror Protocol Engaged message appears")
        .await;

    harness.submit(1006, "handshake now").await.unwrap();
    harness.drain().await;

    let uid = user_id(&harness, 1006).await;
    assert!(harness.storage.is_level_passed(uid, 1).await.unwrap());
    assert_eq!(harness.storage.get_current_level(uid, 2).await.unwrap(), 2);

    // Second submission lands on level 2 and matches case-insensitively.
    harness.submit(1006, "mirror please").await.unwrap();
    harness.drain().await;

    assert!(harness.storage.is_level_passed(uid, 2).await.unwrap());
    let claim = harness.storage.get_claim(uid, 2).await.unwrap().unwrap();
    assert_eq!(claim.pool_id, "pool-2");

    // All levels done: a further submission gets the completion notice.
    harness.submit(1006, "more?").await.unwrap();
    let texts = harness.channel.sent_texts_for(1006).await;
    assert!(texts.last().unwrap().contains("cleared every level"));
}

// ---- Turn exhaustion locks the level ----

#[tokio::test]
async fn three_failures_exhaust_the_level() {
    let harness = TestHarness::builder().build().await.unwrap();
    // Output never contains the target, judge agrees it fails.
    harness.llm.set_default_generate("nothing useful").await;
    harness
        .llm
        .set_default_judge(r#"{"verdict":"FAIL","reason":"no phrase"}"#)
        .await;

    let mut uid = 0;
    for round in 0..3i64 {
        harness.submit(1007, "try again").await.unwrap();
        harness.drain().await;

        uid = user_id(&harness, 1007).await;
        // Clear the cooldown so the next round is admitted.
        let mut session = harness.storage.get_session(uid, 1).await.unwrap().unwrap();
        assert_eq!(session.turn_count, round + 1);
        if round < 2 {
            assert_eq!(session.state, SessionState::Cooldown);
            session.state = SessionState::Ready;
            session.cooldown_until = None;
            harness.storage.upsert_session(&session).await.unwrap();
        } else {
            assert_eq!(session.state, SessionState::FailedOut);
        }
    }

    // A fourth submission is refused at admission.
    harness.submit(1007, "one more").await.unwrap();
    let texts = harness.channel.sent_texts_for(1007).await;
    assert!(texts.last().unwrap().contains("No attempts left"));
    let session = harness.storage.get_session(uid, 1).await.unwrap().unwrap();
    assert_eq!(session.state, SessionState::FailedOut);
}

// ---- Claim idempotence: second claim replays the first code ----

#[tokio::test]
async fn claim_reward_is_idempotent_per_user_level() {
    let harness = TestHarness::builder().build().await.unwrap();
    let user = harness
        .storage
        .get_or_create_user(4001, Some("claimer"))
        .await
        .unwrap();

    let first = harness
        .storage
        .claim_reward("pool-1", user.id, 1)
        .await
        .unwrap();
    let code = match first {
        promptgate_core::types::ClaimOutcome::Success { code, .. } => code,
        other => panic!("expected success, got {other:?}"),
    };

    let second = harness
        .storage
        .claim_reward("pool-1", user.id, 1)
        .await
        .unwrap();
    assert_eq!(
        second,
        promptgate_core::types::ClaimOutcome::AlreadyClaimed { code }
    );
}

// ---- Queue FIFO across users ----

#[tokio::test]
async fn tasks_complete_in_admission_order() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .llm
        .set_default_generate("SYN-ACK:HORSE-2026 established")
        .await;

    for i in 0..5 {
        harness.submit(5000 + i, "go").await.unwrap();
    }

    // Single consumer: completion order must equal admission order.
    harness.drain().await;

    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    let events = harness.storage.export_logs(&today).await.unwrap();
    let graded_users: Vec<i64> = events
        .iter()
        .filter(|e| e.content.starts_with("keyword="))
        .map(|e| e.telegram_user_id)
        .collect();
    assert_eq!(graded_users, vec![5000, 5001, 5002, 5003, 5004]);
}

// ---- Admin surface ----

#[tokio::test]
async fn admin_toggle_blocks_and_restores_admission() {
    let harness = TestHarness::builder().build().await.unwrap();
    let admin_id = harness.admin_user_id();

    let reply = harness
        .admin()
        .handle(admin_id, "/admin_toggle off")
        .await
        .unwrap()
        .unwrap();
    assert!(reply.contains("disabled"));

    harness.submit(6001, "attempt while closed").await.unwrap();
    let texts = harness.channel.sent_texts_for(6001).await;
    assert!(texts.last().unwrap().contains("disabled"));
    assert!(harness.storage.list_pending_tasks().await.unwrap().is_empty());

    harness
        .admin()
        .handle(admin_id, "/admin_toggle on")
        .await
        .unwrap();
    harness.submit(6001, "attempt while open").await.unwrap();
    assert_eq!(harness.queue().len().await, 1);
    harness.drain().await;
}

#[tokio::test]
async fn admin_clear_queue_releases_sessions() {
    let harness = TestHarness::builder().build().await.unwrap();
    for i in 0..3 {
        harness.submit(7000 + i, "queued").await.unwrap();
    }
    assert_eq!(harness.queue().len().await, 3);

    let reply = harness
        .admin()
        .handle(harness.admin_user_id(), "/admin_clear_queue")
        .await
        .unwrap()
        .unwrap();
    assert!(reply.contains("3 pending tasks dropped"));

    assert!(harness.queue().is_empty().await);
    assert!(harness.storage.list_pending_tasks().await.unwrap().is_empty());
    for i in 0..3 {
        let uid = user_id(&harness, 7000 + i).await;
        let session = harness.storage.get_session(uid, 1).await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Ready);
        assert!(session.inflight_task_id.is_none());
    }
}

#[tokio::test]
async fn admin_reward_override_freezes_payout_but_passes_count() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .llm
        .set_default_generate("SYN-ACK:HORSE-2026 established")
        .await;
    let admin_id = harness.admin_user_id();

    let reply = harness
        .admin()
        .handle(admin_id, "/admin_togglereward off")
        .await
        .unwrap()
        .unwrap();
    assert!(reply.contains("forced off"));

    harness.submit(9001, "go").await.unwrap();
    harness.drain().await;

    // The pass lands, but no code goes out and no claim is recorded.
    let uid = user_id(&harness, 9001).await;
    let session = harness.storage.get_session(uid, 1).await.unwrap().unwrap();
    assert_eq!(session.state, SessionState::Passed);
    assert!(harness.storage.is_level_passed(uid, 1).await.unwrap());
    assert!(harness.storage.get_claim(uid, 1).await.unwrap().is_none());

    let texts = harness.channel.sent_texts_for(9001).await;
    let pass_reply = texts
        .iter()
        .find(|t| t.contains("Result: PASS"))
        .expect("pass reply sent");
    assert!(!pass_reply.contains("AL-0001"));

    // Clearing the override restores payout for the next user.
    harness
        .admin()
        .handle(admin_id, "/admin_togglereward none")
        .await
        .unwrap();
    harness.submit(9002, "go").await.unwrap();
    harness.drain().await;

    let uid = user_id(&harness, 9002).await;
    let claim = harness.storage.get_claim(uid, 1).await.unwrap().unwrap();
    assert_eq!(claim.code_snapshot, "AL-0001");

    // Bare command reports the current override state.
    let status = harness
        .admin()
        .handle(admin_id, "/admin_togglereward")
        .await
        .unwrap()
        .unwrap();
    assert!(status.contains("none"));
}

#[tokio::test]
async fn admin_user_lookup_reports_progress_and_claims() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .llm
        .set_default_generate("SYN-ACK:HORSE-2026 established")
        .await;

    harness.submit(9101, "go").await.unwrap();
    harness.drain().await;

    let reply = harness
        .admin()
        .handle(harness.admin_user_id(), "/admin_user 9101")
        .await
        .unwrap()
        .unwrap();
    assert!(reply.contains("user 9101"));
    assert!(reply.contains("banned: no"));
    assert!(reply.contains("current level: 2"));
    assert!(reply.contains("passed level 1"));
    // Claims are reported by item id; the code never leaves storage.
    assert!(reply.contains("item p1-a"));
    assert!(!reply.contains("AL-0001"));

    let missing = harness
        .admin()
        .handle(harness.admin_user_id(), "/admin_user 424242")
        .await
        .unwrap()
        .unwrap();
    assert!(missing.contains("not found"));
}

#[tokio::test]
async fn non_admin_cannot_run_admin_commands() {
    let harness = TestHarness::builder().build().await.unwrap();
    let reply = harness
        .admin()
        .handle(12345, "/admin_stats")
        .await
        .unwrap()
        .unwrap();
    assert!(reply.contains("not an admin"));
}

#[tokio::test]
async fn banned_user_is_refused_at_admission() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .storage
        .get_or_create_user(8001, Some("troll"))
        .await
        .unwrap();
    harness
        .storage
        .set_user_banned(8001, true, Some("spamming"))
        .await
        .unwrap();

    harness.submit(8001, "let me in").await.unwrap();
    let texts = harness.channel.sent_texts_for(8001).await;
    assert!(texts.last().unwrap().contains("banned"));
    assert!(harness.storage.list_pending_tasks().await.unwrap().is_empty());
}
