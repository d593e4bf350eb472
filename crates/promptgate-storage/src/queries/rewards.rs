// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reward item sync and the atomic claim protocol.
//!
//! The claim protocol guarantees, inside a single transaction:
//! - `claimed_count <= max_claims` for every item at all times (the
//!   conditional UPDATE is the compare-and-set backbone);
//! - at most one claim per (user_id, level_id), enforced both by a
//!   precondition check and the unique index;
//! - deterministic candidate order (JD_ECARD first to drain one-shot
//!   inventory, then item_id ascending).

use std::str::FromStr;

use promptgate_core::traits::storage::RewardPoolSync;
use promptgate_core::types::{ClaimOutcome, RewardClaim, RewardKind};
use promptgate_core::PromptgateError;
use rusqlite::params;

use crate::database::{map_tr_err, now_rfc3339, Database};

/// How many times a compare-and-set miss triggers re-selection before the
/// pool is reported exhausted.
const CLAIM_CAS_RETRIES: usize = 3;

/// Upsert items from config, preserving `claimed_count`, then disable any
/// stored item missing from the new config.
pub async fn sync_reward_items(
    db: &Database,
    pools: &[RewardPoolSync],
) -> Result<(), PromptgateError> {
    let pools = pools.to_vec();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let now = now_rfc3339();

            let mut seen: Vec<String> = Vec::new();
            for pool in &pools {
                for item in &pool.items {
                    tx.execute(
                        "INSERT INTO reward_items
                           (pool_id, item_id, kind, code, max_claims, claimed_count, enabled, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, 0, 1, ?6, ?6)
                         ON CONFLICT(item_id) DO UPDATE SET
                           pool_id = excluded.pool_id,
                           kind = excluded.kind,
                           code = excluded.code,
                           max_claims = excluded.max_claims,
                           enabled = 1,
                           updated_at = excluded.updated_at",
                        params![
                            pool.pool_id,
                            item.item_id,
                            item.kind.to_string(),
                            item.code,
                            item.max_claims,
                            now,
                        ],
                    )?;
                    seen.push(item.item_id.clone());
                }
            }

            // Items dropped from config are disabled, never deleted, so
            // historical claims stay auditable.
            if seen.is_empty() {
                tx.execute(
                    "UPDATE reward_items SET enabled = 0, updated_at = ?1",
                    params![now],
                )?;
            } else {
                let placeholders = vec!["?"; seen.len()].join(",");
                let sql = format!(
                    "UPDATE reward_items SET enabled = 0, updated_at = ? WHERE item_id NOT IN ({placeholders})"
                );
                let mut args: Vec<&dyn rusqlite::ToSql> = vec![&now];
                for id in &seen {
                    args.push(id);
                }
                tx.execute(&sql, args.as_slice())?;
            }

            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// The claim protocol body, run inside an already-open transaction.
///
/// Does NOT insert the level-progress row; callers decide that (the engine
/// marks a level passed even when the pool is exhausted).
pub(crate) fn claim_reward_tx(
    conn: &rusqlite::Connection,
    pool_id: &str,
    user_id: i64,
    level_id: i64,
    now: &str,
) -> Result<ClaimOutcome, rusqlite::Error> {
    // Precondition: one award per (user, level).
    let existing: Result<String, rusqlite::Error> = conn.query_row(
        "SELECT code_snapshot FROM reward_claims WHERE user_id = ?1 AND level_id = ?2",
        params![user_id, level_id],
        |row| row.get(0),
    );
    match existing {
        Ok(code) => return Ok(ClaimOutcome::AlreadyClaimed { code }),
        Err(rusqlite::Error::QueryReturnedNoRows) => {}
        Err(e) => return Err(e),
    }

    for _ in 0..CLAIM_CAS_RETRIES {
        // Deterministic candidate order keeps tests reproducible and
        // drains one-shot JD_ECARD inventory before shared codes.
        let candidate: Result<(String, String, String), rusqlite::Error> = conn.query_row(
            "SELECT item_id, code, kind FROM reward_items
             WHERE pool_id = ?1 AND enabled = 1 AND claimed_count < max_claims
             ORDER BY CASE kind WHEN 'JD_ECARD' THEN 0 ELSE 1 END, item_id ASC
             LIMIT 1",
            params![pool_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        );

        let (item_id, code, kind_raw) = match candidate {
            Ok(found) => found,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(ClaimOutcome::PoolExhausted),
            Err(e) => return Err(e),
        };

        // Compare-and-set: the WHERE clause re-checks headroom so the
        // counter can never exceed max_claims regardless of interleaving.
        let updated = conn.execute(
            "UPDATE reward_items
             SET claimed_count = claimed_count + 1, updated_at = ?1
             WHERE item_id = ?2 AND claimed_count < max_claims",
            params![now, item_id],
        )?;
        if updated == 0 {
            continue;
        }

        conn.execute(
            "INSERT INTO reward_claims (user_id, level_id, pool_id, item_id, code_snapshot, claimed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![user_id, level_id, pool_id, item_id, code, now],
        )?;

        let kind = RewardKind::from_str(&kind_raw).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown reward kind {kind_raw:?}").into(),
            )
        })?;
        return Ok(ClaimOutcome::Success { item_id, code, kind });
    }

    Ok(ClaimOutcome::PoolExhausted)
}

/// Atomically claim a reward from a pool for (user, level) and record the
/// level-progress row, per the standalone claim contract.
pub async fn claim_reward(
    db: &Database,
    pool_id: &str,
    user_id: i64,
    level_id: i64,
) -> Result<ClaimOutcome, PromptgateError> {
    let pool_id = pool_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let now = now_rfc3339();
            let outcome = claim_reward_tx(&tx, &pool_id, user_id, level_id, &now)?;
            if matches!(outcome, ClaimOutcome::Success { .. }) {
                super::progress::mark_level_passed_tx(&tx, user_id, level_id, 0, &now)?;
            }
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch the claim for (user, level), if any.
pub async fn get_claim(
    db: &Database,
    user_id: i64,
    level_id: i64,
) -> Result<Option<RewardClaim>, PromptgateError> {
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT id, user_id, level_id, pool_id, item_id, code_snapshot, claimed_at
                 FROM reward_claims WHERE user_id = ?1 AND level_id = ?2",
                params![user_id, level_id],
                |row| {
                    Ok(RewardClaim {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        level_id: row.get(2)?,
                        pool_id: row.get(3)?,
                        item_id: row.get(4)?,
                        code_snapshot: row.get(5)?,
                        claimed_at: row.get(6)?,
                    })
                },
            );
            match result {
                Ok(claim) => Ok(Some(claim)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// All claims for one user, oldest first.
pub async fn list_claims(
    db: &Database,
    user_id: i64,
) -> Result<Vec<RewardClaim>, PromptgateError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, level_id, pool_id, item_id, code_snapshot, claimed_at
                 FROM reward_claims WHERE user_id = ?1 ORDER BY claimed_at ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![user_id], |row| {
                Ok(RewardClaim {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    level_id: row.get(2)?,
                    pool_id: row.get(3)?,
                    item_id: row.get(4)?,
                    code_snapshot: row.get(5)?,
                    claimed_at: row.get(6)?,
                })
            })?;
            let mut claims = Vec::new();
            for row in rows {
                claims.push(row?);
            }
            Ok(claims)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::users;
    use promptgate_core::traits::storage::RewardItemSync;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn pool(pool_id: &str, items: Vec<RewardItemSync>) -> RewardPoolSync {
        RewardPoolSync {
            pool_id: pool_id.to_string(),
            items,
        }
    }

    fn alipay(item_id: &str, code: &str, max_claims: i64) -> RewardItemSync {
        RewardItemSync {
            item_id: item_id.to_string(),
            kind: RewardKind::AlipayCode,
            code: code.to_string(),
            max_claims,
        }
    }

    fn ecard(item_id: &str, code: &str) -> RewardItemSync {
        RewardItemSync {
            item_id: item_id.to_string(),
            kind: RewardKind::JdEcard,
            code: code.to_string(),
            max_claims: 1,
        }
    }

    async fn make_user(db: &Database, telegram_id: i64) -> i64 {
        users::get_or_create_user(db, telegram_id, None)
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn claim_success_then_already_claimed_with_same_code() {
        let (db, _dir) = setup_db().await;
        let user = make_user(&db, 1).await;
        sync_reward_items(&db, &[pool("p1", vec![alipay("a1", "CODE-A", 10)])])
            .await
            .unwrap();

        let first = claim_reward(&db, "p1", user, 1).await.unwrap();
        let code = match first {
            ClaimOutcome::Success { ref code, .. } => code.clone(),
            other => panic!("expected success, got {other:?}"),
        };
        assert_eq!(code, "CODE-A");

        // Second claim for the same (user, level) replays the same code.
        let second = claim_reward(&db, "p1", user, 1).await.unwrap();
        assert_eq!(second, ClaimOutcome::AlreadyClaimed { code });

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn ecard_items_drain_before_shared_codes() {
        let (db, _dir) = setup_db().await;
        sync_reward_items(
            &db,
            &[pool(
                "p1",
                vec![alipay("a-shared", "SHARED", 100), ecard("z-card", "CARD-1")],
            )],
        )
        .await
        .unwrap();

        // Despite sorting after "a-shared" alphabetically, the one-shot
        // e-card goes first.
        let u1 = make_user(&db, 11).await;
        match claim_reward(&db, "p1", u1, 1).await.unwrap() {
            ClaimOutcome::Success { item_id, kind, .. } => {
                assert_eq!(item_id, "z-card");
                assert_eq!(kind, RewardKind::JdEcard);
            }
            other => panic!("expected success, got {other:?}"),
        }

        let u2 = make_user(&db, 12).await;
        match claim_reward(&db, "p1", u2, 1).await.unwrap() {
            ClaimOutcome::Success { item_id, .. } => assert_eq!(item_id, "a-shared"),
            other => panic!("expected success, got {other:?}"),
        }

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn exhausted_pool_reports_no_stock() {
        let (db, _dir) = setup_db().await;
        sync_reward_items(&db, &[pool("p1", vec![ecard("e1", "C1")])])
            .await
            .unwrap();

        let u1 = make_user(&db, 21).await;
        let u2 = make_user(&db, 22).await;
        assert!(matches!(
            claim_reward(&db, "p1", u1, 1).await.unwrap(),
            ClaimOutcome::Success { .. }
        ));
        assert_eq!(
            claim_reward(&db, "p1", u2, 1).await.unwrap(),
            ClaimOutcome::PoolExhausted
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claimed_count_never_exceeds_max_claims_under_concurrency() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("concurrent.db");
        let db = std::sync::Arc::new(Database::open(db_path.to_str().unwrap()).await.unwrap());

        // 10 one-shot items, 20 users racing.
        let items: Vec<RewardItemSync> = (0..10)
            .map(|i| ecard(&format!("e{i:02}"), &format!("C{i:02}")))
            .collect();
        sync_reward_items(&db, &[pool("p1", items)]).await.unwrap();

        let mut user_ids = Vec::new();
        for i in 0..20 {
            user_ids.push(make_user(&db, 100 + i).await);
        }

        let mut handles = Vec::new();
        for user_id in user_ids {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                claim_reward(&db, "p1", user_id, 5).await.unwrap()
            }));
        }

        let mut successes = 0;
        let mut exhausted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                ClaimOutcome::Success { .. } => successes += 1,
                ClaimOutcome::PoolExhausted => exhausted += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(successes, 10);
        assert_eq!(exhausted, 10);

        // Accounting: sum of claimed_count equals claim rows, each item at cap.
        let (total_claimed, claim_rows, over_cap): (i64, i64, i64) = db
            .connection()
            .call(|conn| {
                let total: i64 = conn.query_row(
                    "SELECT SUM(claimed_count) FROM reward_items WHERE pool_id = 'p1'",
                    [],
                    |row| row.get(0),
                )?;
                let rows: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM reward_claims WHERE pool_id = 'p1'",
                    [],
                    |row| row.get(0),
                )?;
                let over: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM reward_items WHERE claimed_count > max_claims",
                    [],
                    |row| row.get(0),
                )?;
                Ok((total, rows, over))
            })
            .await
            .unwrap();
        assert_eq!(total_claimed, 10);
        assert_eq!(claim_rows, 10);
        assert_eq!(over_cap, 0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn resync_preserves_claimed_count_and_disables_missing_items() {
        let (db, _dir) = setup_db().await;
        sync_reward_items(
            &db,
            &[pool("p1", vec![alipay("a1", "OLD", 5), alipay("a2", "B", 5)])],
        )
        .await
        .unwrap();

        let user = make_user(&db, 31).await;
        claim_reward(&db, "p1", user, 1).await.unwrap();

        // Reload: a1 gets a new code, a2 disappears, a3 is new.
        sync_reward_items(
            &db,
            &[pool("p1", vec![alipay("a1", "NEW", 5), alipay("a3", "C", 5)])],
        )
        .await
        .unwrap();

        let rows: Vec<(String, String, i64, i64)> = db
            .connection()
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT item_id, code, claimed_count, enabled FROM reward_items ORDER BY item_id",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
            .unwrap();

        assert_eq!(rows.len(), 3);
        // a1: updated code, claimed_count preserved, still enabled.
        assert_eq!(rows[0], ("a1".into(), "NEW".into(), 1, 1));
        // a2: disabled, not deleted.
        assert_eq!(rows[1].0, "a2");
        assert_eq!(rows[1].3, 0);
        // a3: fresh item starts at zero.
        assert_eq!(rows[2], ("a3".into(), "C".into(), 0, 1));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_claims_returns_user_claims_in_order() {
        let (db, _dir) = setup_db().await;
        sync_reward_items(
            &db,
            &[
                pool("p1", vec![alipay("a1", "A", 5)]),
                pool("p2", vec![alipay("b1", "B", 5)]),
            ],
        )
        .await
        .unwrap();

        let user = make_user(&db, 51).await;
        let other = make_user(&db, 52).await;
        claim_reward(&db, "p1", user, 1).await.unwrap();
        claim_reward(&db, "p2", user, 2).await.unwrap();
        claim_reward(&db, "p1", other, 1).await.unwrap();

        let claims = list_claims(&db, user).await.unwrap();
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[0].level_id, 1);
        assert_eq!(claims[1].level_id, 2);
        assert_eq!(claims[1].pool_id, "p2");

        assert!(list_claims(&db, 999).await.unwrap().is_empty());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn disabled_items_are_never_selected() {
        let (db, _dir) = setup_db().await;
        sync_reward_items(&db, &[pool("p1", vec![alipay("a1", "X", 5)])])
            .await
            .unwrap();
        // Empty resync disables everything.
        sync_reward_items(&db, &[]).await.unwrap();

        let user = make_user(&db, 41).await;
        assert_eq!(
            claim_reward(&db, "p1", user, 1).await.unwrap(),
            ClaimOutcome::PoolExhausted
        );

        db.close().await.unwrap();
    }
}
