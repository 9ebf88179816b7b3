//! Shared balance and inventory primitives that run on an already-open
//! transaction. Multi-entity repository methods (claims, bids, settlement)
//! compose these so every mutation path enforces the same guards.
//!
//! Guarded updates return `false` on a compare-and-swap miss instead of
//! erroring: the caller decides whether a miss is a conflict, an
//! insufficient-funds rejection, or an invariant violation.

use anyhow::Context;
use sqlx::AnyConnection;

/// Allocates the next id from a named sequence row.
///
/// The increment runs before the read-back, so a concurrent allocator in
/// another transaction blocks on the row lock until this one commits; no
/// two transactions can observe the same id.
pub async fn next_sequence_id(conn: &mut AnyConnection, name: &str) -> anyhow::Result<i64> {
    let res = sqlx::query(
        r#"
UPDATE id_sequences
SET next_id = next_id + 1
WHERE name = ?;
"#,
    )
    .bind(name)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("advance sequence {name}"))?;

    if res.rows_affected() != 1 {
        anyhow::bail!("sequence {name} missing; schema bootstrap did not run");
    }

    let row = sqlx::query("SELECT next_id FROM id_sequences WHERE name = ?;")
        .bind(name)
        .fetch_one(conn)
        .await
        .with_context(|| format!("read sequence {name}"))?;

    use sqlx::Row;
    Ok(row.get::<i64, _>("next_id"))
}

/// Debits `amount` flakes iff the balance stays non-negative.
pub async fn debit_flakes(
    conn: &mut AnyConnection,
    user_id: &str,
    amount: i64,
) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"
UPDATE users
SET flakes = flakes - ?
WHERE user_id = ? AND flakes >= ?;
"#,
    )
    .bind(amount)
    .bind(user_id)
    .bind(amount)
    .execute(conn)
    .await
    .with_context(|| format!("debit_flakes user={user_id} amount={amount}"))?;

    Ok(res.rows_affected() == 1)
}

/// Credits `amount` flakes. Returns `false` when the user row is absent.
pub async fn credit_flakes(
    conn: &mut AnyConnection,
    user_id: &str,
    amount: i64,
) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"
UPDATE users
SET flakes = flakes + ?
WHERE user_id = ?;
"#,
    )
    .bind(amount)
    .bind(user_id)
    .execute(conn)
    .await
    .with_context(|| format!("credit_flakes user={user_id} amount={amount}"))?;

    Ok(res.rows_affected() == 1)
}

/// Credits `amount` vials. Returns `false` when the user row is absent.
pub async fn credit_vials(
    conn: &mut AnyConnection,
    user_id: &str,
    amount: i64,
) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"
UPDATE users
SET vials = vials + ?
WHERE user_id = ?;
"#,
    )
    .bind(amount)
    .bind(user_id)
    .execute(conn)
    .await
    .with_context(|| format!("credit_vials user={user_id} amount={amount}"))?;

    Ok(res.rows_affected() == 1)
}

/// Credits a full reward line (flakes, vials, xp) in one statement.
pub async fn credit_rewards(
    conn: &mut AnyConnection,
    user_id: &str,
    flakes: i64,
    vials: i64,
    xp: i64,
) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"
UPDATE users
SET flakes = flakes + ?,
    vials = vials + ?,
    xp = xp + ?
WHERE user_id = ?;
"#,
    )
    .bind(flakes)
    .bind(vials)
    .bind(xp)
    .bind(user_id)
    .execute(conn)
    .await
    .with_context(|| format!("credit_rewards user={user_id}"))?;

    Ok(res.rows_affected() == 1)
}

/// Adjusts an inventory row by `delta`, creating it for a positive delta on
/// a missing row. Returns `false` when the adjustment would drive the
/// amount negative (including decrements of absent rows).
pub async fn adjust_user_card(
    conn: &mut AnyConnection,
    user_id: &str,
    card_id: i64,
    delta: i64,
    now_ms: i64,
) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"
UPDATE user_cards
SET amount = amount + ?
WHERE user_id = ? AND card_id = ? AND amount + ? >= 0;
"#,
    )
    .bind(delta)
    .bind(user_id)
    .bind(card_id)
    .bind(delta)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("adjust_user_card user={user_id} card={card_id} delta={delta}"))?;

    if res.rows_affected() == 1 {
        return Ok(true);
    }

    if delta < 0 {
        return Ok(false);
    }

    // No row yet. A second racer may have inserted between the UPDATE and
    // here; the retry UPDATE below resolves that case.
    let inserted = sqlx::query(
        r#"
INSERT INTO user_cards (user_id, card_id, amount, favorite, locked, obtained_ms)
SELECT ?, ?, ?, FALSE, FALSE, ?
WHERE NOT EXISTS (
  SELECT 1 FROM user_cards WHERE user_id = ? AND card_id = ?
);
"#,
    )
    .bind(user_id)
    .bind(card_id)
    .bind(delta)
    .bind(now_ms)
    .bind(user_id)
    .bind(card_id)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("insert user_card user={user_id} card={card_id}"))?;

    if inserted.rows_affected() == 1 {
        return Ok(true);
    }

    let res = sqlx::query(
        r#"
UPDATE user_cards
SET amount = amount + ?
WHERE user_id = ? AND card_id = ?;
"#,
    )
    .bind(delta)
    .bind(user_id)
    .bind(card_id)
    .execute(conn)
    .await
    .with_context(|| format!("adjust_user_card retry user={user_id} card={card_id}"))?;

    Ok(res.rows_affected() == 1)
}

/// Grants `amount` copies of an opaque item id.
pub async fn grant_item(
    conn: &mut AnyConnection,
    user_id: &str,
    item_id: &str,
    amount: i64,
) -> anyhow::Result<()> {
    let res = sqlx::query(
        r#"
UPDATE user_items
SET amount = amount + ?
WHERE user_id = ? AND item_id = ?;
"#,
    )
    .bind(amount)
    .bind(user_id)
    .bind(item_id)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("grant_item user={user_id} item={item_id}"))?;

    if res.rows_affected() == 1 {
        return Ok(());
    }

    sqlx::query(
        r#"
INSERT INTO user_items (user_id, item_id, amount)
VALUES (?, ?, ?);
"#,
    )
    .bind(user_id)
    .bind(item_id)
    .bind(amount)
    .execute(conn)
    .await
    .with_context(|| format!("insert user_item user={user_id} item={item_id}"))?;

    Ok(())
}
