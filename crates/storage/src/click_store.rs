use anyhow::Result;
use driftnet_core::PublishedClickRow;
use sqlx::PgPool;

/// Number of bound columns per row (§9: "9 · len(batch) placeholders").
const COLUMNS_PER_ROW: usize = 9;

/// Inserts a chunk of `PublishedClickRow` as a single multi-row INSERT.
/// Caller is responsible for chunking to `insert_batch_size` (§4.B): this
/// function issues exactly one statement for whatever slice it's given.
/// Parameter binding is 1-indexed, in row-major order, matching the
/// teacher's hand-built `UNNEST`/positional-bind query style
/// (`crates/storage/src/lib.rs::store_page`).
pub async fn insert_batch(pool: &PgPool, rows: &[PublishedClickRow]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut sql = String::from(
        "INSERT INTO click_events \
         (query_id, result_id, position, page, destination_hash, session_id, user_agent_hash, generated_at, clicked_at) \
         VALUES ",
    );

    for (i, _row) in rows.iter().enumerate() {
        if i > 0 {
            sql.push(',');
        }
        let base = i * COLUMNS_PER_ROW;
        sql.push('(');
        for col in 0..COLUMNS_PER_ROW {
            if col > 0 {
                sql.push(',');
            }
            sql.push_str(&format!("${}", base + col + 1));
        }
        sql.push(')');
    }

    let mut query = sqlx::query(&sql);
    for row in rows {
        query = query
            .bind(&row.query_id)
            .bind(&row.result_id)
            .bind(row.position as i32)
            .bind(row.page as i32)
            .bind(&row.destination_hash)
            .bind(&row.session_id)
            .bind(&row.user_agent_hash)
            .bind(row.generated_at)
            .bind(row.clicked_at);
    }

    query.execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(i: usize) -> PublishedClickRow {
        PublishedClickRow {
            query_id: format!("q{i}"),
            result_id: format!("r{i}"),
            position: 1,
            page: 1,
            destination_hash: "h".into(),
            session_id: None,
            user_agent_hash: "ua".into(),
            generated_at: Utc::now(),
            clicked_at: Utc::now(),
        }
    }

    #[test]
    fn placeholder_count_matches_nine_times_batch_len() {
        let rows: Vec<_> = (0..3).map(row).collect();
        // Build the same SQL the function builds, to assert the
        // placeholder-count invariant without a live database.
        let mut sql = String::new();
        for (i, _) in rows.iter().enumerate() {
            let base = i * COLUMNS_PER_ROW;
            for col in 0..COLUMNS_PER_ROW {
                sql.push_str(&format!("${},", base + col + 1));
            }
        }
        let placeholder_count = sql.matches('$').count();
        assert_eq!(placeholder_count, rows.len() * COLUMNS_PER_ROW);
    }
}
