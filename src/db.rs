use std::collections::{BTreeMap, BTreeSet};

use anyhow::Context;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{DiscountWindow, GroupData, GroupInfo, RawRecord};
use crate::week;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn fetch_groups(pool: &PgPool) -> anyhow::Result<Vec<GroupInfo>> {
    let rows = sqlx::query(
        "SELECT id, category, year FROM campaign_pace.event_groups \
         ORDER BY year DESC, category",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| GroupInfo {
            id: row.get("id"),
            category: row.get("category"),
            year: row.get("year"),
        })
        .collect())
}

/// Load everything one campaign group contributes to a report. The four
/// reads are independent, so they fan out concurrently.
pub async fn fetch_group_data(pool: &PgPool, group_id: Uuid) -> anyhow::Result<GroupData> {
    let mapping_rows = sqlx::query(
        "SELECT event_id FROM campaign_pace.group_events \
         WHERE event_group_id = $1 AND include_in_reporting",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    let event_ids: Vec<i64> = mapping_rows
        .into_iter()
        .map(|row| row.get("event_id"))
        .collect();

    if event_ids.is_empty() {
        return Ok(GroupData::default());
    }

    let (event_rows, discount_rows, entry_rows, donation_rows) = tokio::try_join!(
        sqlx::query(
            "SELECT event_date FROM campaign_pace.events WHERE event_id = ANY($1)",
        )
        .bind(&event_ids)
        .fetch_all(pool),
        sqlx::query(
            "SELECT label, starts_at, ends_at FROM campaign_pace.group_discounts \
             WHERE event_group_id = $1",
        )
        .bind(group_id)
        .fetch_all(pool),
        sqlx::query(
            "SELECT is_paid, date_paid, date_created FROM campaign_pace.event_entries \
             WHERE event_id = ANY($1)",
        )
        .bind(&event_ids)
        .fetch_all(pool),
        sqlx::query(
            "SELECT d_amount, d_refund_amount, date_paid, date_created \
             FROM campaign_pace.donations \
             WHERE event_id = ANY($1) \
               AND d_status = 'paid' \
               AND donation_type IS DISTINCT FROM 'matched'",
        )
        .bind(&event_ids)
        .fetch_all(pool),
    )?;

    // A group can span several events; the report anchors on the latest date.
    let event_date = event_rows
        .iter()
        .filter_map(|row| {
            let raw: Option<String> = row.get("event_date");
            raw.as_deref().and_then(week::parse_civil_datetime)
        })
        .max()
        .map(|dt| dt.date());

    let discounts = discount_rows
        .into_iter()
        .map(|row| {
            let starts_at: Option<String> = row.get("starts_at");
            let ends_at: Option<String> = row.get("ends_at");
            DiscountWindow {
                label: row.get("label"),
                starts_at: starts_at.as_deref().and_then(week::parse_civil_datetime),
                ends_at: ends_at.as_deref().and_then(week::parse_civil_datetime),
            }
        })
        .collect();

    let entries = entry_rows
        .into_iter()
        .map(|row| {
            let is_paid: Option<String> = row.get("is_paid");
            let date_paid: Option<String> = row.get("date_paid");
            let date_created: Option<String> = row.get("date_created");
            RawRecord {
                paid_at: date_paid.as_deref().and_then(week::parse_civil_datetime),
                created_at: date_created.as_deref().and_then(week::parse_civil_datetime),
                is_paid: is_paid.as_deref().and_then(week::coerce_bool) == Some(true),
                amount: 1.0,
            }
        })
        .collect();

    let donations = donation_rows
        .into_iter()
        .map(|row| {
            let amount: Option<f64> = row.get("d_amount");
            let refund: Option<f64> = row.get("d_refund_amount");
            let date_paid: Option<String> = row.get("date_paid");
            let date_created: Option<String> = row.get("date_created");
            RawRecord {
                paid_at: date_paid.as_deref().and_then(week::parse_civil_datetime),
                created_at: date_created.as_deref().and_then(week::parse_civil_datetime),
                is_paid: true,
                amount: amount.unwrap_or(0.0) - refund.unwrap_or(0.0),
            }
        })
        .collect();

    Ok(GroupData {
        entries,
        donations,
        event_date,
        discounts,
    })
}

/// Fetch every distinct group once, concurrently, keyed by id.
pub async fn fetch_groups_data(
    pool: &PgPool,
    ids: &[Uuid],
) -> anyhow::Result<BTreeMap<Uuid, GroupData>> {
    let distinct: BTreeSet<Uuid> = ids.iter().copied().collect();
    let mut tasks = tokio::task::JoinSet::new();
    for id in distinct {
        let pool = pool.clone();
        tasks.spawn(async move { (id, fetch_group_data(&pool, id).await) });
    }

    let mut data = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        let (id, result) = joined.context("group fetch task failed")?;
        data.insert(id, result?);
    }
    Ok(data)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let groups = vec![
        (
            Uuid::parse_str("8c9e3a0f-5f0a-4f7e-9d7c-1b8e2d4f5a03")?,
            "Bay to Bluff",
            2023,
            2303_i64,
            "2023-09-15",
        ),
        (
            Uuid::parse_str("b6f2d1c4-7a85-4f3a-b1de-4a2c9f6e8b01")?,
            "Bay to Bluff",
            2024,
            2404_i64,
            "2024-09-13",
        ),
        (
            Uuid::parse_str("e3a81c92-6d47-4b5f-8c20-9f1d3b7a6c02")?,
            "Bay to Bluff",
            2025,
            2505_i64,
            "2025-09-12",
        ),
    ];

    for (group_id, category, year, event_id, event_date) in &groups {
        sqlx::query(
            r#"
            INSERT INTO campaign_pace.event_groups (id, category, year)
            VALUES ($1, $2, $3)
            ON CONFLICT (category, year) DO NOTHING
            "#,
        )
        .bind(group_id)
        .bind(category)
        .bind(year)
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO campaign_pace.events (event_id, event_name, event_date)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO UPDATE SET event_date = EXCLUDED.event_date
            "#,
        )
        .bind(event_id)
        .bind(format!("{category} {year}"))
        .bind(event_date)
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO campaign_pace.group_events (event_group_id, event_id)
            VALUES ($1, $2)
            ON CONFLICT (event_group_id, event_id) DO NOTHING
            "#,
        )
        .bind(group_id)
        .bind(event_id)
        .execute(pool)
        .await?;
    }

    // Weekly paid-entry batches: (event_id, paid date, count).
    let entry_batches: Vec<(i64, &str, usize)> = vec![
        (2303, "2023-06-16", 14),
        (2303, "2023-07-14", 22),
        (2303, "2023-08-11", 31),
        (2303, "2023-09-08", 40),
        (2404, "2024-06-14", 16),
        (2404, "2024-07-12", 27),
        (2404, "2024-08-09", 35),
        (2404, "2024-09-06", 48),
        (2505, "2025-06-13", 18),
        (2505, "2025-07-11", 30),
        (2505, "2025-08-01", 39),
    ];
    for (event_id, date_paid, count) in entry_batches {
        for n in 0..count {
            sqlx::query(
                r#"
                INSERT INTO campaign_pace.event_entries
                (event_id, is_paid, date_paid, date_created, source_key)
                VALUES ($1, 'Y', $2, $2, $3)
                ON CONFLICT (source_key) DO NOTHING
                "#,
            )
            .bind(event_id)
            .bind(date_paid)
            .bind(format!("seed-entry-{event_id}-{date_paid}-{n}"))
            .execute(pool)
            .await?;
        }
    }

    let donation_batches: Vec<(i64, &str, f64, f64)> = vec![
        (2303, "2023-07-21", 850.0, 0.0),
        (2303, "2023-08-18", 1240.0, 40.0),
        (2303, "2023-09-15", 2210.0, 0.0),
        (2404, "2024-07-19", 930.0, 0.0),
        (2404, "2024-08-16", 1555.0, 55.0),
        (2404, "2024-09-13", 2480.0, 0.0),
        (2505, "2025-06-27", 640.0, 0.0),
        (2505, "2025-07-25", 1310.0, 0.0),
    ];
    for (event_id, date_paid, amount, refund) in donation_batches {
        sqlx::query(
            r#"
            INSERT INTO campaign_pace.donations
            (event_id, d_amount, d_refund_amount, d_status, donation_type,
             date_paid, date_created, source_key)
            VALUES ($1, $2, $3, 'paid', 'online', $4, $4, $5)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(amount)
        .bind(refund)
        .bind(date_paid)
        .bind(format!("seed-donation-{event_id}-{date_paid}"))
        .execute(pool)
        .await?;
    }

    let discounts: Vec<(&Uuid, &str, &str, &str)> = vec![
        (&groups[1].0, "Early bird ends", "2024-05-01", "2024-07-19"),
        (&groups[2].0, "Early bird ends", "2025-05-01", "2025-07-18"),
    ];
    for (group_id, label, starts_at, ends_at) in discounts {
        sqlx::query(
            r#"
            INSERT INTO campaign_pace.group_discounts
            (event_group_id, label, starts_at, ends_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(group_id)
        .bind(label)
        .bind(starts_at)
        .bind(ends_at)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn import_entries_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        event_id: i64,
        is_paid: String,
        date_paid: Option<String>,
        date_created: Option<String>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-entry-{}", Uuid::new_v4()));

        let outcome = sqlx::query(
            r#"
            INSERT INTO campaign_pace.event_entries
            (event_id, is_paid, date_paid, date_created, source_key)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(row.event_id)
        .bind(&row.is_paid)
        .bind(&row.date_paid)
        .bind(&row.date_created)
        .bind(source_key)
        .execute(pool)
        .await?;

        if outcome.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn import_donations_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        event_id: i64,
        d_amount: f64,
        d_refund_amount: Option<f64>,
        d_status: String,
        donation_type: Option<String>,
        date_paid: Option<String>,
        date_created: Option<String>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-donation-{}", Uuid::new_v4()));

        let outcome = sqlx::query(
            r#"
            INSERT INTO campaign_pace.donations
            (event_id, d_amount, d_refund_amount, d_status, donation_type,
             date_paid, date_created, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(row.event_id)
        .bind(row.d_amount)
        .bind(row.d_refund_amount.unwrap_or(0.0))
        .bind(&row.d_status)
        .bind(&row.donation_type)
        .bind(&row.date_paid)
        .bind(&row.date_created)
        .bind(source_key)
        .execute(pool)
        .await?;

        if outcome.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
