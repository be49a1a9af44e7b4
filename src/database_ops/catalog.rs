//! Catalog persistence: idempotent term creation, the game upsert bundle,
//! and the read queries behind the browse endpoints.
//!
//! Term creation happens outside the per-game transaction (it is globally
//! idempotent); the game row, its term links, and its screenshot set are
//! written inside one transaction so a crash mid-import never leaves a
//! partially-linked item.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{Postgres, Row, Transaction};
use tracing::debug;

use crate::database_ops::db::Db;
use crate::normalization::game::{NormalizedGame, NormalizedScreenshot};

/// Result of one game upsert. `created` distinguishes first import from
/// re-import; `slug` is the stored slug, which on re-import is the original
/// one regardless of what the normalizer derived this time.
#[derive(Debug, Clone, Serialize)]
pub struct GameWrite {
    pub game_id: i64,
    pub slug: String,
    pub created: bool,
}

/// True when the error chain bottoms out in a Postgres unique violation.
/// Concurrent imports racing for the same new row land here; callers map it
/// to the "already imported" skip rather than a hard error.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| e.as_database_error())
            .and_then(|db| db.code())
            .map(|code| code == "23505")
            .unwrap_or(false)
    })
}

async fn ensure_term(db: &Db, table: &str, name: &str) -> Result<i64> {
    // First attempt: insert with ON CONFLICT DO NOTHING, then fall back to
    // select. Safe against concurrent creators.
    let insert = format!(
        "INSERT INTO {table} (name) VALUES ($1) ON CONFLICT (name) DO NOTHING RETURNING id"
    );
    if let Some(row) = sqlx::query(&insert)
        .persistent(false)
        .bind(name)
        .fetch_optional(&db.pool)
        .await
        .with_context(|| format!("insert into {table}"))?
    {
        return Ok(row.get::<i64, _>("id"));
    }
    let select = format!("SELECT id FROM {table} WHERE name = $1");
    let row = sqlx::query(&select)
        .persistent(false)
        .bind(name)
        .fetch_one(&db.pool)
        .await
        .with_context(|| format!("select from {table}"))?;
    Ok(row.get::<i64, _>("id"))
}

pub async fn ensure_tag(db: &Db, name: &str) -> Result<i64> {
    ensure_term(db, "tags", name).await
}

pub async fn ensure_platform(db: &Db, name: &str) -> Result<i64> {
    ensure_term(db, "platforms", name).await
}

async fn link_terms(
    tx: &mut Transaction<'_, Postgres>,
    join_table: &str,
    term_col: &str,
    game_id: i64,
    term_ids: &[i64],
) -> Result<()> {
    for term_id in term_ids {
        let sql = format!(
            "INSERT INTO {join_table} (game_id, {term_col}) VALUES ($1, $2) ON CONFLICT DO NOTHING"
        );
        sqlx::query(&sql)
            .persistent(false)
            .bind(game_id)
            .bind(term_id)
            .execute(&mut **tx)
            .await
            .with_context(|| format!("link into {join_table}"))?;
    }
    Ok(())
}

async fn replace_screenshots(
    tx: &mut Transaction<'_, Postgres>,
    game_id: i64,
    shots: &[NormalizedScreenshot],
) -> Result<()> {
    // Upstream has no stable screenshot ids, so the set is replaced
    // wholesale instead of diffed.
    sqlx::query("DELETE FROM screenshots WHERE game_id = $1")
        .persistent(false)
        .bind(game_id)
        .execute(&mut **tx)
        .await
        .context("clear screenshots")?;
    for shot in shots {
        sqlx::query(
            "INSERT INTO screenshots (game_id, image_url, thumbnail_url, sort_index) \
             VALUES ($1, $2, $3, $4)",
        )
        .persistent(false)
        .bind(game_id)
        .bind(&shot.image_url)
        .bind(&shot.thumbnail_url)
        .bind(shot.sort_index)
        .execute(&mut **tx)
        .await
        .context("insert screenshot")?;
    }
    Ok(())
}

/// Upsert one game plus its term links and screenshot set.
///
/// The slug column is present only in the INSERT arm; the UPDATE arm leaves
/// it untouched so existing inbound links survive upstream title changes.
pub async fn upsert_game_bundle(
    db: &Db,
    game: &NormalizedGame,
    shots: &[NormalizedScreenshot],
    tag_ids: &[i64],
    platform_ids: &[i64],
) -> Result<GameWrite> {
    let mut tx = db.pool.begin().await.context("begin game upsert")?;

    let row = sqlx::query(
        "INSERT INTO games (appid, title, slug, summary, header_image, hero_image, \
                            developer, publisher, release_date, critic_score, \
                            review_label, review_count, review_percent, updated_at) \
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13, now()) \
         ON CONFLICT (appid) DO UPDATE SET \
            title = EXCLUDED.title, \
            summary = EXCLUDED.summary, \
            header_image = EXCLUDED.header_image, \
            hero_image = EXCLUDED.hero_image, \
            developer = EXCLUDED.developer, \
            publisher = EXCLUDED.publisher, \
            release_date = EXCLUDED.release_date, \
            critic_score = EXCLUDED.critic_score, \
            review_label = EXCLUDED.review_label, \
            review_count = EXCLUDED.review_count, \
            review_percent = EXCLUDED.review_percent, \
            updated_at = now() \
         RETURNING id, slug, (xmax = 0) AS created",
    )
    .persistent(false)
    .bind(game.appid)
    .bind(&game.title)
    .bind(&game.slug)
    .bind(&game.summary)
    .bind(&game.header_image)
    .bind(&game.hero_image)
    .bind(&game.developer)
    .bind(&game.publisher)
    .bind(game.release_date)
    .bind(game.critic_score)
    .bind(&game.review_label)
    .bind(game.review_count)
    .bind(game.review_percent)
    .fetch_one(&mut *tx)
    .await
    .context("upsert game row")?;

    let game_id: i64 = row.get("id");
    let stored_slug: String = row.get("slug");
    let created: bool = row.get("created");

    link_terms(&mut tx, "game_tags", "tag_id", game_id, tag_ids).await?;
    link_terms(&mut tx, "game_platforms", "platform_id", game_id, platform_ids).await?;
    replace_screenshots(&mut tx, game_id, shots).await?;

    tx.commit().await.context("commit game upsert")?;
    debug!(appid = game.appid, game_id, created, "game upsert committed");

    Ok(GameWrite {
        game_id,
        slug: stored_slug,
        created,
    })
}

// ---- read side (browse endpoints) ----

#[derive(Debug, Clone, Serialize)]
pub struct GameSummary {
    pub appid: i64,
    pub title: String,
    pub slug: String,
    pub header_image: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub critic_score: Option<i32>,
    pub review_percent: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameDetail {
    #[serde(flatten)]
    pub summary: GameSummary,
    pub summary_text: Option<String>,
    pub hero_image: Option<String>,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub review_label: Option<String>,
    pub review_count: Option<i64>,
    pub tags: Vec<String>,
    pub platforms: Vec<String>,
    pub screenshots: Vec<NormalizedScreenshot>,
}

fn summary_from_row(row: &sqlx::postgres::PgRow) -> GameSummary {
    GameSummary {
        appid: row.get("appid"),
        title: row.get("title"),
        slug: row.get("slug"),
        header_image: row.get("header_image"),
        release_date: row.get("release_date"),
        critic_score: row.get("critic_score"),
        review_percent: row.get("review_percent"),
    }
}

/// Paged catalog listing with optional tag/platform filter (matched
/// case-insensitively against the stored display names).
pub async fn list_games(
    db: &Db,
    page: i64,
    per_page: i64,
    tag: Option<&str>,
    platform: Option<&str>,
) -> Result<(Vec<GameSummary>, i64)> {
    let per_page = per_page.clamp(1, 100);
    let offset = (page.max(1) - 1) * per_page;

    let mut joins = String::new();
    let mut wheres: Vec<String> = Vec::new();
    if tag.is_some() {
        joins.push_str(" JOIN game_tags gt ON gt.game_id = g.id JOIN tags t ON t.id = gt.tag_id");
        wheres.push("LOWER(t.name) = LOWER($1)".into());
    }
    if platform.is_some() {
        joins.push_str(
            " JOIN game_platforms gp ON gp.game_id = g.id JOIN platforms p ON p.id = gp.platform_id",
        );
        wheres.push(format!(
            "LOWER(p.name) = LOWER(${})",
            if tag.is_some() { 2 } else { 1 }
        ));
    }
    let where_clause = if wheres.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", wheres.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(DISTINCT g.id) AS n FROM games g{joins}{where_clause}");
    let list_sql = format!(
        "SELECT DISTINCT g.appid, g.title, g.slug, g.header_image, g.release_date, \
                g.critic_score, g.review_percent \
         FROM games g{joins}{where_clause} \
         ORDER BY g.title LIMIT {per_page} OFFSET {offset}"
    );

    let mut count_q = sqlx::query(&count_sql).persistent(false);
    let mut list_q = sqlx::query(&list_sql).persistent(false);
    if let Some(tag) = tag {
        count_q = count_q.bind(tag);
        list_q = list_q.bind(tag);
    }
    if let Some(platform) = platform {
        count_q = count_q.bind(platform);
        list_q = list_q.bind(platform);
    }

    let total: i64 = count_q
        .fetch_one(&db.pool)
        .await
        .context("count games")?
        .get("n");
    let games = list_q
        .fetch_all(&db.pool)
        .await
        .context("list games")?
        .iter()
        .map(summary_from_row)
        .collect();
    Ok((games, total))
}

pub async fn get_game_by_slug(db: &Db, slug: &str) -> Result<Option<GameDetail>> {
    let Some(row) = sqlx::query(
        "SELECT id, appid, title, slug, summary, header_image, hero_image, developer, \
                publisher, release_date, critic_score, review_label, review_count, \
                review_percent \
         FROM games WHERE slug = $1",
    )
    .persistent(false)
    .bind(slug)
    .fetch_optional(&db.pool)
    .await
    .context("select game by slug")?
    else {
        return Ok(None);
    };

    let game_id: i64 = row.get("id");
    let tags: Vec<String> = sqlx::query(
        "SELECT t.name FROM tags t JOIN game_tags gt ON gt.tag_id = t.id \
         WHERE gt.game_id = $1 ORDER BY t.name",
    )
    .persistent(false)
    .bind(game_id)
    .fetch_all(&db.pool)
    .await
    .context("select game tags")?
    .iter()
    .map(|r| r.get::<String, _>("name"))
    .collect();

    let platforms: Vec<String> = sqlx::query(
        "SELECT p.name FROM platforms p JOIN game_platforms gp ON gp.platform_id = p.id \
         WHERE gp.game_id = $1 ORDER BY p.name",
    )
    .persistent(false)
    .bind(game_id)
    .fetch_all(&db.pool)
    .await
    .context("select game platforms")?
    .iter()
    .map(|r| r.get::<String, _>("name"))
    .collect();

    let screenshots: Vec<NormalizedScreenshot> = sqlx::query(
        "SELECT image_url, thumbnail_url, sort_index FROM screenshots \
         WHERE game_id = $1 ORDER BY sort_index",
    )
    .persistent(false)
    .bind(game_id)
    .fetch_all(&db.pool)
    .await
    .context("select game screenshots")?
    .iter()
    .map(|r| NormalizedScreenshot {
        image_url: r.get("image_url"),
        thumbnail_url: r.get("thumbnail_url"),
        sort_index: r.get("sort_index"),
    })
    .collect();

    Ok(Some(GameDetail {
        summary: summary_from_row(&row),
        summary_text: row.get("summary"),
        hero_image: row.get("hero_image"),
        developer: row.get("developer"),
        publisher: row.get("publisher"),
        review_label: row.get("review_label"),
        review_count: row.get("review_count"),
        tags,
        platforms,
        screenshots,
    }))
}
