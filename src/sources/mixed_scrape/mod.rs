//! Mixed-scrape source adapters (§4.7 archetype 3): DailyFaceoff pages
//! that mix a CSS-class-based DOM (line combinations) with a
//! `__NEXT_DATA__` JSON blob embedded in a `<script>` tag (starting
//! goalies), grounded on `examples/original_source`'s
//! `dailyfaceoff/starting_goalies.py` and the tests for a
//! `LineCombinationsDownloader` that never survived into the retained
//! source tree.
//!
//! Neither DailyFaceoff page is keyed by NHL `game_id` the way the other
//! two archetypes are: the original's own `download_tonight()` stores its
//! result under `season_id=0, game_id=0` since it is a league-wide page,
//! not a per-game one. This module follows that same convention and
//! additionally encodes the scraped team into the `page` column so that
//! per-team line-combination rows don't collide under the shared
//! `(game_id, season_id, page)` key.

mod injuries;
mod line_combinations;
mod starting_goalies;

pub use injuries::DailyfaceoffInjuriesAdapter;
pub use line_combinations::LineCombinationsAdapter;
pub use starting_goalies::StartingGoaliesAdapter;

use sqlx::SqlitePool;

use crate::model::{MixedScrapePayload, ParsedEntity};
use crate::sources::error::ParseError;

/// Game id/season id DailyFaceoff pages are stored under: neither page
/// is scoped to one real NHL game, matching the original's own
/// `season_id=0, game_id=0` convention for league-wide downloads.
pub const UNSCOPED_ID: i64 = 0;

pub async fn persist_mixed_scrape(pool: &SqlitePool, parsed: &ParsedEntity) -> Result<u64, ParseError> {
    let ParsedEntity::MixedScrape(payload) = parsed else {
        return Err(ParseError::MissingField {
            field: "mixed_scrape".into(),
            item_key: "<persist>".into(),
        });
    };
    let payload_json = serde_json::to_string(payload)?;
    let result = sqlx::query(
        "INSERT INTO parsed_mixed_scrape (game_id, season_id, page, payload_json)
         VALUES (?, ?, ?, ?)
         ON CONFLICT (game_id, season_id, page) DO UPDATE SET
            payload_json = excluded.payload_json,
            updated_at = datetime('now')",
    )
    .bind(payload.game_id)
    .bind(payload.season_id)
    .bind(&payload.page)
    .bind(payload_json)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

fn empty_payload(page: impl Into<String>) -> MixedScrapePayload {
    MixedScrapePayload {
        game_id: UNSCOPED_ID,
        season_id: UNSCOPED_ID,
        page: page.into(),
        lines: Vec::new(),
        starting_goalies: Vec::new(),
        injuries: Vec::new(),
    }
}
