//! JSON-API source adapters (§4.7 archetype 1): `api-web.nhle.com`-style
//! endpoints returning structured JSON bodies, parsed directly into the
//! `model` types with `safe_int`/`safe_float` guarding missing fields.

mod boxscore;
mod play_by_play;
mod player_game_log;
mod schedule;

pub use boxscore::BoxscoreAdapter;
pub use play_by_play::PlayByPlayAdapter;
pub use player_game_log::PlayerGameLogAdapter;
pub use schedule::{ScheduleAdapter, fetch_season_game_ids};
