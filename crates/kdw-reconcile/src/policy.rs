//! Ratio derivation and the notification gate.
//!
//! Pure functions. No IO, no clock.

use serde::{Deserialize, Serialize};

/// Default exclusive threshold: a ratio strictly below 1.0 is "negative".
pub const DEFAULT_RATIO_THRESHOLD: f64 = 1.0;

const LEAGUE_OF_GRAPHS_MATCH_URL: &str = "https://www.leagueofgraphs.com/match";

/// (kills + assists) / deaths, with deaths floored at one.
///
/// A death-free match yields kills + assists. Never divides by zero and never
/// returns a negative value.
pub fn kda_ratio(kills: u32, deaths: u32, assists: u32) -> f64 {
    let numerator = f64::from(kills) + f64::from(assists);
    let denominator = f64::from(deaths.max(1));
    numerator / denominator
}

/// A cycle-over-cycle ratio change that lands below the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossingEvent {
    pub previous_ratio: f64,
    pub current_ratio: f64,
    pub threshold: f64,
}

/// The notification gate.
///
/// Fires only when a previous ratio exists, the ratio changed, and the new
/// ratio is strictly below `threshold`. Compared against the previously
/// stored ratio only; there is no hysteresis band.
pub fn detect_crossing(previous: Option<f64>, current: f64, threshold: f64) -> Option<CrossingEvent> {
    let previous_ratio = previous?;
    if current != previous_ratio && current < threshold {
        Some(CrossingEvent {
            previous_ratio,
            current_ratio: current,
            threshold,
        })
    } else {
        None
    }
}

/// Public match page for a provider match id.
///
/// `NA1_5284768552` → `https://www.leagueofgraphs.com/match/na/5284768552`.
/// Ids without a platform prefix use `fallback_region`.
pub fn match_url(match_id: &str, fallback_region: &str) -> String {
    let (platform, game_id) = match match_id.split_once('_') {
        Some((platform, game_id)) if !platform.is_empty() && !game_id.is_empty() => {
            (platform, game_id)
        }
        _ => (fallback_region, match_id),
    };
    let region = platform
        .trim_end_matches(|c: char| c.is_ascii_digit())
        .to_ascii_lowercase();
    format!("{LEAGUE_OF_GRAPHS_MATCH_URL}/{region}/{game_id}")
}

/// SMS body for a crossing.
pub fn crossing_message(display_name: &str, match_url: &str) -> String {
    format!("{display_name} just went negative. You can view the match here: {match_url}")
}
