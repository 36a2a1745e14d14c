//! Stat and play extraction.
//!
//! Flattens the provider's box-score and drive structures into the domain
//! shapes. Never raises on missing optional fields: everything optional
//! defaults to `None`/`0`/empty. Compound stat values ("20/28", "5-40") stay
//! opaque display strings at this layer; decomposition happens at the export
//! surface where the per-field separator table lives.

use std::collections::BTreeMap;

use crate::game::models::{Drive, Play};
use crate::providers::espn::{RawDrive, StatEntry};

/// Flatten a statistics array into a stat name → display value map.
pub fn stat_map(entries: &[StatEntry]) -> BTreeMap<String, String> {
    entries
        .iter()
        .filter(|e| !e.name.is_empty())
        .map(|e| (e.name.clone(), e.display_value.clone()))
        .collect()
}

/// Convert raw drives into ordered domain drives, provider order preserved.
pub fn drives(raw: &[RawDrive]) -> Vec<Drive> {
    raw.iter()
        .map(|drive| Drive {
            id: drive.id.clone(),
            team: drive
                .team
                .as_ref()
                .and_then(|t| t.abbreviation.clone())
                .filter(|a| !a.is_empty()),
            description: drive.description.clone(),
            plays: drive
                .plays
                .iter()
                .map(|play| Play {
                    id: play.id.clone(),
                    play_type: play.play_type.as_ref().and_then(|t| t.text.clone()),
                    text: play.text.clone(),
                    away_score: play.away_score.unwrap_or(0),
                    home_score: play.home_score.unwrap_or(0),
                    period: play.period.as_ref().and_then(|p| p.number),
                    clock: play.clock.as_ref().and_then(|c| c.display_value.clone()),
                    scoring_play: play.scoring_play.unwrap_or(false),
                    yards: play.stat_yardage.unwrap_or(0),
                    down: play.start.as_ref().and_then(|s| s.down),
                    distance: play.start.as_ref().and_then(|s| s.distance),
                    yard_line: play.start.as_ref().and_then(|s| s.yard_line),
                })
                .collect(),
        })
        .collect()
}

/// Parse a provider score string; missing or unparseable scores count as 0.
pub fn parse_score(score: Option<&str>) -> i64 {
    score.and_then(|s| s.trim().parse().ok()).unwrap_or(0)
}
