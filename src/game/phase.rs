//! Game-phase classification.
//!
//! ESPN reports end-of-half inconsistently: the status text sometimes lags at
//! "In Progress" or "End of 2nd Quarter" before its own state machine flips to
//! "Halftime". The classifier normalizes those cases up front so every
//! consumer reads one persisted phase instead of re-deriving it.

use serde::{Deserialize, Serialize};

/// The clock string ESPN shows when a period has fully elapsed.
const ZERO_CLOCK: &str = "0:00";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    Scheduled,
    Live,
    Halftime,
    Final,
}

impl GamePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::Live => "Live",
            Self::Halftime => "Halftime",
            Self::Final => "Final",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Scheduled" => Some(Self::Scheduled),
            "Live" => Some(Self::Live),
            "Halftime" => Some(Self::Halftime),
            "Final" => Some(Self::Final),
            _ => None,
        }
    }
}

impl std::fmt::Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a game's phase from the provider's status description, period
/// number, and displayed clock.
///
/// The forced-halftime rule runs first: a second quarter with an expired clock
/// is halftime no matter what the status text says.
pub fn classify(status: &str, period: i64, clock: Option<&str>) -> GamePhase {
    let status_lower = status.trim().to_lowercase();

    if (period == 2 && clock == Some(ZERO_CLOCK))
        || status_lower == "end of 2nd quarter"
        || status_lower.contains("halftime")
    {
        return GamePhase::Halftime;
    }

    if status_lower.contains("final") {
        return GamePhase::Final;
    }

    if ["scheduled", "postponed", "delayed", "pregame"]
        .iter()
        .any(|p| status_lower.contains(p))
    {
        return GamePhase::Scheduled;
    }

    GamePhase::Live
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halftime_status_is_halftime() {
        assert_eq!(classify("Halftime", 2, Some("0:00")), GamePhase::Halftime);
    }

    #[test]
    fn end_of_second_quarter_is_halftime() {
        assert_eq!(
            classify("End of 2nd Quarter", 2, Some("0:00")),
            GamePhase::Halftime
        );
    }

    #[test]
    fn expired_second_quarter_clock_forces_halftime() {
        // Status text lags behind the clock here.
        assert_eq!(classify("In Progress", 2, Some("0:00")), GamePhase::Halftime);
    }

    #[test]
    fn in_progress_third_quarter_is_live() {
        assert_eq!(classify("In Progress", 3, Some("10:21")), GamePhase::Live);
    }

    #[test]
    fn second_quarter_with_time_left_is_live() {
        assert_eq!(classify("In Progress", 2, Some("8:45")), GamePhase::Live);
    }

    #[test]
    fn final_variants() {
        assert_eq!(classify("Final", 4, Some("0:00")), GamePhase::Final);
        assert_eq!(classify("Final/OT", 5, Some("0:00")), GamePhase::Final);
    }

    #[test]
    fn pregame_variants_are_scheduled() {
        assert_eq!(classify("Scheduled", 0, None), GamePhase::Scheduled);
        assert_eq!(classify("Postponed", 0, None), GamePhase::Scheduled);
    }

    #[test]
    fn case_insensitive_matching() {
        assert_eq!(classify("HALFTIME", 2, None), GamePhase::Halftime);
        assert_eq!(classify("end of 2nd quarter", 2, Some("0:00")), GamePhase::Halftime);
    }

    #[test]
    fn unknown_in_game_text_defaults_to_live() {
        assert_eq!(classify("End of 3rd Quarter", 3, Some("0:00")), GamePhase::Live);
    }

    #[test]
    fn phase_round_trips_through_str() {
        for phase in [
            GamePhase::Scheduled,
            GamePhase::Live,
            GamePhase::Halftime,
            GamePhase::Final,
        ] {
            assert_eq!(GamePhase::parse(phase.as_str()), Some(phase));
        }
    }
}
