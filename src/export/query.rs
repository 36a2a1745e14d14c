//! Export query parameter validation.
//!
//! The export surface rejects bad input up front with a client error; nothing
//! is partially processed. Limits are clamped rather than rejected.

use chrono::NaiveDate;
use thiserror::Error;

use crate::config::ExportConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid limit '{0}': expected an integer")]
    InvalidLimit(String),
    #[error("unknown format '{0}': expected 'json' or 'csv'")]
    UnknownFormat(String),
    #[error("game_id parameter is required and cannot be empty")]
    MissingGameId,
    #[error("invalid game_id: only alphanumeric characters, hyphens, and underscores are allowed")]
    InvalidGameId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

/// Validated parameters for the snapshot export query.
#[derive(Debug, Clone)]
pub struct ExportQuery {
    pub game_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: i64,
    pub format: ExportFormat,
}

pub fn validate_export_query(
    game_id: Option<&str>,
    start_date: Option<&str>,
    end_date: Option<&str>,
    limit: Option<&str>,
    format: Option<&str>,
    config: &ExportConfig,
) -> Result<ExportQuery, QueryError> {
    let game_id = match game_id {
        Some(id) if !id.trim().is_empty() => {
            validate_game_id(id)?;
            Some(id.to_string())
        }
        _ => None,
    };

    let start_date = start_date.map(parse_date).transpose()?;
    let end_date = end_date.map(parse_date).transpose()?;

    let limit = match limit {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| QueryError::InvalidLimit(raw.to_string()))?,
        None => config.default_limit,
    }
    .clamp(1, config.max_limit);

    let format = match format {
        None => ExportFormat::Json,
        Some(raw) => match raw.to_lowercase().as_str() {
            "json" => ExportFormat::Json,
            "csv" => ExportFormat::Csv,
            _ => return Err(QueryError::UnknownFormat(raw.to_string())),
        },
    };

    Ok(ExportQuery {
        game_id,
        start_date,
        end_date,
        limit,
        format,
    })
}

/// Strict calendar date: `2025-13-01` is rejected, not wrapped.
pub fn parse_date(raw: &str) -> Result<NaiveDate, QueryError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| QueryError::InvalidDate(raw.to_string()))
}

/// Per-game export game ids: required, alphanumeric/hyphen/underscore only.
pub fn validate_game_id(game_id: &str) -> Result<(), QueryError> {
    if game_id.trim().is_empty() {
        return Err(QueryError::MissingGameId);
    }
    if !game_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(QueryError::InvalidGameId);
    }
    Ok(())
}
