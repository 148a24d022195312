//! Pipeline stages.
//!
//! Four batch stages, run in order: `timeouts` and `nontimeouts` build the
//! treatment and control tables from the raw season data, `prepare` strips
//! contaminated controls, and `assemble` emits the final analysis table.
//! Shared here: the stage output schema, break-event matching, and the
//! parallel temporal lookups both extraction stages use.

pub mod assemble;
pub mod nontimeouts;
pub mod prepare;
pub mod timeouts;

use polars::prelude::*;
use rayon::prelude::*;
use thiserror::Error;
use tracing::info;

use crate::config::PipelineConfig;
use crate::data::loader::LoaderError;
use crate::timeline::{EventIndex, GameTimelines, Perspective, TimelineError};

#[derive(Debug, Error)]
pub enum StageError {
    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Timeline(#[from] TimelineError),
}

/// Column order shared by the stage-1/2 outputs.
pub(crate) const STAGE_COLUMNS: [&str; 11] = [
    "game_id",
    "date",
    "period",
    "team_id",
    "elapsed_seconds",
    "elapsed_seconds_quarter",
    "point_diff",
    "past_point_diff",
    "future_point_diff",
    "time_since_last_break",
    "treatment",
];

/// Run all four stages in order.
pub fn run_all(config: &PipelineConfig) -> Result<(), StageError> {
    info!("stage 1/4: timeouts");
    timeouts::run(config)?;
    info!("stage 2/4: nontimeouts");
    nontimeouts::run(config)?;
    info!("stage 3/4: prepare");
    prepare::run(config)?;
    info!("stage 4/4: assemble");
    assemble::run(config)?;
    Ok(())
}

/// A break is anything that stops play: period boundaries and timeouts.
pub(crate) fn is_break_event() -> Expr {
    col("event_type")
        .eq(lit("start of period"))
        .or(col("event_type").eq(lit("timeout")))
        .or(col("event_type").eq(lit("end of period")))
}

/// Break times per game over the full event log.
pub(crate) fn break_index(pbp: &DataFrame) -> Result<EventIndex, StageError> {
    let breaks = pbp
        .clone()
        .lazy()
        .filter(is_break_event())
        .select([col("game_id"), col("elapsed_seconds")])
        .collect()?;
    Ok(EventIndex::from_frame(&breaks)?)
}

/// One row's keys into the temporal indexes.
pub(crate) struct LookupRow {
    pub game: Option<i64>,
    pub t: Option<i64>,
    pub perspective: Option<Perspective>,
}

/// Point differentials at `t - offset` and `t + offset` for each row, read
/// off the full game trajectory under the row's perspective.
pub(crate) fn offset_diffs(
    timelines: &GameTimelines,
    rows: &[LookupRow],
    offset: i64,
) -> (Vec<Option<i64>>, Vec<Option<i64>>) {
    rows.par_iter()
        .map(|row| match (row.game, row.t, row.perspective) {
            (Some(game), Some(t), Some(perspective)) => (
                timelines.diff_at(game, t - offset, perspective),
                timelines.diff_at(game, t + offset, perspective),
            ),
            _ => (None, None),
        })
        .unzip()
}

/// Seconds since the last break strictly before each row's time.
pub(crate) fn time_since_last_break(
    breaks: &EventIndex,
    games: &[Option<i64>],
    times: &[Option<i64>],
) -> Vec<Option<i64>> {
    games
        .par_iter()
        .zip(times.par_iter())
        .map(|(game, t)| match (game, t) {
            (Some(game), Some(t)) => breaks.last_before(*game, *t).map(|b| *t - b),
            _ => None,
        })
        .collect()
}

/// Project a stage frame onto the shared output schema with its treatment
/// marker.
pub(crate) fn stage_output(df: DataFrame, treatment: i64) -> Result<DataFrame, StageError> {
    Ok(df
        .lazy()
        .select([
            col("game_id"),
            col("date"),
            col("period"),
            col("team_id"),
            col("elapsed_seconds"),
            col("elapsed_seconds_quarter"),
            col("point_diff"),
            col("past_point_diff"),
            col("future_point_diff"),
            col("time_since_last_break"),
            lit(treatment).alias("treatment"),
        ])
        .collect()?)
}
