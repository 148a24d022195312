//! Stage 3: drop control events contaminated by a nearby timeout.

use polars::prelude::*;
use tracing::info;

use crate::config::PipelineConfig;
use crate::data::loader;
use crate::stages::StageError;
use crate::timeline::EventIndex;

/// Filter the raw control table: a control event within the exclusion window
/// of a timeout in the same game, on either side, is removed. Events with no
/// timeout on a side are unconstrained on that side. Writes
/// `nontimeouts.csv` and returns the frame.
pub fn run(config: &PipelineConfig) -> Result<DataFrame, StageError> {
    let controls = loader::load_stage_output(&config.nontimeouts_raw_csv())?;
    let stoppages = loader::load_stage_output(&config.timeouts_csv())?;
    info!(
        controls = controls.height(),
        timeouts = stoppages.height(),
        "loaded stage outputs"
    );

    let timeout_index = EventIndex::from_frame(&stoppages)?;
    let games = loader::int_column(&controls, "game_id")?;
    let times = loader::int_column(&controls, "elapsed_seconds")?;
    let keep = contamination_mask(
        &timeout_index,
        &games,
        &times,
        config.windows.exclusion_secs,
    );

    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    let mut filtered = controls.filter(&mask)?;
    info!(
        kept = filtered.height(),
        dropped = controls.height() - filtered.height(),
        "removed controls near a timeout"
    );
    loader::write_csv(&mut filtered, &config.nontimeouts_csv())?;
    Ok(filtered)
}

/// True for rows clear of every timeout by more than `window` seconds.
/// Rows that cannot be placed (null keys) are dropped.
fn contamination_mask(
    timeouts: &EventIndex,
    games: &[Option<i64>],
    times: &[Option<i64>],
    window: i64,
) -> Vec<bool> {
    games
        .iter()
        .zip(times.iter())
        .map(|(game, t)| match (game, t) {
            (Some(game), Some(t)) => !timeouts.any_within(*game, *t, window),
            _ => false,
        })
        .collect()
}
