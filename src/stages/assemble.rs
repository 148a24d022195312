//! Stage 4: merge treatment and control rows into the analysis table.

use polars::prelude::*;
use tracing::info;

use crate::config::{PipelineConfig, WindowConfig, PERIOD_SECONDS};
use crate::data::loader;
use crate::stages::{StageError, STAGE_COLUMNS};

/// Final output columns, in order.
const ANALYSIS_COLUMNS: [&str; 6] = [
    "treatment",
    "outcome",
    "scoring_run",
    "coach_exp",
    "time_since_last_break",
    "point_diff",
];

/// Build the analysis table: stack the treatment and filtered control rows,
/// join coach experience, derive `scoring_run` and `outcome`, drop rows with
/// missing identity or outcomes, and trim rows too close to a quarter
/// boundary. Writes `nba_timeouts_analysis.csv` and returns the frame.
pub fn run(config: &PipelineConfig) -> Result<DataFrame, StageError> {
    let treatments = loader::load_stage_output(&config.timeouts_csv())?;
    let controls = loader::load_stage_output(&config.nontimeouts_csv())?;
    let coaches = loader::load_coaches(&config.inputs.coaches)?;
    info!(
        treatments = treatments.height(),
        controls = controls.height(),
        "loaded stage outputs"
    );

    let combined = stack_stage_frames(&treatments, &controls)?;
    let mut output = finalize(combined, coaches, &config.windows)?;
    loader::write_csv(&mut output, &config.analysis_csv())?;
    info!(
        rows = output.height(),
        path = %config.analysis_csv().display(),
        "wrote analysis table"
    );
    Ok(output)
}

/// Stack two stage outputs after projecting both onto the shared schema.
fn stack_stage_frames(a: &DataFrame, b: &DataFrame) -> Result<DataFrame, StageError> {
    let left = a.select(STAGE_COLUMNS)?;
    let right = b.select(STAGE_COLUMNS)?;
    Ok(left.vstack(&right)?)
}

/// Derivations, null drops, and quarter trimming over the combined frame.
fn finalize(
    combined: DataFrame,
    coaches: DataFrame,
    windows: &WindowConfig,
) -> Result<DataFrame, StageError> {
    let lower = windows.quarter_trim_secs;
    let upper = PERIOD_SECONDS - windows.quarter_trim_secs;
    Ok(combined
        .lazy()
        .join(
            coaches.lazy(),
            [col("team_id")],
            [col("team_id")],
            JoinArgs::new(JoinType::Left),
        )
        .with_columns([
            (col("point_diff") - col("past_point_diff")).alias("scoring_run"),
            (col("future_point_diff") - col("point_diff")).alias("outcome"),
        ])
        .filter(col("team_id").is_not_null())
        .filter(
            col("outcome")
                .is_not_null()
                .and(col("scoring_run").is_not_null()),
        )
        .filter(col("time_since_last_break").is_not_null())
        .filter(
            col("elapsed_seconds_quarter")
                .gt_eq(lit(lower))
                .and(col("elapsed_seconds_quarter").lt_eq(lit(upper))),
        )
        .select(ANALYSIS_COLUMNS.map(col))
        .collect()?)
}
