//! Stage 2: sample control events with the same scoring context.

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::data::loader;
use crate::stages::{self, StageError};
use crate::timeline::{GameTimelines, Perspective};

/// Build the raw control table: a uniform sample of non-timeout events, each
/// viewed from a randomly drawn away/home perspective, with the same
/// differential and break computations as the treatment table. Writes
/// `nontimeouts_raw.csv` and returns the frame.
pub fn run(config: &PipelineConfig) -> Result<DataFrame, StageError> {
    let pbp = loader::load_play_by_play(&config.inputs.play_by_play)?;
    let teams = loader::load_team_directory(&config.inputs.teams)?;
    info!(events = pbp.height(), "loaded play-by-play");

    let timelines = GameTimelines::from_events(&pbp)?;
    let breaks = stages::break_index(&pbp)?;

    // Controls need an acting team for identity attribution.
    let eligible = pbp
        .lazy()
        .filter(
            col("event_type")
                .neq(lit("timeout"))
                .and(col("team").is_not_null())
                .and(col("team").neq(lit(""))),
        )
        .collect()?;
    info!(rows = eligible.height(), "control-eligible events");

    let mut rng = match config.control.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let n = config.control.sample_size.min(eligible.height());
    if n < config.control.sample_size {
        warn!(
            requested = config.control.sample_size,
            available = eligible.height(),
            "fewer eligible events than the requested sample size, taking all"
        );
    }
    let picks = rand::seq::index::sample(&mut rng, eligible.height(), n).into_vec();
    let indices = IdxCa::from_vec(
        "sample".into(),
        picks.iter().map(|&i| i as IdxSize).collect(),
    );
    let mut sampled = eligible.take(&indices)?;
    info!(rows = sampled.height(), "sampled control events");

    // Each control row reads the scoreline from a random side.
    let perspectives: Vec<Option<Perspective>> = (0..n)
        .map(|_| {
            Some(if rng.gen_bool(0.5) {
                Perspective::Away
            } else {
                Perspective::Home
            })
        })
        .collect();

    let games = loader::int_column(&sampled, "game_id")?;
    let times = loader::int_column(&sampled, "elapsed_seconds")?;
    let away = loader::int_column(&sampled, "away_score")?;
    let home = loader::int_column(&sampled, "home_score")?;

    let point_diffs: Vec<Option<i64>> = (0..n)
        .map(|i| match (perspectives[i], away[i], home[i]) {
            (Some(p), Some(a), Some(h)) => Some(p.sign() * (a - h)),
            _ => None,
        })
        .collect();
    let rows: Vec<stages::LookupRow> = (0..n)
        .map(|i| stages::LookupRow {
            game: games[i],
            t: times[i],
            perspective: perspectives[i],
        })
        .collect();
    let (past, future) = stages::offset_diffs(&timelines, &rows, config.windows.offset_secs);
    let since_break = stages::time_since_last_break(&breaks, &games, &times);

    sampled.with_column(Column::new("point_diff".into(), point_diffs))?;
    sampled.with_column(Column::new("past_point_diff".into(), past))?;
    sampled.with_column(Column::new("future_point_diff".into(), future))?;
    sampled.with_column(Column::new("time_since_last_break".into(), since_break))?;

    // Identity comes from the acting team, resolved via the directory.
    let resolved = sampled
        .lazy()
        .with_column(col("team").str().to_lowercase().alias("initials"))
        .join(
            teams.lazy().select([col("initials"), col("team_id")]),
            [col("initials")],
            [col("initials")],
            JoinArgs::new(JoinType::Left),
        )
        .filter(col("team_id").is_not_null())
        .collect()?;
    let unresolved = sampled.height().saturating_sub(resolved.height());
    if unresolved > 0 {
        warn!(unresolved, "dropped control events with unknown team initials");
    }

    let mut output = stages::stage_output(resolved, 0)?;
    loader::write_csv(&mut output, &config.nontimeouts_raw_csv())?;
    info!(
        rows = output.height(),
        path = %config.nontimeouts_raw_csv().display(),
        "wrote raw control table"
    );
    Ok(output)
}
