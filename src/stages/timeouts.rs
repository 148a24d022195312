//! Stage 1: extract timeout events with their scoring context.

use polars::prelude::*;
use tracing::info;

use crate::config::PipelineConfig;
use crate::data::loader;
use crate::stages::{self, StageError};
use crate::timeline::{EventIndex, GameTimelines, Perspective};

/// Build the treatment table: every full (regular or short) timeout, with the
/// calling team's point differential at the stoppage, the differential one
/// offset before and after, and the time since the previous break. Writes
/// `timeouts.csv` and returns the frame.
pub fn run(config: &PipelineConfig) -> Result<DataFrame, StageError> {
    let pbp = loader::load_play_by_play(&config.inputs.play_by_play)?;
    let teams = loader::load_team_directory(&config.inputs.teams)?;
    let schedule = loader::load_schedule(&config.inputs.schedule)?;
    info!(
        events = pbp.height(),
        games = schedule.height(),
        "loaded play-by-play and schedule"
    );

    let timelines = GameTimelines::from_events(&pbp)?;
    let breaks = stages::break_index(&pbp)?;

    // Full timeouts only; 20-second and official timeouts stay out.
    let mut stoppages = pbp
        .lazy()
        .filter(col("event_type").eq(lit("timeout")).and(
            col("type")
                .eq(lit("timeout: regular"))
                .or(col("type").eq(lit("timeout: short"))),
        ))
        .collect()?;
    info!(rows = stoppages.height(), "extracted full timeouts");

    let nicknames = calling_team_nicknames(&stoppages)?;
    stoppages.with_column(Column::new("nickname".into(), nicknames))?;

    let stoppages = stoppages
        .lazy()
        .join(
            teams.lazy().select([col("nickname"), col("team_id")]),
            [col("nickname")],
            [col("nickname")],
            JoinArgs::new(JoinType::Left),
        )
        .join(
            schedule.lazy(),
            [col("game_id")],
            [col("game_id")],
            JoinArgs::new(JoinType::Left),
        )
        .collect()?;

    let enriched = attach_scoring_context(stoppages, &timelines, &breaks, config.windows.offset_secs)?;
    let mut output = stages::stage_output(enriched, 1)?;
    loader::write_csv(&mut output, &config.timeouts_csv())?;
    info!(
        rows = output.height(),
        path = %config.timeouts_csv().display(),
        "wrote timeout table"
    );
    Ok(output)
}

/// The team calling a timeout is named by the first word of the event
/// description ("Warriors timeout: regular").
fn calling_team_nicknames(df: &DataFrame) -> Result<Vec<Option<String>>, StageError> {
    let descriptions = loader::str_column(df, "description")?;
    Ok(descriptions
        .into_iter()
        .map(|description| {
            description.and_then(|d| d.split_whitespace().next().map(|word| word.to_lowercase()))
        })
        .collect())
}

/// Which side of the scoreline the team is on, per the schedule.
fn side_of(team: Option<&str>, road: Option<&str>, home: Option<&str>) -> Option<Perspective> {
    let team = team?;
    if road == Some(team) {
        Some(Perspective::Away)
    } else if home == Some(team) {
        Some(Perspective::Home)
    } else {
        None
    }
}

/// Attach `point_diff`, the offset differentials, and the break distance.
/// Rows whose team resolves to neither schedule side get nulls throughout.
fn attach_scoring_context(
    mut df: DataFrame,
    timelines: &GameTimelines,
    breaks: &EventIndex,
    offset: i64,
) -> Result<DataFrame, StageError> {
    let games = loader::int_column(&df, "game_id")?;
    let times = loader::int_column(&df, "elapsed_seconds")?;
    let away = loader::int_column(&df, "away_score")?;
    let home = loader::int_column(&df, "home_score")?;
    let team_ids = loader::str_column(&df, "team_id")?;
    let road_teams = loader::str_column(&df, "road_team")?;
    let home_teams = loader::str_column(&df, "home_team")?;

    let height = df.height();
    let mut perspectives: Vec<Option<Perspective>> = Vec::with_capacity(height);
    let mut point_diffs: Vec<Option<i64>> = Vec::with_capacity(height);
    for i in 0..height {
        let perspective = side_of(
            team_ids[i].as_deref(),
            road_teams[i].as_deref(),
            home_teams[i].as_deref(),
        );
        let diff = match (perspective, away[i], home[i]) {
            (Some(p), Some(a), Some(h)) => Some(p.sign() * (a - h)),
            _ => None,
        };
        perspectives.push(perspective);
        point_diffs.push(diff);
    }

    let rows: Vec<stages::LookupRow> = (0..height)
        .map(|i| stages::LookupRow {
            game: games[i],
            t: times[i],
            perspective: perspectives[i],
        })
        .collect();
    let (past, future) = stages::offset_diffs(timelines, &rows, offset);
    let since_break = stages::time_since_last_break(breaks, &games, &times);

    df.with_column(Column::new("point_diff".into(), point_diffs))?;
    df.with_column(Column::new("past_point_diff".into(), past))?;
    df.with_column(Column::new("future_point_diff".into(), future))?;
    df.with_column(Column::new("time_since_last_break".into(), since_break))?;
    Ok(df)
}
