//! CSV Loader Module
//! Handles CSV ingestion, column normalization, and output writing using Polars.

use polars::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::config::PERIOD_SECONDS;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("input file not found: {path}")]
    FileNotFound { path: PathBuf },
    #[error("failed to load CSV: {0}")]
    CsvError(#[from] PolarsError),
    #[error("missing column `{column}` in {table}")]
    MissingColumn { column: String, table: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Numeric columns shared by the intermediate stage outputs. Re-reads cast
/// them back to Int64 so a file where a column happens to be all-null still
/// lines up for concatenation.
const STAGE_INT_COLUMNS: [&str; 9] = [
    "game_id",
    "period",
    "elapsed_seconds",
    "elapsed_seconds_quarter",
    "point_diff",
    "past_point_diff",
    "future_point_diff",
    "time_since_last_break",
    "treatment",
];

/// Read a CSV with the season-data settings: inferred schema, lossy UTF-8
/// (the play-by-play export is Latin-1), malformed cells tolerated.
fn read_csv(path: &Path) -> Result<DataFrame, LoaderError> {
    if !path.exists() {
        return Err(LoaderError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let df = LazyCsvReader::new(path)
        .with_infer_schema_length(Some(10_000))
        .with_ignore_errors(true)
        .with_encoding(CsvEncoding::LossyUtf8)
        .finish()?
        .collect()?;
    Ok(df)
}

fn ensure_columns(df: &DataFrame, table: &str, columns: &[&str]) -> Result<(), LoaderError> {
    for column in columns {
        if df.column(column).is_err() {
            return Err(LoaderError::MissingColumn {
                column: (*column).to_string(),
                table: table.to_string(),
            });
        }
    }
    Ok(())
}

/// Parse a raw game id: any non-digit prefix is a dataset tag, the digits are
/// the key shared with the schedule.
pub fn parse_game_id(raw: &str) -> Option<i64> {
    let digits = raw.trim().trim_start_matches(|c: char| !c.is_ascii_digit());
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Parse an `h:mm:ss` elapsed-within-period clock into seconds.
pub fn parse_elapsed(raw: &str) -> Option<i64> {
    let mut parts = raw.trim().split(':');
    let (h, m, s) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let (h, m, s): (i64, i64, i64) = (h.parse().ok()?, m.parse().ok()?, s.parse().ok()?);
    if h < 0 || !(0..60).contains(&m) || !(0..60).contains(&s) {
        return None;
    }
    Some(h * 3600 + m * 60 + s)
}

/// Load the play-by-play log and derive the elapsed-time axes.
///
/// Adds `elapsed_seconds_quarter` and `elapsed_seconds`, replaces `game_id`
/// with its parsed numeric key, trims the string columns the pipeline matches
/// on, and returns the frame sorted by `elapsed_seconds` with input order
/// preserved among ties. Rows whose `game_id`, `period`, or `elapsed` fail to
/// parse are dropped with a logged count.
pub fn load_play_by_play(path: &Path) -> Result<DataFrame, LoaderError> {
    let mut df = read_csv(path)?;
    ensure_columns(
        &df,
        "play-by-play log",
        &[
            "game_id",
            "date",
            "period",
            "away_score",
            "home_score",
            "elapsed",
            "team",
            "event_type",
            "type",
            "description",
        ],
    )?;

    let height = df.height();
    let mut game_ids: Vec<Option<i64>> = Vec::with_capacity(height);
    let mut quarter_secs: Vec<Option<i64>> = Vec::with_capacity(height);
    let mut game_secs: Vec<Option<i64>> = Vec::with_capacity(height);
    let mut keep: Vec<bool> = Vec::with_capacity(height);
    {
        let raw_ids = df.column("game_id")?.cast(&DataType::String)?;
        let raw_elapsed = df.column("elapsed")?.cast(&DataType::String)?;
        let periods = df.column("period")?.cast(&DataType::Int64)?;
        let (raw_ids, raw_elapsed, periods) = (raw_ids.str()?, raw_elapsed.str()?, periods.i64()?);

        for i in 0..height {
            let id = raw_ids.get(i).and_then(parse_game_id);
            let secs = raw_elapsed.get(i).and_then(parse_elapsed);
            match (id, secs, periods.get(i)) {
                (Some(id), Some(secs), Some(period)) => {
                    game_ids.push(Some(id));
                    quarter_secs.push(Some(secs));
                    game_secs.push(Some(secs + (period - 1) * PERIOD_SECONDS));
                    keep.push(true);
                }
                _ => {
                    game_ids.push(None);
                    quarter_secs.push(None);
                    game_secs.push(None);
                    keep.push(false);
                }
            }
        }
    }
    let dropped = keep.iter().filter(|kept| !**kept).count();
    if dropped > 0 {
        warn!(
            dropped,
            "dropping play-by-play rows with unparseable game_id/period/elapsed"
        );
    }

    df.with_column(Column::new("game_id".into(), game_ids))?;
    df.with_column(Column::new("elapsed_seconds_quarter".into(), quarter_secs))?;
    df.with_column(Column::new("elapsed_seconds".into(), game_secs))?;

    // The raw export carries stray whitespace in the columns used for
    // event matching and team resolution.
    for name in ["event_type", "type", "team", "description"] {
        let trimmed = trimmed_string_column(&df, name)?;
        df.with_column(Column::new(name.into(), trimmed))?;
    }
    for name in ["away_score", "home_score"] {
        let cast = df.column(name)?.cast(&DataType::Int64)?;
        df.with_column(cast)?;
    }

    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    let df = df.filter(&mask)?;
    let df = df.sort(
        ["elapsed_seconds"],
        SortMultipleOptions::default().with_maintain_order(true),
    )?;
    Ok(df)
}

/// Load the team directory: `nickname` and `initials` lowercased for
/// case-insensitive joins, `SHORT NAME` renamed to `team_id`.
pub fn load_team_directory(path: &Path) -> Result<DataFrame, LoaderError> {
    let df = read_csv(path)?;
    ensure_columns(&df, "team directory", &["NICKNAME", "INITIALS", "SHORT NAME"])?;
    let df = df
        .lazy()
        .select([
            col("NICKNAME")
                .cast(DataType::String)
                .str()
                .to_lowercase()
                .alias("nickname"),
            col("INITIALS")
                .cast(DataType::String)
                .str()
                .to_lowercase()
                .alias("initials"),
            col("SHORT NAME").cast(DataType::String).alias("team_id"),
        ])
        .collect()?;
    Ok(df)
}

/// Load the season schedule: `game_id`, `road_team`, `home_team`.
pub fn load_schedule(path: &Path) -> Result<DataFrame, LoaderError> {
    let df = read_csv(path)?;
    ensure_columns(&df, "schedule", &["GAME ID", "ROAD TEAM", "HOME TEAM"])?;
    let df = df
        .lazy()
        .select([
            col("GAME ID").cast(DataType::Int64).alias("game_id"),
            col("ROAD TEAM").cast(DataType::String).alias("road_team"),
            col("HOME TEAM").cast(DataType::String).alias("home_team"),
        ])
        .collect()?;
    Ok(df)
}

/// Load the coach experience table keyed by `team_id`.
pub fn load_coaches(path: &Path) -> Result<DataFrame, LoaderError> {
    let df = read_csv(path)?;
    ensure_columns(&df, "coaches table", &["team_id", "coach_exp"])?;
    let df = df
        .lazy()
        .select([
            col("team_id").cast(DataType::String),
            col("coach_exp").cast(DataType::Float64),
        ])
        .collect()?;

    // A duplicate team would multiply rows through the later left join.
    let team_ids = str_column(&df, "team_id")?;
    let mut seen = std::collections::HashSet::new();
    for team in team_ids.into_iter().flatten() {
        if !seen.insert(team.clone()) {
            warn!(team_id = %team, "duplicate team in coaches table");
        }
    }
    Ok(df)
}

/// Re-read an intermediate stage output with its dtypes normalized.
pub fn load_stage_output(path: &Path) -> Result<DataFrame, LoaderError> {
    let mut df = read_csv(path)?;
    for name in STAGE_INT_COLUMNS {
        if df.column(name).is_ok() {
            let cast = df.column(name)?.cast(&DataType::Int64)?;
            df.with_column(cast)?;
        }
    }
    for name in ["date", "team_id"] {
        if df.column(name).is_ok() {
            let cast = df.column(name)?.cast(&DataType::String)?;
            df.with_column(cast)?;
        }
    }
    Ok(df)
}

/// Write a frame as CSV with a header, creating parent directories as needed.
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<(), LoaderError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = std::fs::File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

/// Extract a column as `Vec<Option<i64>>`, casting if necessary.
pub fn int_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>, LoaderError> {
    let cast = df.column(name)?.cast(&DataType::Int64)?;
    Ok(cast.i64()?.into_iter().collect())
}

/// Extract a column as `Vec<Option<String>>`, casting if necessary.
pub fn str_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, LoaderError> {
    let cast = df.column(name)?.cast(&DataType::String)?;
    Ok(cast
        .str()?
        .into_iter()
        .map(|value| value.map(|s| s.to_string()))
        .collect())
}

fn trimmed_string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, LoaderError> {
    let cast = df.column(name)?.cast(&DataType::String)?;
    Ok(cast
        .str()?
        .into_iter()
        .map(|value| value.map(|s| s.trim().to_string()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_game_ids() {
        assert_eq!(parse_game_id("0021800001"), Some(21_800_001));
        assert_eq!(parse_game_id("G0021800500"), Some(21_800_500));
        assert_eq!(parse_game_id(" 0021800001 "), Some(21_800_001));
        assert_eq!(parse_game_id("JUNKROW"), None);
        assert_eq!(parse_game_id(""), None);
    }

    #[test]
    fn parses_elapsed_clocks() {
        assert_eq!(parse_elapsed("0:00:00"), Some(0));
        assert_eq!(parse_elapsed("0:11:34"), Some(694));
        assert_eq!(parse_elapsed("0:12:00"), Some(720));
        assert_eq!(parse_elapsed("1:00:05"), Some(3605));
        assert_eq!(parse_elapsed("0:61:00"), None);
        assert_eq!(parse_elapsed("12:00"), None);
        assert_eq!(parse_elapsed("junk"), None);
    }

    #[test]
    fn play_by_play_derives_axes_and_drops_junk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pbp.csv");
        std::fs::write(
            &path,
            "game_id,date,period,away_score,home_score,elapsed,team,event_type,type,description\n\
             JUNKROW,junk,,,,junk,,junk,junk,junk\n\
             0021800001,2018-10-16,2,10,8,0:01:30,GS , timeout,\" timeout: regular\",Warriors timeout: regular\n\
             0021800001,2018-10-16,1,2,0,0:01:00,GS,shot,jump shot,Curry 3pt\n",
        )
        .unwrap();

        let df = load_play_by_play(&path).unwrap();
        assert_eq!(df.height(), 2);

        let games = int_column(&df, "game_id").unwrap();
        assert_eq!(games, vec![Some(21_800_001), Some(21_800_001)]);

        // Sorted by elapsed_seconds: the period-1 row first.
        let elapsed = int_column(&df, "elapsed_seconds").unwrap();
        assert_eq!(elapsed, vec![Some(60), Some(720 + 90)]);
        let quarter = int_column(&df, "elapsed_seconds_quarter").unwrap();
        assert_eq!(quarter, vec![Some(60), Some(90)]);

        // Matching columns come back trimmed.
        let event_types = str_column(&df, "event_type").unwrap();
        assert_eq!(
            event_types,
            vec![Some("shot".to_string()), Some("timeout".to_string())]
        );
        let subtypes = str_column(&df, "type").unwrap();
        assert_eq!(subtypes[1], Some("timeout: regular".to_string()));
    }

    #[test]
    fn team_directory_lowercases_join_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("teams.csv");
        std::fs::write(
            &path,
            "NICKNAME,INITIALS,SHORT NAME,FULL NAME\n\
             Warriors,GS,GS,Golden State Warriors\n\
             Spurs,SA,SA,San Antonio Spurs\n",
        )
        .unwrap();

        let df = load_team_directory(&path).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(
            df.get_column_names()
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>(),
            vec!["nickname", "initials", "team_id"]
        );
        let nicknames = str_column(&df, "nickname").unwrap();
        assert_eq!(nicknames[0], Some("warriors".to_string()));
        let initials = str_column(&df, "initials").unwrap();
        assert_eq!(initials[1], Some("sa".to_string()));
    }

    #[test]
    fn missing_column_is_reported_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.csv");
        std::fs::write(&path, "GAME ID,ROAD TEAM\n1,GS\n").unwrap();

        let err = load_schedule(&path).unwrap_err();
        match err {
            LoaderError::MissingColumn { column, table } => {
                assert_eq!(column, "HOME TEAM");
                assert_eq!(table, "schedule");
            }
            other => panic!("expected MissingColumn, got: {other}"),
        }
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_schedule(Path::new("/nonexistent/schedule.csv")).unwrap_err();
        assert!(matches!(err, LoaderError::FileNotFound { .. }));
    }
}
