//! Temporal index over game events.
//!
//! Everything time-shaped in the pipeline funnels through here: per-game
//! score trajectories answering "what was the point differential at or
//! before time t", and per-game event-time indexes answering "when was the
//! last break strictly before t" / "the next timeout strictly after t".
//! Lookups are binary searches over per-game vectors sorted by elapsed time;
//! events sharing a timestamp keep input order, so the latest one wins an
//! at-or-before lookup.

use polars::prelude::*;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// Which side of the scoreline a differential is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perspective {
    Away,
    Home,
}

impl Perspective {
    /// Sign applied to the stored away-minus-home differential.
    pub fn sign(self) -> i64 {
        match self {
            Perspective::Away => 1,
            Perspective::Home => -1,
        }
    }
}

/// Score trajectory of a single game: `(elapsed_seconds, away - home)` per
/// event, sorted by elapsed time with input order preserved among ties.
#[derive(Debug, Default)]
pub struct ScoreTimeline {
    samples: Vec<(i64, i64)>,
}

impl ScoreTimeline {
    /// Differential at the last event at or before `t`, signed for the given
    /// perspective. `None` when `t` precedes every event.
    pub fn diff_at(&self, t: i64, perspective: Perspective) -> Option<i64> {
        let idx = self.samples.partition_point(|&(time, _)| time <= t);
        if idx == 0 {
            return None;
        }
        let (_, away_minus_home) = self.samples[idx - 1];
        Some(perspective.sign() * away_minus_home)
    }
}

/// Score trajectories for every game in a play-by-play frame.
#[derive(Debug, Default)]
pub struct GameTimelines {
    games: HashMap<i64, ScoreTimeline>,
}

impl GameTimelines {
    /// Build trajectories from a frame carrying `game_id`, `elapsed_seconds`,
    /// `away_score`, and `home_score`. Rows with a null in any of those are
    /// skipped.
    pub fn from_events(df: &DataFrame) -> Result<Self, TimelineError> {
        let game_ids = df.column("game_id")?.cast(&DataType::Int64)?;
        let times = df.column("elapsed_seconds")?.cast(&DataType::Int64)?;
        let away = df.column("away_score")?.cast(&DataType::Int64)?;
        let home = df.column("home_score")?.cast(&DataType::Int64)?;
        let (game_ids, times) = (game_ids.i64()?, times.i64()?);
        let (away, home) = (away.i64()?, home.i64()?);

        let mut games: HashMap<i64, ScoreTimeline> = HashMap::new();
        for i in 0..df.height() {
            if let (Some(game), Some(t), Some(a), Some(h)) =
                (game_ids.get(i), times.get(i), away.get(i), home.get(i))
            {
                games
                    .entry(game)
                    .or_default()
                    .samples
                    .push((t, a - h));
            }
        }
        for timeline in games.values_mut() {
            timeline.samples.sort_by_key(|&(time, _)| time);
        }
        Ok(Self { games })
    }

    pub fn diff_at(&self, game: i64, t: i64, perspective: Perspective) -> Option<i64> {
        self.games.get(&game)?.diff_at(t, perspective)
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}

/// Sorted event times per game, for strict neighbor lookups.
#[derive(Debug, Default)]
pub struct EventIndex {
    events: HashMap<i64, Vec<i64>>,
}

impl EventIndex {
    /// Build from a frame carrying `game_id` and `elapsed_seconds`. Rows with
    /// a null in either are skipped.
    pub fn from_frame(df: &DataFrame) -> Result<Self, TimelineError> {
        let game_ids = df.column("game_id")?.cast(&DataType::Int64)?;
        let times = df.column("elapsed_seconds")?.cast(&DataType::Int64)?;
        let (game_ids, times) = (game_ids.i64()?, times.i64()?);

        let mut events: HashMap<i64, Vec<i64>> = HashMap::new();
        for i in 0..df.height() {
            if let (Some(game), Some(t)) = (game_ids.get(i), times.get(i)) {
                events.entry(game).or_default().push(t);
            }
        }
        for times in events.values_mut() {
            times.sort_unstable();
        }
        Ok(Self { events })
    }

    /// Time of the last indexed event strictly before `t`, if any.
    pub fn last_before(&self, game: i64, t: i64) -> Option<i64> {
        let times = self.events.get(&game)?;
        let idx = times.partition_point(|&time| time < t);
        if idx == 0 {
            None
        } else {
            Some(times[idx - 1])
        }
    }

    /// Time of the first indexed event strictly after `t`, if any.
    pub fn next_after(&self, game: i64, t: i64) -> Option<i64> {
        let times = self.events.get(&game)?;
        let idx = times.partition_point(|&time| time <= t);
        times.get(idx).copied()
    }

    /// Whether any indexed event lies within `window` seconds of `t`,
    /// inclusive on both ends.
    pub fn any_within(&self, game: i64, t: i64, window: i64) -> bool {
        let Some(times) = self.events.get(&game) else {
            return false;
        };
        let idx = times.partition_point(|&time| time < t - window);
        times.get(idx).is_some_and(|&time| time <= t + window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    fn sample_events() -> DataFrame {
        df!(
            "game_id" => [1i64, 1, 1, 1, 2],
            "elapsed_seconds" => [0i64, 60, 60, 300, 10],
            "away_score" => [0i64, 2, 4, 4, 3],
            "home_score" => [0i64, 0, 0, 6, 0],
        )
        .unwrap()
    }

    #[test]
    fn diff_at_picks_last_event_at_or_before() {
        let timelines = GameTimelines::from_events(&sample_events()).unwrap();
        assert_eq!(timelines.diff_at(1, 0, Perspective::Away), Some(0));
        assert_eq!(timelines.diff_at(1, 59, Perspective::Away), Some(0));
        assert_eq!(timelines.diff_at(1, 299, Perspective::Away), Some(4));
        assert_eq!(timelines.diff_at(1, 1000, Perspective::Away), Some(-2));
    }

    #[test]
    fn diff_at_ties_keep_input_order() {
        // Two events at t=60; the later row (4-0) must win.
        let timelines = GameTimelines::from_events(&sample_events()).unwrap();
        assert_eq!(timelines.diff_at(1, 60, Perspective::Away), Some(4));
    }

    #[test]
    fn diff_at_signs_by_perspective() {
        let timelines = GameTimelines::from_events(&sample_events()).unwrap();
        assert_eq!(timelines.diff_at(1, 300, Perspective::Away), Some(-2));
        assert_eq!(timelines.diff_at(1, 300, Perspective::Home), Some(2));
    }

    #[test]
    fn diff_at_before_first_event_is_none() {
        let timelines = GameTimelines::from_events(&sample_events()).unwrap();
        assert_eq!(timelines.diff_at(2, 5, Perspective::Away), None);
    }

    #[test]
    fn diff_at_unknown_game_is_none() {
        let timelines = GameTimelines::from_events(&sample_events()).unwrap();
        assert_eq!(timelines.diff_at(99, 100, Perspective::Away), None);
    }

    #[test]
    fn null_rows_are_skipped() {
        let df = df!(
            "game_id" => [Some(1i64), None, Some(1)],
            "elapsed_seconds" => [Some(0i64), Some(10), Some(20)],
            "away_score" => [Some(0i64), Some(2), None],
            "home_score" => [Some(0i64), Some(0), Some(0)],
        )
        .unwrap();
        let timelines = GameTimelines::from_events(&df).unwrap();
        // Only the t=0 row survives.
        assert_eq!(timelines.diff_at(1, 100, Perspective::Away), Some(0));
    }

    fn sample_index() -> EventIndex {
        let df = df!(
            "game_id" => [1i64, 1, 1, 2],
            "elapsed_seconds" => [0i64, 300, 300, 50],
        )
        .unwrap();
        EventIndex::from_frame(&df).unwrap()
    }

    #[test]
    fn last_before_is_strict() {
        let index = sample_index();
        assert_eq!(index.last_before(1, 300), Some(0));
        assert_eq!(index.last_before(1, 301), Some(300));
        assert_eq!(index.last_before(1, 0), None);
    }

    #[test]
    fn next_after_is_strict() {
        let index = sample_index();
        assert_eq!(index.next_after(1, 0), Some(300));
        assert_eq!(index.next_after(1, 300), None);
        assert_eq!(index.next_after(1, -5), Some(0));
        assert_eq!(index.next_after(2, 50), None);
    }

    #[test]
    fn unknown_game_has_no_neighbors() {
        let index = sample_index();
        assert_eq!(index.last_before(9, 100), None);
        assert_eq!(index.next_after(9, 100), None);
    }

    #[test]
    fn any_within_is_inclusive_on_both_ends() {
        let index = sample_index();
        assert!(index.any_within(1, 300, 60));
        assert!(index.any_within(1, 360, 60));
        assert!(index.any_within(1, 240, 60));
        assert!(!index.any_within(1, 361, 60));
        assert!(!index.any_within(1, 150, 60));
        assert!(!index.any_within(9, 300, 60));
    }
}
