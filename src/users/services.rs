use std::ops::RangeInclusive;

use time::Date;

use super::dto::{DailySummary, EntryView};
use crate::store::FoodEntry;

/// Accepted daily calorie goals.
pub const GOAL_RANGE: RangeInclusive<i32> = 1000..=5000;

pub fn validate_goal(goal: i32) -> Result<i32, String> {
    if GOAL_RANGE.contains(&goal) {
        Ok(goal)
    } else {
        Err(format!(
            "daily goal must be between {} and {} calories",
            GOAL_RANGE.start(),
            GOAL_RANGE.end()
        ))
    }
}

pub fn daily_summary(date: Date, goal: i32, entries: Vec<FoodEntry>) -> DailySummary {
    let eaten: i64 = entries.iter().map(|e| i64::from(e.calories)).sum();
    let goal_wide = i64::from(goal);
    let progress_percent = if goal_wide > 0 {
        (eaten as f64 / goal_wide as f64 * 100.0).round() as i64
    } else {
        0
    };
    DailySummary {
        date,
        goal,
        eaten,
        remaining: goal_wide - eaten,
        progress_percent,
        entries: entries.into_iter().map(EntryView::from).collect(),
    }
}
