pub const WEEKS_PER_YEAR: f64 = 52.0;
pub const MONTHS_PER_YEAR: f64 = 12.0;

/// Average number of working days in a month for the given week length.
pub fn days_per_month(days_per_week: u32) -> f64 {
    days_per_week as f64 * WEEKS_PER_YEAR / MONTHS_PER_YEAR
}

/// Convert man-days to man-months. `None` when the week has no working days.
pub fn man_days_to_man_months(man_days: u32, days_per_week: u32) -> Option<f64> {
    if days_per_week == 0 {
        return None;
    }
    Some(man_days as f64 / days_per_month(days_per_week))
}
