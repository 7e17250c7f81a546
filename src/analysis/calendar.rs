use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub const CALENDAR_DAYS_PER_WEEK: u32 = 7;
pub const DEFAULT_BUSINESS_DAYS_PER_WEEK: u32 = 5;

pub trait CalendarService: Send + Sync {
    fn set_business_day_mode(&self, enabled: bool);
    fn days_per_week(&self) -> u32;
    /// Week length used in business-day mode.
    fn set_business_days_per_week(&self, days: u32);
}

/// Calendar switching between a working week and a seven-day week.
#[derive(Debug)]
pub struct WorkingCalendar {
    business_mode: AtomicBool,
    business_days_per_week: AtomicU32,
}

impl WorkingCalendar {
    pub fn new() -> Self {
        Self::with_business_days_per_week(DEFAULT_BUSINESS_DAYS_PER_WEEK)
    }

    pub fn with_business_days_per_week(days: u32) -> Self {
        Self {
            business_mode: AtomicBool::new(true),
            business_days_per_week: AtomicU32::new(days.clamp(1, CALENDAR_DAYS_PER_WEEK)),
        }
    }

    pub fn is_business_day_mode(&self) -> bool {
        self.business_mode.load(Ordering::SeqCst)
    }
}

impl Default for WorkingCalendar {
    fn default() -> Self {
        Self::new()
    }
}

impl CalendarService for WorkingCalendar {
    fn set_business_day_mode(&self, enabled: bool) {
        self.business_mode.store(enabled, Ordering::SeqCst);
    }

    fn days_per_week(&self) -> u32 {
        if self.is_business_day_mode() {
            self.business_days_per_week.load(Ordering::SeqCst)
        } else {
            CALENDAR_DAYS_PER_WEEK
        }
    }

    fn set_business_days_per_week(&self, days: u32) {
        self.business_days_per_week
            .store(days.clamp(1, CALENDAR_DAYS_PER_WEEK), Ordering::SeqCst);
    }
}
