use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;

use crate::error::CoreError;
use crate::recurrence::normalize_to_local_date;

/// Source of "today" for the engine. Injected so tests stay deterministic.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Wall clock reporting the current date in a fixed timezone.
#[derive(Debug, Clone)]
pub struct SystemClock {
    timezone: Tz,
}

impl SystemClock {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// Builds a clock from an IANA timezone name such as `Europe/Berlin`.
    pub fn from_name(timezone: &str) -> Result<Self, CoreError> {
        let tz: Tz = timezone
            .parse()
            .map_err(|_| CoreError::InvalidInput(format!("Invalid timezone: {}", timezone)))?;
        Ok(Self::new(tz))
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        normalize_to_local_date(Utc::now(), self.timezone)
    }
}

/// Clock frozen at a given date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(FixedClock(day).today(), day);
    }

    #[test]
    fn test_system_clock_from_name() {
        assert!(SystemClock::from_name("America/New_York").is_ok());
        assert!(matches!(
            SystemClock::from_name("Invalid/Timezone"),
            Err(CoreError::InvalidInput(_))
        ));
    }
}
