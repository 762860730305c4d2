use time::{Date, OffsetDateTime, UtcOffset};

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

// `YYYY-MM-DD` in JSON, for every calendar date the API exposes.
time::serde::format_description!(pub iso_date, Date, "[year]-[month]-[day]");

/// Calendar date of `now` in the service's fixed zone.
pub fn service_date(now: OffsetDateTime, offset: UtcOffset) -> Date {
    now.to_offset(offset).date()
}

/// Start-of-day instant of `date` in the service's fixed zone.
pub fn start_of_day(date: Date, offset: UtcOffset) -> OffsetDateTime {
    date.midnight().assume_offset(offset)
}

#[cfg(test)]
pub mod fixed {
    use std::sync::Mutex;

    use time::{Duration, OffsetDateTime};

    use super::Clock;

    pub struct FixedClock(Mutex<OffsetDateTime>);

    impl FixedClock {
        pub fn at(now: OffsetDateTime) -> Self {
            Self(Mutex::new(now))
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> OffsetDateTime {
            *self.0.lock().unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime, offset};

    use super::*;

    #[test]
    fn service_date_follows_configured_offset() {
        let now = datetime!(2026-10-16 22:30 UTC);
        assert_eq!(service_date(now, offset!(UTC)), date!(2026 - 10 - 16));
        assert_eq!(service_date(now, offset!(+3)), date!(2026 - 10 - 17));
    }

    #[test]
    fn dates_serialize_as_iso_strings() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Wrapper {
            #[serde(with = "iso_date")]
            day: Date,
        }
        let json = serde_json::to_string(&Wrapper { day: date!(2026 - 11 - 15) }).unwrap();
        assert_eq!(json, r#"{"day":"2026-11-15"}"#);
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.day, date!(2026 - 11 - 15));
    }

    #[test]
    fn start_of_day_is_local_midnight() {
        let instant = start_of_day(date!(2026 - 10 - 17), offset!(+3));
        assert_eq!(instant, datetime!(2026-10-16 21:00 UTC));
    }
}
