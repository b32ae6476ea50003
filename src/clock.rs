use chrono::{DateTime, Local, MappedLocalTime, NaiveDateTime, TimeDelta, TimeZone, Timelike};

/// Longest forward clock jump searched when a wall-clock time does not exist.
const MAX_GAP_MINUTES: i64 = 24 * 60;

/// Source of local wall-clock time for triggers, file names and retention cutoffs.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Maps a wall-clock time in `tz` to an instant.
///
/// Ambiguous times (clock turned back) take their earlier occurrence. Times
/// skipped by a forward jump resolve to the first instant after the gap.
pub fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&local) {
        MappedLocalTime::Single(instant) => Some(instant),
        MappedLocalTime::Ambiguous(earliest, _) => Some(earliest),
        MappedLocalTime::None => {
            // Offset transitions happen on whole minutes.
            let minute = local.with_second(0)?.with_nanosecond(0)?;
            (1..=MAX_GAP_MINUTES).find_map(|m| {
                let candidate = minute.checked_add_signed(TimeDelta::minutes(m))?;
                tz.from_local_datetime(&candidate).earliest()
            })
        }
    }
}

#[cfg(test)]
pub(crate) struct FixedClock(pub DateTime<Local>);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}


#[cfg(test)]
mod tests {
    use super::test_zone::CentralEurope2026;
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn wall(month: u32, day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, month, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn utc(month: u32, day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&wall(month, day, h, m))
    }

    #[test]
    fn test_resolve_plain_local_time() {
        let resolved = resolve_local(&CentralEurope2026, wall(6, 10, 2, 0)).unwrap();
        assert_eq!(resolved, utc(6, 10, 0, 0));
    }

    #[test]
    fn test_time_in_spring_gap_resolves_to_end_of_gap() {
        let resolved = resolve_local(&CentralEurope2026, wall(3, 29, 2, 30)).unwrap();
        assert_eq!(resolved, utc(3, 29, 1, 0));
        assert_eq!(resolved.naive_local(), wall(3, 29, 3, 0));
    }

    #[test]
    fn test_ambiguous_time_takes_earlier_occurrence() {
        let resolved = resolve_local(&CentralEurope2026, wall(10, 25, 2, 30)).unwrap();
        assert_eq!(resolved, utc(10, 25, 0, 30));
    }
}
