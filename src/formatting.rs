use chrono::{Datelike, NaiveDate};

const WEEKDAYS: [&str; 7] = [
    "måndag", "tisdag", "onsdag", "torsdag", "fredag", "lördag", "söndag",
];
const MONTHS: [&str; 12] = [
    "januari",
    "februari",
    "mars",
    "april",
    "maj",
    "juni",
    "juli",
    "augusti",
    "september",
    "oktober",
    "november",
    "december",
];

/// Long Swedish date, e.g. `måndag 15 september 2025`. Input that is not a
/// `YYYY-MM-DD` date is returned as is.
pub fn format_date(date: &str) -> String {
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(parsed) => format!(
            "{} {} {} {}",
            WEEKDAYS[parsed.weekday().num_days_from_monday() as usize],
            parsed.day(),
            MONTHS[parsed.month0() as usize],
            parsed.year()
        ),
        Err(_) => date.to_string(),
    }
}

/// `HH:MM` part of a `HH:MM[:SS]` time.
pub fn format_time(time: &str) -> &str {
    match time.get(..5) {
        Some(hours_minutes) if time.len() == 8 && time.as_bytes()[5] == b':' => hours_minutes,
        _ => time,
    }
}

pub fn format_duration(minutes: u32) -> String {
    if minutes < 60 {
        return format!("{minutes}min");
    }
    let hours = minutes / 60;
    match minutes % 60 {
        0 => format!("{hours}h"),
        remaining => format!("{hours}h {remaining}min"),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test_case::test_case(45, "45min")]
    #[test_case::test_case(60, "1h")]
    #[test_case::test_case(90, "1h 30min")]
    #[test_case::test_case(125, "2h 5min")]
    #[test_case::test_case(0, "0min")]
    fn test_format_duration(minutes: u32, expected: &str) {
        assert_eq!(format_duration(minutes), expected);
    }

    #[test_case::test_case("07:00", "07:00")]
    #[test_case::test_case("07:00:00", "07:00")]
    #[test_case::test_case("soon", "soon")]
    fn test_format_time(time: &str, expected: &str) {
        assert_eq!(format_time(time), expected);
    }

    #[test_case::test_case("2025-09-15", "måndag 15 september 2025")]
    #[test_case::test_case("2025-01-05", "söndag 5 januari 2025")]
    #[test_case::test_case("not a date", "not a date")]
    fn test_format_date(date: &str, expected: &str) {
        assert_eq!(format_date(date), expected);
    }
}
