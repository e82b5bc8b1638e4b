use chrono::{DateTime, Local};

/// Formats a millisecond score as seconds with millisecond precision,
/// e.g. 17000 -> "17.000".
pub fn format_score_ms(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

/// Date a leaderboard entry was recorded, for display next to the name.
pub fn format_recorded_at(at: DateTime<Local>) -> String {
    at.format("%Y/%m/%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_score_ms() {
        assert_eq!(format_score_ms(0), "0.000");
        assert_eq!(format_score_ms(17_000), "17.000");
        assert_eq!(format_score_ms(12_345), "12.345");
        assert_eq!(format_score_ms(999), "0.999");
        assert_eq!(format_score_ms(61_001), "61.001");
    }

    #[test]
    fn test_format_recorded_at() {
        let at = Local.with_ymd_and_hms(2026, 8, 30, 9, 15, 0).unwrap();
        assert_eq!(format_recorded_at(at), "2026/08/30");
    }
}
