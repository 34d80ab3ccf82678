/// Parses a feed duration string into whole seconds.
///
/// Accepts plain integer seconds (`"90"`), `M:S` (`"3:20"`), and `H:M:S`
/// (`"1:02:03"`). Anything else is unknown and yields `None`.
pub fn parse_duration_string(raw: &str) -> Option<i32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parts: Vec<&str> = trimmed.split(':').collect();

    let numbers: Option<Vec<i32>> = parts
        .iter()
        .map(|p| p.parse::<i32>().ok().filter(|n| *n >= 0))
        .collect();
    let numbers = numbers?;

    match numbers.as_slice() {
        [seconds] => Some(*seconds),
        [minutes, seconds] => Some(minutes * 60 + seconds),
        [hours, minutes, seconds] => Some(hours * 3600 + minutes * 60 + seconds),
        _ => None,
    }
}

/// Formats whole seconds as `H:MM:SS` for itunes:duration tags.
pub fn format_hms(total_seconds: i64) -> String {
    let total_seconds = total_seconds.max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{hours}:{minutes:02}:{seconds:02}")
}

/// Truncates to at most `max_chars` characters, replacing the tail with an
/// ellipsis when the input is longer.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }

    let kept: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{kept}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_seconds() {
        assert_eq!(parse_duration_string("90"), Some(90));
        assert_eq!(parse_duration_string(" 0 "), Some(0));
    }

    #[test]
    fn parses_colon_forms() {
        assert_eq!(parse_duration_string("3:20"), Some(200));
        assert_eq!(parse_duration_string("1:02:03"), Some(3723));
        assert_eq!(parse_duration_string("0:59"), Some(59));
    }

    #[test]
    fn malformed_is_unknown() {
        assert_eq!(parse_duration_string(""), None);
        assert_eq!(parse_duration_string("abc"), None);
        assert_eq!(parse_duration_string("1:2:3:4"), None);
        assert_eq!(parse_duration_string("-5"), None);
        assert_eq!(parse_duration_string("1:-2"), None);
    }

    #[test]
    fn formats_hms() {
        assert_eq!(format_hms(0), "0:00:00");
        assert_eq!(format_hms(59), "0:00:59");
        assert_eq!(format_hms(3723), "1:02:03");
        assert_eq!(format_hms(45 * 60), "0:45:00");
    }

    #[test]
    fn truncates_long_titles() {
        let long = "a".repeat(100);
        let truncated = truncate_with_ellipsis(&long, 80);
        assert_eq!(truncated.chars().count(), 80);
        assert!(truncated.ends_with('…'));

        assert_eq!(truncate_with_ellipsis("short", 80), "short");
    }
}
