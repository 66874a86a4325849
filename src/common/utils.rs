//! Utility functions for shardlocate

use std::time::Duration;

/// Parse duration string (e.g., "500ms", "30s", "5m", "1h")
pub fn parse_duration(s: &str) -> crate::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::InvalidConfig("empty duration".into()));
    }

    let (num_str, unit) = if let Some(num) = s.strip_suffix("ms") {
        (num, "ms")
    } else {
        let split = s.len() - s.chars().last().map(char::len_utf8).unwrap_or(0);
        (&s[..split], &s[split..])
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| crate::Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let secs_per_unit = match unit {
        "ms" => return Ok(Duration::from_millis(num)),
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => {
            return Err(crate::Error::InvalidConfig(format!(
                "unknown duration unit: {}",
                unit
            )))
        }
    };
    let secs = num
        .checked_mul(secs_per_unit)
        .ok_or_else(|| crate::Error::InvalidConfig(format!("duration out of range: {}", s)))?;

    Ok(Duration::from_secs(secs))
}

/// Join a coordination-service parent path and a child name
pub fn join_path(parent: &str, child: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), child)
}
