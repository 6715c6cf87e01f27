//! Go-style duration strings (`300ms`, `1h30m`, `24h0m0s`)
//!
//! IPNS lifetimes and TTLs travel in this syntax both on the wire to the
//! endpoint and in queued update messages.

use std::time::Duration;

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Parse a duration such as `24h`, `1h30m` or `1.5s`.
///
/// Negative durations are rejected; `0` alone is accepted.
pub fn parse_go_duration(input: &str) -> Result<Duration, String> {
    let invalid = || format!("invalid duration {:?}", input);

    let mut rest = input.trim();
    if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix('-') {
        if stripped == "0" {
            return Ok(Duration::ZERO);
        }
        return Err(format!("negative duration {:?}", input));
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let whole_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (whole, after_whole) = rest.split_at(whole_len);

        let (fraction, after_number) = match after_whole.strip_prefix('.') {
            Some(tail) => {
                let frac_len = tail.bytes().take_while(u8::is_ascii_digit).count();
                tail.split_at(frac_len)
            }
            None => ("", after_whole),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }

        let unit_len = after_number
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map(|(i, _)| i)
            .unwrap_or(after_number.len());
        let (unit, tail) = after_number.split_at(unit_len);
        let scale = unit_nanos(unit).ok_or_else(|| {
            if unit.is_empty() {
                format!("missing unit in duration {:?}", input)
            } else {
                format!("unknown unit {:?} in duration {:?}", unit, input)
            }
        })?;

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut value = whole.checked_mul(scale).ok_or_else(invalid)?;

        // Digits past nanosecond precision cannot contribute
        let fraction = &fraction[..fraction.len().min(18)];
        if !fraction.is_empty() {
            let digits: u128 = fraction.parse().map_err(|_| invalid())?;
            let divisor = 10u128.pow(fraction.len() as u32);
            value = value
                .checked_add(digits * scale / divisor)
                .ok_or_else(invalid)?;
        }

        total = total.checked_add(value).ok_or_else(invalid)?;
        rest = tail;
    }

    let secs = u64::try_from(total / NANOS_PER_SECOND).map_err(|_| invalid())?;
    Ok(Duration::new(secs, (total % NANOS_PER_SECOND) as u32))
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(NANOS_PER_SECOND),
        "m" => Some(60 * NANOS_PER_SECOND),
        "h" => Some(3_600 * NANOS_PER_SECOND),
        _ => None,
    }
}

/// Render a duration the way Go's `Duration.String` does
pub fn format_go_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }

    if nanos < NANOS_PER_SECOND {
        return if nanos < 1_000 {
            format!("{}ns", nanos)
        } else if nanos < 1_000_000 {
            format!("{}µs", decimal(nanos, 3))
        } else {
            format!("{}ms", decimal(nanos, 6))
        };
    }

    let hours = nanos / (3_600 * NANOS_PER_SECOND);
    let minutes = (nanos / (60 * NANOS_PER_SECOND)) % 60;
    let seconds = decimal(nanos % (60 * NANOS_PER_SECOND), 9);

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// `value / 10^places` with trailing fractional zeros dropped
fn decimal(value: u128, places: u32) -> String {
    let divisor = 10u128.pow(places);
    let whole = value / divisor;
    let fraction = value % divisor;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0width$}", fraction, width = places as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}
