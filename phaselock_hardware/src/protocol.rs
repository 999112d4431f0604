//! Thorlabs Elliptec ASCII protocol (ELL14 rotation mount).
//!
//! Commands are `{address}{command}{data}` with no terminator; replies end
//! in CR LF. Positions travel as 32-bit two's-complement hex.
use crate::error::{HwError, Result};

/// 143 360 pulses per revolution.
pub const DEFAULT_PULSES_PER_DEGREE: f64 = 398.2222;

pub const STATUS_OK: u8 = 0;
pub const STATUS_BUSY: u8 = 9;

/// A decoded device reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `PO`: position in pulses, sent when a move or home finishes.
    Position(i32),
    /// `GS`: status code, see [`status_text`].
    Status(u8),
    /// Any other reply type, kept by its two-letter code.
    Other(String),
}

/// Validate a bus address: one hex digit, case-insensitive.
pub fn parse_address(s: &str) -> Result<char> {
    let mut chars = s.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_hexdigit() => Ok(c.to_ascii_uppercase()),
        _ => Err(HwError::InvalidArgument(format!(
            "address must be one hex digit, got {s:?}"
        ))),
    }
}

/// Convert a rotation to device pulses, rounding to the nearest pulse.
pub fn degrees_to_pulses(degrees: f64, pulses_per_degree: f64) -> Result<i32> {
    let pulses = (degrees * pulses_per_degree).round();
    if !pulses.is_finite() || pulses < f64::from(i32::MIN) || pulses > f64::from(i32::MAX) {
        return Err(HwError::InvalidArgument(format!(
            "rotation {degrees}° is not representable in pulses"
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    let pulses = pulses as i32;
    Ok(pulses)
}

pub fn pulses_to_degrees(pulses: i32, pulses_per_degree: f64) -> f64 {
    f64::from(pulses) / pulses_per_degree
}

pub fn encode_move_relative(address: char, pulses: i32) -> String {
    // Two's-complement reinterpretation is the wire format.
    #[allow(clippy::cast_sign_loss)]
    let raw = pulses as u32;
    format!("{address}mr{raw:08X}")
}

pub fn encode_home(address: char) -> String {
    format!("{address}ho0")
}

pub fn encode_get_status(address: char) -> String {
    format!("{address}gs")
}

/// Decode one reply line addressed to `address`.
pub fn parse_reply(address: char, line: &str) -> Result<Reply> {
    let line = line.trim();
    let mut chars = line.chars();
    let from = chars
        .next()
        .ok_or_else(|| HwError::Protocol("empty reply".into()))?;
    if !from.eq_ignore_ascii_case(&address) {
        return Err(HwError::Protocol(format!(
            "reply from address {from}, expected {address}: {line:?}"
        )));
    }
    let rest = chars.as_str();
    let (code, payload) = match (rest.get(..2), rest.get(2..)) {
        (Some(code), Some(payload)) => (code, payload.trim()),
        _ => return Err(HwError::Protocol(format!("truncated reply {line:?}"))),
    };
    match code {
        "PO" => {
            // "0PO" alone means position zero.
            if payload.is_empty() {
                return Ok(Reply::Position(0));
            }
            let raw = u32::from_str_radix(payload.get(..8).unwrap_or(payload), 16)
                .map_err(|e| HwError::Protocol(format!("bad position {payload:?}: {e}")))?;
            #[allow(clippy::cast_possible_wrap)]
            let pulses = raw as i32;
            Ok(Reply::Position(pulses))
        }
        "GS" => {
            if payload.is_empty() {
                return Ok(Reply::Status(STATUS_OK));
            }
            u8::from_str_radix(payload, 16)
                .map(Reply::Status)
                .map_err(|e| HwError::Protocol(format!("bad status {payload:?}: {e}")))
        }
        other => Ok(Reply::Other(other.to_string())),
    }
}

pub fn status_text(code: u8) -> &'static str {
    match code {
        0 => "ok",
        1 => "communication timeout",
        2 => "mechanical timeout",
        3 => "command error or not supported",
        4 => "value out of range",
        5 => "module isolated",
        6 => "module out of isolation",
        7 => "initializing error",
        8 => "thermal error",
        9 => "busy",
        10 => "sensor error",
        11 => "motor error",
        12 => "out of range",
        13 => "over current error",
        _ => "reserved",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(45.0, 17920)]
    #[case(90.0, 35840)]
    #[case(-7.5, -2987)]
    #[case(0.0, 0)]
    fn converts_degrees_to_pulses(#[case] deg: f64, #[case] pulses: i32) {
        assert_eq!(degrees_to_pulses(deg, DEFAULT_PULSES_PER_DEGREE).unwrap(), pulses);
    }

    #[test]
    fn rejects_unrepresentable_rotation() {
        assert!(degrees_to_pulses(f64::NAN, DEFAULT_PULSES_PER_DEGREE).is_err());
        assert!(degrees_to_pulses(1e10, DEFAULT_PULSES_PER_DEGREE).is_err());
    }

    #[test]
    fn encodes_commands() {
        assert_eq!(encode_move_relative('0', 0x2000), "0mr00002000");
        assert_eq!(encode_move_relative('A', -1), "AmrFFFFFFFF");
        assert_eq!(encode_home('0'), "0ho0");
        assert_eq!(encode_get_status('3'), "3gs");
    }

    #[rstest]
    #[case("0PO00002000\r\n", Reply::Position(0x2000))]
    #[case("0POFFFFF448", Reply::Position(-3000))]
    #[case("0PO", Reply::Position(0))]
    #[case("0GS00", Reply::Status(STATUS_OK))]
    #[case("0GS09", Reply::Status(STATUS_BUSY))]
    #[case("0GS0D", Reply::Status(13))]
    #[case("0IN0E1140", Reply::Other("IN".into()))]
    fn parses_replies(#[case] line: &str, #[case] expected: Reply) {
        assert_eq!(parse_reply('0', line).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("1GS00")]
    #[case("0G")]
    #[case("0POXYZ")]
    #[case("0GSZZ")]
    fn rejects_malformed_replies(#[case] line: &str) {
        assert!(matches!(parse_reply('0', line), Err(HwError::Protocol(_))));
    }

    #[test]
    fn address_is_one_hex_digit() {
        assert_eq!(parse_address("a").unwrap(), 'A');
        assert_eq!(parse_address(" 0 ").unwrap(), '0');
        assert!(parse_address("10").is_err());
        assert!(parse_address("G").is_err());
        assert!(parse_address("").is_err());
    }

    #[test]
    fn status_codes_have_text() {
        assert_eq!(status_text(STATUS_BUSY), "busy");
        assert_eq!(status_text(200), "reserved");
    }
}
