//! Cron expression parsing.
//!
//! Accepts the five-field form `minute hour day-of-month month day-of-week`
//! plus the presets `@daily`, `@midnight`, `@weekly` and `@monthly`. Each
//! field is `*`, an integer, an `a-b` range, or a comma list of those. The
//! day-of-week field may carry a `#n` suffix selecting the nth occurrence of
//! a single weekday within the month (`1#1` is the first Monday).
//!
//! Day-of-week uses standard cron numbering: `0` and `7` are Sunday, `1` is
//! Monday. When both day fields are restricted, a day must satisfy both.

use std::fmt;

use chrono_tz::Tz;

use crate::error::{Error, Result, ScheduleFormatError};

/// Human-readable field order, quoted in format errors.
pub const EXPECTED_FORMAT: &str = "minute hour day-of-month month day-of-week";

const PRESETS: &[(&str, &str)] = &[
    ("@daily", "0 0 * * *"),
    ("@midnight", "0 0 * * *"),
    ("@weekly", "0 0 * * 0"),
    ("@monthly", "0 0 1 * *"),
];

const MAX_NTH: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl FieldKind {
    const ALL: [Self; 5] = [
        Self::Minute,
        Self::Hour,
        Self::DayOfMonth,
        Self::Month,
        Self::DayOfWeek,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::DayOfMonth => "day-of-month",
            Self::Month => "month",
            Self::DayOfWeek => "day-of-week",
        }
    }

    /// Inclusive bounds accepted in the expression text.
    pub fn bounds(self) -> (u32, u32) {
        match self {
            Self::Minute => (0, 59),
            Self::Hour => (0, 23),
            Self::DayOfMonth => (1, 31),
            Self::Month => (1, 12),
            Self::DayOfWeek => (0, 7),
        }
    }
}

/// The values one field allows, as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSet {
    bits: u64,
    wildcard: bool,
}

impl FieldSet {
    pub fn parse(kind: FieldKind, raw: &str) -> std::result::Result<Self, String> {
        let (lo, hi) = kind.bounds();
        if raw == "*" {
            let mut set = Self {
                bits: 0,
                wildcard: true,
            };
            for v in lo..=hi {
                set.insert(kind, v);
            }
            return Ok(set);
        }

        let mut set = Self {
            bits: 0,
            wildcard: false,
        };
        for item in raw.split(',') {
            if item.is_empty() {
                return Err(format!("empty list item in '{raw}'"));
            }
            let (start, end) = match item.split_once('-') {
                Some((a, b)) => (parse_number(a)?, parse_number(b)?),
                None => {
                    let v = parse_number(item)?;
                    (v, v)
                },
            };
            if start > end {
                return Err(format!("range {start}-{end} is reversed"));
            }
            if start < lo || end > hi {
                return Err(format!("value out of range {lo}-{hi} in '{item}'"));
            }
            for v in start..=end {
                set.insert(kind, v);
            }
        }
        Ok(set)
    }

    fn insert(&mut self, kind: FieldKind, value: u32) {
        // Sunday is both 0 and 7.
        let value = if kind == FieldKind::DayOfWeek && value == 7 {
            0
        } else {
            value
        };
        self.bits |= 1 << value;
    }

    pub fn contains(&self, value: u32) -> bool {
        value < 64 && self.bits & (1 << value) != 0
    }

    /// Whether the field was written as `*`.
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Allowed values in ascending order.
    pub fn values(&self) -> impl Iterator<Item = u32> + '_ {
        (0..64).filter(|v| self.contains(*v))
    }

    /// The only allowed value, if exactly one.
    pub fn single(&self) -> Option<u32> {
        (self.bits.count_ones() == 1).then(|| self.bits.trailing_zeros())
    }
}

fn parse_number(s: &str) -> std::result::Result<u32, String> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("'{s}' is not a number"));
    }
    s.parse::<u32>().map_err(|_| format!("'{s}' is not a number"))
}

/// A validated, immutable schedule: the five fields, the optional nth
/// occurrence, and the timezone they are evaluated in.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleDescriptor {
    expression: String,
    fields: [String; 5],
    minute: FieldSet,
    hour: FieldSet,
    day_of_month: FieldSet,
    month: FieldSet,
    day_of_week: FieldSet,
    nth: Option<u8>,
    timezone: Tz,
}

impl ScheduleDescriptor {
    /// The expression as supplied (preset or five fields).
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The five fields after preset expansion, day-of-week without `#n`.
    pub fn fields(&self) -> &[String; 5] {
        &self.fields
    }

    /// Five-field form, `#n` included.
    pub fn normalized(&self) -> String {
        let mut out = self.fields.join(" ");
        if let Some(n) = self.nth {
            out.push('#');
            out.push_str(&n.to_string());
        }
        out
    }

    pub fn minute(&self) -> &FieldSet {
        &self.minute
    }

    pub fn hour(&self) -> &FieldSet {
        &self.hour
    }

    pub fn day_of_month(&self) -> &FieldSet {
        &self.day_of_month
    }

    pub fn month(&self) -> &FieldSet {
        &self.month
    }

    pub fn day_of_week(&self) -> &FieldSet {
        &self.day_of_week
    }

    pub fn nth(&self) -> Option<u8> {
        self.nth
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

impl fmt::Display for ScheduleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.expression, self.timezone.name())
    }
}

/// Parse a cron expression into a descriptor evaluated in `timezone`.
pub fn parse_schedule(
    expression: &str,
    timezone: Tz,
) -> std::result::Result<ScheduleDescriptor, ScheduleFormatError> {
    let trimmed = expression.trim();
    let fail = |reason: String| ScheduleFormatError::new(expression, reason);
    if trimmed.is_empty() {
        return Err(fail(format!("expression is empty, expected {EXPECTED_FORMAT}")));
    }

    let expanded = if trimmed.starts_with('@') {
        PRESETS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(trimmed))
            .map(|(_, body)| *body)
            .ok_or_else(|| {
                fail("unknown preset, expected @daily, @midnight, @weekly or @monthly".into())
            })?
    } else {
        trimmed
    };

    let parts: Vec<&str> = expanded.split_whitespace().collect();
    if parts.len() != 5 {
        return Err(fail(format!(
            "expected 5 fields ({EXPECTED_FORMAT}), got {}",
            parts.len()
        )));
    }

    let (dow_raw, nth) = match parts[4].split_once('#') {
        Some((dow, n)) => {
            let n = n
                .parse::<u8>()
                .ok()
                .filter(|n| (1..=MAX_NTH).contains(n))
                .ok_or_else(|| {
                    fail(format!(
                        "nth occurrence must be an integer between 1 and {MAX_NTH}, got '{n}'"
                    ))
                })?;
            (dow, Some(n))
        },
        None => (parts[4], None),
    };

    let mut sets = [FieldSet {
        bits: 0,
        wildcard: false,
    }; 5];
    let raws = [parts[0], parts[1], parts[2], parts[3], dow_raw];
    for ((kind, raw), slot) in FieldKind::ALL.iter().zip(raws).zip(sets.iter_mut()) {
        *slot = FieldSet::parse(*kind, raw)
            .map_err(|reason| fail(format!("{} field: {reason}", kind.name())))?;
    }
    let [minute, hour, day_of_month, month, day_of_week] = sets;

    if nth.is_some() && (day_of_week.is_wildcard() || day_of_week.single().is_none()) {
        return Err(fail(format!(
            "nth occurrence requires a single weekday, got '{dow_raw}'"
        )));
    }

    Ok(ScheduleDescriptor {
        expression: trimmed.to_string(),
        fields: raws.map(str::to_string),
        minute,
        hour,
        day_of_month,
        month,
        day_of_week,
        nth,
        timezone,
    })
}

/// Resolve an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>().map_err(|_| Error::unknown_timezone(name))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn parse(expr: &str) -> std::result::Result<ScheduleDescriptor, ScheduleFormatError> {
        parse_schedule(expr, chrono_tz::Europe::Rome)
    }

    #[rstest]
    #[case("0 9 * * 1")]
    #[case("30 14 * * *")]
    #[case("0 9 1 * *")]
    #[case("0 9 * * 1#1")]
    #[case("0 9 * * 5#5")]
    #[case("0,15,30,45 8-18 * * 1-5")]
    #[case("0 0 * * 7")]
    #[case("  0 9 * * 1  ")]
    #[case("@daily")]
    #[case("@WEEKLY")]
    fn accepts(#[case] expr: &str) {
        assert!(parse(expr).is_ok(), "{expr} should parse");
    }

    #[rstest]
    #[case("", "empty")]
    #[case("0 9 * *", "expected 5 fields")]
    #[case("0 9 * * 1 2026", "expected 5 fields")]
    #[case("60 9 * * *", "minute field")]
    #[case("0 24 * * *", "hour field")]
    #[case("0 9 0 * *", "day-of-month field")]
    #[case("0 9 * 13 *", "month field")]
    #[case("0 9 * * 8", "day-of-week field")]
    #[case("0 9 * * 1#6", "nth occurrence must be")]
    #[case("0 9 * * 1#0", "nth occurrence must be")]
    #[case("0 9 * * 1#x", "nth occurrence must be")]
    #[case("0 9 * * 1#1#2", "nth occurrence must be")]
    #[case("0 9 * * *#1", "single weekday")]
    #[case("0 9 * * 1-5#2", "single weekday")]
    #[case("0 9 * * 1,3#2", "single weekday")]
    #[case("*/5 * * * *", "minute field")]
    #[case("0 9 * * MON", "day-of-week field")]
    #[case("0 17-9 * * *", "reversed")]
    #[case("0 9,,10 * * *", "empty list item")]
    #[case("@yearly", "unknown preset")]
    fn rejects(#[case] expr: &str, #[case] needle: &str) {
        let err = parse(expr).unwrap_err();
        assert_eq!(err.expression, expr);
        assert!(
            err.to_string().contains(needle),
            "error for {expr:?} was {err}, expected it to mention {needle:?}"
        );
    }

    #[test]
    fn field_count_error_names_expected_format() {
        let err = parse("0 9 *").unwrap_err();
        assert!(err.reason.contains(EXPECTED_FORMAT));
    }

    #[rstest]
    #[case("@daily", "0 0 * * *")]
    #[case("@midnight", "0 0 * * *")]
    #[case("@weekly", "0 0 * * 0")]
    #[case("@monthly", "0 0 1 * *")]
    fn presets_expand(#[case] preset: &str, #[case] body: &str) {
        let a = parse(preset).unwrap();
        let b = parse(body).unwrap();
        assert_eq!(a.fields(), b.fields());
        assert_eq!(a.normalized(), body);
        assert_eq!(a.expression(), preset);
        assert_eq!(a.minute(), b.minute());
        assert_eq!(a.day_of_week(), b.day_of_week());
    }

    #[test]
    fn sunday_is_zero_and_seven() {
        let zero = parse("0 0 * * 0").unwrap();
        let seven = parse("0 0 * * 7").unwrap();
        assert_eq!(zero.day_of_week().values().collect::<Vec<_>>(), vec![0]);
        assert_eq!(zero.day_of_week().bits, seven.day_of_week().bits);
    }

    #[test]
    fn nth_is_extracted() {
        let d = parse("0 9 * * 1#1").unwrap();
        assert_eq!(d.nth(), Some(1));
        assert_eq!(d.day_of_week().single(), Some(1));
        assert_eq!(d.fields()[4], "1");
        assert_eq!(d.normalized(), "0 9 * * 1#1");
    }

    #[test]
    fn lists_and_ranges_expand() {
        let d = parse("0,30 8-10 * * 1-5").unwrap();
        assert_eq!(d.minute().values().collect::<Vec<_>>(), vec![0, 30]);
        assert_eq!(d.hour().values().collect::<Vec<_>>(), vec![8, 9, 10]);
        assert_eq!(
            d.day_of_week().values().collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert!(!d.day_of_week().is_wildcard());
        assert!(d.day_of_month().is_wildcard());
        assert!(d.day_of_month().contains(31));
        assert!(!d.day_of_month().contains(0));
    }

    #[test]
    fn descriptor_keeps_timezone() {
        let d = parse_schedule("0 9 * * *", chrono_tz::UTC).unwrap();
        assert_eq!(d.timezone(), chrono_tz::UTC);
        assert_eq!(d.to_string(), "0 9 * * * (UTC)");
    }

    #[test]
    fn timezone_lookup() {
        assert_eq!(
            parse_timezone("Europe/Rome").unwrap(),
            chrono_tz::Europe::Rome
        );
        assert!(matches!(
            parse_timezone("Mars/Olympus"),
            Err(Error::UnknownTimezone { .. })
        ));
    }
}
