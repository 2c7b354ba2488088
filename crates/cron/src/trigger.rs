//! Next-fire computation for parsed schedules.
//!
//! Candidates are generated on the local wall clock of the descriptor's
//! timezone and mapped back to instants. Local times skipped by a DST gap
//! never fire; local times repeated by a DST fold fire once, at the earlier
//! instant. Schedules with a wildcard minute or hour therefore do not fire
//! during the repeated hour at all: `* * * * *` in Europe/Rome goes from
//! 02:59 CEST straight to 03:00 CET.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
};

use crate::expr::ScheduleDescriptor;

/// Give up after this many years without a match (e.g. `0 0 31 2 *`).
const SEARCH_HORIZON_YEARS: i32 = 400;

/// The earliest instant strictly after `reference` matching the schedule,
/// or `None` if nothing matches within the search horizon.
pub fn next_fire_after(
    descriptor: &ScheduleDescriptor,
    reference: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let tz = descriptor.timezone();
    let local = reference.with_timezone(&tz).naive_local();
    let start = local.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);

    let last_year = start.year() + SEARCH_HORIZON_YEARS;
    let (mut year, mut month) = (start.year(), start.month());
    while year <= last_year {
        if descriptor.month().contains(month)
            && let Some(found) = scan_month(descriptor, reference, start, year, month)
        {
            return Some(found);
        }
        (year, month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
    }
    None
}

/// The next `count` fire times after `reference`, in order.
pub fn upcoming(
    descriptor: &ScheduleDescriptor,
    reference: DateTime<Utc>,
    count: usize,
) -> Vec<DateTime<Utc>> {
    let mut out = Vec::with_capacity(count);
    let mut cursor = reference;
    while out.len() < count {
        let Some(next) = next_fire_after(descriptor, cursor) else {
            break;
        };
        out.push(next);
        cursor = next;
    }
    out
}

/// Whether a calendar day satisfies the day-of-month, day-of-week and nth
/// constraints together.
pub fn day_matches(descriptor: &ScheduleDescriptor, date: NaiveDate) -> bool {
    let day = date.day();
    descriptor.day_of_month().contains(day)
        && descriptor
            .day_of_week()
            .contains(date.weekday().num_days_from_sunday())
        && descriptor
            .nth()
            .is_none_or(|n| (day - 1) / 7 + 1 == u32::from(n))
}

fn scan_month(
    descriptor: &ScheduleDescriptor,
    reference: DateTime<Utc>,
    start: NaiveDateTime,
    year: i32,
    month: u32,
) -> Option<DateTime<Utc>> {
    let tz = descriptor.timezone();
    let start_date = start.date();

    for day in 1..=31 {
        let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
            continue;
        };
        if date < start_date || !day_matches(descriptor, date) {
            continue;
        }
        let same_day = date == start_date;
        for hour in descriptor.hour().values() {
            if same_day && hour < start.hour() {
                continue;
            }
            let same_hour = same_day && hour == start.hour();
            for minute in descriptor.minute().values() {
                if same_hour && minute < start.minute() {
                    continue;
                }
                let Some(naive) = date.and_hms_opt(hour, minute, 0) else {
                    continue;
                };
                let instant = match tz.from_local_datetime(&naive) {
                    LocalResult::Single(t) => t,
                    LocalResult::Ambiguous(earliest, _) => earliest,
                    LocalResult::None => continue,
                };
                let instant = instant.with_timezone(&Utc);
                if instant > reference {
                    return Some(instant);
                }
            }
        }
    }
    None
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::expr::parse_schedule,
        chrono_tz::{Europe::Rome, Tz, UTC},
        proptest::prelude::*,
        rstest::rstest,
        std::str::FromStr,
    };

    fn at(tz: Tz, y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        tz.with_ymd_and_hms(y, mo, d, h, mi, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc)
    }

    fn next(expr: &str, tz: Tz, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        next_fire_after(&parse_schedule(expr, tz).unwrap(), reference)
    }

    #[test]
    fn monday_nine_from_sunday_noon() {
        // 2024-06-02 is a Sunday.
        let got = next("0 9 * * 1", Rome, at(Rome, 2024, 6, 2, 12, 0)).unwrap();
        assert_eq!(got, at(Rome, 2024, 6, 3, 9, 0));
    }

    #[test]
    fn first_monday_of_month() {
        // 2024-07-01 is a Monday.
        let got = next("0 9 * * 1#1", Rome, at(Rome, 2024, 6, 15, 0, 0)).unwrap();
        assert_eq!(got, at(Rome, 2024, 7, 1, 9, 0));
        let after = next("0 9 * * 1#1", Rome, got).unwrap();
        assert_eq!(after, at(Rome, 2024, 8, 5, 9, 0));
    }

    #[test]
    fn fifth_friday_skips_months_without_one() {
        // March 2024 has Fridays 1, 8, 15, 22, 29; April has none on a fifth week;
        // May 2024 has Fridays 3..31.
        let got = next("0 9 * * 5#5", UTC, at(UTC, 2024, 3, 30, 0, 0)).unwrap();
        assert_eq!(got, at(UTC, 2024, 5, 31, 9, 0));
    }

    #[test]
    fn reference_exactly_on_fire_time_moves_on() {
        let reference = at(UTC, 2024, 6, 3, 9, 0);
        let got = next("0 9 * * *", UTC, reference).unwrap();
        assert_eq!(got, at(UTC, 2024, 6, 4, 9, 0));
    }

    #[test]
    fn sub_minute_reference_rounds_up() {
        let reference = at(UTC, 2024, 6, 3, 8, 59) + Duration::seconds(30);
        let got = next("0 9 * * *", UTC, reference).unwrap();
        assert_eq!(got, at(UTC, 2024, 6, 3, 9, 0));
    }

    #[test]
    fn day_fields_are_anded() {
        // The 13th that is also a Friday: 2024-09-13.
        let got = next("0 0 13 * 5", UTC, at(UTC, 2024, 1, 1, 0, 0)).unwrap();
        assert_eq!(got, at(UTC, 2024, 9, 13, 0, 0));
    }

    #[test]
    fn leap_day() {
        let got = next("0 12 29 2 *", UTC, at(UTC, 2025, 1, 1, 0, 0)).unwrap();
        assert_eq!(got, at(UTC, 2028, 2, 29, 12, 0));
    }

    #[test]
    fn impossible_date_never_fires() {
        assert_eq!(next("0 0 31 2 *", UTC, at(UTC, 2024, 1, 1, 0, 0)), None);
    }

    #[test]
    fn spring_forward_gap_is_skipped() {
        // Europe/Rome jumps 02:00 -> 03:00 on 2024-03-31.
        let got = next("30 2 * * *", Rome, at(Rome, 2024, 3, 30, 12, 0)).unwrap();
        assert_eq!(got, at(Rome, 2024, 4, 1, 2, 30));
    }

    #[test]
    fn fall_back_fold_fires_once_at_earlier_instant() {
        // Europe/Rome repeats 02:00-03:00 on 2024-10-27.
        let reference = at(Rome, 2024, 10, 26, 12, 0);
        let first = next("30 2 * * *", Rome, reference).unwrap();
        assert_eq!(first, Utc.with_ymd_and_hms(2024, 10, 27, 0, 30, 0).unwrap());
        let second = next("30 2 * * *", Rome, first).unwrap();
        assert_eq!(second, at(Rome, 2024, 10, 28, 2, 30));
    }

    #[test]
    fn fold_repeated_hour_is_not_fired_again() {
        // 02:59 CEST on 2024-10-27 is 00:59 UTC; 03:00 CET is 02:00 UTC.
        let last_summer_minute = Utc.with_ymd_and_hms(2024, 10, 27, 0, 59, 0).unwrap();
        let first_winter_minute = Utc.with_ymd_and_hms(2024, 10, 27, 2, 0, 0).unwrap();
        assert_eq!(
            next("* * * * *", Rome, last_summer_minute),
            Some(first_winter_minute)
        );
        // From inside the repeated hour, the next fire is still 03:00 CET.
        let second_pass = Utc.with_ymd_and_hms(2024, 10, 27, 1, 30, 0).unwrap();
        assert_eq!(
            next("* * * * *", Rome, second_pass),
            Some(first_winter_minute)
        );
    }

    #[test]
    fn timezone_shifts_the_instant() {
        let reference = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let rome = next("0 9 * * *", Rome, reference).unwrap();
        let utc = next("0 9 * * *", UTC, reference).unwrap();
        assert_eq!(utc - rome, Duration::hours(1));
    }

    #[test]
    fn upcoming_lists_in_order() {
        let d = parse_schedule("0 9 * * 1-5", UTC).unwrap();
        // 2024-06-07 is a Friday.
        let list = upcoming(&d, at(UTC, 2024, 6, 7, 10, 0), 3);
        assert_eq!(list, vec![
            at(UTC, 2024, 6, 10, 9, 0),
            at(UTC, 2024, 6, 11, 9, 0),
            at(UTC, 2024, 6, 12, 9, 0),
        ]);
        assert!(upcoming(&parse_schedule("0 0 30 2 *", UTC).unwrap(), Utc::now(), 2).is_empty());
    }

    /// Cross-check against the `cron` crate for expressions it reads the same
    /// way (no day-of-week restriction, no `#n`).
    #[rstest]
    #[case("0 9 * * *")]
    #[case("30 14 1 * *")]
    #[case("0,15,30,45 8-18 * * *")]
    #[case("0 0 1 1,4,7,10 *")]
    #[case("5 23 28-31 * *")]
    fn agrees_with_cron_crate(#[case] expr: &str) {
        let oracle = cron::Schedule::from_str(&format!("0 {expr} *")).unwrap();
        let ours = parse_schedule(expr, UTC).unwrap();
        let mut reference = Utc.with_ymd_and_hms(2023, 12, 30, 17, 42, 11).unwrap();
        for _ in 0..50 {
            let expected = oracle.after(&reference).next().unwrap();
            let got = next_fire_after(&ours, reference).unwrap();
            assert_eq!(got, expected, "{expr} after {reference}");
            reference = got;
        }
    }

    proptest! {
        #[test]
        fn next_fire_is_strictly_later_and_matches(
            minute in 0u32..60,
            hour in 0u32..24,
            weekday in 0u32..7,
            offset_mins in 0i64..(3 * 366 * 24 * 60),
        ) {
            let expr = format!("{minute} {hour} * * {weekday}");
            let d = parse_schedule(&expr, Rome).unwrap();
            let reference = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(offset_mins)
                + Duration::seconds(offset_mins % 60);
            let fire = next_fire_after(&d, reference).unwrap();
            prop_assert!(fire > reference);
            prop_assert!(fire - reference <= Duration::days(15));
            let local = fire.with_timezone(&Rome);
            prop_assert_eq!(local.minute(), minute);
            prop_assert_eq!(local.weekday().num_days_from_sunday(), weekday);
            prop_assert!(day_matches(&d, local.date_naive()));
        }

        #[test]
        fn nth_weekday_lands_in_its_week(
            weekday in 0u32..7,
            n in 1u8..=5,
            offset_days in 0i64..(2 * 366),
        ) {
            let d = parse_schedule(&format!("0 9 * * {weekday}#{n}"), UTC).unwrap();
            let reference = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + Duration::days(offset_days);
            let fire = next_fire_after(&d, reference).unwrap();
            prop_assert!(fire > reference);
            prop_assert_eq!(fire.weekday().num_days_from_sunday(), weekday);
            prop_assert_eq!((fire.day() - 1) / 7 + 1, u32::from(n));
        }
    }
}
