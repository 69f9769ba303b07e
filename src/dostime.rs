//! Conversions between Unix time and the MS-DOS packed date-time
//! stamped on every ZIP entry.
//!
//! The DOS format packs a wall-clock calendar date and time into 32 bits:
//!
//! ```text
//! bits  0-4   seconds / 2   (DOS time has 2-second resolution)
//! bits  5-10  minutes
//! bits 11-15  hours
//! bits 16-20  day of month  (1-31)
//! bits 21-24  month         (1-12)
//! bits 25-31  years since 1980
//! ```
//!
//! Seven bits of year puts the representable range at 1980 through 2107.
//! DOS timestamps record no time zone; conversions here pin the wall
//! clock to a fixed zone (UTC-8) so results don't depend on the host's
//! timezone database.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};

/// 1980-01-01 00:00:00 on the codec's wall clock,
/// the earliest moment DOS time can express
pub const MIN_UNIX_TIME: i64 = 315_561_600;

/// 2107-12-31 23:59:59 on the codec's wall clock,
/// the latest moment DOS time can express
pub const MAX_UNIX_TIME: i64 = 4_354_847_999;

/// The fixed wall-clock zone, as seconds east of UTC
const ZONE_OFFSET: i64 = -8 * 3600;

/// Packs Unix seconds into a DOS date-time.
///
/// Times outside the representable range are clamped to its ends.
/// The odd second is lost: `dos_to_unix(unix_to_dos(t))` may be up to
/// one second earlier than `t`.
pub fn unix_to_dos(t: i64) -> u32 {
    let t = t.clamp(MIN_UNIX_TIME, MAX_UNIX_TIME);
    // In range by the clamp above.
    let dt: NaiveDateTime = DateTime::from_timestamp(t + ZONE_OFFSET, 0)
        .expect("clamped timestamp out of chrono range")
        .naive_utc();

    let year = (dt.year() - 1980) as u32;
    (year << 25)
        | (dt.month() << 21)
        | (dt.day() << 16)
        | (dt.hour() << 11)
        | (dt.minute() << 5)
        | (dt.second() / 2)
}

/// Unpacks a DOS date-time into Unix seconds.
///
/// Returns `None` if the packed fields don't name a real calendar date
/// (month 0, day 32, hour 25, ...). The result is always within
/// [`MIN_UNIX_TIME`, `MAX_UNIX_TIME`].
pub fn dos_to_unix(dos: u32) -> Option<i64> {
    let seconds = (dos & 0x1f) * 2;
    let minutes = (dos >> 5) & 0x3f;
    let hours = (dos >> 11) & 0x1f;
    let day = (dos >> 16) & 0x1f;
    let month = (dos >> 21) & 0x0f;
    let year = ((dos >> 25) & 0x7f) as i32 + 1980;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = date.and_hms_opt(hours, minutes, seconds)?;
    Some(time.and_utc().timestamp() - ZONE_OFFSET)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn epoch_packs_to_known_value() {
        // 1980-01-01 00:00:00: year 0, month 1, day 1, midnight.
        assert_eq!(unix_to_dos(315_561_600), 0x0021_0000);
        assert_eq!(unix_to_dos(MIN_UNIX_TIME), 0x0021_0000);
        assert_eq!(dos_to_unix(0x0021_0000), Some(MIN_UNIX_TIME));
    }

    #[test]
    fn clamps_out_of_range_times() {
        assert_eq!(unix_to_dos(0), 0x0021_0000);
        assert_eq!(unix_to_dos(-1), 0x0021_0000);
        assert_eq!(unix_to_dos(MAX_UNIX_TIME + 1), unix_to_dos(MAX_UNIX_TIME));
    }

    #[test]
    fn range_ends_round_trip() {
        // 23:59:59 on 2107-12-31 quantizes down one second.
        assert_eq!(
            dos_to_unix(unix_to_dos(MAX_UNIX_TIME)),
            Some(MAX_UNIX_TIME - 1)
        );
        // The last hours of the range survive, not just the last second.
        let near_top = MAX_UNIX_TIME - 7200;
        assert_eq!(
            dos_to_unix(unix_to_dos(near_top)),
            Some(near_top - near_top % 2)
        );
    }

    #[test]
    fn round_trip_quantizes_to_two_seconds() {
        // Sample the representable range with a coarse, odd stride so we
        // hit both even and odd seconds.
        let mut t = MIN_UNIX_TIME;
        while t < MAX_UNIX_TIME {
            let back = dos_to_unix(unix_to_dos(t)).unwrap();
            assert_eq!(back, t - (t % 2), "round trip of {t}");
            assert!((MIN_UNIX_TIME..=MAX_UNIX_TIME).contains(&back));
            t += 100_000_001;
        }
    }

    #[test]
    fn nonsense_fields_unpack_to_none() {
        // Month 0 and day 0 are unrepresentable as calendar dates.
        assert_eq!(dos_to_unix(0), None);
        // Day 32 can't be encoded (5 bits max out at 31), but hour 25 can.
        let bad_hour = 0x0021_0000 | (25 << 11);
        assert_eq!(dos_to_unix(bad_hour), None);
    }
}
