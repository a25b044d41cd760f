//! Timestamp labels for messages and the sidebar

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc};

const MINUTES_IN_DAY: i64 = 1440;
const MINUTES_IN_MONTH: i64 = 43_200;
const MINUTES_IN_TWO_MONTHS: i64 = 86_400;

/// Label for a message timestamp, relative to the local clock.
pub fn time_label(ts: Option<DateTime<Utc>>) -> String {
    time_label_at(ts, &Local::now())
}

/// Label for `ts` as seen at `now`, in `now`'s time zone.
///
/// Same calendar day: clock time (`10:51 AM`). Previous day: `Yesterday`.
/// Otherwise a relative phrase (`3 days ago`). Missing: `Just now`.
pub fn time_label_at<Tz: TimeZone>(ts: Option<DateTime<Utc>>, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let Some(ts) = ts else {
        return "Just now".to_string();
    };
    let local = ts.with_timezone(&now.timezone());
    let today = now.date_naive();

    if local.date_naive() == today {
        local.format("%I:%M %p").to_string()
    } else if today.pred_opt() == Some(local.date_naive()) {
        "Yesterday".to_string()
    } else {
        relative(&local, now)
    }
}

/// `<distance> ago`, or `in <distance>` for future times.
fn relative<Tz: TimeZone>(then: &DateTime<Tz>, now: &DateTime<Tz>) -> String {
    if then > now {
        format!("in {}", distance_in_words(now, then))
    } else {
        format!("{} ago", distance_in_words(then, now))
    }
}

/// Human distance between `earlier` and `later`.
pub fn distance_in_words<Tz: TimeZone>(earlier: &DateTime<Tz>, later: &DateTime<Tz>) -> String {
    let seconds = (later.clone() - earlier.clone()).num_seconds();
    let minutes = (seconds as f64 / 60.0).round() as i64;

    if minutes < 2 {
        return if minutes == 0 {
            "less than a minute".to_string()
        } else {
            "1 minute".to_string()
        };
    }
    if minutes < 45 {
        return format!("{} minutes", minutes);
    }
    if minutes < 90 {
        return "about 1 hour".to_string();
    }
    if minutes < MINUTES_IN_DAY {
        let hours = (minutes as f64 / 60.0).round() as i64;
        return format!("about {} hours", hours);
    }
    if minutes < 2520 {
        return "1 day".to_string();
    }
    if minutes < MINUTES_IN_MONTH {
        let days = (minutes as f64 / MINUTES_IN_DAY as f64).round() as i64;
        return format!("{} days", days);
    }
    if minutes < MINUTES_IN_TWO_MONTHS {
        let months = (minutes as f64 / MINUTES_IN_MONTH as f64).round() as i64;
        return plural_about(months, "month");
    }

    let months = months_between(earlier, later);
    if months < 12 {
        let nearest = (minutes as f64 / MINUTES_IN_MONTH as f64).round() as i64;
        return if nearest == 1 {
            "1 month".to_string()
        } else {
            format!("{} months", nearest)
        };
    }

    let rem = months % 12;
    let years = months / 12;
    if rem < 3 {
        plural_about(years, "year")
    } else if rem < 9 {
        format!("over {} {}", years, unit(years, "year"))
    } else {
        format!("almost {} years", years + 1)
    }
}

fn unit(n: i64, word: &str) -> String {
    if n == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}

fn plural_about(n: i64, word: &str) -> String {
    format!("about {} {}", n, unit(n, word))
}

/// Whole calendar months from `earlier` to `later`.
fn months_between<Tz: TimeZone>(earlier: &DateTime<Tz>, later: &DateTime<Tz>) -> i64 {
    let a = earlier.naive_local();
    let b = later.naive_local();
    let mut months = (b.year() as i64 - a.year() as i64) * 12 + (b.month() as i64 - a.month() as i64);
    let a_rest = (a.day(), a.num_seconds_from_midnight());
    let b_rest = (b.day(), b.num_seconds_from_midnight());
    if months > 0 && b_rest < a_rest {
        months -= 1;
    }
    months
}

/// Calendar date, e.g. `Jan 5, 2024`.
pub fn format_date(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%b %-d, %Y").to_string()
}
