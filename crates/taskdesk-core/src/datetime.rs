use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc,
             Weekday};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str = "taskdesk-time.toml";
const TIMEZONE_ENV_VAR: &str = "TASKDESK_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str = "TASKDESK_TIME_CONFIG";
const DEFAULT_DISPLAY_TIMEZONE: &str = "UTC";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
    timezone: Option<String>,
    time: Option<TimezoneSection>,
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
    timezone: Option<String>,
}

/// Timezone used for rendering timestamps and interpreting local deadline
/// expressions. Resolved once from `$TASKDESK_TIMEZONE`, then a
/// `taskdesk-time.toml` file, then the default.
pub fn display_timezone() -> &'static Tz {
    static DISPLAY_TZ: OnceLock<Tz> = OnceLock::new();
    DISPLAY_TZ.get_or_init(resolve_display_timezone)
}

pub fn format_display(dt: DateTime<Utc>) -> String {
    dt.with_timezone(display_timezone())
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

fn resolve_display_timezone() -> Tz {
    if let Ok(raw) = std::env::var(TIMEZONE_ENV_VAR) {
        if let Some(tz) = parse_timezone(&raw, TIMEZONE_ENV_VAR) {
            return tz;
        }
    }

    if let Some(path) = timezone_config_path()
        && let Some(tz) = load_timezone_from_file(&path)
    {
        return tz;
    }

    parse_timezone(DEFAULT_DISPLAY_TIMEZONE, "DEFAULT_DISPLAY_TIMEZONE").unwrap_or_else(|| {
        tracing::error!("failed to parse fallback timezone; using UTC");
        chrono_tz::UTC
    })
}

fn timezone_config_path() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var(TIMEZONE_CONFIG_ENV_VAR) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    std::env::current_dir().ok().map(|dir| dir.join(TIMEZONE_CONFIG_FILE))
}

fn load_timezone_from_file(path: &PathBuf) -> Option<Tz> {
    if !path.exists() {
        tracing::debug!(file = %path.display(), "timezone config file not found");
        return None;
    }

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::error!(
                file = %path.display(),
                error = %err,
                "failed reading timezone config file"
            );
            return None;
        }
    };

    let parsed = match toml::from_str::<TimezoneConfig>(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::error!(
                file = %path.display(),
                error = %err,
                "failed parsing timezone config file"
            );
            return None;
        }
    };

    let timezone = parsed
        .timezone
        .or_else(|| parsed.time.and_then(|section| section.timezone));
    let Some(timezone) = timezone else {
        tracing::warn!(file = %path.display(), "timezone config had no timezone field");
        return None;
    };

    parse_timezone(timezone.as_str(), &format!("file:{}", path.display()))
}

fn parse_timezone(raw: &str, source: &str) -> Option<Tz> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        tracing::warn!(source, "timezone source was empty");
        return None;
    }

    match trimmed.parse::<Tz>() {
        Ok(tz) => {
            tracing::info!(source, timezone = %trimmed, "configured display timezone");
            Some(tz)
        }
        Err(err) => {
            tracing::error!(
                source,
                timezone = %trimmed,
                error = %err,
                "failed to parse timezone id"
            );
            None
        }
    }
}

fn to_utc_from_local(local_naive: NaiveDateTime, context: &str) -> anyhow::Result<DateTime<Utc>> {
    match display_timezone().from_local_datetime(&local_naive) {
        LocalResult::Single(local_dt) => Ok(local_dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(first, second) => {
            tracing::warn!(
                context,
                first = %first,
                second = %second,
                "ambiguous local datetime; using earliest"
            );
            let chosen = if first <= second { first } else { second };
            Ok(chosen.with_timezone(&Utc))
        }
        LocalResult::None => Err(anyhow!(
            "local datetime does not exist in configured timezone: {context}"
        )),
    }
}

fn end_of_local_day(date: NaiveDate, context: &str) -> anyhow::Result<DateTime<Utc>> {
    let end = date
        .and_hms_opt(23, 59, 59)
        .ok_or_else(|| anyhow!("failed to construct end of day"))?;
    to_utc_from_local(end, context)
}

/// Parse a deadline expression for `assign`.
///
/// Date-only forms (`today`, weekday names, `%Y-%m-%d`) resolve to the end
/// of that local day; timed forms are taken as given; `+Nd`/`+Nw`/`+Nh`
/// offset from now.
#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_deadline_expr(input: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    let token = input.trim();
    let lower = token.to_ascii_lowercase();

    match lower.as_str() {
        "now" => return Ok(now),
        "today" | "eod" => {
            let local_today = now.with_timezone(display_timezone()).date_naive();
            return end_of_local_day(local_today, "today");
        }
        "tomorrow" => {
            let local_today = now.with_timezone(display_timezone()).date_naive();
            let next = local_today
                .checked_add_signed(Duration::days(1))
                .ok_or_else(|| anyhow!("failed to advance to tomorrow"))?;
            return end_of_local_day(next, "tomorrow");
        }
        "eow" => {
            let local_today = now.with_timezone(display_timezone()).date_naive();
            let sunday = next_weekday_date(local_today, Weekday::Sun);
            return end_of_local_day(sunday, "eow");
        }
        _ => {}
    }

    if let Some(weekday) = parse_weekday_name(&lower) {
        let local_today = now.with_timezone(display_timezone()).date_naive();
        let target = next_weekday_date(local_today, weekday);
        return end_of_local_day(target, "weekday-name");
    }

    let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dwh])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

    if let Some(caps) = rel_re.captures(&lower) {
        let sign = caps
            .name("sign")
            .map(|m| m.as_str())
            .ok_or_else(|| anyhow!("missing relative sign"))?;
        let num: i64 = caps
            .name("num")
            .map(|m| m.as_str())
            .ok_or_else(|| anyhow!("missing relative amount"))?
            .parse()
            .context("invalid relative number")?;
        let unit = caps
            .name("unit")
            .map(|m| m.as_str())
            .ok_or_else(|| anyhow!("missing relative unit"))?;

        let duration = match unit {
            "d" => Duration::days(num),
            "w" => Duration::weeks(num),
            "h" => Duration::hours(num),
            _ => return Err(anyhow!("unknown relative unit: {unit}")),
        };

        return Ok(if sign == "-" { now - duration } else { now + duration });
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(token, fmt) {
            return to_utc_from_local(ndt, fmt);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        return end_of_local_day(date, "date");
    }

    Err(anyhow!("unrecognized deadline expression: {input}"))
}

fn parse_weekday_name(lower: &str) -> Option<Weekday> {
    match lower {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

fn next_weekday_date(today: NaiveDate, target: Weekday) -> NaiveDate {
    let today_num = today.weekday().num_days_from_monday() as i64;
    let target_num = target.num_days_from_monday() as i64;
    let mut ahead = (target_num - today_num).rem_euclid(7);
    if ahead == 0 {
        ahead = 7;
    }
    today + Duration::days(ahead)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{format_display, parse_deadline_expr};

    #[test]
    fn parses_bare_date_as_end_of_day() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let parsed = parse_deadline_expr("2025-06-30", now).expect("parse date");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 6, 30, 23, 59, 59).unwrap());
    }

    #[test]
    fn parses_timed_form_exactly() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let parsed = parse_deadline_expr("2025-06-30T17:00", now).expect("parse datetime");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 6, 30, 17, 0, 0).unwrap());
    }

    #[test]
    fn tomorrow_is_end_of_next_day() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let parsed = parse_deadline_expr("tomorrow", now).expect("parse tomorrow");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 6, 2, 23, 59, 59).unwrap());
    }

    #[test]
    fn relative_offsets_apply_to_now() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let parsed = parse_deadline_expr("+3d", now).expect("parse offset");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 6, 4, 12, 0, 0).unwrap());
    }

    #[test]
    fn weekday_resolves_to_next_occurrence() {
        // 2025-06-01 is a Sunday; "friday" lands on the 6th.
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let parsed = parse_deadline_expr("friday", now).expect("parse weekday");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 6, 6, 23, 59, 59).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert!(parse_deadline_expr("someday", now).is_err());
    }

    #[test]
    fn formats_in_display_timezone() {
        let dt = Utc.with_ymd_and_hms(2025, 6, 30, 17, 0, 0).unwrap();
        assert_eq!(format_display(dt), "2025-06-30 17:00");
    }
}
