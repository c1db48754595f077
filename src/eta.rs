extern crate chrono;
extern crate chrono_tz;
extern crate time;

use crate::config;
use crate::result;

pub const NOW_THRESHOLD_SECS: i64 = 30;
pub const SHIFT_MIN_REMAINING_SECS: i64 = 5;

const ONE_MIN_CEILING_SECS: i64 = 120;
const MAX_RELATIVE_SECS: i64 = 24 * 60 * 60;

pub const NOW_LABEL: &str = "now";
pub const NO_DATA_LABEL: &str = "n/a";

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizerSettings {
    pub now_threshold_secs: i64,
    pub shift_min_remaining_secs: i64,
    pub timezone: chrono_tz::Tz,
}

impl Default for NormalizerSettings {
    fn default() -> NormalizerSettings {
        return NormalizerSettings{
            now_threshold_secs: NOW_THRESHOLD_SECS,
            shift_min_remaining_secs: SHIFT_MIN_REMAINING_SECS,
            timezone: chrono_tz::Asia::Hong_Kong,
        };
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrivalTime {
    Absolute(time::OffsetDateTime),
    Relative(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawArrival {
    pub when: ArrivalTime,
    pub last_departure_passed: bool,
    pub destinations: Vec<String>,
}

impl RawArrival {
    pub fn at(when: time::OffsetDateTime) -> RawArrival {
        return RawArrival{
            when: ArrivalTime::Absolute(when),
            last_departure_passed: false,
            destinations: vec![],
        };
    }

    pub fn relative(text: &str) -> RawArrival {
        return RawArrival{
            when: ArrivalTime::Relative(text.to_string()),
            last_departure_passed: false,
            destinations: vec![],
        };
    }

    pub fn with_destinations(mut self, destinations: Vec<String>) -> RawArrival {
        self.destinations = destinations;
        return self;
    }

    pub fn goes_to(&self, label: &str) -> bool {
        return self.destinations.iter().any(|d| d == label);
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NormalizedArrival {
    pub seconds_until: Option<i64>,
    pub minutes_label: String,
    pub clock_label: Option<String>,
}

impl NormalizedArrival {
    pub fn no_data() -> NormalizedArrival {
        return NormalizedArrival{
            seconds_until: None,
            minutes_label: NO_DATA_LABEL.to_string(),
            clock_label: None,
        };
    }

    pub fn is_valid(&self) -> bool {
        return self.seconds_until.is_some();
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FeedArrivals {
    pub first: NormalizedArrival,
    pub second: NormalizedArrival,
}

impl FeedArrivals {
    pub fn no_data() -> FeedArrivals {
        return FeedArrivals{
            first: NormalizedArrival::no_data(),
            second: NormalizedArrival::no_data(),
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedArrival {
    pub expected_at: time::OffsetDateTime,
    pub captured_at: time::OffsetDateTime,
}

// Per-feed state carried between polls. Owned by the poller.
#[derive(Debug, Default)]
pub struct FeedState {
    cached_second: Option<CachedArrival>,
    latest_ticket: u64,
}

impl FeedState {
    pub fn new() -> FeedState {
        return FeedState::default();
    }

    pub fn begin_poll(&mut self) -> u64 {
        self.latest_ticket += 1;
        return self.latest_ticket;
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        return ticket == self.latest_ticket;
    }

    fn remember_second(&mut self, cached: Option<CachedArrival>) {
        self.cached_second = cached;
    }

    fn take_second(&mut self) -> Option<CachedArrival> {
        return self.cached_second.take();
    }
}

pub fn minutes_label(seconds_until: i64, now_threshold_secs: i64) -> String {
    if seconds_until < now_threshold_secs {
        return NOW_LABEL.to_string();
    }
    if seconds_until < ONE_MIN_CEILING_SECS {
        return "1 min".to_string();
    }

    let minutes = (seconds_until + 30) / 60;
    if minutes == 1 {
        return "1 min".to_string();
    }
    return format!("{} mins", minutes);
}

pub fn clock_label(when: time::OffsetDateTime, tz: &chrono_tz::Tz) -> Option<String> {
    use chrono::TimeZone;

    return tz.timestamp_opt(when.unix_timestamp(), 0)
        .single()
        .map(|local| local.format("%H:%M:%S").to_string());
}

pub fn resolve_relative_text(text: &str) -> Result<Option<i64>, result::EtaError> {
    let trimmed = text.trim();

    match trimmed {
        "Arriving" | "-" => return Ok(Some(0)),
        "" | "--" | "n/a" => return Ok(None),
        _ => {},
    }

    let mut parts = trimmed.split_whitespace();
    let count = parts.next().and_then(|n| n.parse::<i64>().ok());
    let unit = parts.next();

    match (count, unit, parts.next()) {
        (Some(n), Some("min"), None) | (Some(n), Some("mins"), None) if n >= 0 => {
            match n.checked_mul(60) {
                Some(secs) if secs <= MAX_RELATIVE_SECS => return Ok(Some(secs)),
                _ => return Err(result::EtaError::UnrecognizedFormat(text.to_string())),
            }
        },
        _ => {
            return Err(result::EtaError::UnrecognizedFormat(text.to_string()));
        },
    }
}

fn resolve(raw: &RawArrival, now: time::OffsetDateTime) -> Option<time::OffsetDateTime> {
    match raw.when {
        ArrivalTime::Absolute(when) => {
            if when <= now {
                return None;
            }
            return Some(when);
        },
        ArrivalTime::Relative(ref text) => {
            // Listed rail departures are upcoming by definition, so "Arriving"
            // resolves to `now` and still counts.
            match resolve_relative_text(text) {
                Ok(Some(secs)) => return now.checked_add(time::Duration::seconds(secs)),
                Ok(None) => return None,
                Err(err) => {
                    warn!("{}, treating as no data", err);
                    return None;
                },
            }
        },
    }
}

pub fn normalize(raw: Option<&RawArrival>, now: time::OffsetDateTime, settings: &NormalizerSettings) -> NormalizedArrival {
    let raw = match raw {
        Some(raw) if !raw.last_departure_passed => raw,
        _ => return NormalizedArrival::no_data(),
    };

    match resolve(raw, now) {
        None => return NormalizedArrival::no_data(),
        Some(when) => return normalize_resolved(when, now, settings),
    }
}

fn normalize_resolved(when: time::OffsetDateTime, now: time::OffsetDateTime, settings: &NormalizerSettings) -> NormalizedArrival {
    let seconds_until = std::cmp::max(0, (when - now).whole_seconds());

    return NormalizedArrival{
        seconds_until: Some(seconds_until),
        minutes_label: minutes_label(seconds_until, settings.now_threshold_secs),
        clock_label: clock_label(when, &settings.timezone),
    };
}

pub fn apply_destination_filter(arrivals: Vec<RawArrival>, destination_label: &str) -> Vec<RawArrival> {
    return arrivals.into_iter()
        .filter(|a| a.goes_to(destination_label))
        .collect();
}

fn shift_cached(cached: CachedArrival, now: time::OffsetDateTime, settings: &NormalizerSettings) -> NormalizedArrival {
    let remaining = (cached.expected_at - now).whole_seconds();
    if remaining <= settings.shift_min_remaining_secs {
        debug!("Cached arrival expired ({}s left), not shifting", remaining);
        return NormalizedArrival::no_data();
    }

    debug!("Shifting cached arrival captured at {} ({}s left)", cached.captured_at, remaining);
    return normalize_resolved(cached.expected_at, now, settings);
}

// One poll cycle for one feed. Entries that normalize to n/a are skipped; a
// failed fetch counts as an empty response.
pub fn normalize_feed(
    feed: &config::RouteFeed,
    polled: result::EtaResult<Vec<RawArrival>>,
    state: &mut FeedState,
    now: time::OffsetDateTime,
    settings: &NormalizerSettings) -> FeedArrivals {

    let arrivals = match polled {
        Ok(arrivals) => arrivals,
        Err(err) => {
            warn!("Feed {} @ {}: {:#}", feed.route_id, feed.stop_label, err);
            vec![]
        },
    };

    let arrivals = match feed.destination_filter {
        Some(ref label) => apply_destination_filter(arrivals, label),
        None => arrivals,
    };

    let cached = state.take_second();

    let mut usable = arrivals.iter()
        .map(|a| normalize(Some(a), now, settings))
        .filter(|n| n.is_valid())
        .take(2);
    let first = usable.next();
    let second = usable.next();

    let first = match first {
        Some(first) => first,
        None => {
            if arrivals.iter().any(|a| a.last_departure_passed) {
                debug!("Feed {} @ {}: last departure passed, not shifting", feed.route_id, feed.stop_label);
                return FeedArrivals::no_data();
            }
            return match cached {
                Some(cached) => FeedArrivals{
                    first: shift_cached(cached, now, settings),
                    second: NormalizedArrival::no_data(),
                },
                None => FeedArrivals::no_data(),
            };
        },
    };

    if let Some(ref second) = second {
        let expected_at = second.seconds_until
            .and_then(|secs| now.checked_add(time::Duration::seconds(secs)));
        if let Some(expected_at) = expected_at {
            state.remember_second(Some(CachedArrival{
                expected_at: expected_at,
                captured_at: now,
            }));
        }
    }

    return FeedArrivals{
        first: first,
        second: second.unwrap_or_else(NormalizedArrival::no_data),
    };
}
