extern crate anyhow;
extern crate chrono_tz;
extern crate serde;
extern crate serde_json;

use anyhow::Context;
use crate::eta;
use crate::result;

pub const DEFAULT_NOW_THRESHOLD_SECS: i64 = 30;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_TIMEZONE: &str = "Asia/Hong_Kong";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    // Bus ETA APIs: RFC 3339 timestamps.
    Timestamp,
    // Light rail schedule: "Arriving", "3 mins", "--".
    RelativeText,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RouteFeed {
    pub route_id: String,
    pub stop_label: String,
    pub source_kind: SourceKind,
    pub url: String,
    #[serde(default)]
    pub destination_filter: Option<String>,
    #[serde(default)]
    pub now_threshold_secs: Option<i64>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_now_threshold")]
    pub now_threshold_secs: i64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_feeds")]
    pub feeds: Vec<RouteFeed>,
}

fn default_timezone() -> String {
    return DEFAULT_TIMEZONE.to_string();
}

fn default_now_threshold() -> i64 {
    return DEFAULT_NOW_THRESHOLD_SECS;
}

fn default_poll_interval() -> u64 {
    return DEFAULT_POLL_INTERVAL_SECS;
}

impl Default for Config {
    fn default() -> Config {
        return Config{
            timezone: default_timezone(),
            now_threshold_secs: default_now_threshold(),
            poll_interval_secs: default_poll_interval(),
            feeds: default_feeds(),
        };
    }
}

impl Config {
    pub fn tz(&self) -> result::EtaResult<chrono_tz::Tz> {
        return parse_timezone(&self.timezone);
    }

    pub fn settings_for(&self, feed: &RouteFeed) -> result::EtaResult<eta::NormalizerSettings> {
        return Ok(eta::NormalizerSettings{
            now_threshold_secs: feed.now_threshold_secs.unwrap_or(self.now_threshold_secs),
            shift_min_remaining_secs: eta::SHIFT_MIN_REMAINING_SECS,
            timezone: self.tz()?,
        });
    }

    pub fn poll_interval(&self, feed: &RouteFeed) -> std::time::Duration {
        let secs = feed.poll_interval_secs.unwrap_or(self.poll_interval_secs);
        return std::time::Duration::from_secs(std::cmp::max(1, secs));
    }

    fn validate(&self) -> result::EtaResult<()> {
        self.tz()?;
        if self.now_threshold_secs < 0 {
            return Err(result::make_error(&format!(
                "now_threshold_secs must not be negative, got {}", self.now_threshold_secs)));
        }
        for feed in &self.feeds {
            if feed.url.is_empty() {
                return Err(result::make_error(&format!(
                    "Feed {} @ {} has no url", feed.route_id, feed.stop_label)));
            }
            if let Some(threshold) = feed.now_threshold_secs {
                if threshold < 0 {
                    return Err(result::make_error(&format!(
                        "Feed {} @ {}: now_threshold_secs must not be negative, got {}",
                        feed.route_id, feed.stop_label, threshold)));
                }
            }
        }
        return Ok(());
    }
}

pub fn parse_timezone(name: &str) -> result::EtaResult<chrono_tz::Tz> {
    return name.parse::<chrono_tz::Tz>()
        .map_err(|e| result::make_error(&format!("Unknown timezone '{}': {}", name, e)));
}

pub fn config_from_file<P: AsRef<std::path::Path>>(path: P) -> result::EtaResult<Config> {
    let debug_path = path.as_ref().to_str().map(|x| x.to_string());
    let file = std::fs::File::open(path)
        .with_context(|| format!("Opening config from '{:?}'", debug_path))?;
    let reader = std::io::BufReader::new(file);
    let config: Config = serde_json::from_reader(reader)
        .with_context(|| format!("while parsing config '{:?}'", debug_path))?;
    config.validate()?;
    return Ok(config);
}

fn bus(route_id: &str, stop_label: &str, url: &str) -> RouteFeed {
    return RouteFeed{
        route_id: route_id.to_string(),
        stop_label: stop_label.to_string(),
        source_kind: SourceKind::Timestamp,
        url: url.to_string(),
        destination_filter: None,
        now_threshold_secs: None,
        poll_interval_secs: None,
    };
}

fn light_rail(route_id: &str, stop_label: &str, url: &str) -> RouteFeed {
    return RouteFeed{
        source_kind: SourceKind::RelativeText,
        ..bus(route_id, stop_label, url)
    };
}

pub fn default_feeds() -> Vec<RouteFeed> {
    let lrt_url = "https://rt.data.gov.hk/v1/transport/mtr/lrt/getSchedule?station_id=520";

    return vec![
        bus("967", "慧景軒", "https://rt.data.gov.hk/v2/transport/citybus/eta/CTB/003773/967"),
        bus("969", "慧景軒", "https://rt.data.gov.hk/v2/transport/citybus/eta/CTB/003773/969"),
        bus("969", "晴彩樓", "https://rt.data.gov.hk/v2/transport/citybus/eta/CTB/002059/969"),
        bus("269M", "晴碧樓", "https://data.etabus.gov.hk/v1/transport/kmb/eta/797CC0222B9EFBEF/269M/1"),
        bus("265M", "晴彩樓", "https://data.etabus.gov.hk/v1/transport/kmb/eta/FE801C732EC6EA42/265M/1"),
        bus("269C", "麗湖居", "https://data.etabus.gov.hk/v1/transport/kmb/eta/7BB395B6FE66E102/269C/1"),
        bus("276B", "慧景軒", "https://data.etabus.gov.hk/v1/transport/kmb/eta/A6C169DA579FC45B/276B/1"),
        RouteFeed{
            destination_filter: Some("天富".to_string()),
            ..bus("276B", "彩園總站", "https://data.etabus.gov.hk/v1/transport/kmb/eta/26A1D2969A15C3AF/276B/1")
        },
        bus("265B", "晴彩樓", "https://data.etabus.gov.hk/v1/transport/kmb/eta/FE801C732EC6EA42/265B/1"),
        light_rail("705", "天秀", lrt_url),
        light_rail("706", "天秀", lrt_url),
    ];
}

#[cfg(test)]
mod tests {
    use super::{Config, SourceKind};

    #[test]
    fn built_in_feeds() {
        let config = Config::default();
        assert_eq!(11, config.feeds.len());
        assert_eq!("967", config.feeds[0].route_id);
        assert_eq!(Some("天富".to_string()), config.feeds[7].destination_filter);
        assert_eq!(SourceKind::RelativeText, config.feeds[10].source_kind);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_partial_config() {
        let raw_json = r#"{
            "now_threshold_secs": 20,
            "feeds": [
                {"route_id": "705", "stop_label": "Tin Sau", "source_kind": "relative_text",
                 "url": "http://example.invalid/lrt", "poll_interval_secs": 10}
            ]
        }"#;

        let config: Config = serde_json::from_str(raw_json).expect("parse config");
        assert_eq!("Asia/Hong_Kong", config.timezone);
        assert_eq!(30, config.poll_interval_secs);
        assert_eq!(1, config.feeds.len());
        assert_eq!(std::time::Duration::from_secs(10), config.poll_interval(&config.feeds[0]));

        let settings = config.settings_for(&config.feeds[0]).expect("settings");
        assert_eq!(20, settings.now_threshold_secs);
        assert_eq!(chrono_tz::Asia::Hong_Kong, settings.timezone);
    }

    #[test]
    fn per_feed_threshold_override() {
        let mut config = Config::default();
        config.feeds[0].now_threshold_secs = Some(45);
        assert_eq!(45, config.settings_for(&config.feeds[0]).unwrap().now_threshold_secs);
        assert_eq!(30, config.settings_for(&config.feeds[1]).unwrap().now_threshold_secs);
    }

    #[test]
    fn rejects_bad_timezone() {
        let mut config = Config::default();
        config.timezone = "Mars/Olympus_Mons".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_negative_thresholds() {
        let mut config = Config::default();
        config.now_threshold_secs = -1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.feeds[4].now_threshold_secs = Some(-30);
        let err = config.validate().expect_err("negative per-feed threshold");
        assert!(format!("{}", err).contains("265M"));

        config.feeds[4].now_threshold_secs = Some(0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_file_golden() {
        let config = super::config_from_file("testdata/config.json").expect("config_from_file");
        assert_eq!(2, config.feeds.len());
        assert_eq!(Some("天富".to_string()), config.feeds[0].destination_filter);
        assert_eq!(SourceKind::RelativeText, config.feeds[1].source_kind);
    }
}
