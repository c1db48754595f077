extern crate chrono;
extern crate chrono_tz;
extern crate serde_json;

use crate::config;
use crate::eta;
use crate::result;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BoardRow {
    pub route_id: String,
    pub stop_label: String,
    pub first: eta::NormalizedArrival,
    pub second: eta::NormalizedArrival,
}

#[derive(Serialize, Debug)]
pub struct Board {
    rows: Vec<BoardRow>,
    last_update: Option<String>,
    #[serde(skip)]
    timezone: chrono_tz::Tz,
}

impl Board {
    pub fn new(feeds: &[config::RouteFeed], timezone: chrono_tz::Tz) -> Board {
        return Board{
            rows: feeds.iter().map(|feed| BoardRow{
                route_id: feed.route_id.clone(),
                stop_label: feed.stop_label.clone(),
                first: eta::NormalizedArrival::no_data(),
                second: eta::NormalizedArrival::no_data(),
            }).collect(),
            last_update: None,
            timezone: timezone,
        };
    }

    pub fn rows(&self) -> &[BoardRow] {
        return &self.rows;
    }

    pub fn last_update(&self) -> Option<&str> {
        return self.last_update.as_ref().map(String::as_str);
    }

    pub fn update(&mut self, index: usize, arrivals: eta::FeedArrivals, now: time::OffsetDateTime) -> result::EtaResult<()> {
        use chrono::TimeZone;

        let row = self.rows.get_mut(index).ok_or(
            result::make_error(&format!("No board row #{}", index)))?;

        if row.first != arrivals.first {
            debug!("{} @ {}: {} -> {}",
                   row.route_id, row.stop_label, row.first.minutes_label, arrivals.first.minutes_label);
        }
        row.first = arrivals.first;
        row.second = arrivals.second;

        self.last_update = self.timezone.timestamp_opt(now.unix_timestamp(), 0)
            .single()
            .map(|local| local.format("%H:%M").to_string());
        return Ok(());
    }

    pub fn to_json(&self) -> result::EtaResult<String> {
        return Ok(serde_json::to_string(self)?);
    }

    pub fn to_text(&self) -> String {
        let mut text = format!("Last update: {}\n", self.last_update().unwrap_or("--:--"));
        for row in &self.rows {
            text.push_str(&format!("{:<6} {:<8} {:>8} {:>10} | {:>8} {:>10}\n",
                                   row.route_id, row.stop_label,
                                   row.first.minutes_label, row.first.clock_label.as_ref().map(String::as_str).unwrap_or(""),
                                   row.second.minutes_label, row.second.clock_label.as_ref().map(String::as_str).unwrap_or("")));
        }
        return text;
    }
}
