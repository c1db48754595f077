extern crate anyhow;
extern crate reqwest;
extern crate serde;
extern crate serde_json;
extern crate serde_with;

use anyhow::Context;
use serde_with::{DefaultOnNull, NoneAsEmptyString, serde_as};

use crate::config;
use crate::eta;
use crate::result;

// Shared shape of the KMB (data.etabus.gov.hk) and Citybus
// (rt.data.gov.hk/v2/transport/citybus) ETA endpoints.
#[derive(Serialize, Deserialize, Debug)]
struct EtaResponse {
    #[serde(default)]
    data: Vec<EtaRecord>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug)]
struct EtaRecord {
    route: String,
    #[serde(default)]
    dir: String,
    #[serde(default)]
    dest_en: Option<String>,
    #[serde(default)]
    dest_tc: Option<String>,
    #[serde(default)]
    eta_seq: Option<i32>,
    #[serde_as(as = "DefaultOnNull<NoneAsEmptyString>")]
    #[serde(default)]
    eta: Option<String>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    rmk_en: String,
}

impl EtaRecord {
    fn last_departure_passed(&self) -> bool {
        let remark = self.rmk_en.to_lowercase();
        return remark.contains("final bus has departed") || remark.contains("last bus has departed");
    }

    fn destinations(&self) -> Vec<String> {
        return self.dest_tc.iter().chain(self.dest_en.iter())
            .filter(|d| !d.is_empty())
            .cloned()
            .collect();
    }
}

pub fn fetch_and_parse(feed: &config::RouteFeed, fetch_fn: fn(&str) -> result::EtaResult<String>) -> result::EtaResult<Vec<eta::RawArrival>> {
    debug!("Fetching {} for {} @ {}", feed.url, feed.route_id, feed.stop_label);
    let response_body = fetch_fn(&feed.url)
        .with_context(|| format!("while fetching {}", feed.url))?;

    return parse_response(&response_body);
}

pub fn parse_response(response_body: &str) -> result::EtaResult<Vec<eta::RawArrival>> {
    let response_json: EtaResponse = serde_json::from_str(response_body)
        .context("while parsing bus ETA json")?;

    let mut records = response_json.data;
    records.sort_by_key(|r| r.eta_seq.unwrap_or(i32::MAX));

    let mut arrivals = vec![];
    for record in &records {
        let expired = record.last_departure_passed();
        match record.eta {
            Some(ref eta_text) => {
                let when = time::OffsetDateTime::parse(
                    eta_text, &time::format_description::well_known::Rfc3339)
                    .with_context(|| format!("while parsing eta '{}' for route {}", eta_text, record.route))?;
                let mut arrival = eta::RawArrival::at(when).with_destinations(record.destinations());
                arrival.last_departure_passed = expired;
                arrivals.push(arrival);
            },
            None => {
                debug!("Route {} {}: no eta (seq {:?}) '{}'",
                       record.route, record.dir, record.eta_seq, record.rmk_en);
            },
        }
    }

    return Ok(arrivals);
}

#[cfg(test)]
mod tests {
    extern crate serde_json;
    extern crate time;

    use crate::eta;

    #[test]
    fn parse_kmb_json() {
        let raw_json = r#"{"type":"ETA","version":"1.0","generated_timestamp":"2024-03-05T12:31:40+08:00","data":[{"co":"KMB","route":"276B","dir":"O","service_type":1,"seq":12,"dest_tc":"天水圍市中心","dest_sc":"天水围市中心","dest_en":"TIN SHUI WAI TOWN CENTRE","eta_seq":2,"eta":"2024-03-05T12:48:02+08:00","rmk_tc":"原定班次","rmk_sc":"原定班次","rmk_en":"Scheduled Bus","data_timestamp":"2024-03-05T12:31:28+08:00"},{"co":"KMB","route":"276B","dir":"O","service_type":1,"seq":12,"dest_tc":"天富","dest_sc":"天富","dest_en":"TIN FU COURT","eta_seq":1,"eta":"2024-03-05T12:36:15+08:00","rmk_tc":"","rmk_sc":"","rmk_en":"","data_timestamp":"2024-03-05T12:31:28+08:00"},{"co":"KMB","route":"276B","dir":"O","service_type":1,"seq":12,"dest_tc":"天富","dest_sc":"天富","dest_en":"TIN FU COURT","eta_seq":3,"eta":null,"rmk_tc":"","rmk_sc":"","rmk_en":"","data_timestamp":"2024-03-05T12:31:28+08:00"}]}"#;

        let arrivals = super::parse_response(raw_json).expect("parse_response");

        assert_eq!(2, arrivals.len());
        assert_eq!(eta::ArrivalTime::Absolute(time::macros::datetime!(2024-03-05 12:36:15 +8)), arrivals[0].when);
        assert_eq!(vec!["天富".to_string(), "TIN FU COURT".to_string()], arrivals[0].destinations);
        assert_eq!(eta::ArrivalTime::Absolute(time::macros::datetime!(2024-03-05 12:48:02 +8)), arrivals[1].when);
        assert!(!arrivals[1].last_departure_passed);
    }

    #[test]
    fn parse_citybus_golden() {
        let raw_json = std::fs::read_to_string("testdata/citybus_eta.json")
            .expect("Error reading citybus_eta.json");

        let arrivals = super::parse_response(&raw_json).expect("parse_response");

        assert_eq!(2, arrivals.len());
        assert_eq!(eta::ArrivalTime::Absolute(time::macros::datetime!(2024-03-05 12:34:56 +8)), arrivals[0].when);
        assert_eq!(eta::ArrivalTime::Absolute(time::macros::datetime!(2024-03-05 12:52:10 +8)), arrivals[1].when);
        assert!(arrivals[0].goes_to("TIN SHUI WAI TOWN CENTRE"));
    }

    #[test]
    fn final_bus_departed() {
        let raw_json = r#"{"data":[{"route":"269C","dir":"O","dest_en":"TIN SHUI WAI","eta_seq":1,"eta":"2024-03-05T23:59:00+08:00","rmk_en":"The final bus has departed from this stop"}]}"#;

        let arrivals = super::parse_response(raw_json).expect("parse_response");
        assert_eq!(1, arrivals.len());
        assert!(arrivals[0].last_departure_passed);
    }

    #[test]
    fn empty_and_null_etas() {
        let raw_json = r#"{"data":[{"route":"967","eta_seq":1,"eta":"","rmk_en":null},{"route":"967","eta_seq":2,"eta":null}]}"#;
        assert!(super::parse_response(raw_json).expect("parse_response").is_empty());

        assert!(super::parse_response(r#"{"type":"ETA","data":[]}"#).expect("parse_response").is_empty());
    }

    #[test]
    fn malformed_json() {
        assert!(super::parse_response("<html>502 Bad Gateway</html>").is_err());
        assert!(super::parse_response(r#"{"data":[{"route":"967","eta":"tomorrow"}]}"#).is_err());
    }

    #[test]
    fn fetch_with_injected_fetcher() {
        let fake_fetch_fn = |_url: &str| -> crate::result::EtaResult<String> {
            return Ok(std::fs::read_to_string("testdata/citybus_eta.json").expect("error reading citybus_eta.json"));
        };

        let feed = crate::config::default_feeds()[0].clone();
        let arrivals = super::fetch_and_parse(&feed, fake_fetch_fn).expect("fetch_and_parse");
        assert_eq!(2, arrivals.len());
    }
}
