extern crate anyhow;
extern crate serde;
extern crate serde_json;

use anyhow::Context;

use crate::config;
use crate::eta;
use crate::result;

// https://rt.data.gov.hk/v1/transport/mtr/lrt/getSchedule?station_id=NNN
#[derive(Serialize, Deserialize, Debug)]
struct LrtSchedule {
    #[serde(default = "default_status")]
    status: i32,
    #[serde(default)]
    system_time: Option<String>,
    #[serde(default)]
    platform_list: Vec<LrtPlatform>,
}

fn default_status() -> i32 {
    return 1;
}

#[derive(Serialize, Deserialize, Debug)]
struct LrtPlatform {
    #[serde(default)]
    route_list: Vec<LrtTrain>,
}

#[derive(Serialize, Deserialize, Debug)]
struct LrtTrain {
    route_no: String,
    #[serde(default)]
    dest_en: Option<String>,
    #[serde(default)]
    dest_ch: Option<String>,
    #[serde(default)]
    time_en: String,
}

pub fn fetch_and_parse(feed: &config::RouteFeed, fetch_fn: fn(&str) -> result::EtaResult<String>) -> result::EtaResult<Vec<eta::RawArrival>> {
    debug!("Fetching {} for {} @ {}", feed.url, feed.route_id, feed.stop_label);
    let response_body = fetch_fn(&feed.url)
        .with_context(|| format!("while fetching {}", feed.url))?;

    return parse_response(&response_body, &feed.route_id);
}

pub fn parse_response(response_body: &str, route_no: &str) -> result::EtaResult<Vec<eta::RawArrival>> {
    let schedule: LrtSchedule = serde_json::from_str(response_body)
        .context("while parsing light rail schedule json")?;

    if schedule.status == 0 {
        warn!("Light rail schedule reported status 0 at {:?}", schedule.system_time);
        return Err(result::EtaError::NoData.into());
    }

    let mut arrivals = vec![];
    for platform in &schedule.platform_list {
        for train in platform.route_list.iter().filter(|t| t.route_no == route_no) {
            let destinations = train.dest_ch.iter().chain(train.dest_en.iter()).cloned().collect();
            arrivals.push(eta::RawArrival::relative(&train.time_en).with_destinations(destinations));
        }
    }

    debug!("Route {}: {} trains across {} platforms",
           route_no, arrivals.len(), schedule.platform_list.len());
    return Ok(arrivals);
}

#[cfg(test)]
mod tests {
    use crate::eta;
    use crate::result;

    fn times(arrivals: &[eta::RawArrival]) -> Vec<eta::ArrivalTime> {
        return arrivals.iter().map(|a| a.when.clone()).collect();
    }

    #[test]
    fn parse_schedule_golden() {
        let raw_json = std::fs::read_to_string("testdata/lrt_schedule.json")
            .expect("Error reading lrt_schedule.json");

        let arrivals_705 = super::parse_response(&raw_json, "705").expect("parse 705");
        assert_eq!(
            vec![
                eta::ArrivalTime::Relative("Arriving".to_string()),
                eta::ArrivalTime::Relative("9 mins".to_string()),
                eta::ArrivalTime::Relative("-".to_string()),
            ],
            times(&arrivals_705));
        assert!(arrivals_705[0].goes_to("天榮"));
        assert!(arrivals_705[0].goes_to("Tin Wing"));

        let arrivals_706 = super::parse_response(&raw_json, "706").expect("parse 706");
        assert_eq!(
            vec![
                eta::ArrivalTime::Relative("4 mins".to_string()),
                eta::ArrivalTime::Relative("1 min".to_string()),
            ],
            times(&arrivals_706));

        assert!(super::parse_response(&raw_json, "751").expect("parse 751").is_empty());
    }

    #[test]
    fn status_zero_is_no_data() {
        let err = super::parse_response(r#"{"status":0}"#, "705").expect_err("status 0");
        assert_eq!(Some(&result::EtaError::NoData), err.downcast_ref::<result::EtaError>());
    }

    #[test]
    fn missing_platform_list() {
        assert!(super::parse_response(r#"{"status":1,"system_time":"2024-03-05 12:31:40"}"#, "705")
                .expect("parse")
                .is_empty());
        assert!(super::parse_response("not json", "705").is_err());
    }
}
