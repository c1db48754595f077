extern crate anyhow;
extern crate reqwest;
extern crate std;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;

use crate::board;
use crate::config;
use crate::eta;
use crate::etabus;
use crate::lrt;
use crate::result;

pub type FetchFn = fn(&str) -> result::EtaResult<String>;

struct FeedSlot {
    feed: config::RouteFeed,
    settings: eta::NormalizerSettings,
    interval: std::time::Duration,
    state: Mutex<eta::FeedState>,
}

pub struct Poller {
    slots: Vec<FeedSlot>,
    board: Arc<Mutex<board::Board>>,
    fetch_fn: FetchFn,
    manual_refresh: AtomicBool,
}

// At most one manual refresh runs at a time; the flag clears when the claim
// is dropped.
pub struct RefreshClaim {
    poller: Arc<Poller>,
}

impl RefreshClaim {
    pub fn run_all(self) {
        self.poller.refresh_all();
    }

    pub fn run_feed(self, index: usize) {
        if let Err(err) = self.poller.refresh_feed(index) {
            error!("Manual refresh of feed #{}: {:#}", index, err);
        }
    }
}

impl Drop for RefreshClaim {
    fn drop(&mut self) {
        self.poller.manual_refresh.store(false, Ordering::SeqCst);
    }
}

pub fn claim_refresh(poller: &Arc<Poller>) -> Option<RefreshClaim> {
    if poller.manual_refresh.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
        return None;
    }
    return Some(RefreshClaim{
        poller: Arc::clone(poller),
    });
}

impl Poller {
    pub fn new(config: &config::Config, board: Arc<Mutex<board::Board>>, fetch_fn: FetchFn) -> result::EtaResult<Poller> {
        let mut slots = vec![];
        for feed in &config.feeds {
            slots.push(FeedSlot{
                feed: feed.clone(),
                settings: config.settings_for(feed)?,
                interval: config.poll_interval(feed),
                state: Mutex::new(eta::FeedState::new()),
            });
        }

        return Ok(Poller{
            slots: slots,
            board: board,
            fetch_fn: fetch_fn,
            manual_refresh: AtomicBool::new(false),
        });
    }

    pub fn feed_count(&self) -> usize {
        return self.slots.len();
    }

    pub fn refresh_feed(&self, index: usize) -> result::EtaResult<()> {
        let slot = self.slot(index)?;
        let ticket = lock(&slot.state)?.begin_poll();

        let polled = fetch_feed(&slot.feed, self.fetch_fn);

        return self.apply_poll(index, ticket, polled, time::OffsetDateTime::now_utc());
    }

    fn apply_poll(&self, index: usize, ticket: u64, polled: result::EtaResult<Vec<eta::RawArrival>>, now: time::OffsetDateTime) -> result::EtaResult<()> {
        let slot = self.slot(index)?;
        let mut state = lock(&slot.state)?;

        if !state.is_current(ticket) {
            info!("Dropping superseded poll #{} for {} @ {}", ticket, slot.feed.route_id, slot.feed.stop_label);
            return Ok(());
        }

        let arrivals = eta::normalize_feed(&slot.feed, polled, &mut state, now, &slot.settings);
        return lock(&self.board)?.update(index, arrivals, now);
    }

    pub fn refresh_all(&self) {
        std::thread::scope(|scope| {
            for index in 0..self.slots.len() {
                scope.spawn(move || {
                    if let Err(err) = self.refresh_feed(index) {
                        error!("Refreshing feed #{}: {:#}", index, err);
                    }
                });
            }
        });
        info!("All {} feeds refreshed", self.slots.len());
    }

    fn run_worker(&self, index: usize) {
        let interval = match self.slots.get(index) {
            Some(slot) => slot.interval,
            None => return,
        };

        loop {
            if let Err(err) = self.refresh_feed(index) {
                error!("Polling feed #{}: {:#}", index, err);
            }
            std::thread::sleep(interval);
        }
    }

    fn slot(&self, index: usize) -> result::EtaResult<&FeedSlot> {
        return self.slots.get(index).ok_or(
            result::make_error(&format!("No feed #{}", index)));
    }
}

// One thread per feed, so a stalled upstream only delays its own row.
pub fn spawn_workers(poller: &Arc<Poller>) -> result::EtaResult<Vec<std::thread::JoinHandle<()>>> {
    let mut handles = vec![];
    for index in 0..poller.feed_count() {
        let poller = Arc::clone(poller);
        let handle = std::thread::Builder::new()
            .name(format!("feed-{}", index))
            .spawn(move || poller.run_worker(index))
            .with_context(|| format!("while starting worker for feed #{}", index))?;
        handles.push(handle);
    }
    return Ok(handles);
}

fn lock<T>(mutex: &Mutex<T>) -> result::EtaResult<std::sync::MutexGuard<T>> {
    return mutex.lock().map_err(|_| result::make_error("lock poisoned"));
}

pub fn fetch_feed(feed: &config::RouteFeed, fetch_fn: FetchFn) -> result::EtaResult<Vec<eta::RawArrival>> {
    match feed.source_kind {
        config::SourceKind::Timestamp => return etabus::fetch_and_parse(feed, fetch_fn),
        config::SourceKind::RelativeText => return lrt::fetch_and_parse(feed, fetch_fn),
    }
}

pub fn real_fetch(url: &str) -> result::EtaResult<String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;
    let response = client.get(url)
        .header(reqwest::header::USER_AGENT, "hkboard (arrivals board)")
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .with_context(|| format!("while fetching url: {}", url))?;

    let status = response.status();
    if !status.is_success() {
        return Err(result::EtaError::HttpError(status.as_u16()).into());
    }

    return Ok(response.text()?);
}
