extern crate anyhow;
extern crate chrono;
extern crate chrono_tz;
extern crate flexi_logger;
extern crate getopts;
#[macro_use]
extern crate log;
extern crate reqwest;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate time;

use std::sync::{Arc, Mutex};

mod board;
mod config;
mod eta;
mod etabus;
mod lrt;
mod poller;
mod result;
mod server;

fn init_logging(log_dir: &str, log_level: &str) -> result::EtaResult<flexi_logger::LoggerHandle> {
    let handle = flexi_logger::Logger::try_with_env_or_str(log_level)?
        .log_to_file(flexi_logger::FileSpec::default().directory(log_dir))
        .duplicate_to_stderr(flexi_logger::Duplicate::Info)
        .format(flexi_logger::detailed_format)
        .start()?;
    return Ok(handle);
}

fn load_config(path: Option<String>) -> result::EtaResult<config::Config> {
    match path {
        Some(path) => {
            info!("Loading feeds from {}", path);
            return config::config_from_file(&path);
        },
        None => {
            info!("No --config given, using built-in feeds");
            return Ok(config::Config::default());
        },
    }
}

fn run(matches: &getopts::Matches) -> result::EtaResult<()> {
    let one_shot = matches.opt_present("one-shot");
    let port = matches.opt_str("port").unwrap_or("8080".to_string());

    let config = load_config(matches.opt_str("config"))?;
    info!("Running. feeds={} one-shot={} tz={}", config.feeds.len(), one_shot, config.timezone);

    let board = Arc::new(Mutex::new(board::Board::new(&config.feeds, config.tz()?)));
    let poller = Arc::new(poller::Poller::new(&config, Arc::clone(&board), poller::real_fetch)?);

    if one_shot {
        poller.refresh_all();
        let board = board.lock().map_err(|_| result::make_error("board lock poisoned"))?;
        print!("{}", board.to_text());
        return Ok(());
    }

    let _workers = poller::spawn_workers(&poller)?;
    return server::run_server(&port, board, poller);
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let mut opts = getopts::Options::new();
    opts.optopt("c", "config", "JSON file listing the feeds to poll.", "FILENAME");
    opts.optopt("p", "port", "Port for the arrivals board (default 8080).", "PORT");
    opts.optflag("o", "one-shot", "Poll every feed once, print the board and exit.");
    opts.optopt("", "log-dir", "Where to write log files (default ./).", "DIR");
    opts.optopt("", "log-level", "Log spec when RUST_LOG is unset (default info).", "LEVEL");
    opts.optflag("h", "help", "Print this help.");

    let matches = match opts.parse(&args[1..]) {
        Ok(matches) => matches,
        Err(err) => {
            eprintln!("{}\n{}", err, opts.usage(&format!("Usage: {} [options]", args[0])));
            std::process::exit(2);
        },
    };

    if matches.opt_present("help") {
        print!("{}", opts.usage(&format!("Usage: {} [options]", args[0])));
        return;
    }

    let log_dir = matches.opt_str("log-dir").unwrap_or("./".to_string());
    let log_level = matches.opt_str("log-level").unwrap_or("info".to_string());
    let _logger = match init_logging(&log_dir, &log_level) {
        Ok(logger) => logger,
        Err(err) => {
            eprintln!("Couldn't start logging: {:#}", err);
            std::process::exit(1);
        },
    };

    if let Err(err) = run(&matches) {
        error!("{:#}", err);
        std::process::exit(1);
    }
}
