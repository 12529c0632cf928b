use std::env;
use std::process::ExitCode;

use oneshot_http::{Config, ConsoleSink, Driver, Error, Target};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::FmtSubscriber;

const DEFAULT_URL: &str =
    "https://api.github.com/search/repositories?q=netty&sort=stars&order=desc&per_page=5";

fn main() -> ExitCode {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(LevelFilter::INFO)
        .with_writer(std::io::stderr)
        .finish();

    // Also installs the bridge for the library's log records.
    if let Err(e) = subscriber.try_init() {
        eprintln!("Logging not available: {}", e);
    }

    let url = env::args().nth(1).unwrap_or_else(|| DEFAULT_URL.to_string());

    match run(&url) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(url: &str) -> Result<(), Error> {
    let target: Target = url.parse()?;
    let mut sink = ConsoleSink::stdout();

    Driver::new(Config::new(target)).run(&mut sink)
}
