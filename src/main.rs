use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

use log::{error, info};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use structopt::StructOpt;

use rank_balancer::config::positive_or;
use rank_balancer::error::Result;
use rank_balancer::{parse_backends, Balancer, BalancerConfig, BalancerError, HttpProber, TcpConnector};

#[derive(StructOpt, Debug)]
#[structopt(name = "rank-balancer")]
struct Args {
    #[structopt(short = "t", long = "idle-timeout", help = "Seconds without a client before backends are re-probed")]
    idle_timeout: Option<u64>,

    #[structopt(long = "probe-timeout", help = "Seconds to wait on a backend during a probe")]
    probe_timeout: Option<u64>,

    #[structopt(long = "test-file", help = "File requested from each backend when measuring it")]
    test_file: Option<String>,

    #[structopt(long = "redirect-page", parse(from_os_str), help = "Body sent with 301 responses")]
    redirect_page: Option<PathBuf>,

    #[structopt(long = "unavailable-page", parse(from_os_str), help = "Body sent with 503 responses")]
    unavailable_page: Option<PathBuf>,

    #[structopt(name = "BACKEND", help = "Backend servers as host:port")]
    backends: Vec<String>,
}

fn load_config(args: &Args) -> BalancerConfig {
    let mut config = BalancerConfig::from_env();
    if let Some(secs) = args.idle_timeout {
        let secs = positive_or("--idle-timeout", secs, config.idle_timeout.as_secs());
        config.idle_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.probe_timeout {
        let secs = positive_or("--probe-timeout", secs, config.probe_timeout.as_secs());
        config.probe_timeout = Duration::from_secs(secs);
    }
    if let Some(test_file) = &args.test_file {
        config.test_file = test_file.clone();
    }
    if let Some(page) = &args.redirect_page {
        config.redirect_page = page.clone();
    }
    if let Some(page) = &args.unavailable_page {
        config.unavailable_page = page.clone();
    }
    config
}

fn install_signal_handler() -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("Interrupt received, shutting down ...");
            process::exit(0);
        }
    });
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let backends = parse_backends(&args.backends);
    if backends.is_empty() {
        return Err(BalancerError::NoBackends);
    }

    install_signal_handler()?;

    let config = load_config(&args);
    info!(
        "⚙️ idle timeout {:?}, probe timeout {:?}, test file {}",
        config.idle_timeout, config.probe_timeout, config.test_file
    );

    let prober = HttpProber::new(TcpConnector::new(config.probe_timeout), config.test_file.clone());
    let mut balancer = Balancer::new(config, backends, prober);
    balancer.run()
}

fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::from_args();
    if let Err(e) = run(args) {
        error!("❌ {}, shutting down", e);
        process::exit(1);
    }
}
