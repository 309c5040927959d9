/**
 * Lunar Rover Navigation
 *
 * Loads nav.json, starts navigation and runs until SIGINT/SIGTERM.
 *
 * Usage: lrn [-c <config>] [-l <level>] [-v] [-h]
 * Default config: ./nav.json
 */

use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{error, info};

use lrn::{LrnConfig, LrnManager};

const DEFAULT_CONFIG: &str = "nav.json";

static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn signal_handler(_sig: libc::c_int) {
    RUNNING.store(false, Ordering::SeqCst);
}

struct Options {
    config: String,
    log_level: Option<String>,
}

fn usage() {
    println!("Usage: lrn [options]");
    println!();
    println!("Options:");
    println!("  -c, --config <path>     Configuration file path (default: ./{})", DEFAULT_CONFIG);
    println!("  -l, --log-level <level> trace, debug, info (default), warning, error, fatal");
    println!("  -v, --version           Show version");
    println!("  -h, --help              Show this help");
}

/// None when the process should exit right away
fn parse_args() -> Result<Option<Options>, String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut options = Options {
        config: format!("./{}", DEFAULT_CONFIG),
        log_level: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                usage();
                return Ok(None);
            }
            "-v" | "--version" => {
                println!("lrn {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            "-c" | "--config" => {
                i += 1;
                options.config = args.get(i).cloned().ok_or("--config needs a path")?;
            }
            "-l" | "--log-level" => {
                i += 1;
                options.log_level = Some(args.get(i).cloned().ok_or("--log-level needs a level")?);
            }
            other => return Err(format!("unknown option: {}", other)),
        }
        i += 1;
    }
    Ok(Some(options))
}

//accept the severity names of the old tool too
fn log_filter(level: &str) -> &str {
    match level {
        "warning" => "warn",
        "fatal" => "error",
        other => other,
    }
}

fn install_signal_handlers() -> bool {
    unsafe {
        let handler = signal_handler as libc::sighandler_t;
        libc::signal(libc::SIGINT, handler) != libc::SIG_ERR
            && libc::signal(libc::SIGTERM, handler) != libc::SIG_ERR
    }
}

fn main() {
    let options = match parse_args() {
        Ok(Some(options)) => options,
        Ok(None) => return,
        Err(e) => {
            eprintln!("{}", e);
            usage();
            process::exit(1);
        }
    };

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = &options.log_level {
        logger.parse_filters(log_filter(level));
    }
    logger.init();

    info!("lrn v{}", env!("CARGO_PKG_VERSION"));

    let config = match LrnConfig::load(&options.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load {}: {}", options.config, e);
            process::exit(1);
        }
    };

    if !install_signal_handlers() {
        error!("Failed to install signal handlers");
        process::exit(2);
    }

    let manager = LrnManager::new();
    manager.load_configuration(config);
    if let Err(e) = manager.start() {
        error!("Failed to start navigation: {}", e);
        process::exit(1);
    }

    while RUNNING.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    info!("Shutdown signal received");
    manager.stop();
}
