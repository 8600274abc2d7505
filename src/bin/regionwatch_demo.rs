//! regionwatch demo
//!
//! Monitors two services against the in-memory adapters, replays a scripted
//! sequence of crossings, and prints each service's start/stop transitions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use regionwatch::{
    Activation, Crossing, EngineConfig, InMemoryPredicateStore, InMemoryRegionStore, Location,
    NotificationSound, PositionPredicate, Presentation, PredicateId, Reconciler, Region,
    SessionError, WatchError, WatchResult,
};

/// Demo configuration
struct Config {
    /// Default tracing directive level
    log_level: String,
    /// Optional engine configuration file (JSON)
    config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            config_path: None,
        }
    }
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--log-level" | "-l" => {
                if i + 1 < args.len() {
                    config.log_level = args[i + 1].clone();
                    i += 2;
                } else {
                    eprintln!("error: --log-level requires a value");
                    std::process::exit(1);
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    eprintln!("error: --config requires a value");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                println!("regionwatch-demo - scripted geofence monitoring");
                println!();
                println!("USAGE:");
                println!("    regionwatch-demo [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -l, --log-level <LEVEL>   Log level for regionwatch [default: info]");
                println!("    -c, --config <FILE>       Engine configuration (JSON)");
                println!("    -h, --help                Print help information");
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(1);
            }
        }
    }

    config
}

/// Something that starts when the device arrives and stops when it leaves.
struct Service {
    name: &'static str,
    region: Region,
    start: PositionPredicate,
    stop: PositionPredicate,
    running: bool,
}

impl Service {
    fn new(name: &'static str, latitude: f64, longitude: f64, radius: f64) -> WatchResult<Self> {
        let center = Location::named(latitude, longitude, name)?;
        let region = Region::circle(center, radius)?;
        let alert = Presentation::new(
            format!("Start {name}"),
            format!("You arrived at {name}"),
            NotificationSound::Default,
        )?;
        Ok(Self {
            name,
            start: PositionPredicate::inside(region.clone(), Activation::Always(alert)),
            stop: PositionPredicate::outside(region.clone(), Activation::WhenInUse),
            region,
            running: false,
        })
    }
}

enum Step {
    Enter(&'static str),
    Exit(&'static str),
}

fn script() -> Vec<Step> {
    vec![
        Step::Enter("Châtillon"),
        Step::Enter("Châtillon"),
        Step::Exit("Châtillon"),
        Step::Enter("Invalides"),
        Step::Exit("Invalides"),
        Step::Exit("Invalides"),
    ]
}

fn run(config: &Config) -> WatchResult<()> {
    let engine_config = match &config.config_path {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    let regions = Arc::new(InMemoryRegionStore::new());
    let notifications = Arc::new(InMemoryPredicateStore::with_category(
        engine_config.category_identifier.clone(),
    ));
    let engine = Reconciler::with_config(regions.clone(), notifications.clone(), engine_config)?;

    let mut services = vec![
        Service::new("Châtillon", 48.809_995, 2.300_354, 50.0)?,
        Service::new("Invalides", 48.855_011, 2.312_583, 120.0)?,
    ];
    let owners: HashMap<PredicateId, usize> = services
        .iter()
        .enumerate()
        .flat_map(|(i, s)| [(s.start.id(), i), (s.stop.id(), i)])
        .collect();
    let region_of: HashMap<&'static str, String> = services
        .iter()
        .map(|s| (s.name, s.region.identifier()))
        .collect();

    let desired: Vec<PositionPredicate> = services
        .iter()
        .flat_map(|s| [s.start.clone(), s.stop.clone()])
        .collect();
    let stream = engine.monitor(desired)?;
    println!("monitoring {} services", services.len());

    let steps = script();
    let expected = steps.len();
    let driver = {
        let regions = Arc::clone(&regions);
        thread::spawn(move || {
            for step in steps {
                thread::sleep(Duration::from_millis(50));
                let delivered = match step {
                    Step::Enter(name) => region_of.get(name).is_some_and(|id| regions.enter(id)),
                    Step::Exit(name) => region_of.get(name).is_some_and(|id| regions.exit(id)),
                };
                if !delivered {
                    eprintln!("warning: scripted crossing for an unmonitored region");
                }
            }
        })
    };

    for _ in 0..expected {
        let triggered = match stream.recv_timeout(Duration::from_secs(2)) {
            Ok(t) => t,
            Err(WatchError::Session(SessionError::Timeout { .. })) => break,
            Err(e) => return Err(e),
        };
        let Some(&index) = owners.get(&triggered.predicate().id()) else {
            continue;
        };
        let service = &mut services[index];
        let wants_running = triggered.crossing() == Crossing::Entered;

        // Distinct until changed: repeated crossings in the same state are ignored.
        if service.running == wants_running {
            println!("{}: already {}", service.name, state_label(wants_running));
            continue;
        }
        service.running = wants_running;
        println!("{}: {}", service.name, state_label(wants_running));

        if triggered.predicate().is_always() {
            // The platform fires the scheduled alert for the same crossing.
            let id = triggered.predicate().id().to_string();
            if let Some(options) = notifications.deliver(&id) {
                println!(
                    "{}: system alert {}",
                    service.name,
                    if options.is_empty() { "suppressed" } else { "presented" }
                );
            }
        }
    }

    if driver.join().is_err() {
        return Err(WatchError::internal("crossing driver panicked"));
    }
    println!(
        "emitted {} events, dropped {}",
        stream.emitted_events(),
        stream.dropped_events()
    );
    stream.cancel()?;
    println!("released every registration: {}", regions.monitored_identifiers().is_empty());
    Ok(())
}

const fn state_label(running: bool) -> &'static str {
    if running {
        "running"
    } else {
        "stopped"
    }
}

fn main() {
    let config = parse_args();
    regionwatch::logging::init(&format!("regionwatch={}", config.log_level));

    if let Err(e) = run(&config) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
