use rowstream::{
    compare,
    config::{self, Config},
};
use tracing::{error, info};

fn main() {
    // Logs go to stderr so stdout only carries rows and timings
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    info!("Starting rowstream...");

    // Optional config path as the only argument
    let args: Vec<String> = std::env::args().collect();
    let config = match args.get(1) {
        Some(path) => match config::load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration from {}: {}", path, e);
                std::process::exit(2);
            }
        },
        None => {
            info!("No configuration file given, using placeholder settings");
            Config::default()
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = compare::run_comparison(&config, &mut out) {
        error!("Failed to write comparison report: {}", e);
    }
}
