use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use versatiles_download::hashes::HashEvent;
use versatiles_download::{config, group, output, run, scan};

#[derive(Parser)]
#[command(name = "versatiles-download")]
#[command(about = "Catalog, hash, cache and publish versatiles release files")]
#[command(long_about = "\
Catalog, hash, cache and publish versatiles release files

The volume root holds everything a run reads and writes:

  volumes/
  ├── remote_files/                  # Release tree (*.versatiles, any depth)
  │   ├── osm.20240701.versatiles
  │   ├── osm.20240701.versatiles.md5     # Sidecars, written once
  │   └── osm.20240701.versatiles.sha256
  ├── local_files/                   # Local cache + rendered pages
  └── nginx_conf/site-confs/default.conf

Files are grouped by the name up to the first dot. The newest release of a
product is also published without its date (osm.versatiles).

The domain comes from --domain, the config file, or the DOMAIN environment
variable, in that order.

Run 'versatiles-download gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Public host name (overrides config and DOMAIN)
    #[arg(long, global = true)]
    domain: Option<String>,

    /// Volume root (overrides config)
    #[arg(long, global = true)]
    volume_root: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline: scan → hash → group → sync → render → publish
    Run {
        /// Also write the run report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// List products found in the release tree
    Scan,
    /// Fill missing checksum sidecars
    Hash,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "versatiles_download=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(err) = execute(cli) {
        error!("{err}");
        std::process::exit(1);
    }
}

fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let mut config = config::load_config(&cli.config)?;
    if let Some(domain) = cli.domain {
        config.domain = Some(domain);
    }
    if config.domain.is_none() {
        config.domain = std::env::var("DOMAIN").ok();
    }
    if let Some(volume_root) = cli.volume_root {
        config.volume_root = volume_root;
    }
    config.validate()?;

    match cli.command {
        Command::Run { report } => {
            let (tx, printer) = spawn_printer();
            let result = run::run(&config, Some(tx));
            printer.join().ok();
            let result = result?;
            output::print_run_report(&result);
            if let Some(path) = report {
                std::fs::write(&path, serde_json::to_string_pretty(&result)?)?;
            }
        }
        Command::Scan => {
            let remote_dir = PathBuf::from(&config.volume_root).join("remote_files");
            let files = scan::scan(&remote_dir)?;
            let groups = group::group_files(files);
            output::print_scan_output(&groups);
        }
        Command::Hash => {
            let (tx, printer) = spawn_printer();
            let result = run::hash(&config, Some(&tx));
            drop(tx);
            printer.join().ok();
            println!("Hashes: {}", result?);
        }
        Command::GenConfig => unreachable!("handled above"),
    }

    Ok(())
}

/// Print hash progress on a separate thread until the sender is dropped.
fn spawn_printer() -> (Sender<HashEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let printer = thread::spawn(move || {
        for event in rx {
            for line in output::format_hash_event(&event) {
                println!("{}", line);
            }
        }
    });
    (tx, printer)
}
