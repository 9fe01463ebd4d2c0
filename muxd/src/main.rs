mod server;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use common::config::{read_config, MuxConfig};
use common::err::CResult;
use common::log::tracing_factory::{OutputType, TracingFactory, TracingFactoryOptions};

#[derive(Parser, Debug, Clone)]
#[command(name = "muxd")]
#[command(version, disable_version_flag = true)]
#[command(about = "Persistent multi-user text world server")]
#[command(long_about = None)]
pub(crate) struct CliArgs {
    /// Path to the loaded configuration file
    #[arg(short, long, help = "Path to loaded configuration file", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the version and exit
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version, help = "print version")]
    version: Option<bool>,

    /// Pid file path
    #[arg(short, long, help = "Pid file path", value_name = "FILE")]
    pub pid_file: Option<String>,

    /// Standalone mode: no network, commands read from stdin as God
    #[arg(short = 's', long, help = "standalone mode (no network)", default_value_t = false)]
    pub standalone: bool,

    /// enable debug info
    #[arg(short, long, help = "enable debug mode", default_value_t = false)]
    pub debug: bool,
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config = load_config(&args);

    let log_opt = TracingFactoryOptions::new(
        args.debug,
        if args.standalone {
            OutputType::STDOUT
        } else {
            OutputType::LOG
        },
        config.base.get_log_dir(),
    );
    let log_factory = TracingFactory::init_log_with_options(log_opt);
    if args.debug {
        eprintln!("log_dir: {:?}", log_factory.get_log_dir());
        eprintln!(
            "config: {}",
            serde_json::to_string_pretty(&config).unwrap_or_default()
        );
    }

    eprintln!();
    eprintln!("╔╦╗╦ ╦═╗ ╦");
    eprintln!("║║║║ ║╔╩╦╝");
    eprintln!(
        "╩ ╩╚═╝╩ ╚═ muxd {} ({})",
        env!("CARGO_PKG_VERSION"),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    eprintln!();

    match server::run(config, &args) {
        // A restart hands the listen state to the freshly spawned child
        // and exits cleanly.
        Ok(server::Outcome::Shutdown) | Ok(server::Outcome::Restart) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            eprintln!("fatal: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Load the config file named on the command line, or the default
/// search path, or built-in defaults when neither exists.
fn load_config(args: &CliArgs) -> MuxConfig {
    let path = get_config_path(args);
    match path {
        Some(p) if p.exists() => match read_config(&p) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("config {} unreadable ({}); using defaults", p.display(), e);
                MuxConfig::default()
            }
        },
        _ => MuxConfig::default(),
    }
}

fn get_config_path(args: &CliArgs) -> Option<PathBuf> {
    if let Some(p) = args.config.as_ref() {
        return Some(p.clone());
    }
    let mut pwd = std::env::current_dir().unwrap_or("/".into());
    pwd.push("conf");
    pwd.push("muxd");
    pwd.set_extension("toml");
    Some(pwd)
}

pub(crate) fn merge(config: &mut MuxConfig, args: &CliArgs) -> CResult<()> {
    if let Some(pid) = args.pid_file.as_ref() {
        config.base.pid_file = pid.clone();
    }
    Ok(())
}
