//! Main CLI application

use crate::config::{find_config_file, load_root};
use crate::loader::{CacheFetcher, Loader};
use crate::runner::{GlobalContext, PackageGraph, Verbosity};
use crate::ui;
use anyhow::Context as _;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use log::LevelFilter;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Action run when none is named
pub const DEFAULT_ACTION: &str = "default";

/// Parsed command line
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub action: String,
    pub file: Option<PathBuf>,
    pub list: bool,
    pub dump: bool,
    pub update: bool,
    pub live: bool,
    pub args: BTreeMap<String, String>,
    pub verbosity: Verbosity,
}

impl Options {
    fn from_matches(matches: &ArgMatches) -> Self {
        let args = matches
            .get_many::<(String, String)>("arg")
            .map(|pairs| pairs.cloned().collect())
            .unwrap_or_default();

        Options {
            action: matches
                .get_one::<String>("action")
                .cloned()
                .unwrap_or_else(|| DEFAULT_ACTION.to_string()),
            file: matches.get_one::<PathBuf>("file").cloned(),
            list: matches.get_flag("list"),
            dump: matches.get_flag("dump"),
            update: matches.get_flag("update"),
            live: matches.get_flag("live"),
            args,
            verbosity: get_verbosity(matches),
        }
    }
}

/// Build the clap command
pub fn build_command() -> Command {
    Command::new("run")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run declarative actions, with importable action packages")
        .arg(
            Arg::new("action")
                .value_name("ACTION")
                .help("Action to run, qualified with import aliases for imported actions")
                .default_value(DEFAULT_ACTION),
        )
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Path to run.yaml"),
        )
        .arg(
            Arg::new("list")
                .short('l')
                .long("list")
                .help("List available actions")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dump")
                .short('d')
                .long("dump")
                .help("Print the merged root declaration and exit, without fetching imports")
                .action(ArgAction::SetTrue)
                .conflicts_with("list"),
        )
        .arg(
            Arg::new("update")
                .short('u')
                .long("update")
                .help("Fetch imported packages again even when cached")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("arg")
                .short('a')
                .long("arg")
                .value_name("KEY=VALUE")
                .help("Argument passed to the action (repeatable)")
                .value_parser(parse_assignment)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("live")
                .long("live")
                .help("Render progress as an action tree")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print command output and errors")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Print no output")
                .action(ArgAction::SetTrue)
                .conflicts_with_all(["quiet", "verbose"]),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print debug logging")
                .action(ArgAction::SetTrue)
                .conflicts_with("quiet"),
        )
}

/// Parse a `key=value` argument assignment
fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

/// Get verbosity level from matches
fn get_verbosity(matches: &ArgMatches) -> Verbosity {
    if matches.get_flag("silent") {
        Verbosity::Silent
    } else if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

/// Initialise `env_logger`; `RUST_LOG` overrides the flag-derived level
fn init_logging(verbosity: Verbosity) {
    let level = match verbosity {
        Verbosity::Silent => LevelFilter::Off,
        Verbosity::Quiet => LevelFilter::Error,
        Verbosity::Normal => LevelFilter::Warn,
        Verbosity::Verbose => LevelFilter::Debug,
    };

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .try_init();
}

/// Load `.env` next to the root document; variables already set win
fn load_dotenv(dir: &Path) {
    let path = dir.join(".env");
    if !path.is_file() {
        return;
    }
    match dotenvy::from_path(&path) {
        Ok(()) => log::debug!("loaded {}", path.display()),
        Err(e) => log::warn!("ignoring {}: {}", path.display(), e),
    }
}

fn print_actions(graph: &PackageGraph) {
    let actions = graph.list_actions();
    if actions.is_empty() {
        println!("No actions defined");
        return;
    }

    let width = actions.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    println!("{}", "Actions:".bold());
    for (name, description) in actions {
        let padding = " ".repeat(width - name.len());
        match description {
            Some(description) => println!("  {}{}  {}", name.cyan(), padding, description),
            None => println!("  {}", name.cyan()),
        }
    }
}

/// Execute parsed options
pub fn execute(options: &Options) -> anyhow::Result<()> {
    let config_path = match &options.file {
        Some(path) => path.clone(),
        None => find_config_file()?,
    };
    let root_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    load_dotenv(&root_dir);

    let root = load_root(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    if options.dump {
        print!("{}", serde_yaml::to_string(&root)?);
        return Ok(());
    }

    let fetcher = CacheFetcher::new(&root_dir).force_refresh(options.update);
    let graph = Loader::new(fetcher).load(root)?;

    if options.list {
        print_actions(&graph);
        return Ok(());
    }

    log::debug!("running {} with args {:?}", options.action, options.args);

    if options.live {
        let (ctx, events) = GlobalContext::channel();
        let ctx = ctx.with_verbosity(options.verbosity);
        let reporter = ui::spawn_reporter(events);

        let result = graph.run(&ctx, &options.action, &options.args);

        // Closing the bus ends the reporter loop
        ctx.done();
        if reporter.join().is_err() {
            log::warn!("progress display stopped unexpectedly");
        }
        result?;
    } else {
        let ctx = GlobalContext::new().with_verbosity(options.verbosity);
        graph.run(&ctx, &options.action, &options.args)?;
    }

    Ok(())
}

/// Run the CLI with the given arguments
pub fn run_from<I, T>(args: I) -> anyhow::Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = build_command().get_matches_from(args);
    let options = Options::from_matches(&matches);
    init_logging(options.verbosity);
    execute(&options)
}

/// Run the CLI application with process arguments
pub fn run() -> anyhow::Result<()> {
    run_from(std::env::args_os())
}
