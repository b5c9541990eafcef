//! CLI mode for offline-cache: install, activate, inspect and serve.

mod progress;

use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    AppConfig, CacheObserver, CacheStorage, Error, Request, StorageBackend, build_manager,
    format_bytes,
};

use progress::{ActivationLog, InstallProgress, print_activation_summary, print_install_summary, print_listing};

/// A parsed CLI command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Pre-cache the manifest into the current generation.
    Install,
    /// Delete every generation but the current one.
    Activate,
    /// Answer one request cache-first.
    Fetch(String),
    /// List generations and cached entries.
    List,
    /// Run the caching proxy.
    Serve,
    /// Print usage.
    Help,
}

/// Parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub command: Command,
    pub config_path: Option<PathBuf>,
    pub origin: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub memory: bool,
}

pub fn print_usage() {
    eprintln!("Usage: offline-cache [OPTIONS] <COMMAND>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  install             Pre-cache the manifest into the current cache");
    eprintln!("  activate            Delete every cache except the current one");
    eprintln!("  fetch <path>        Fetch a path cache-first and report where it came from");
    eprintln!("  list                List caches and the entries of the current one");
    eprintln!("  serve               Run the caching proxy in front of the origin");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <PATH> Configuration file (default: {})", AppConfig::default_path().display());
    eprintln!("  --origin <URL>      Origin base URL");
    eprintln!("  --cache-dir <PATH>  Directory of the disk cache store");
    eprintln!("  --memory            Keep caches in memory (only useful with serve)");
    eprintln!("  -h, --help          Show this help");
}

fn take_value(args: &[String], i: &mut usize, flag: &str) -> crate::Result<String> {
    *i += 1;
    args.get(*i)
        .cloned()
        .ok_or_else(|| Error::Usage(format!("{flag} requires a value")))
}

/// Parses command line arguments (without the program name).
///
/// # Errors
///
/// Returns [`Error::Usage`] for unknown flags, missing values or a missing
/// command.
pub fn parse_args(args: &[String]) -> crate::Result<CliArgs> {
    let mut command = None;
    let mut config_path = None;
    let mut origin = None;
    let mut cache_dir = None;
    let mut memory = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => command = Some(Command::Help),
            "-c" | "--config" => config_path = Some(PathBuf::from(take_value(args, &mut i, "--config")?)),
            "--origin" => origin = Some(take_value(args, &mut i, "--origin")?),
            "--cache-dir" => cache_dir = Some(PathBuf::from(take_value(args, &mut i, "--cache-dir")?)),
            "--memory" => memory = true,
            flag if flag.starts_with('-') => {
                return Err(Error::Usage(format!("unknown option {flag}")));
            }
            word if command.is_none() => {
                command = Some(match word {
                    "install" => Command::Install,
                    "activate" => Command::Activate,
                    "fetch" => Command::Fetch(take_value(args, &mut i, "fetch")?),
                    "list" => Command::List,
                    "serve" => Command::Serve,
                    "help" => Command::Help,
                    other => return Err(Error::Usage(format!("unknown command {other}"))),
                });
            }
            extra => return Err(Error::Usage(format!("unexpected argument {extra}"))),
        }
        i += 1;
    }

    Ok(CliArgs {
        command: command.unwrap_or(Command::Help),
        config_path,
        origin,
        cache_dir,
        memory,
    })
}

/// Applies command line overrides on top of the loaded configuration.
fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(origin) = &args.origin {
        config.origin.base_url.clone_from(origin);
    }
    if let Some(dir) = &args.cache_dir {
        config.storage.directory.clone_from(dir);
        config.storage.backend = StorageBackend::Disk;
    }
    if args.memory {
        config.storage.backend = StorageBackend::Memory;
    }
}

/// Runs the CLI with the process arguments.
///
/// # Errors
///
/// Returns an error if the arguments are invalid or the command fails.
pub async fn run() -> crate::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&args)?;
    if args.command == Command::Help {
        print_usage();
        return Ok(());
    }

    let mut config = AppConfig::load_or_default(args.config_path.as_deref())?;
    apply_overrides(&mut config, &args);
    run_command(args.command, config).await
}

/// Runs a single command against the given configuration.
///
/// # Errors
///
/// Returns the command's error.
pub async fn run_command(command: Command, config: AppConfig) -> crate::Result<()> {
    let manager = build_manager(&config)?;

    match command {
        Command::Help => print_usage(),
        Command::Install => {
            let progress = Arc::new(InstallProgress::new());
            let observer: Arc<dyn CacheObserver> = Arc::clone(&progress) as Arc<dyn CacheObserver>;
            let result = manager.install_with(&observer).await;
            progress.finish();
            print_install_summary(&result?);
        }
        Command::Activate => {
            let observer: Arc<dyn CacheObserver> = Arc::new(ActivationLog);
            let report = manager.activate_with(&observer).await?;
            print_activation_summary(manager.current_generation(), &report);
        }
        Command::Fetch(path) => {
            let request = Request::get(&path);
            let hits_before = manager.stats().snapshot().hits;
            let response = manager.fetch(&request).await?;
            let source = if manager.stats().snapshot().hits > hits_before {
                "cache"
            } else {
                "network"
            };
            println!(
                "{} {} ({}, from {source})",
                response.status(),
                request.url(),
                format_bytes(response.len())
            );
        }
        Command::List => {
            let generations = manager.storage().keys().await?;
            let entries = manager.entries().await?;
            print_listing(manager.current_generation(), &generations, &entries);
        }
        Command::Serve => serve(manager, &config).await?,
    }
    Ok(())
}

#[cfg(feature = "server")]
async fn serve(
    manager: crate::OfflineCacheManager<crate::DynStorage, crate::HttpNetwork>,
    config: &AppConfig,
) -> crate::Result<()> {
    let worker = crate::ServiceWorker::register(manager, config.server.scope.clone());
    let shutdown = tokio_util::sync::CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Received SIGINT");
        }
        signal.cancel();
    });
    crate::server::run_server(worker, &config.server, shutdown).await
}

#[cfg(not(feature = "server"))]
async fn serve(
    _manager: crate::OfflineCacheManager<crate::DynStorage, crate::HttpNetwork>,
    _config: &AppConfig,
) -> crate::Result<()> {
    Err(Error::Usage("server support not compiled in".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn no_arguments_means_help() {
        assert_eq!(parse_args(&[]).unwrap().command, Command::Help);
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_args(&args(&["install"])).unwrap().command, Command::Install);
        assert_eq!(parse_args(&args(&["activate"])).unwrap().command, Command::Activate);
        assert_eq!(parse_args(&args(&["list"])).unwrap().command, Command::List);
        assert_eq!(parse_args(&args(&["serve"])).unwrap().command, Command::Serve);
        assert_eq!(
            parse_args(&args(&["fetch", "/index.html"])).unwrap().command,
            Command::Fetch("/index.html".to_string())
        );
    }

    #[test]
    fn parses_options_around_command() {
        let parsed = parse_args(&args(&[
            "--config",
            "site.toml",
            "install",
            "--origin",
            "https://example.com/",
            "--cache-dir",
            "/tmp/c",
        ]))
        .unwrap();
        assert_eq!(parsed.command, Command::Install);
        assert_eq!(parsed.config_path, Some(PathBuf::from("site.toml")));
        assert_eq!(parsed.origin.as_deref(), Some("https://example.com/"));
        assert_eq!(parsed.cache_dir, Some(PathBuf::from("/tmp/c")));
        assert!(!parsed.memory);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(parse_args(&args(&["--bogus"])), Err(Error::Usage(_))));
        assert!(matches!(parse_args(&args(&["explode"])), Err(Error::Usage(_))));
        assert!(matches!(parse_args(&args(&["fetch"])), Err(Error::Usage(_))));
        assert!(matches!(parse_args(&args(&["list", "extra"])), Err(Error::Usage(_))));
        assert!(matches!(parse_args(&args(&["--origin"])), Err(Error::Usage(_))));
    }

    #[test]
    fn overrides_replace_config_values() {
        let mut config = AppConfig::default();
        let parsed = parse_args(&args(&["--origin", "https://example.com/", "--memory", "serve"])).unwrap();
        apply_overrides(&mut config, &parsed);
        assert_eq!(config.origin.base_url, "https://example.com/");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[tokio::test]
    async fn list_on_empty_store_succeeds() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.storage.directory = dir.path().to_path_buf();
        run_command(Command::List, config).await.unwrap();
    }

    #[tokio::test]
    async fn install_against_unreachable_origin_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.storage.directory = dir.path().to_path_buf();
        config.origin.base_url = "http://127.0.0.1:9/".to_string();
        config.cache = crate::CacheConfig::new().with_manifest(["/"]);

        let result = run_command(Command::Install, config).await;
        assert!(matches!(result, Err(Error::ManifestFetch { .. })));
    }
}
