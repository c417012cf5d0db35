//! CLI mode for shellcache - drives the cache lifecycle against a disk store.

mod progress;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use console::style;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{
    AppConfig, CacheStorage, CacheStore, Command, DiskCacheStorage, DownloadProgress,
    HttpFetcher, Manifest, MessageOutcome, Reconciler, Request, Routed, ServingOrigin,
    ShellWorker, WorkerEvent,
};

use progress::{BarProgress, print_activation, print_summary};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

fn print_usage() {
    eprintln!("Usage: shellcache [--config <path>] <command> [args]...");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  install                 Stage the core shell");
    eprintln!("  activate                Reconcile the stores against the manifest");
    eprintln!("  fetch <url>...          Route requests through the cache");
    eprintln!("  message <command>       Send skipWaiting or downloadOffline");
    eprintln!("  status                  Show the state of the cache stores");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>         Config file (default: {})", AppConfig::default_path().display());
    eprintln!("  -h, --help              Show this help");
}

enum CliCommand {
    Install,
    Activate,
    Fetch(Vec<String>),
    Message(Command),
    Status,
}

struct CliArgs {
    config_path: Option<PathBuf>,
    command: Option<CliCommand>,
}

/// Scans arguments. `Err` carries a message for the user.
fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut config_path = None;
    let mut positional = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let path = args.get(i).ok_or("--config requires a value")?;
                config_path = Some(PathBuf::from(path));
            }
            "-h" | "--help" => {
                return Ok(CliArgs {
                    config_path,
                    command: None,
                });
            }
            flag if flag.starts_with('-') => return Err(format!("unknown option {flag}")),
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let Some((name, rest)) = positional.split_first() else {
        return Ok(CliArgs {
            config_path,
            command: None,
        });
    };
    let command = match name.as_str() {
        "install" => CliCommand::Install,
        "activate" => CliCommand::Activate,
        "status" => CliCommand::Status,
        "fetch" if !rest.is_empty() => CliCommand::Fetch(rest.to_vec()),
        "fetch" => return Err("fetch requires at least one URL".to_string()),
        "message" => {
            let data = rest.first().ok_or("message requires a command")?;
            CliCommand::Message(data.parse().map_err(|e| format!("{e}"))?)
        }
        other => return Err(format!("unknown command {other}")),
    };
    Ok(CliArgs {
        config_path,
        command: Some(command),
    })
}

/// Everything a command needs, built from the config file.
struct Context {
    config: AppConfig,
    storage: Arc<DiskCacheStorage>,
    fetcher: Arc<HttpFetcher>,
    manifest: Arc<Manifest>,
    origin: ServingOrigin,
}

impl Context {
    fn load(config_path: Option<&std::path::Path>) -> crate::Result<Self> {
        let config = AppConfig::load(config_path)?;
        let manifest = Manifest::load(&config.manifest_path)?;
        let origin = ServingOrigin::parse(&config.origin)?;
        log::info!(
            "Serving {origin} with {} manifest resource(s), caches in {}",
            manifest.len(),
            config.storage_dir.display()
        );
        Ok(Self {
            storage: Arc::new(DiskCacheStorage::new(config.storage_dir.clone())),
            fetcher: Arc::new(HttpFetcher::new()?),
            manifest: Arc::new(manifest),
            origin,
            config,
        })
    }

    fn worker(
        &self,
    ) -> (
        ShellWorker<DiskCacheStorage, HttpFetcher>,
        mpsc::UnboundedReceiver<WorkerEvent>,
    ) {
        ShellWorker::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.manifest),
            self.origin.clone(),
            self.config.cache.clone(),
        )
    }
}

/// Logs worker events until the worker is dropped.
fn spawn_event_logger(mut events: mpsc::UnboundedReceiver<WorkerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                WorkerEvent::CachesWiped { reason } => {
                    log::warn!("Caches wiped: {reason}");
                }
                other => log::info!("Worker event: {other:?}"),
            }
        }
    })
}

/// Runs the CLI.
///
/// # Errors
///
/// Returns an error if configuration or the manifest cannot be loaded, or if
/// the command fails.
pub async fn run() -> crate::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("Error: {message}");
            print_usage();
            std::process::exit(1);
        }
    };
    let Some(command) = cli.command else {
        print_usage();
        return Ok(());
    };

    let ctx = Context::load(cli.config_path.as_deref())?;
    match command {
        CliCommand::Install => install(&ctx).await,
        CliCommand::Activate => activate(&ctx).await,
        CliCommand::Fetch(urls) => fetch(&ctx, &urls).await,
        CliCommand::Message(command) => message(&ctx, command).await,
        CliCommand::Status => status(&ctx).await,
    }
}

async fn install(ctx: &Context) -> crate::Result<()> {
    let (worker, events) = ctx.worker();
    let logger = spawn_event_logger(events);

    let result = worker.on_install().await;
    drop(worker);
    let _ = logger.await;

    let staged = result?;
    println!(
        "{} {staged} core shell file(s) staged; run `shellcache activate` next",
        style("Installed:").green()
    );
    Ok(())
}

async fn activate(ctx: &Context) -> crate::Result<()> {
    let reconciler = Reconciler::new(
        Arc::clone(&ctx.storage),
        Arc::clone(&ctx.fetcher),
        Arc::clone(&ctx.manifest),
        ctx.origin.clone(),
        ctx.config.cache.clone(),
    );
    match reconciler.activate().await {
        Ok(report) => {
            print_activation(&report);
            Ok(())
        }
        Err(e) => {
            println!("{} all cache stores deleted", style("Activation failed:").red());
            Err(e)
        }
    }
}

async fn fetch(ctx: &Context, urls: &[String]) -> crate::Result<()> {
    let (worker, events) = ctx.worker();
    let logger = spawn_event_logger(events);

    let mut result = Ok(());
    for url in urls {
        let routed = match Request::get(url) {
            // Activation ran in an earlier invocation.
            Ok(request) => worker.router().route(&request).await,
            Err(e) => Err(e),
        };
        match routed {
            Ok(Routed::Passthrough) => println!("  {url} {}", style("passthrough").dim()),
            Ok(Routed::Response(response)) => println!(
                "  {url} {} ({})",
                response.status,
                indicatif::HumanBytes(response.body.len() as u64)
            ),
            Err(e) => {
                println!("  {url} {}", style(format!("error: {e}")).red());
                result = Err(e);
            }
        }
    }

    drop(worker);
    let _ = logger.await;
    result
}

async fn message(ctx: &Context, command: Command) -> crate::Result<()> {
    let bar = Arc::new(BarProgress::new());
    let (worker, events) = ctx.worker();
    let worker = worker.with_progress(Arc::clone(&bar) as Arc<dyn DownloadProgress>);
    let logger = spawn_event_logger(events);

    let result = worker.on_message(command).await;
    bar.finish();
    drop(worker);
    let _ = logger.await;

    match result? {
        MessageOutcome::SkipWaiting => println!("Requested immediate activation"),
        MessageOutcome::Downloaded(report) => print_summary(&report),
    }
    Ok(())
}

async fn status(ctx: &Context) -> crate::Result<()> {
    let names = &ctx.config.cache.names;

    println!("\n{SEPARATOR}");
    println!("Cache stores in {}", ctx.storage.root().display());
    println!("{SEPARATOR}");
    for name in [&names.content, &names.staging, &names.manifest] {
        if ctx.storage.has(name).await? {
            let entries = ctx.storage.open(name).await?.keys().await?.len();
            println!("  {name:<20} {entries} entries");
        } else {
            println!("  {name:<20} {}", style("absent").dim());
        }
    }

    let recorded = if ctx.storage.has(&names.manifest).await? {
        let records = ctx.storage.open(&names.manifest).await?;
        records.get(&names.record_key).await?.is_some()
    } else {
        false
    };
    println!(
        "  Manifest record:     {}",
        if recorded { "present" } else { "absent" }
    );

    let missing = if ctx.storage.has(&names.content).await? {
        let (worker, _events) = ctx.worker();
        worker.downloader().missing_paths().await?.len()
    } else {
        ctx.manifest.len()
    };
    println!(
        "  Offline coverage:    {}/{} resource(s)",
        ctx.manifest.len() - missing,
        ctx.manifest.len()
    );
    println!("{SEPARATOR}");
    Ok(())
}
