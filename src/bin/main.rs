use std::{
    error::Error,
    io::{self, BufRead, IsTerminal, Write},
    process,
    sync::{
        Arc,
        mpsc::{self, Receiver},
    },
    thread,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ambrosia_launcher::{
    bootstrap::ensure_configurations,
    cli::{Cli, Commands, SecretCommand, parse_args},
    config::LauncherSettings,
    events::ServiceEvent,
    logs::{resolve_log_path, show_logs, tail_lines},
    manager::ServiceManager,
    ports::allocate_ports,
    runtime::{RuntimeMode, RuntimePaths},
    secrets::validate_secret,
    services::ServiceName,
};
use strum::IntoEnumIterator;

const RECOVERY_LOG_LINES: usize = 20;

fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args();
    init_logging(&args);

    match &args.command {
        Commands::Start { mode, json_events } => {
            let settings = build_settings(&args, mode.mode())?;
            run_foreground(settings, *json_events)?;
        }
        Commands::Init { mode } => {
            let settings = build_settings(&args, mode.mode())?;
            let ports = allocate_ports(settings.mode);
            ensure_configurations(&settings.paths, &ports)?;
            println!("{}", settings.paths.ambrosia_config().display());
            println!("{}", settings.paths.phoenix_config().display());
        }
        Commands::Ports { mode } => {
            let ports = allocate_ports(mode.mode());
            println!("phoenixd: {}", ports.phoenixd);
            println!("backend: {}", ports.backend);
            println!("nextjs: {}", ports.nextjs);
        }
        Commands::Logs { service, lines } => {
            let paths = resolve_paths(&args);
            info!("Fetching logs for service: {service}");
            show_logs(paths.log_dir(), service.as_ref(), *lines)?;
        }
        Commands::Secret {
            command: SecretCommand::Check { words },
        } => {
            if validate_secret(&words.join(" ")) {
                println!("valid");
            } else {
                println!("invalid");
                process::exit(1);
            }
        }
    }

    Ok(())
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.directive())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn resolve_paths(args: &Cli) -> RuntimePaths {
    match &args.home {
        Some(home) => RuntimePaths::from_home(home),
        None => RuntimePaths::from_env(),
    }
}

/// Settings file first, then command-line overrides.
fn build_settings(args: &Cli, mode: RuntimeMode) -> Result<LauncherSettings, Box<dyn Error>> {
    let paths = resolve_paths(args);
    let mut settings = LauncherSettings::load(mode, paths, args.config.as_deref())?;

    if let Some(dir) = &args.resources_dir {
        settings.resources_dir = dir.clone();
    }
    if let Some(dir) = &args.project_dir {
        settings.project_dir = dir.clone();
    }

    Ok(settings)
}

fn run_foreground(settings: LauncherSettings, json_events: bool) -> Result<(), Box<dyn Error>> {
    let manager = Arc::new(ServiceManager::new(settings));
    spawn_event_printer(manager.subscribe(), json_events);

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })?;

    loop {
        match manager.start_all() {
            Ok(url) => {
                println!("Ambrosia POS is running at {url}");
                break;
            }
            Err(err) => {
                error!("Failed to start services: {err}");
                if !prompt_recovery(&manager)? {
                    process::exit(1);
                }
                info!("Retrying startup");
            }
        }
    }

    let _ = shutdown_rx.recv();
    info!("Shutting down; stopping services");
    manager.stop_all();
    Ok(())
}

fn spawn_event_printer(events: Receiver<ServiceEvent>, json: bool) {
    thread::spawn(move || {
        for event in events {
            if json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(err) => warn!("Failed to serialize event: {err}"),
                }
            } else {
                println!("[{}] {event}", event.name());
            }
        }
    });
}

/// Asks whether to retry after a failed start. `false` means quit.
fn prompt_recovery(manager: &ServiceManager) -> io::Result<bool> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Ok(false);
    }

    let mut input = String::new();
    loop {
        print!("Startup failed. [r]etry, [l]ogs or [q]uit? ");
        io::stdout().flush()?;

        input.clear();
        if stdin.lock().read_line(&mut input)? == 0 {
            return Ok(false);
        }

        match input.trim().to_ascii_lowercase().as_str() {
            "r" | "retry" => return Ok(true),
            "q" | "quit" => return Ok(false),
            "l" | "logs" => print_recent_logs(manager),
            other => println!("Unknown choice '{other}'"),
        }
    }
}

fn print_recent_logs(manager: &ServiceManager) {
    let log_dir = manager.settings().paths.log_dir();
    println!("Logs are in {}", log_dir.display());

    for service in ServiceName::iter() {
        let path = resolve_log_path(log_dir, service.as_ref());
        match tail_lines(&path, RECOVERY_LOG_LINES) {
            Ok(lines) => {
                println!("--- {service} ({}) ---", path.display());
                for line in lines {
                    println!("{line}");
                }
            }
            Err(_) => println!("--- {service}: no log today ---"),
        }
    }
}
