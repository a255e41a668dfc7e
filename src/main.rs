use std::error::Error;
use std::process::ExitCode;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

mod backend;
mod cli;
mod config;
mod control;
mod dispatch;
mod http;
mod logger;
mod server;
mod smoke;

use cli::{Cli, Command};
use config::{AppState, Config};
use control::{PgTools, ProcessControl};
use dispatch::Dispatcher;

fn main() -> ExitCode {
    let cli = match Cli::from_env() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("[ERROR] {e}\n\n{}", cli::USAGE);
            return ExitCode::from(2);
        }
    };

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            logger::log_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    if cli.command == Command::Help {
        println!("{}", cli::USAGE);
        return Ok(ExitCode::SUCCESS);
    }

    let cfg = Config::load_from(&cli.config_path)?;
    if cli.command == Command::Config {
        print!("{}", cfg.to_toml()?);
        return Ok(ExitCode::SUCCESS);
    }

    logger::init(&cfg)?;

    // Tokio 运行时，线程数取自 server.workers
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
        logger::log_debug(&format!("[CONFIG] Using {workers} worker threads"));
    }

    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg, cli.command))
}

async fn async_main(cfg: Config, command: Command) -> Result<ExitCode, Box<dyn Error>> {
    let tools = PgTools::from_config(&cfg.database, &cfg.control);

    match command {
        Command::Serve => {
            serve(cfg).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Status => status(&cfg, &tools).await,
        Command::Start => start(&cfg, &tools).await,
        Command::Stop => {
            tools.stop_service().await?;
            logger::log_info("Database service stopped");
            Ok(ExitCode::SUCCESS)
        }
        Command::Create(name) => {
            tools.create_database(&name).await?;
            logger::log_info(&format!("Created database '{name}'"));
            Ok(ExitCode::SUCCESS)
        }
        Command::Drop(name) => {
            tools.drop_database(&name).await?;
            logger::log_info(&format!("Dropped database '{name}'"));
            Ok(ExitCode::SUCCESS)
        }
        Command::Migrate { database, file } => {
            tools.run_file(&database, &file).await?;
            logger::log_info(&format!("Applied {} to '{database}'", file.display()));
            Ok(ExitCode::SUCCESS)
        }
        Command::Smoke => {
            let backend = backend::from_config(&cfg.database);
            let report = smoke::SmokeTest::new(&cfg, &tools, backend).run().await;
            report.print_summary();
            Ok(if report.success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        // handled before the runtime starts
        Command::Config | Command::Help => Ok(ExitCode::SUCCESS),
    }
}

/// Run the query endpoint until SIGINT/SIGTERM
async fn serve(cfg: Config) -> Result<(), Box<dyn Error>> {
    let addr = cfg.get_socket_addr()?;
    let listener = server::create_reusable_listener(addr, cfg.server.backlog)?;

    let backend = backend::from_config(&cfg.database);
    let dispatcher = Dispatcher::from_config(&cfg, backend)?;
    logger::log_server_start(&addr, &cfg, &dispatcher);

    let state = Arc::new(AppState::new(cfg, dispatcher));
    server::start_signal_handler(Arc::clone(&state.shutdown_signal))?;
    let active_connections = Arc::new(AtomicUsize::new(0));

    // Use LocalSet for spawn_local support
    let local = tokio::task::LocalSet::new();
    local
        .run_until(server::run_server_loop(listener, state, active_connections))
        .await?;
    Ok(())
}

async fn status(cfg: &Config, tools: &PgTools) -> Result<ExitCode, Box<dyn Error>> {
    let endpoint = format!("{}:{}", cfg.database.host, cfg.database.port);
    if !tools.is_ready().await? {
        logger::log_step("FAIL", "Service", &format!("not accepting connections on {endpoint}"));
        return Ok(ExitCode::FAILURE);
    }
    logger::log_step("PASS", "Service", &format!("accepting connections on {endpoint}"));

    let version = tools
        .run_statement(&cfg.database.maintenance_db, "SHOW server_version")
        .await?;
    logger::log_step("PASS", "Version", &version);

    let databases = tools.list_databases().await?;
    logger::log_step("PASS", "Databases", &databases.join(", "));

    let target = &cfg.database.dbname;
    if databases.iter().any(|name| name == target) {
        logger::log_step("PASS", "Target store", &format!("'{target}' exists"));
        Ok(ExitCode::SUCCESS)
    } else {
        logger::log_step(
            "FAIL",
            "Target store",
            &format!("'{target}' missing, run `query_gateway create {target}`"),
        );
        Ok(ExitCode::FAILURE)
    }
}

async fn start(cfg: &Config, tools: &PgTools) -> Result<ExitCode, Box<dyn Error>> {
    if tools.is_ready().await? {
        logger::log_info("Database service already running");
        return Ok(ExitCode::SUCCESS);
    }

    tools.start_service().await?;
    let ready = tools
        .wait_until_ready(
            cfg.control.ready_attempts,
            Duration::from_millis(cfg.control.ready_interval_ms),
        )
        .await?;

    if ready {
        logger::log_info("Database service started and accepting connections");
        Ok(ExitCode::SUCCESS)
    } else {
        logger::log_error(&format!(
            "Database service not ready after {} attempts",
            cfg.control.ready_attempts
        ));
        Ok(ExitCode::FAILURE)
    }
}
