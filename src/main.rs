//! RISC-V Boot GDB — Main Entry Point

use clap::Parser;
use tracing::{info, error, debug};
use tracing_subscriber::{EnvFilter, fmt};
use rmcp::{ServiceExt, transport::stdio};

use riscv_boot_gdb::recorder::RecordingDebugger;
use riscv_boot_gdb::script::{render_script, startup_args};
use riscv_boot_gdb::{Args, Config, GdbBootToolHandler, Mode};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = Config::from_args(&args)?;

    match args.mode.clone().unwrap_or(Mode::Serve) {
        Mode::Serve => serve(config).await,
        Mode::Script { output } => {
            let script = render_script(&config.initializer(None, false)?.plan());
            match output {
                Some(path) => {
                    std::fs::write(&path, script)?;
                    info!("Wrote GDB init script to {}", path.display());
                }
                None => print!("{script}"),
            }
            Ok(())
        }
        Mode::Launch { gdb_args } => launch(&config, &gdb_args).await,
        Mode::Plan => {
            let mut recorder = RecordingDebugger::new();
            let report = config.initializer(None, false)?.initialize(&mut recorder).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting RISC-V Boot GDB MCP Server v{}", env!("CARGO_PKG_VERSION"));

    let service = GdbBootToolHandler::new(config)
        .serve(stdio()).await.inspect_err(|e| {
            error!("Serving error: {:?}", e);
        })?;

    service.waiting().await?;
    Ok(())
}

/// Hand the terminal to GDB with the session commands run at startup
async fn launch(config: &Config, gdb_args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let initializer = config.initializer(None, false)?;
    let gdb_path = config.find_gdb()?;

    let mut cmd = tokio::process::Command::new(&gdb_path);
    cmd.args(startup_args(&initializer.plan())).args(gdb_args);

    info!("Launching {} for {}", gdb_path.display(), initializer.root().display());
    let status = cmd.status().await?;
    if !status.success() {
        error!("gdb exited with {}", status);
        std::process::exit(status.code().unwrap_or(1));
    }
    Ok(())
}

fn init_logging(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false);

    if let Some(log_file) = &args.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)?;
        subscriber.with_writer(file).init();
    } else {
        subscriber.with_writer(std::io::stderr).init();
    }

    debug!("Logging initialized with level: {}", args.log_level);
    Ok(())
}
