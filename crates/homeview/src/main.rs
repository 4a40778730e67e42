use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use homeview::BlindRoller;
use homeview::Config;
use homeview::DeviceId;
use homeview::HttpBackend;
use homeview::MeasurementsView;
use homeview::PageSizeOption;
use homeview::Status;
use homeview::TimeRange;
use homeview::format_diagnostics;
use homeview::list_blind_rollers;
use homeview::range::parse_instant;
use homeview::render;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

/// Smart-home dashboard client
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Config file(s); later files may not redefine fields set by earlier ones
    #[arg(short, long = "config", value_name = "FILE")]
    configs: Vec<PathBuf>,

    /// Log at debug level regardless of config
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show a device's measurements over a time range
    Measurements {
        device: String,

        /// Range start (RFC 3339, YYYY-MM-DDTHH:MM or YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// Range end
        #[arg(long)]
        end: Option<String>,

        /// Rows per page: 5, 10, 25 or all
        #[arg(long)]
        page_size: Option<PageSizeOption>,

        /// Page to show, starting at 1
        #[arg(long, default_value_t = 1)]
        page: i64,
    },

    /// List, read or move blind rollers
    BlindRoller {
        #[command(subcommand)]
        action: BlindRollerAction,
    },
}

#[derive(Debug, Subcommand)]
enum BlindRollerAction {
    /// List every blind roller and the room it is in
    List,

    /// Print the current close percentage
    Get { device: String },

    /// Move to a close percentage between 0 and 100
    Set {
        device: String,
        #[arg(allow_negative_numbers = true)]
        percent: i64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let (config, diagnostics) = Config::from_files(&cli.configs)?;

    let mut targets = config.logging.targets();
    if cli.verbose {
        targets = targets.with_default(LevelFilter::DEBUG);
    }
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(targets)
        .init();

    if !diagnostics.is_empty() {
        eprint!("{}", format_diagnostics(&diagnostics));
    }

    tracing::debug!("Using backend at {}", config.backend.base_url);
    let backend = Arc::new(
        HttpBackend::new(&config.backend.base_url, config.backend.timeout)
            .context("Failed to create HTTP client")?,
    );

    match cli.command {
        Command::Measurements {
            device,
            start,
            end,
            page_size,
            page,
        } => {
            let device = DeviceId::new(device)?;
            let default_range = config.measurements.default_range;
            let start = match start {
                Some(s) => parse_instant(&s)?,
                None => default_range.start(),
            };
            let end = match end {
                Some(s) => parse_instant(&s)?,
                None => default_range.end(),
            };
            let range = TimeRange::new(start, end)?;

            let page_size = page_size.unwrap_or(config.measurements.page_size);
            let view = MeasurementsView::new(backend, device.clone(), range, page_size.into())
                .with_row_order(config.measurements.row_order);

            view.set_inputs(device, range).await;
            view.set_page(page.saturating_sub(1));

            let snapshot = view.snapshot();
            print!("{}", render::render_snapshot(&snapshot, &view.pagination()));

            Ok(if snapshot.status == Status::Error {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::BlindRoller { action } => match action {
            BlindRollerAction::List => {
                let rollers = list_blind_rollers(backend.as_ref())
                    .await
                    .context("Failed to list blind rollers")?;
                if rollers.is_empty() {
                    println!("No blind rollers found");
                }
                for roller in rollers {
                    println!("{}\t{}", roller.device_name, roller.room_name);
                }
                Ok(ExitCode::SUCCESS)
            }
            BlindRollerAction::Get { device } => {
                let roller = BlindRoller::new(backend, DeviceId::new(device)?);
                let position = roller
                    .current_position()
                    .await
                    .with_context(|| format!("Failed to read position of {}", roller.device()))?;
                println!("Current position: {}%", position);
                Ok(ExitCode::SUCCESS)
            }
            BlindRollerAction::Set { device, percent } => {
                let roller = BlindRoller::new(backend, DeviceId::new(device)?);
                let position = roller
                    .set_position(percent)
                    .await
                    .with_context(|| format!("Failed to set position of {}", roller.device()))?;
                println!("New position set successfully: {}%", position);
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}
