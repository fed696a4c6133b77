use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use std::path::PathBuf;

use form_pilot::config::{Overrides, Settings};
use form_pilot::hands::{BrowserOptions, BrowserSession, resolve_attach_endpoint};
use form_pilot::records::DEFAULT_INPUT_FILE;
use form_pilot::{BatchReport, OpenRouterClient, Orchestrator, PlanGenerator, PlanRunner, face};

#[derive(Parser)]
#[command(name = "form-pilot", version, about = "Fill web forms from JSON records with an LLM-planned browser")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Process every record in an input file, then exit.
    Run {
        #[arg(long, default_value = DEFAULT_INPUT_FILE)]
        input: PathBuf,
    },
    /// Accept batches over HTTP (POST /fill-forms, SSE on /events).
    Serve {
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Form address used when a record has no `url` of its own.
    #[arg(long, global = true)]
    url: Option<String>,

    #[arg(long, global = true)]
    model: Option<String>,

    /// OpenAI-compatible API base.
    #[arg(long, global = true)]
    api_base: Option<String>,

    #[arg(long, global = true)]
    max_markup_chars: Option<usize>,

    #[arg(long, global = true)]
    headless: bool,

    /// Running Chrome to reuse: `http://host:port` of its remote debugging
    /// port, or the browser's `ws://…/devtools/browser/<id>` URL.
    #[arg(long, global = true)]
    attach: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env(Overrides {
        api_base: cli.common.api_base.clone(),
        model: cli.common.model.clone(),
        default_url: cli.common.url.clone(),
        max_markup_chars: cli.common.max_markup_chars,
    })?;

    let command = cli.command.unwrap_or(Command::Run {
        input: PathBuf::from(DEFAULT_INPUT_FILE),
    });

    // Read the batch before paying for a browser.
    let records = match &command {
        Command::Run { input } => {
            let records = form_pilot::load_records(input);
            if records.is_empty() {
                tracing::info!(input = %input.display(), "no entries found");
                return Ok(());
            }
            Some(records)
        }
        Command::Serve { .. } => None,
    };

    let attach = match &cli.common.attach {
        Some(endpoint) => match resolve_attach_endpoint(endpoint).await {
            Ok(ws) => Some(ws),
            Err(e) => {
                tracing::warn!(%endpoint, error = %e, "could not resolve DevTools endpoint, launching a new Chrome");
                None
            }
        },
        None => None,
    };
    let browser_options = BrowserOptions {
        headless: cli.common.headless,
        attach,
    };
    let session = tokio::task::spawn_blocking(move || BrowserSession::launch(&browser_options))
        .await
        .context("browser launch panicked")??;
    let mut page = session.page();

    let client = OpenRouterClient::new(&settings.api_base, &settings.api_key);
    let generator =
        PlanGenerator::new(client, &settings.model).with_max_markup_chars(settings.max_markup_chars);
    let orchestrator = Orchestrator::new(
        generator,
        PlanRunner::new(settings.timings),
        &settings.default_url,
    );

    match (command, records) {
        (Command::Run { .. }, Some(records)) => {
            let report = orchestrator.run(&mut page, &records).await;
            log_summary(&report);
        }
        (Command::Serve { port }, _) => {
            let (mut jobs, events) = face::start_server(port)
                .await
                .context("could not start HTTP server")?;
            let orchestrator = orchestrator.with_events(events);
            tracing::info!("waiting for batches");
            while let Some(job) = jobs.recv().await {
                let report = orchestrator.run(&mut page, &job.records).await;
                log_summary(&report);
                let _ = job.reply.send(report);
            }
        }
        (Command::Run { .. }, None) => {}
    }

    Ok(())
}

fn log_summary(report: &BatchReport) {
    for r in &report.records {
        match &r.error {
            Some(error) => tracing::warn!(index = r.index, url = %r.url, %error, "entry failed"),
            None => tracing::info!(
                index = r.index,
                planned = r.planned,
                applied = r.applied,
                failed = r.failures.len(),
                "entry done"
            ),
        }
    }
    tracing::info!(
        entries = report.records.len(),
        completed = report.completed(),
        "batch summary"
    );
}
