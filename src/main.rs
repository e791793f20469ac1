mod collect;
mod config;
mod dispatch;
mod error;
mod fetch;
mod model;
mod parser;
mod pipeline;
mod pivot;
mod store;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::config::{Config, StageName};
use crate::pipeline::{Orchestrator, SiteStages, TerminalOperator};

#[derive(Parser)]
#[command(name = "wiki_pivot", about = "Scrape a reference wiki into one pivoted table")]
struct Cli {
    /// Settings file (TOML); WIKI_PIVOT_* environment variables override it
    #[arg(short, long, global = true, default_value = "wiki_pivot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the enabled pipeline stages in order
    Run(RunArgs),
    /// Show which stages would run, with their prompts and pauses
    Stages(RunArgs),
    /// Pivot an already packed block file without touching the network
    Pivot {
        /// Packed blocks (JSON array)
        input: PathBuf,
        /// Pivoted rows (JSON array)
        output: PathBuf,
        /// Also write the table as CSV here
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Reject ambiguous property names and colliding markers
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Site host, e.g. https://wiki.example
    #[arg(long)]
    host: Option<String>,
    /// Output root for all artifacts
    #[arg(short, long)]
    out: Option<PathBuf>,
    /// Only run these stages (e.g. --only parse-pages --only pivot-data)
    #[arg(long, value_parser = parse_stage)]
    only: Vec<StageName>,
    /// Skip these stages
    #[arg(long, value_parser = parse_stage)]
    skip: Vec<StageName>,
    /// Ignore configured pauses
    #[arg(long)]
    no_pause: bool,
}

fn parse_stage(s: &str) -> Result<StageName, String> {
    s.parse().map_err(|e: error::Error| e.to_string())
}

fn resolve_config(path: &std::path::Path, args: RunArgs) -> anyhow::Result<Config> {
    let mut config = Config::load(path)?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(out) = args.out {
        config.out = out;
    }
    if !args.only.is_empty() {
        config.restrict_to(&args.only);
    }
    config.skip(&args.skip);
    if args.no_pause {
        config.disable_pauses();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let config = resolve_config(&cli.config, args)?;
            let stages = SiteStages::new(&config)?;
            let plan: Vec<&str> = config.plan().map(|(stage, _)| stage.as_str()).collect();
            info!("Plan: {}", plan.join(" -> "));

            let mut orchestrator = Orchestrator::new(stages, TerminalOperator);
            let completed = match orchestrator.run(&config).await {
                Ok(completed) => completed,
                Err(e) => {
                    if let Some(stage) = e.failed_stage() {
                        eprintln!("Pipeline stopped at `{}`; later stages did not run.", stage);
                    }
                    return Err(e.into());
                }
            };
            println!(
                "Ran {} stage(s); output in {}",
                completed.len(),
                config.out.display()
            );
        }
        Commands::Stages(args) => {
            let config = resolve_config(&cli.config, args)?;
            print_plan(&config);
            return Ok(());
        }
        Commands::Pivot {
            input,
            output,
            csv,
            strict,
        } => {
            let table = pivot::pivot_file(&input, &output, csv.as_deref(), strict).await?;
            println!(
                "Wrote {} rows x {} columns to {}",
                table.len(),
                table.columns.len(),
                output.display()
            );
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }
    Ok(())
}

fn print_plan(config: &Config) {
    println!("Source: {}", config.root_url());
    println!("Output: {}", config.out.display());
    println!("{:<14} | {:<7} | {:<5} | {}", "Stage", "Enabled", "Pause", "Prompt");
    println!("{}", "-".repeat(50));
    for stage in StageName::ALL {
        let (enabled, pause, prompt) = match config.stage(stage) {
            Some(s) => (s.enabled, s.pause, s.prompt.as_deref().unwrap_or("-")),
            None => (false, false, "-"),
        };
        println!(
            "{:<14} | {:<7} | {:<5} | {}",
            stage,
            if enabled { "yes" } else { "no" },
            if pause { "yes" } else { "no" },
            prompt
        );
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_stage_lists() {
        let cli = Cli::try_parse_from([
            "wiki_pivot",
            "run",
            "--only",
            "parse-pages",
            "--only",
            "pivot-data",
            "--skip",
            "fetch-root",
            "--no-pause",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.only, vec![StageName::ParsePages, StageName::PivotData]);
        assert_eq!(args.skip, vec![StageName::FetchRoot]);
        assert!(args.no_pause);
        assert_eq!(cli.config, PathBuf::from("wiki_pivot.toml"));
    }

    #[test]
    fn cli_rejects_unknown_stage() {
        assert!(Cli::try_parse_from(["wiki_pivot", "run", "--only", "fetch-all"]).is_err());
    }

    #[test]
    fn durations_read_naturally() {
        assert_eq!(format_duration(std::time::Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(std::time::Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(std::time::Duration::from_secs(3725)), "1h 2m 5s");
    }
}
