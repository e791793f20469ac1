use std::time::Instant;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::collect;
use crate::config::{Config, StageName};
use crate::error::{Error, Result};
use crate::fetch::{self, HttpFetcher};
use crate::parser;
use crate::pivot;

/// Runs one named stage. Every stage reads its inputs from the artifacts
/// written by earlier stages, so the runner never needs more than the config.
pub trait StageRunner {
    async fn run_stage(&self, stage: StageName, config: &Config) -> Result<()>;
}

/// Whoever is watching the run: sees prompts and releases pauses.
pub trait Operator {
    fn announce(&mut self, message: &str);
    /// Block until the operator says to continue.
    async fn acknowledge(&mut self) -> Result<()>;
    fn stage_done(&mut self, stage: StageName);
}

pub struct Orchestrator<R, O> {
    runner: R,
    operator: O,
}

impl<R: StageRunner, O: Operator> Orchestrator<R, O> {
    pub fn new(runner: R, operator: O) -> Self {
        Self { runner, operator }
    }

    /// Run every enabled stage in the fixed stage order, one at a time.
    /// Stops at the first failure, which is reported with its stage.
    pub async fn run(&mut self, config: &Config) -> Result<Vec<StageName>> {
        let mut completed = Vec::new();
        for stage in StageName::ALL {
            let Some(settings) = config.stage(stage).filter(|s| s.enabled) else {
                debug!("Skipping disabled stage {}", stage);
                continue;
            };

            if let Some(prompt) = &settings.prompt {
                self.operator.announce(prompt);
            }
            if settings.pause {
                self.operator.acknowledge().await.map_err(|e| Error::Stage {
                    stage,
                    source: Box::new(e),
                })?;
            }

            info!("Stage {} started", stage);
            let started = Instant::now();
            self.runner
                .run_stage(stage, config)
                .await
                .map_err(|e| Error::Stage {
                    stage,
                    source: Box::new(e),
                })?;
            info!(
                "Stage {} finished in {:.1}s",
                stage,
                started.elapsed().as_secs_f64()
            );

            if settings.prompt.is_some() || settings.pause {
                self.operator.stage_done(stage);
            }
            completed.push(stage);
        }
        Ok(completed)
    }
}

/// The real stages of a scrape run.
pub struct SiteStages {
    fetcher: HttpFetcher,
}

impl SiteStages {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            fetcher: HttpFetcher::new(config)?,
        })
    }
}

impl StageRunner for SiteStages {
    async fn run_stage(&self, stage: StageName, config: &Config) -> Result<()> {
        match stage {
            StageName::FetchRoot => fetch::fetch_root(config, &self.fetcher).await,
            StageName::ParseRoot => parser::parse_root(config).await,
            StageName::FetchPages => fetch::fetch_pages(config, &self.fetcher).await,
            StageName::ParsePages => parser::parse_pages(config).await,
            StageName::CollectPages => collect::collect_pages(config).await,
            StageName::PivotData => pivot::pivot_data(config).await,
        }
    }
}

/// Prompts on stdout; a pause waits for Enter on stdin.
pub struct TerminalOperator;

impl Operator for TerminalOperator {
    fn announce(&mut self, message: &str) {
        println!("{}", message);
    }

    async fn acknowledge(&mut self) -> Result<()> {
        println!("Press Enter to continue");
        wait_for_line(BufReader::new(tokio::io::stdin())).await
    }

    fn stage_done(&mut self, _stage: StageName) {
        println!("Done");
    }
}

/// One line from `input`. A closed input never releases a pause.
async fn wait_for_line<R: AsyncBufRead + Unpin>(mut input: R) -> Result<()> {
    let mut line = String::new();
    let read = input.read_line(&mut line).await.map_err(Error::Acknowledge)?;
    if read == 0 {
        return Err(Error::Acknowledge(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "input closed while waiting for Enter",
        )));
    }
    Ok(())
}
