use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use config::builder::DefaultState;
use config::ConfigBuilder;
use serde::Deserialize;

use crate::error::{Error, Result};

const ENV_PREFIX: &str = "WIKI_PIVOT";

/// Pipeline stages in execution order. The order is owned here, never by
/// whoever happens to list stages in a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageName {
    FetchRoot,
    ParseRoot,
    FetchPages,
    ParsePages,
    CollectPages,
    PivotData,
}

impl StageName {
    pub const ALL: [StageName; 6] = [
        StageName::FetchRoot,
        StageName::ParseRoot,
        StageName::FetchPages,
        StageName::ParsePages,
        StageName::CollectPages,
        StageName::PivotData,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageName::FetchRoot => "fetch-root",
            StageName::ParseRoot => "parse-root",
            StageName::FetchPages => "fetch-pages",
            StageName::ParsePages => "parse-pages",
            StageName::CollectPages => "collect-pages",
            StageName::PivotData => "pivot-data",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        StageName::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown stage `{}`", s)))
    }
}

/// A stage listed without an `enabled` key is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub enabled: bool,
    pub prompt: Option<String>,
    pub pause: bool,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prompt: None,
            pause: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Max page requests in flight at once.
    pub concurrency: usize,
    /// Minimum gap between two request starts.
    pub interval_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            interval_ms: 300,
            timeout_secs: 30,
            user_agent: concat!("wiki_pivot/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PivotSettings {
    /// Reject mixed plain/list names and colliding short markers.
    pub strict: bool,
    /// Also write the pivoted table as CSV.
    pub csv: bool,
}

impl Default for PivotSettings {
    fn default() -> Self {
        Self {
            strict: false,
            csv: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub path: String,
    pub out: PathBuf,
    /// Sidebar section whose entries make up the table of contents.
    pub section: String,
    pub fetch: FetchSettings,
    pub pivot: PivotSettings,
    pub stages: BTreeMap<StageName, StageConfig>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    host: String,
    #[serde(default)]
    path: String,
    #[serde(default = "default_out")]
    out: PathBuf,
    #[serde(default = "default_section")]
    section: String,
    #[serde(default)]
    fetch: FetchSettings,
    #[serde(default)]
    pivot: PivotSettings,
    stages: Option<BTreeMap<String, StageConfig>>,
}

fn default_out() -> PathBuf {
    PathBuf::from("out")
}

fn default_section() -> String {
    "Blocks".to_string()
}

impl Config {
    /// Config with every stage enabled and no operator gating.
    pub fn new(host: impl Into<String>, path: impl Into<String>, out: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
            out: out.into(),
            section: default_section(),
            fetch: FetchSettings::default(),
            pivot: PivotSettings::default(),
            stages: all_stages(),
        }
    }

    /// Layer the optional config file under `WIKI_PIVOT_*` environment variables.
    /// The result is not validated yet so CLI overrides can still fill gaps.
    pub fn load(file: &Path) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(file).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::resolve(builder)
    }

    fn resolve(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let raw: RawConfig = builder.build()?.try_deserialize()?;
        let stages = match raw.stages {
            Some(table) => table
                .into_iter()
                .map(|(name, stage)| Ok((name.parse::<StageName>()?, stage)))
                .collect::<Result<BTreeMap<_, _>>>()?,
            None => all_stages(),
        };
        Ok(Self {
            host: raw.host,
            path: raw.path,
            out: raw.out,
            section: raw.section,
            fetch: raw.fetch,
            pivot: raw.pivot,
            stages,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("`host` must be set".into()));
        }
        if self.fetch.concurrency == 0 {
            return Err(Error::Config("`fetch.concurrency` must be at least 1".into()));
        }
        Ok(())
    }

    pub fn stage(&self, name: StageName) -> Option<&StageConfig> {
        self.stages.get(&name)
    }

    /// Enabled stages, in execution order.
    pub fn plan(&self) -> impl Iterator<Item = (StageName, &StageConfig)> + '_ {
        StageName::ALL
            .into_iter()
            .filter_map(|name| self.stage(name).filter(|s| s.enabled).map(|s| (name, s)))
    }

    pub fn root_url(&self) -> String {
        format!("{}{}", self.host, self.path)
    }

    pub fn page_url(&self, href: &str) -> String {
        format!("{}{}{}", self.host, self.path, href)
    }

    /// Enable exactly the listed stages.
    pub fn restrict_to(&mut self, only: &[StageName]) {
        for (name, stage) in self.stages.iter_mut() {
            stage.enabled = only.contains(name);
        }
        for name in only {
            self.stages.entry(*name).or_default();
        }
    }

    pub fn skip(&mut self, skipped: &[StageName]) {
        for name in skipped {
            if let Some(stage) = self.stages.get_mut(name) {
                stage.enabled = false;
            }
        }
    }

    pub fn disable_pauses(&mut self) {
        for stage in self.stages.values_mut() {
            stage.pause = false;
        }
    }
}

fn all_stages() -> BTreeMap<StageName, StageConfig> {
    StageName::ALL
        .into_iter()
        .map(|name| (name, StageConfig::default()))
        .collect()
}
