use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

static UNSAFE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]+").unwrap());

/// Where every intermediate artifact of a run lives, relative to the output root.
#[derive(Debug, Clone)]
pub struct Artifacts {
    root: PathBuf,
}

impl Artifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn html_dir(&self) -> PathBuf {
        self.root.join("html")
    }

    pub fn root_html(&self) -> PathBuf {
        self.html_dir().join("root.html")
    }

    pub fn pages_html_dir(&self) -> PathBuf {
        self.html_dir().join("pages")
    }

    pub fn page_html(&self, page_name: &str) -> PathBuf {
        self.pages_html_dir()
            .join(format!("{}.html", normalize_file_name(page_name)))
    }

    pub fn json_dir(&self) -> PathBuf {
        self.root.join("json")
    }

    pub fn toc(&self) -> PathBuf {
        self.json_dir().join("toc.json")
    }

    pub fn pages_json_dir(&self) -> PathBuf {
        self.json_dir().join("pages")
    }

    pub fn page_json(&self, page_name: &str) -> PathBuf {
        self.pages_json_dir()
            .join(format!("{}.json", normalize_file_name(page_name)))
    }

    pub fn packed(&self) -> PathBuf {
        self.json_dir().join("packed.json")
    }

    pub fn pivot_json(&self) -> PathBuf {
        self.json_dir().join("pivot.json")
    }

    pub fn pivot_csv(&self) -> PathBuf {
        self.json_dir().join("pivot.csv")
    }
}

/// File stem for a page name: runs of anything but `[A-Za-z0-9_-]` become `_`.
pub fn normalize_file_name(name: &str) -> String {
    UNSAFE_RUN_RE.replace_all(name.trim(), "_").into_owned()
}

pub async fn ensure_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::io(dir, e))
}

pub async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::io(path, e))
}

pub async fn write_text(path: &Path, contents: &str) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| Error::io(path, e))?;
    debug!(path = %path.display(), bytes = contents.len(), "wrote artifact");
    Ok(())
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = read_text(path).await?;
    serde_json::from_str(&text).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_text(path, &text).await
}
