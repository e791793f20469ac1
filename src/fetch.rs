use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::model::PageInfo;
use crate::store::{self, Artifacts};

/// Plain GET of one document. Non-success statuses are errors; nothing is retried.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.fetch.user_agent.as_str())
            .timeout(Duration::from_secs(config.fetch.timeout_secs))
            .build()
            .map_err(|source| Error::Transport {
                url: config.host.clone(),
                source,
            })?;
        Ok(Self { client })
    }

    pub async fn get_text(&self, url: String) -> Result<String> {
        let transport = |source| Error::Transport {
            url: url.clone(),
            source,
        };
        let response = self.client.get(&url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                url,
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(transport)
    }
}

pub async fn fetch_root(config: &Config, fetcher: &HttpFetcher) -> Result<()> {
    let url = config.root_url();
    info!("Fetching root document: {}", url);
    let text = fetcher.get_text(url).await?;
    let artifacts = Artifacts::new(&config.out);
    store::ensure_dir(&artifacts.html_dir()).await?;
    store::write_text(&artifacts.root_html(), &text).await
}

pub async fn fetch_pages(config: &Config, fetcher: &HttpFetcher) -> Result<()> {
    let fetcher = fetcher.clone();
    fetch_pages_with(config, move |url| {
        let fetcher = fetcher.clone();
        async move { fetcher.get_text(url).await }
    })
    .await
}

/// Fetch every TOC page through one dispatcher and store the raw documents.
///
/// Every request is allowed to finish; the first failure (in TOC order) is
/// reported once all of them have settled.
pub async fn fetch_pages_with<F, Fut>(config: &Config, fetch: F) -> Result<()>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let artifacts = Artifacts::new(&config.out);
    let toc: Vec<PageInfo> = store::read_json(&artifacts.toc()).await?;
    store::ensure_dir(&artifacts.pages_html_dir()).await?;

    let dispatcher = Dispatcher::new(
        fetch,
        config.fetch.concurrency,
        Duration::from_millis(config.fetch.interval_ms),
    )?;

    info!(
        "Fetching {} pages ({} at a time, {}ms apart)",
        toc.len(),
        config.fetch.concurrency,
        config.fetch.interval_ms
    );
    let pb = ProgressBar::new(toc.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let outcomes = join_all(toc.iter().map(|info| {
        let dispatcher = &dispatcher;
        let artifacts = &artifacts;
        let pb = &pb;
        async move {
            let result = async {
                let text = dispatcher.call(config.page_url(&info.href)).await?;
                store::write_text(&artifacts.page_html(&info.name), &text).await
            }
            .await;
            pb.inc(1);
            if let Err(e) = &result {
                warn!("Fetching {} failed: {}", info.name, e);
            }
            result
        }
    }))
    .await;
    pb.finish_and_clear();

    let failed = outcomes.iter().filter(|r| r.is_err()).count();
    info!("Fetched {} pages ({} failed)", toc.len() - failed, failed);
    outcomes.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    async fn seeded(dir: &std::path::Path, toc: &[(&str, &str)]) -> Config {
        let mut config = Config::new("https://wiki.example", "/docs/", dir);
        config.fetch.interval_ms = 0;
        let artifacts = Artifacts::new(dir);
        store::ensure_dir(&artifacts.json_dir()).await.unwrap();
        let toc: Vec<PageInfo> = toc
            .iter()
            .map(|(name, href)| PageInfo {
                name: name.to_string(),
                href: href.to_string(),
            })
            .collect();
        store::write_json(&artifacts.toc(), &toc).await.unwrap();
        config
    }

    #[tokio::test]
    async fn stores_one_document_per_toc_entry() {
        let dir = tempfile::tempdir().unwrap();
        let config = seeded(dir.path(), &[("Stone", "stone/"), ("Oak Log", "oak-log/")]).await;
        let requested = Mutex::new(Vec::new());

        fetch_pages_with(&config, |url: String| {
            requested.lock().unwrap().push(url.clone());
            async move { Ok(format!("<html>{}</html>", url)) }
        })
        .await
        .unwrap();

        assert_eq!(
            *requested.lock().unwrap(),
            vec![
                "https://wiki.example/docs/stone/".to_string(),
                "https://wiki.example/docs/oak-log/".to_string(),
            ]
        );
        let artifacts = Artifacts::new(dir.path());
        let stored = store::read_text(&artifacts.page_html("Oak Log")).await.unwrap();
        assert_eq!(stored, "<html>https://wiki.example/docs/oak-log/</html>");
    }

    #[tokio::test]
    async fn one_failed_page_fails_the_stage_but_not_its_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let config = seeded(
            dir.path(),
            &[("Stone", "stone/"), ("Missing", "missing/"), ("Dirt", "dirt/")],
        )
        .await;

        let err = fetch_pages_with(&config, |url: String| async move {
            if url.contains("missing") {
                Err(Error::Status { url, status: 404 })
            } else {
                Ok("ok".to_string())
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Status { status: 404, .. }));
        let artifacts = Artifacts::new(dir.path());
        assert!(artifacts.page_html("Stone").exists());
        assert!(artifacts.page_html("Dirt").exists());
        assert!(!artifacts.page_html("Missing").exists());
    }

    #[tokio::test]
    async fn missing_toc_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new("https://wiki.example", "/", dir.path());
        let err = fetch_pages_with(&config, |_url: String| async { Ok(String::new()) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
