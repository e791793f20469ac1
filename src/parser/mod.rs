pub mod page;
pub mod toc;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use scraper::ElementRef;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::model::{Block, PageInfo};
use crate::store::{self, Artifacts};

/// Trimmed text content of an element, like the DOM's `textContent.trim()`.
pub(crate) fn text_of(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

pub async fn parse_root(config: &Config) -> Result<()> {
    let artifacts = Artifacts::new(&config.out);
    let html = store::read_text(&artifacts.root_html()).await?;
    let toc = toc::extract_toc(&html, &config.section)?;
    info!("Table of contents: {} pages under `{}`", toc.len(), config.section);
    store::ensure_dir(&artifacts.json_dir()).await?;
    store::write_json(&artifacts.toc(), &toc).await
}

/// Parse every fetched page into a Block. Documents are read up front and
/// parsed in parallel; output files keep the TOC naming.
pub async fn parse_pages(config: &Config) -> Result<()> {
    let artifacts = Artifacts::new(&config.out);
    let toc: Vec<PageInfo> = store::read_json(&artifacts.toc()).await?;
    store::ensure_dir(&artifacts.pages_json_dir()).await?;

    let mut documents = Vec::with_capacity(toc.len());
    for info in &toc {
        documents.push(store::read_text(&artifacts.page_html(&info.name)).await?);
    }

    let pb = ProgressBar::new(toc.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    let blocks: Vec<Block> = toc
        .par_iter()
        .zip(documents.par_iter())
        .map(|(info, html)| {
            let block = page::extract_block(info, html);
            pb.inc(1);
            block
        })
        .collect::<Result<_>>()?;
    pb.finish_and_clear();

    for (info, block) in toc.iter().zip(&blocks) {
        store::write_json(&artifacts.page_json(&info.name), block).await?;
    }
    let properties: usize = blocks.iter().map(|b| b.properties.len()).sum();
    info!("Parsed {} pages ({} properties)", blocks.len(), properties);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::Property;

    async fn workspace(dir: &std::path::Path) -> (Config, Artifacts) {
        let config = Config::new("https://wiki.example", "/", dir);
        let artifacts = Artifacts::new(dir);
        store::ensure_dir(&artifacts.html_dir()).await.unwrap();
        (config, artifacts)
    }

    #[tokio::test]
    async fn root_document_becomes_toc_json() {
        let dir = tempfile::tempdir().unwrap();
        let (config, artifacts) = workspace(dir.path()).await;
        let html = std::fs::read_to_string("tests/fixtures/root.html").unwrap();
        store::write_text(&artifacts.root_html(), &html).await.unwrap();

        parse_root(&config).await.unwrap();

        let toc: Vec<PageInfo> = store::read_json(&artifacts.toc()).await.unwrap();
        assert_eq!(toc.len(), 3);
        assert_eq!(toc[0].name, "Stone");
    }

    #[tokio::test]
    async fn pages_become_block_json() {
        let dir = tempfile::tempdir().unwrap();
        let (config, artifacts) = workspace(dir.path()).await;
        store::ensure_dir(&artifacts.json_dir()).await.unwrap();
        store::ensure_dir(&artifacts.pages_html_dir()).await.unwrap();
        let toc = vec![PageInfo {
            name: "Stone Brick".into(),
            href: "blocks/stone-brick/".into(),
        }];
        store::write_json(&artifacts.toc(), &toc).await.unwrap();
        let html = std::fs::read_to_string("tests/fixtures/stone_brick.html").unwrap();
        store::write_text(&artifacts.page_html("Stone Brick"), &html).await.unwrap();

        parse_pages(&config).await.unwrap();

        let block: Block = store::read_json(&artifacts.page_json("Stone Brick")).await.unwrap();
        assert_eq!(block.name, "Stone Bricks");
        assert!(block
            .properties
            .iter()
            .any(|p| matches!(p, Property::List { name, .. } if name == "Tool speed")));
    }

    #[tokio::test]
    async fn missing_page_document_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (config, artifacts) = workspace(dir.path()).await;
        store::ensure_dir(&artifacts.json_dir()).await.unwrap();
        let toc = vec![PageInfo {
            name: "Ghost".into(),
            href: "ghost/".into(),
        }];
        store::write_json(&artifacts.toc(), &toc).await.unwrap();

        let err = parse_pages(&config).await.unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
