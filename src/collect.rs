use futures::future::try_join_all;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::model::{Block, PageInfo};
use crate::store::{self, Artifacts};

/// Gather every per-page Block into one packed file, in table-of-contents order.
pub async fn collect_pages(config: &Config) -> Result<()> {
    let artifacts = Artifacts::new(&config.out);
    let toc: Vec<PageInfo> = store::read_json(&artifacts.toc()).await?;

    let blocks: Vec<Block> = try_join_all(toc.iter().map(|info| {
        let path = artifacts.page_json(&info.name);
        async move { store::read_json::<Block>(&path).await }
    }))
    .await?;

    info!("Collected {} blocks", blocks.len());
    store::write_json(&artifacts.packed(), &blocks).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    async fn seed(artifacts: &Artifacts, names: &[&str]) {
        store::ensure_dir(&artifacts.pages_json_dir()).await.unwrap();
        let toc: Vec<PageInfo> = names
            .iter()
            .map(|name| PageInfo {
                name: name.to_string(),
                href: format!("blocks/{}/", name.to_lowercase()),
            })
            .collect();
        store::write_json(&artifacts.toc(), &toc).await.unwrap();
    }

    #[tokio::test]
    async fn packs_blocks_in_toc_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new("https://wiki.example", "/", dir.path());
        let artifacts = Artifacts::new(dir.path());
        seed(&artifacts, &["Stone", "Dirt", "Oak Log"]).await;
        for name in ["Oak Log", "Stone", "Dirt"] {
            let block = Block::new(name).plain("Color", name);
            store::write_json(&artifacts.page_json(name), &block).await.unwrap();
        }

        collect_pages(&config).await.unwrap();

        let packed: Vec<Block> = store::read_json(&artifacts.packed()).await.unwrap();
        let names: Vec<&str> = packed.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Stone", "Dirt", "Oak Log"]);
    }

    #[tokio::test]
    async fn missing_page_block_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new("https://wiki.example", "/", dir.path());
        let artifacts = Artifacts::new(dir.path());
        seed(&artifacts, &["Stone"]).await;

        let err = collect_pages(&config).await.unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(!artifacts.packed().exists());
    }
}
