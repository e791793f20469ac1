use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::text_of;
use crate::error::{Error, Result};
use crate::model::PageInfo;

static SECTION_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "main.md-main .md-sidebar.md-sidebar--primary nav.md-nav--primary > ul.md-nav__list > li.md-nav__item",
    )
    .unwrap()
});
static ENTRY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("nav.md-nav > ul.md-nav__list > li.md-nav__item").unwrap());
static LABEL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("label").unwrap());
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

/// Pages listed under the sidebar section labelled `section`.
pub fn extract_toc(html: &str, section: &str) -> Result<Vec<PageInfo>> {
    let document = Html::parse_document(html);
    let chosen = document
        .select(&SECTION_SEL)
        .find(|li| section_label(li) == section)
        .ok_or_else(|| Error::Structural(format!("sidebar section `{}`", section)))?;

    chosen.select(&ENTRY_SEL).map(|li| entry(&li)).collect()
}

fn section_label(li: &ElementRef<'_>) -> String {
    match li.select(&LABEL_SEL).next() {
        Some(label) => text_of(&label),
        None => text_of(li),
    }
}

fn entry(li: &ElementRef<'_>) -> Result<PageInfo> {
    let anchor = li
        .select(&ANCHOR_SEL)
        .next()
        .ok_or_else(|| Error::Structural(format!("link in TOC entry `{}`", text_of(li))))?;
    let name = text_of(&anchor);
    let href = anchor
        .value()
        .attr("href")
        .ok_or_else(|| Error::Structural(format!("href of TOC entry `{}`", name)))?
        .to_string();
    Ok(PageInfo { name, href })
}
