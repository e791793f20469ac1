use std::sync::LazyLock;

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use super::text_of;
use crate::error::{Error, Result};
use crate::model::{Block, ListItem, PageInfo, Property};

static CONTAINER_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".md-content > article.md-content__inner").unwrap());
static TABLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static STRONG_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("strong").unwrap());
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

/// Turn one page document into its Block: heading, lead paragraph and the
/// property table.
pub fn extract_block(info: &PageInfo, html: &str) -> Result<Block> {
    let document = Html::parse_document(html);
    let container = document
        .select(&CONTAINER_SEL)
        .next()
        .ok_or_else(|| Error::Structural(format!("article container on page `{}`", info.name)))?;

    let mut block = Block::new(info.name.clone());
    let children: Vec<ElementRef<'_>> = child_elements(&container).collect();
    if let Some(h1) = children.iter().find(|el| el.value().name() == "h1") {
        block.name = text_of(h1);
    }
    block.description = children
        .iter()
        .find(|el| el.value().name() == "p")
        .map(text_of);

    let table = container
        .select(&TABLE_SEL)
        .next()
        .ok_or_else(|| Error::Structural(format!("property table on page `{}`", info.name)))?;
    block.properties = table_properties(&table, &block.name);
    Ok(block)
}

fn table_properties(table: &ElementRef<'_>, page: &str) -> Vec<Property> {
    let rows = child_elements(table)
        .filter(|el| el.value().name() == "tbody")
        .flat_map(|body| child_elements(&body).filter(|el| el.value().name() == "tr"));

    let mut properties = Vec::new();
    let mut section: Option<String> = None;
    for row in rows {
        let cells: Vec<ElementRef<'_>> = child_elements(&row)
            .filter(|el| matches!(el.value().name(), "td" | "th"))
            .collect();
        let Some(first) = cells.first() else {
            continue;
        };

        let value_is_blank = cells.get(1).map_or(true, |cell| text_of(cell).is_empty());
        // Empty properties also render with a blank value, only bold labels open a section.
        if value_is_blank && first.select(&STRONG_SEL).next().is_some() {
            section = Some(text_of(first)).filter(|s| !s.is_empty());
            continue;
        }

        let Some(value_cell) = cells.get(1) else {
            warn!("Skipping single-cell row `{}` on page `{}`", text_of(first), page);
            continue;
        };
        let name = text_of(first);
        let property = if value_cell.select(&ANCHOR_SEL).next().is_some() {
            Property::List {
                name,
                section: section.clone(),
                items: list_items(value_cell, page),
            }
        } else {
            Property::Plain {
                name,
                section: section.clone(),
                value: text_of(value_cell),
            }
        };
        properties.push(property);
    }
    properties
}

fn list_items(cell: &ElementRef<'_>, page: &str) -> Vec<ListItem> {
    cell.select(&ANCHOR_SEL)
        .filter_map(|anchor| {
            let Some(marker) = anchor.value().attr("href") else {
                warn!("Skipping link without href on page `{}`", page);
                return None;
            };
            let value = anchor
                .next_sibling()
                .map(|node| match node.value() {
                    Node::Text(text) => text.trim().to_string(),
                    Node::Element(_) => ElementRef::wrap(node).map(|el| text_of(&el)).unwrap_or_default(),
                    _ => String::new(),
                })
                .unwrap_or_default();
            Some(ListItem {
                marker: marker.to_string(),
                value,
            })
        })
        .collect()
}

fn child_elements<'a>(el: &ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    el.children().filter_map(ElementRef::wrap)
}
