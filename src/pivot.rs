//! Schema discovery and pivot of heterogeneous page records into one dense table.
//!
//! Column order depends only on the set of names and markers seen, never on
//! block order: plain columns sort lexicographically, then every list
//! property contributes one `"{property}:{short marker}"` column per short
//! marker observed for that property.
//!
//! Distinct markers may shorten to the same suffix. By default they share a
//! column and, within one list, the later item wins; `strict` turns that
//! (and a name used both as plain and as list property) into an error.
//!
//! A plain property literally named `name` or `description` shares the
//! built-in column and is written after it, so in lenient mode it replaces
//! the block's own value, and blocks lacking that property get `null` there.
//! Strict mode rejects such properties.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{Block, Property};
use crate::store::{self, Artifacts};

/// Value written for attributes that are present without a meaningful value.
pub const FLAG_VALUE: &str = "TRUE";

const NAME_COLUMN: &str = "name";
const DESCRIPTION_COLUMN: &str = "description";

/// `https://site/blocks/stone-brick` → `brick`, `https://site/blocks/dirt` → `dirt`.
pub fn short_marker(marker: &str) -> &str {
    let last = marker.rsplit_once('/').map_or(marker, |(_, tail)| tail);
    last.split_once('-').map_or(last, |(_, tail)| tail)
}

fn flag_or(value: &str) -> String {
    if value.is_empty() || value == "/" {
        FLAG_VALUE.to_string()
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    /// Names seen as plain properties anywhere.
    pub plain: BTreeSet<String>,
    /// List property name → short markers seen for that property.
    pub lists: BTreeMap<String, BTreeSet<String>>,
    /// List property name → most items any single block had for it.
    pub max_items: BTreeMap<String, usize>,
    short_markers: HashMap<String, String>,
}

impl Schema {
    pub fn discover(blocks: &[Block], strict: bool) -> Result<Self> {
        let mut plain = BTreeSet::new();
        let mut list_markers: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
        let mut max_items: BTreeMap<String, usize> = BTreeMap::new();

        for property in blocks.iter().flat_map(|b| &b.properties) {
            match property {
                Property::Plain { name, .. } => {
                    plain.insert(name.clone());
                }
                Property::List { name, items, .. } => {
                    list_markers
                        .entry(name.clone())
                        .or_default()
                        .extend(items.iter().map(|item| item.marker.as_str()));
                    let max = max_items.entry(name.clone()).or_default();
                    *max = (*max).max(items.len());
                }
            }
        }

        if strict {
            if let Some(name) = plain.iter().find(|name| list_markers.contains_key(*name)) {
                return Err(Error::SchemaAmbiguity(format!(
                    "`{}` is both a plain and a list property",
                    name
                )));
            }
            if let Some(name) = plain
                .iter()
                .find(|name| *name == NAME_COLUMN || *name == DESCRIPTION_COLUMN)
            {
                return Err(Error::SchemaAmbiguity(format!(
                    "property `{}` shadows a built-in column",
                    name
                )));
            }
        }

        let all_markers: BTreeSet<&str> = list_markers.values().flatten().copied().collect();
        let mut short_markers = HashMap::with_capacity(all_markers.len());
        let mut owners: HashMap<&str, &str> = HashMap::new();
        for marker in all_markers {
            let short = short_marker(marker);
            if let Some(previous) = owners.insert(short, marker) {
                if strict {
                    return Err(Error::SchemaAmbiguity(format!(
                        "markers `{}` and `{}` both shorten to `{}`",
                        previous, marker, short
                    )));
                }
                debug!("Markers {} and {} share column suffix {}", previous, marker, short);
            }
            short_markers.insert(marker.to_string(), short.to_string());
        }

        let mut schema = Self {
            plain,
            lists: BTreeMap::new(),
            max_items,
            short_markers,
        };
        schema.lists = list_markers
            .into_iter()
            .map(|(name, markers)| {
                let shorts = markers
                    .into_iter()
                    .map(|marker| schema.short(marker).to_string())
                    .collect();
                (name, shorts)
            })
            .collect();
        Ok(schema)
    }

    /// Canonical column suffix for a marker.
    pub fn short<'a>(&'a self, marker: &'a str) -> &'a str {
        self.short_markers
            .get(marker)
            .map_or_else(|| short_marker(marker), String::as_str)
    }

    /// Output columns in order, each name once.
    pub fn columns(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let list_columns = self
            .lists
            .iter()
            .flat_map(|(name, markers)| markers.iter().map(move |m| format!("{}:{}", name, m)));
        [NAME_COLUMN.to_string(), DESCRIPTION_COLUMN.to_string()]
            .into_iter()
            .chain(self.plain.iter().cloned())
            .chain(list_columns)
            .filter(|column| seen.insert(column.clone()))
            .collect()
    }
}

/// One block with its properties keyed by name, before flattening.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PivotedBlock {
    pub name: String,
    pub description: Option<String>,
    pub properties: BTreeMap<String, String>,
    pub list_properties: BTreeMap<String, BTreeMap<String, String>>,
}

pub fn pivot_block(block: &Block, schema: &Schema) -> PivotedBlock {
    let mut pivoted = PivotedBlock {
        name: block.name.clone(),
        description: block.description.clone(),
        ..Default::default()
    };
    for property in &block.properties {
        match property {
            Property::Plain { name, value, .. } => {
                pivoted.properties.insert(name.clone(), flag_or(value));
            }
            Property::List { name, items, .. } => {
                let values = items
                    .iter()
                    .map(|item| (schema.short(&item.marker).to_string(), flag_or(&item.value)))
                    .collect();
                pivoted.list_properties.insert(name.clone(), values);
            }
        }
    }
    pivoted
}

/// Rows over one shared column list. Serializes as an array of objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotTable {
    pub columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl PivotTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `None` for an unknown row or column, `Some(None)` for a null cell.
    pub fn get(&self, row: usize, column: &str) -> Option<Option<&str>> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).map(|values| values[idx].as_deref())
    }

    fn flatten(
        columns: &[String],
        index: &HashMap<&str, usize>,
        schema: &Schema,
        block: &PivotedBlock,
    ) -> Vec<Option<String>> {
        let mut values = vec![None; columns.len()];
        let mut set = |column: &str, value: Option<String>| {
            if let Some(&idx) = index.get(column) {
                values[idx] = value;
            }
        };

        set(NAME_COLUMN, Some(block.name.clone()));
        set(
            DESCRIPTION_COLUMN,
            block.description.clone().filter(|d| !d.is_empty()),
        );
        for name in &schema.plain {
            set(name, block.properties.get(name).cloned());
        }
        for (name, markers) in &schema.lists {
            let items = block.list_properties.get(name);
            for marker in markers {
                let value = items.and_then(|by_marker| by_marker.get(marker)).cloned();
                set(&format!("{}:{}", name, marker), value);
            }
        }
        values
    }

    fn write_csv(&self, path: &Path) -> Result<()> {
        let csv_err = |source| Error::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
        writer.write_record(&self.columns).map_err(csv_err)?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(|v| v.as_deref().unwrap_or("")))
                .map_err(csv_err)?;
        }
        writer.flush().map_err(|e| Error::io(path, e))
    }
}

struct RowRef<'a> {
    columns: &'a [String],
    values: &'a [Option<String>],
}

impl Serialize for RowRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl Serialize for PivotTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.rows.iter().map(|values| RowRef {
            columns: &self.columns,
            values,
        }))
    }
}

/// Discover the schema over all blocks, then emit one row per block in input order.
pub fn pivot(blocks: &[Block], strict: bool) -> Result<(Schema, PivotTable)> {
    let schema = Schema::discover(blocks, strict)?;
    let columns = schema.columns();
    let index: HashMap<&str, usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect();
    let rows = blocks
        .iter()
        .map(|block| PivotTable::flatten(&columns, &index, &schema, &pivot_block(block, &schema)))
        .collect();
    Ok((schema, PivotTable { columns, rows }))
}

/// Pivot a packed block file into `output` (and optionally a CSV twin).
pub async fn pivot_file(
    input: &Path,
    output: &Path,
    csv: Option<&Path>,
    strict: bool,
) -> Result<PivotTable> {
    let blocks: Vec<Block> = store::read_json(input).await?;
    let (schema, table) = pivot(&blocks, strict)?;
    if table.is_empty() {
        warn!("No blocks in {}; writing an empty table", input.display());
    }
    info!(
        "Pivoted {} blocks: {} plain columns, {} list properties, {} columns total",
        table.len(),
        schema.plain.len(),
        schema.lists.len(),
        table.columns.len()
    );
    for (name, max) in &schema.max_items {
        debug!("List property {} holds up to {} items", name, max);
    }

    store::write_json(output, &table).await?;
    if let Some(path) = csv {
        table.write_csv(path)?;
    }
    Ok(table)
}

pub async fn pivot_data(config: &Config) -> Result<()> {
    let artifacts = Artifacts::new(&config.out);
    let csv = config.pivot.csv.then(|| artifacts.pivot_csv());
    pivot_file(
        &artifacts.packed(),
        &artifacts.pivot_json(),
        csv.as_deref(),
        config.pivot.strict,
    )
    .await?;
    Ok(())
}
