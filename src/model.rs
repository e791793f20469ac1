use serde::{Deserialize, Serialize};

/// One table-of-contents entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub name: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem {
    /// Link target naming the related entity this item is about.
    pub marker: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Property {
    Plain {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        section: Option<String>,
        value: String,
    },
    List {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        section: Option<String>,
        items: Vec<ListItem>,
    },
}

#[cfg(test)]
impl Property {
    pub fn name(&self) -> &str {
        match self {
            Property::Plain { name, .. } | Property::List { name, .. } => name,
        }
    }
}

/// One page's extracted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub properties: Vec<Property>,
}

impl Block {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            properties: Vec::new(),
        }
    }
}

#[cfg(test)]
impl Block {
    pub fn plain(mut self, name: &str, value: &str) -> Self {
        self.properties.push(Property::Plain {
            name: name.to_string(),
            section: None,
            value: value.to_string(),
        });
        self
    }

    pub fn list(mut self, name: &str, items: &[(&str, &str)]) -> Self {
        self.properties.push(Property::List {
            name: name.to_string(),
            section: None,
            items: items
                .iter()
                .map(|(marker, value)| ListItem {
                    marker: marker.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        });
        self
    }
}
