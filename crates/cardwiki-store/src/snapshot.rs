//! JSON store snapshots.
//!
//! A snapshot lists pages with the links, attribute facts and explicit deck
//! memberships their markup produced:
//!
//! ```json
//! { "pages": [
//!   { "name": "pixar",
//!     "links": [{ "to": "up", "type": "movie" }],
//!     "attributes": { "founded": 1986 },
//!     "collections": ["studios"] }
//! ] }
//! ```
//!
//! Link targets that have no page entry of their own still become pages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{KnowledgeStore, StoreError, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub pages: Vec<PageSnapshot>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub name: String,
    #[serde(default)]
    pub links: Vec<LinkSnapshot>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub collections: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSnapshot {
    pub to: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
}

impl StoreSnapshot {
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build a store. Pages are added first so page ids follow snapshot
    /// order; text attribute values are coerced like typed-in markup.
    pub fn into_store(self) -> Result<KnowledgeStore, StoreError> {
        let mut store = KnowledgeStore::new();
        for page in &self.pages {
            store.add_page(&page.name);
        }
        for page in self.pages {
            let id = store.add_page(&page.name);
            for link in &page.links {
                let target = store.add_page(&link.to);
                store.add_link(id, target, link.link_type.as_deref())?;
            }
            for (attribute, value) in page.attributes {
                let value = match value {
                    Value::Text(text) => Value::coerce(&text),
                    other => other,
                };
                store.add_eav(id, &attribute, value)?;
            }
            for deck in &page.collections {
                store.add_to_deck(id, deck)?;
            }
        }
        debug!(
            pages = store.page_count(),
            decks = store.deck_count(),
            links = store.link_count(),
            eavs = store.eav_count(),
            "loaded store snapshot"
        );
        Ok(store)
    }
}

impl KnowledgeStore {
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        StoreSnapshot::from_json(json)?.into_store()
    }
}
