//! Cardwiki store: pages, decks, typed links and attribute facts.
//!
//! The store is the read side of a personal wiki:
//!
//! - every **page** is also an *entity* that searches can name directly,
//! - a **deck** (collection) is a named set of member pages,
//! - **links** are typed, directed page → page edges,
//! - **attribute facts** attach `(attribute, value)` pairs to a page.
//!
//! Deck membership is partly derived from links, the same way the wiki's
//! views derive it: a link `[up|movie]` makes `up` a member of deck `movie`
//! (untyped links land in the hidden deck `unknown`), and a collection link
//! `[[movies]]` makes the *linking* page a member of `movies`.
//!
//! Key pieces:
//! 1. **String interning**: names are stored once and referenced by `StrId`
//! 2. **Membership bitmaps**: deck → pages and page → decks as roaring bitmaps
//! 3. **Adjacency indexes**: outgoing/incoming link lists per page
//! 4. **Dictionaries**: phrase → id maps for the search phrase matcher
//! 5. **Query builder**: a multi-step select/join/aggregate query (`query`)
//!
//! All reads take `&self`, so one borrow of a store is one consistent
//! snapshot for the whole of a search compile.

pub mod query;
pub mod snapshot;
pub mod value;

use std::collections::{BTreeMap, HashMap};

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

pub use query::{
    AggregateFunc, ExecError, Field, FieldRef, Func, Limit, Query, QueryBuilder, QueryOp,
    QueryResult, Record, Row, SortDirection, SortKey, Table, Term,
};
pub use snapshot::{LinkSnapshot, PageSnapshot, StoreSnapshot};
pub use value::Value;

/// Deck a typed link's target joins when the link carries no type.
pub const UNTYPED_LINK_DECK: &str = "unknown";
/// Link type that makes the *source* page a member of the target deck.
pub const COLLECTION_LINK_TYPE: &str = "collection";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown page `{0}`")]
    UnknownPage(String),
    #[error("invalid store snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

// ============================================================================
// String Interning
// ============================================================================

/// Interned string ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct StrId(u32);

impl StrId {
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// String interner: maps strings to compact IDs
#[derive(Debug, Default)]
pub struct StringInterner {
    str_to_id: HashMap<String, StrId>,
    id_to_str: Vec<String>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning its ID
    pub fn intern(&mut self, s: &str) -> StrId {
        if let Some(id) = self.str_to_id.get(s) {
            return *id;
        }
        let id = StrId(self.id_to_str.len() as u32);
        self.str_to_id.insert(s.to_string(), id);
        self.id_to_str.push(s.to_string());
        id
    }

    /// Look up an existing ID for a string without inserting.
    pub fn id_of(&self, s: &str) -> Option<StrId> {
        self.str_to_id.get(s).copied()
    }

    pub fn lookup(&self, id: StrId) -> Option<&str> {
        self.id_to_str.get(id.0 as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.id_to_str.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_str.is_empty()
    }
}

// ============================================================================
// Core Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeckId(pub u32);

/// A typed, directed link between two pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub page: PageId,
    pub target: PageId,
    pub link_type: StrId,
}

/// One side of a link seen from `page`, ignoring direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    pub page: PageId,
    pub link: PageId,
    pub link_type: StrId,
}

/// A `(page, attribute, value)` fact.
#[derive(Debug, Clone, PartialEq)]
pub struct Eav {
    pub page: PageId,
    pub attribute: StrId,
    pub value: Value,
}

/// Which names a dictionary lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DictionaryKind {
    Entity,
    Collection,
    Attribute,
}

// ============================================================================
// Knowledge Store
// ============================================================================

#[derive(Debug, Default)]
pub struct KnowledgeStore {
    interner: StringInterner,
    /// page id -> name
    pages: Vec<StrId>,
    page_index: HashMap<StrId, PageId>,
    /// deck id -> name
    decks: Vec<StrId>,
    deck_index: HashMap<StrId, DeckId>,
    /// deck id -> member pages
    deck_members: Vec<RoaringBitmap>,
    /// page id -> decks containing it
    page_decks: Vec<RoaringBitmap>,
    links: Vec<Link>,
    /// page id -> ids into `links` where the page is the source
    outgoing: Vec<Vec<u32>>,
    /// page id -> ids into `links` where the page is the target
    incoming: Vec<Vec<u32>>,
    eavs: Vec<Eav>,
    /// page id -> ids into `eavs`
    page_eavs: Vec<Vec<u32>>,
    /// attribute -> number of facts using it
    attribute_counts: HashMap<StrId, u32>,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn deck_count(&self) -> usize {
        self.decks.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn eav_count(&self) -> usize {
        self.eavs.len()
    }

    pub fn name(&self, id: StrId) -> &str {
        self.interner.lookup(id).unwrap_or("")
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Add a page (names are case-insensitive). Returns the existing id if
    /// the page is already known.
    pub fn add_page(&mut self, name: &str) -> PageId {
        let key = normalize_name(name);
        let sid = self.interner.intern(&key);
        if let Some(id) = self.page_index.get(&sid) {
            return *id;
        }
        let id = PageId(self.pages.len() as u32);
        self.pages.push(sid);
        self.page_index.insert(sid, id);
        self.page_decks.push(RoaringBitmap::new());
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        self.page_eavs.push(Vec::new());
        id
    }

    fn ensure_deck(&mut self, name: &str) -> DeckId {
        let key = normalize_name(name);
        let sid = self.interner.intern(&key);
        if let Some(id) = self.deck_index.get(&sid) {
            return *id;
        }
        let id = DeckId(self.decks.len() as u32);
        self.decks.push(sid);
        self.deck_index.insert(sid, id);
        self.deck_members.push(RoaringBitmap::new());
        id
    }

    pub fn add_to_deck(&mut self, page: PageId, deck: &str) -> Result<DeckId, StoreError> {
        self.check_page(page)?;
        let deck_id = self.ensure_deck(deck);
        self.deck_members[deck_id.0 as usize].insert(page.0);
        self.page_decks[page.0 as usize].insert(deck_id.0);
        Ok(deck_id)
    }

    /// Record a link and the deck memberships it implies.
    pub fn add_link(
        &mut self,
        page: PageId,
        target: PageId,
        link_type: Option<&str>,
    ) -> Result<(), StoreError> {
        self.check_page(page)?;
        self.check_page(target)?;
        let type_name = normalize_name(link_type.unwrap_or(UNTYPED_LINK_DECK));
        let link_type = self.interner.intern(&type_name);
        let id = self.links.len() as u32;
        self.links.push(Link {
            page,
            target,
            link_type,
        });
        self.outgoing[page.0 as usize].push(id);
        self.incoming[target.0 as usize].push(id);

        if type_name == COLLECTION_LINK_TYPE {
            let deck = self.page_name(target).to_string();
            self.add_to_deck(page, &deck)?;
        }
        self.add_to_deck(target, &type_name)?;
        Ok(())
    }

    pub fn add_eav(
        &mut self,
        page: PageId,
        attribute: &str,
        value: impl Into<Value>,
    ) -> Result<(), StoreError> {
        self.check_page(page)?;
        let attribute = self.interner.intern(&normalize_name(attribute));
        let id = self.eavs.len() as u32;
        self.eavs.push(Eav {
            page,
            attribute,
            value: value.into(),
        });
        self.page_eavs[page.0 as usize].push(id);
        *self.attribute_counts.entry(attribute).or_insert(0) += 1;
        Ok(())
    }

    fn check_page(&self, page: PageId) -> Result<(), StoreError> {
        if (page.0 as usize) < self.pages.len() {
            Ok(())
        } else {
            Err(StoreError::UnknownPage(format!("#{}", page.0)))
        }
    }

    // ------------------------------------------------------------------
    // Point lookups
    // ------------------------------------------------------------------

    pub fn page_id(&self, name: &str) -> Option<PageId> {
        let sid = self.interner.id_of(&normalize_name(name))?;
        self.page_index.get(&sid).copied()
    }

    pub fn page_name(&self, page: PageId) -> &str {
        self.pages
            .get(page.0 as usize)
            .map(|sid| self.name(*sid))
            .unwrap_or("")
    }

    pub fn deck_id(&self, name: &str) -> Option<DeckId> {
        let sid = self.interner.id_of(&normalize_name(name))?;
        self.deck_index.get(&sid).copied()
    }

    pub fn deck_name(&self, deck: DeckId) -> &str {
        self.decks
            .get(deck.0 as usize)
            .map(|sid| self.name(*sid))
            .unwrap_or("")
    }

    pub fn attribute_id(&self, name: &str) -> Option<StrId> {
        let sid = self.interner.id_of(&normalize_name(name))?;
        self.attribute_counts.contains_key(&sid).then_some(sid)
    }

    /// Does `page` carry a fact for `attribute` directly?
    pub fn has_eav(&self, page: PageId, attribute: StrId) -> bool {
        self.eavs_of(page).any(|eav| eav.attribute == attribute)
    }

    pub fn eavs_of(&self, page: PageId) -> impl Iterator<Item = &Eav> + '_ {
        self.page_eavs
            .get(page.0 as usize)
            .into_iter()
            .flatten()
            .filter_map(move |&id| self.eavs.get(id as usize))
    }

    pub fn eavs(&self) -> &[Eav] {
        &self.eavs
    }

    pub fn is_member(&self, deck: DeckId, page: PageId) -> bool {
        self.deck_members
            .get(deck.0 as usize)
            .is_some_and(|members| members.contains(page.0))
    }

    /// Is `page` a member of any deck at all?
    pub fn in_any_deck(&self, page: PageId) -> bool {
        self.page_decks
            .get(page.0 as usize)
            .is_some_and(|decks| !decks.is_empty())
    }

    // ------------------------------------------------------------------
    // Graph primitives
    // ------------------------------------------------------------------

    pub fn pages_in_deck(&self, deck: DeckId) -> Option<&RoaringBitmap> {
        self.deck_members.get(deck.0 as usize)
    }

    pub fn deck_size(&self, deck: DeckId) -> u64 {
        self.pages_in_deck(deck).map(|m| m.len()).unwrap_or(0)
    }

    /// Names of the decks containing `page`, sorted.
    pub fn decks_of_page(&self, page: PageId) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .page_decks
            .get(page.0 as usize)
            .map(|decks| decks.iter().map(|d| self.deck_name(DeckId(d))).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    pub fn outgoing_links(&self, page: PageId) -> impl Iterator<Item = &Link> + '_ {
        self.link_ids(&self.outgoing, page)
    }

    pub fn incoming_links(&self, page: PageId) -> impl Iterator<Item = &Link> + '_ {
        self.link_ids(&self.incoming, page)
    }

    fn link_ids<'a>(
        &'a self,
        index: &'a [Vec<u32>],
        page: PageId,
    ) -> impl Iterator<Item = &'a Link> + 'a {
        index
            .get(page.0 as usize)
            .into_iter()
            .flatten()
            .filter_map(move |&id| self.links.get(id as usize))
    }

    /// Links touching `page` in either direction, each reported with `page`
    /// on the near side.
    pub fn directionless_links(&self, page: PageId) -> Vec<Neighbor> {
        let out = self.outgoing_links(page).map(|l| Neighbor {
            page,
            link: l.target,
            link_type: l.link_type,
        });
        let inc = self.incoming_links(page).map(|l| Neighbor {
            page,
            link: l.page,
            link_type: l.link_type,
        });
        out.chain(inc).collect()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn page_ids(&self) -> impl Iterator<Item = PageId> {
        (0..self.pages.len() as u32).map(PageId)
    }

    pub fn deck_ids(&self) -> impl Iterator<Item = DeckId> {
        (0..self.decks.len() as u32).map(DeckId)
    }

    // ------------------------------------------------------------------
    // Dictionaries
    // ------------------------------------------------------------------

    /// Phrase → id map used by the search phrase matcher.
    pub fn dictionary(&self, kind: DictionaryKind) -> BTreeMap<String, u32> {
        match kind {
            DictionaryKind::Entity => self
                .pages
                .iter()
                .enumerate()
                .map(|(ix, sid)| (self.name(*sid).to_string(), ix as u32))
                .collect(),
            DictionaryKind::Collection => self
                .decks
                .iter()
                .enumerate()
                .map(|(ix, sid)| (self.name(*sid).to_string(), ix as u32))
                .collect(),
            DictionaryKind::Attribute => self
                .attribute_counts
                .keys()
                .map(|sid| (self.name(*sid).to_string(), sid.raw()))
                .collect(),
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixar_store() -> KnowledgeStore {
        let mut store = KnowledgeStore::new();
        let pixar = store.add_page("Pixar");
        let up = store.add_page("up");
        let toy = store.add_page("toy story");
        store.add_link(pixar, up, Some("movie")).unwrap();
        store.add_link(pixar, toy, Some("movie")).unwrap();
        store.add_eav(pixar, "founded", 1986i64).unwrap();
        store
    }

    #[test]
    fn typed_links_derive_deck_membership() {
        let store = pixar_store();
        let movie = store.deck_id("movie").unwrap();
        assert_eq!(store.deck_size(movie), 2);
        let up = store.page_id("up").unwrap();
        assert!(store.is_member(movie, up));
        assert_eq!(store.decks_of_page(up), vec!["movie"]);
    }

    #[test]
    fn collection_links_put_the_source_in_the_deck() {
        let mut store = KnowledgeStore::new();
        let chris = store.add_page("chris");
        let people = store.add_page("people");
        store.add_link(chris, people, Some("collection")).unwrap();

        let people_deck = store.deck_id("people").unwrap();
        assert!(store.is_member(people_deck, chris));
        // The target itself lands in the hidden `collection` deck.
        let hidden = store.deck_id(COLLECTION_LINK_TYPE).unwrap();
        assert!(store.is_member(hidden, people));
    }

    #[test]
    fn untyped_links_land_in_unknown() {
        let mut store = KnowledgeStore::new();
        let a = store.add_page("a");
        let b = store.add_page("b");
        store.add_link(a, b, None).unwrap();
        let unknown = store.deck_id(UNTYPED_LINK_DECK).unwrap();
        assert!(store.is_member(unknown, b));
    }

    #[test]
    fn directionless_links_see_both_directions() {
        let store = pixar_store();
        let up = store.page_id("up").unwrap();
        let pixar = store.page_id("pixar").unwrap();
        let neighbors = store.directionless_links(up);
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].link, pixar);
        assert_eq!(store.name(neighbors[0].link_type), "movie");
    }

    #[test]
    fn dictionaries_are_lowercased_and_sorted() {
        let store = pixar_store();
        let entities = store.dictionary(DictionaryKind::Entity);
        let keys: Vec<&str> = entities.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["pixar", "toy story", "up"]);
        let attrs = store.dictionary(DictionaryKind::Attribute);
        assert!(attrs.contains_key("founded"));
        let decks = store.dictionary(DictionaryKind::Collection);
        assert!(decks.contains_key("movie"));
    }

    #[test]
    fn unknown_page_ids_are_rejected() {
        let mut store = KnowledgeStore::new();
        let err = store.add_eav(PageId(7), "age", 3i64).unwrap_err();
        assert!(matches!(err, StoreError::UnknownPage(_)));
    }
}
