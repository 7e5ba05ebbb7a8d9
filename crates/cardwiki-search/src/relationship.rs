//! Relationship inference between two search subjects.
//!
//! Given e.g. a collection and an attribute, decide whether the members of
//! the collection carry the attribute directly (distance 0), through one
//! linked page (distance 1) or through two (distance 2). Multi-hop answers
//! also report, per hop, the collections every bridging page shares, largest
//! first, so the linearizer can name a representative collection to gather.
//!
//! Probes are plain store reads; nothing is cached between calls.

use std::collections::{BTreeMap, BTreeSet};

use cardwiki_store::{KnowledgeStore, PageId, StrId};
use serde::Serialize;
use tracing::trace;

use crate::tree::NodeKind;

/// Collection name that stands for "every deck".
pub const ALL_DECKS: &str = "decks";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RelationshipKind {
    #[serde(rename = "ent->eav")]
    EntToEav,
    #[serde(rename = "coll->eav")]
    CollToEav,
    #[serde(rename = "coll->ent")]
    CollToEnt,
    #[serde(rename = "coll->coll")]
    CollToColl,
    #[serde(rename = "ent->deck")]
    EntToDeck,
}

/// Collections shared by every page bridging one hop, largest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Hop {
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub distance: u8,
    pub kind: RelationshipKind,
    pub hops: Vec<Hop>,
}

impl Relationship {
    fn direct(kind: RelationshipKind) -> Self {
        Self {
            distance: 0,
            kind,
            hops: Vec::new(),
        }
    }

    fn bridged(kind: RelationshipKind, hops: Vec<Hop>) -> Self {
        Self {
            distance: hops.len().max(1) as u8,
            kind,
            hops,
        }
    }
}

/// How `b` relates to `a`, if at all. Only collection→collection,
/// collection→attribute, collection→entity and entity→attribute pairs are
/// defined; every other pair is unrelated.
pub fn relate(store: &KnowledgeStore, a: &NodeKind, b: &NodeKind) -> Option<Relationship> {
    let rel = match (a, b) {
        (NodeKind::Collection(c1), NodeKind::Collection(c2)) => collection_to_collection(store, c1, c2),
        (NodeKind::Collection(c), NodeKind::Attribute(attr)) => collection_to_attribute(store, c, attr),
        (NodeKind::Collection(c), NodeKind::Entity(e)) => collection_to_entity(store, c, e),
        (NodeKind::Entity(e), NodeKind::Attribute(attr)) => entity_to_attribute(store, e, attr),
        _ => None,
    };
    trace!(a = ?a, b = ?b, relationship = ?rel, "relationship probe");
    rel
}

// ============================================================================
// Probes
// ============================================================================

/// e.g. "chris's age", "pixar's founded"
fn entity_to_attribute(store: &KnowledgeStore, entity: &str, attribute: &str) -> Option<Relationship> {
    let page = store.page_id(entity)?;
    let attr = store.attribute_id(attribute)?;
    if store.has_eav(page, attr) {
        return Some(Relationship::direct(RelationshipKind::EntToEav));
    }

    let hop1: Vec<PageId> = store
        .outgoing_links(page)
        .map(|l| l.target)
        .filter(|t| store.has_eav(*t, attr))
        .collect();
    if !hop1.is_empty() {
        return Some(Relationship::bridged(
            RelationshipKind::EntToEav,
            vec![common_collections(store, &hop1)],
        ));
    }

    let mut firsts = Vec::new();
    let mut seconds = Vec::new();
    for l1 in store.outgoing_links(page) {
        for l2 in store.outgoing_links(l1.target) {
            if store.has_eav(l2.target, attr) {
                firsts.push(l1.target);
                seconds.push(l2.target);
            }
        }
    }
    if firsts.is_empty() {
        return None;
    }
    Some(Relationship::bridged(
        RelationshipKind::EntToEav,
        vec![
            common_collections(store, &firsts),
            common_collections(store, &seconds),
        ],
    ))
}

/// e.g. "salaries per department"
fn collection_to_attribute(store: &KnowledgeStore, collection: &str, attribute: &str) -> Option<Relationship> {
    let members = members(store, collection)?;
    let attr = store.attribute_id(attribute)?;
    if members.iter().any(|m| store.has_eav(*m, attr)) {
        return Some(Relationship::direct(RelationshipKind::CollToEav));
    }

    let hop1: Vec<PageId> = members
        .iter()
        .flat_map(|m| store.directionless_links(*m))
        .map(|n| n.link)
        .filter(|p| store.has_eav(*p, attr))
        .collect();
    if !hop1.is_empty() {
        return Some(Relationship::bridged(
            RelationshipKind::CollToEav,
            vec![common_collections(store, &hop1)],
        ));
    }

    let mut firsts = Vec::new();
    let mut seconds = Vec::new();
    for m in &members {
        for n1 in store.directionless_links(*m) {
            for n2 in store.directionless_links(n1.link) {
                if store.has_eav(n2.link, attr) {
                    firsts.push(n1.link);
                    seconds.push(n2.link);
                }
            }
        }
    }
    if firsts.is_empty() {
        return None;
    }
    Some(Relationship::bridged(
        RelationshipKind::CollToEav,
        vec![
            common_collections(store, &firsts),
            common_collections(store, &seconds),
        ],
    ))
}

/// e.g. "meetings john was in", "events with chris granger"
fn collection_to_entity(store: &KnowledgeStore, collection: &str, entity: &str) -> Option<Relationship> {
    let page = store.page_id(entity)?;
    if collection == ALL_DECKS && store.in_any_deck(page) {
        return Some(Relationship::direct(RelationshipKind::EntToDeck));
    }
    let members = members(store, collection)?;
    if members.contains(&page) {
        return Some(Relationship::direct(RelationshipKind::CollToEnt));
    }

    let linked = |p: PageId| store.directionless_links(p).into_iter().any(|n| n.link == page);
    if members.iter().any(|m| linked(*m)) {
        // Members link to the entity themselves: nothing to bridge.
        return Some(Relationship {
            distance: 1,
            kind: RelationshipKind::CollToEnt,
            hops: Vec::new(),
        });
    }

    let bridges: Vec<PageId> = members
        .iter()
        .flat_map(|m| store.directionless_links(*m))
        .map(|n| n.link)
        .filter(|p| linked(*p))
        .collect();
    if bridges.is_empty() {
        return None;
    }
    Some(Relationship {
        distance: 2,
        kind: RelationshipKind::CollToEnt,
        hops: vec![common_collections(store, &bridges)],
    })
}

/// e.g. "authors and papers"
///
/// Shared members against the busiest link type between the two decks:
/// links win at distance 1, shared members at distance 0, and a nonzero tie
/// also reads as distance 1.
fn collection_to_collection(store: &KnowledgeStore, c1: &str, c2: &str) -> Option<Relationship> {
    let d1 = store.deck_id(c1)?;
    let d2 = store.deck_id(c2)?;
    let (m1, m2) = (store.pages_in_deck(d1)?, store.pages_in_deck(d2)?);
    let shared = (m1 & m2).len();

    let mut by_type: BTreeMap<StrId, u64> = BTreeMap::new();
    for page in m1.iter() {
        for n in store.directionless_links(PageId(page)) {
            if m2.contains(n.link.0) {
                *by_type.entry(n.link_type).or_insert(0) += 1;
            }
        }
    }
    let links = by_type.values().copied().max().unwrap_or(0);
    trace!(c1, c2, shared, links, "collection overlap");

    let distance = if links > shared {
        1
    } else if shared > links {
        0
    } else if links == 0 {
        return None;
    } else {
        1
    };
    Some(Relationship {
        distance,
        kind: RelationshipKind::CollToColl,
        hops: Vec::new(),
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn members(store: &KnowledgeStore, collection: &str) -> Option<Vec<PageId>> {
    let deck = store.deck_id(collection)?;
    Some(store.pages_in_deck(deck)?.iter().map(PageId).collect())
}

/// Collections containing every one of `pages`, largest first (ties by name).
pub fn common_collections(store: &KnowledgeStore, pages: &[PageId]) -> Hop {
    let unique: BTreeSet<PageId> = pages.iter().copied().collect();
    let mut iter = unique.into_iter();
    let Some(first) = iter.next() else {
        return Hop::default();
    };
    let mut shared: BTreeSet<&str> = store.decks_of_page(first).into_iter().collect();
    for page in iter {
        let decks: BTreeSet<&str> = store.decks_of_page(page).into_iter().collect();
        shared = shared.intersection(&decks).copied().collect();
        if shared.is_empty() {
            break;
        }
    }
    let mut candidates: Vec<&str> = shared.into_iter().collect();
    candidates.sort_by_key(|name| {
        std::cmp::Reverse(store.deck_id(name).map(|d| store.deck_size(d)).unwrap_or(0))
    });
    Hop {
        candidates: candidates.into_iter().map(str::to_string).collect(),
    }
}
