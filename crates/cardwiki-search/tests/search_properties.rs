//! Properties every compile must satisfy, over a small fixed store.

use std::collections::HashSet;

use cardwiki_search::matcher::match_tokens;
use cardwiki_search::{compile, NodeKind, SearchConfig, TokenKind};
use cardwiki_store::{DictionaryKind, KnowledgeStore};
use proptest::prelude::*;

fn studio_store() -> KnowledgeStore {
    let mut store = KnowledgeStore::new();
    let pixar = store.add_page("pixar");
    store.add_to_deck(pixar, "studios").unwrap();
    store.add_eav(pixar, "founded", 1986i64).unwrap();
    for (title, year) in [("up", 2009i64), ("toy story", 1995), ("coco", 2017)] {
        let movie = store.add_page(title);
        store.add_to_deck(movie, "movies").unwrap();
        store.add_eav(movie, "year", year).unwrap();
        store.add_link(pixar, movie, Some("film")).unwrap();
    }
    for (name, salary, age) in [("chris", 120i64, 30i64), ("jamie", 90, 41), ("rob", 100, 35)] {
        let person = store.add_page(name);
        store.add_to_deck(person, "people").unwrap();
        store.add_eav(person, "salary", salary).unwrap();
        store.add_eav(person, "age", age).unwrap();
        store.add_link(pixar, person, Some("employee")).unwrap();
    }
    store
}

const WORDS: &[&str] = &[
    "movies", "movie", "up", "toy story", "coco", "pixar", "pixar's", "founded", "year", "studios",
    "people", "chris", "jamie", "salaries", "salary", "age", "older", "younger", "than", "per",
    "each", "without", "not", "top", "bottom", "highest", "sum", "average", "count", ">", "<",
    "+", "*", "5", "100", "2000", "decks", "the", "and",
];

fn search_text() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(WORDS), 0..8).prop_map(|words| words.join(" "))
}

#[test]
fn inflected_phrases_match_at_the_typed_span() {
    let store = studio_store();
    for (text, kind) in [
        ("the salaries", TokenKind::Attribute("salary".into())),
        ("the movie", TokenKind::Collection("movies".into())),
        ("the studio", TokenKind::Collection("studios".into())),
        ("the years", TokenKind::Attribute("year".into())),
    ] {
        let tokens = match_tokens(&store, text);
        let token = tokens
            .iter()
            .find(|t| t.kind == kind)
            .unwrap_or_else(|| panic!("no {kind:?} in {text:?}"));
        assert_eq!(token.position, 4);
        assert_eq!(token.length, text.chars().count() - 4);
    }
}

#[test]
fn dictionary_phrases_round_trip() {
    let store = studio_store();
    let kinds: [(DictionaryKind, fn(String) -> TokenKind); 3] = [
        (DictionaryKind::Entity, TokenKind::Entity),
        (DictionaryKind::Collection, TokenKind::Collection),
        (DictionaryKind::Attribute, TokenKind::Attribute),
    ];
    for (dict, make) in kinds {
        for phrase in store.dictionary(dict).into_keys() {
            // `film` and `employee` are link-type decks; they match like any
            // other collection.
            let text = format!("xyzzy {phrase} quux");
            let tokens = match_tokens(&store, &text);
            let expected = make(phrase.clone());
            let covering: Vec<_> = tokens.iter().filter(|t| t.position == 6).collect();
            assert_eq!(covering.len(), 1, "{text:?} → {tokens:?}");
            assert_eq!(covering[0].length, phrase.chars().count());
            assert_eq!(covering[0].kind, expected, "{text:?}");
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn tokens_are_ordered_and_disjoint(text in search_text()) {
        let store = studio_store();
        let tokens = match_tokens(&store, &text);
        for pair in tokens.windows(2) {
            prop_assert!(pair[0].end() <= pair[1].position, "{:?}", tokens);
        }
        let len = text.chars().count();
        for token in &tokens {
            prop_assert!(token.length > 0);
            prop_assert!(token.end() <= len);
        }
    }

    #[test]
    fn compiling_is_deterministic(text in search_text()) {
        let store = studio_store();
        let config = SearchConfig::default();
        let first = compile(&store, &text, &config);
        let second = compile(&store, &text, &config);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn named_operators_are_full(text in search_text()) {
        let store = studio_store();
        if let Ok(search) = compile(&store, &text, &SearchConfig::default()) {
            for id in &search.forest.operations {
                let node = search.forest.node(*id);
                let NodeKind::Operation(desc) = &node.kind else {
                    prop_assert!(false, "non-operation recorded as operation");
                    continue;
                };
                if desc.is_sort_limit() {
                    prop_assert!(node.arguments.len() <= desc.arity);
                } else {
                    prop_assert_eq!(node.arguments.len(), desc.arity, "{}", desc.symbol);
                }
            }
        }
    }

    #[test]
    fn projection_names_are_distinct(text in search_text()) {
        let store = studio_store();
        if let Ok(search) = compile(&store, &text, &SearchConfig::default()) {
            let mut seen = HashSet::new();
            for (name, _) in search.query().projection() {
                prop_assert!(seen.insert(name.clone()), "duplicate column {}", name);
            }
        }
    }
}
