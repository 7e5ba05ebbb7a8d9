//! Phrase matching: raw search text → typed tokens.
//!
//! Each store dictionary (entities, collections, attributes) is scanned
//! with a greedy longest-window match over the normalized words of the
//! input. A window that misses is retried in its singular and plural forms
//! before it shrinks. Whatever text no dictionary claims is then read word
//! by word for operators, modifiers and literals.
//!
//! Positions and lengths count characters (not bytes) of the input.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use cardwiki_store::{DictionaryKind, KnowledgeStore, Value};
use serde::Serialize;
use tracing::{debug, trace};

use crate::inflect;
use crate::vocabulary::{self, Modifier, OperatorDescriptor, DECK_WORDS};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub position: usize,
    pub length: usize,
    pub kind: TokenKind,
}

impl Token {
    pub fn end(&self) -> usize {
        self.position + self.length
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum TokenKind {
    Entity(String),
    Collection(String),
    Attribute(String),
    Modifier(Modifier),
    Operation(&'static OperatorDescriptor),
    Value(Value),
}

impl TokenKind {
    pub fn label(&self) -> &'static str {
        match self {
            TokenKind::Entity(_) => "entity",
            TokenKind::Collection(_) => "collection",
            TokenKind::Attribute(_) => "attribute",
            TokenKind::Modifier(_) => "modifier",
            TokenKind::Operation(_) => "operation",
            TokenKind::Value(_) => "value",
        }
    }
}

/// Phrase dictionaries the matcher scans, in scan order.
#[derive(Debug, Clone, Default)]
pub struct Dictionaries {
    pub entities: BTreeMap<String, u32>,
    pub collections: BTreeMap<String, u32>,
    pub attributes: BTreeMap<String, u32>,
}

impl Dictionaries {
    pub fn from_store(store: &KnowledgeStore) -> Self {
        Self {
            entities: store.dictionary(DictionaryKind::Entity),
            collections: store.dictionary(DictionaryKind::Collection),
            attributes: store.dictionary(DictionaryKind::Attribute),
        }
    }
}

pub fn match_tokens(store: &KnowledgeStore, text: &str) -> Vec<Token> {
    match_with(&Dictionaries::from_store(store), text)
}

pub fn match_with(dictionaries: &Dictionaries, text: &str) -> Vec<Token> {
    let original: Vec<char> = text.chars().collect();
    let lowered: Vec<char> = original.iter().map(|c| lower_char(*c)).collect();
    if lowered.iter().all(|c| c.is_whitespace()) {
        return Vec::new();
    }

    let quoted = quoted_spans(&lowered);
    let mut cleaned: String = lowered
        .iter()
        .map(|c| if c.is_alphanumeric() || *c == '_' { *c } else { ' ' })
        .collect();
    for (start, end) in &quoted {
        cleaned = mask(&cleaned, *start, *end);
    }
    let words: Vec<&str> = cleaned.split(' ').collect();

    // (position, length, priority, kind)
    let mut candidates: Vec<(usize, usize, u8, TokenKind)> = Vec::new();
    let scans: [(&BTreeMap<String, u32>, u8, fn(String) -> TokenKind); 3] = [
        (&dictionaries.entities, 1, TokenKind::Entity),
        (&dictionaries.collections, 0, TokenKind::Collection),
        (&dictionaries.attributes, 2, TokenKind::Attribute),
    ];
    for (dict, priority, make) in scans {
        for (pos, len, found) in scan_dictionary(&words, dict) {
            candidates.push((pos, len, priority, make(found)));
        }
    }

    // Overlapping matches: the longer span wins, then collection over
    // entity over attribute.
    candidates.sort_by_key(|(pos, len, priority, _)| (*pos, Reverse(*len), *priority));
    let mut tokens: Vec<Token> = Vec::new();
    for (position, length, _, kind) in candidates {
        if tokens.last().is_some_and(|t| position < t.end()) {
            trace!(position, kind = kind.label(), "overlapping match dropped");
            continue;
        }
        tokens.push(Token {
            position,
            length,
            kind,
        });
    }

    let mut remaining: String = lowered.iter().collect();
    for token in &tokens {
        remaining = mask(&remaining, token.position, token.end());
    }
    for (start, end) in &quoted {
        remaining = mask(&remaining, *start, *end);
        let inner: String = original[start + 1..(*end).max(start + 1)]
            .iter()
            .collect::<String>()
            .trim_end_matches('"')
            .to_string();
        if inner.trim().is_empty() {
            trace!(position = *start, "empty quote dropped");
            continue;
        }
        tokens.push(Token {
            position: *start,
            length: end - start,
            kind: TokenKind::Value(Value::Text(inner)),
        });
    }
    tokens.extend(leftover_tokens(&remaining));

    tokens.sort_by_key(|t| t.position);
    debug!(input = %text, tokens = tokens.len(), "matched search tokens");
    tokens
}

fn lower_char(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

/// `"`-delimited spans as `[start, end)`, quotes included. An unterminated
/// quote runs to the end of the input.
fn quoted_spans(chars: &[char]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut ix = 0;
    while ix < chars.len() {
        if chars[ix] == '"' {
            let close = chars[ix + 1..].iter().position(|c| *c == '"');
            let end = close.map(|c| ix + 1 + c + 1).unwrap_or(chars.len());
            spans.push((ix, end));
            ix = end;
        } else {
            ix += 1;
        }
    }
    spans
}

fn mask(text: &str, start: usize, end: usize) -> String {
    text.chars()
        .enumerate()
        .map(|(ix, c)| if ix >= start && ix < end { ' ' } else { c })
        .collect()
}

/// Greedy longest-window scan of one dictionary.
fn scan_dictionary(words: &[&str], dict: &BTreeMap<String, u32>) -> Vec<(usize, usize, String)> {
    let mut results = Vec::new();
    let mut front = 0;
    let mut back = words.len();
    let mut pos = 0;
    while front < words.len() {
        if words[front].is_empty() {
            pos += 1;
            front += 1;
            back = words.len();
            continue;
        }
        let window = words[front..back].join(" ");
        if let Some(found) = lookup(dict, &window) {
            let len = window.chars().count();
            results.push((pos, len, found));
            pos += len + 1;
            front = back;
            back = words.len();
        } else if back - 1 > front {
            back -= 1;
        } else {
            pos += words[front].chars().count() + 1;
            front += 1;
            back = words.len();
        }
    }
    results
}

/// The window as typed, then singular, then plural.
fn lookup(dict: &BTreeMap<String, u32>, window: &str) -> Option<String> {
    if dict.contains_key(window) {
        return Some(window.to_string());
    }
    let singular = inflect::singular(window);
    if dict.contains_key(&singular) {
        return Some(singular);
    }
    let plural = inflect::plural(&singular);
    dict.contains_key(&plural).then_some(plural)
}

fn leftover_tokens(remaining: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut start = 0;
    for (ix, c) in remaining.chars().chain(std::iter::once(' ')).enumerate() {
        if !c.is_whitespace() {
            if word.is_empty() {
                start = ix;
            }
            word.push(c);
            continue;
        }
        if word.is_empty() {
            continue;
        }
        // "5," reads as 5
        let trimmed = word.trim_end_matches(|c: char| !c.is_alphanumeric());
        let found = leftover_kind(&word).map(|kind| (kind, word.chars().count()));
        let found = found.or_else(|| {
            if trimmed.is_empty() || trimmed.len() == word.len() {
                return None;
            }
            leftover_kind(trimmed).map(|kind| (kind, trimmed.chars().count()))
        });
        match found {
            Some((kind, length)) => tokens.push(Token {
                position: start,
                length,
                kind,
            }),
            None => trace!(word = %word, "unmatched word dropped"),
        }
        word.clear();
    }
    tokens
}

/// A word no dictionary matched: modifier, operator, `decks` or a number.
fn leftover_kind(word: &str) -> Option<TokenKind> {
    if let Some(m) = vocabulary::modifier(word) {
        Some(TokenKind::Modifier(m))
    } else if let Some(op) = vocabulary::operator(word) {
        Some(TokenKind::Operation(op))
    } else if DECK_WORDS.contains(&word) {
        Some(TokenKind::Collection("decks".to_string()))
    } else {
        match Value::coerce(word) {
            n @ Value::Number(_) => Some(TokenKind::Value(n)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dictionaries() -> Dictionaries {
        let mut d = Dictionaries::default();
        for (ix, name) in ["pixar", "up", "toy story", "chris granger"].iter().enumerate() {
            d.entities.insert(name.to_string(), ix as u32);
        }
        for (ix, name) in ["movies", "departments", "studio"].iter().enumerate() {
            d.collections.insert(name.to_string(), ix as u32);
        }
        for (ix, name) in ["founded", "salary", "age"].iter().enumerate() {
            d.attributes.insert(name.to_string(), ix as u32);
        }
        d
    }

    fn kinds(tokens: &[Token]) -> Vec<(usize, TokenKind)> {
        tokens.iter().map(|t| (t.position, t.kind.clone())).collect()
    }

    #[test]
    fn trailing_punctuation_keeps_the_number() {
        let tokens = match_with(&dictionaries(), "top 5, movies");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].kind.label(), "operation");
        assert_eq!(tokens[1].kind, TokenKind::Value(Value::Number(5.0)));
        assert_eq!((tokens[1].position, tokens[1].length), (4, 1));
        assert_eq!(tokens[2].kind, TokenKind::Collection("movies".into()));
    }

    #[test]
    fn empty_quotes_are_not_values() {
        for text in ["movies \"", "movies \"\"", "movies \"  \""] {
            let tokens = match_with(&dictionaries(), text);
            assert_eq!(
                kinds(&tokens),
                vec![(0, TokenKind::Collection("movies".into()))],
                "{text:?}"
            );
        }
    }

    #[test]
    fn single_collection() {
        let tokens = match_with(&dictionaries(), "movies");
        assert_eq!(kinds(&tokens), vec![(0, TokenKind::Collection("movies".into()))]);
        assert_eq!(tokens[0].length, 6);
    }

    #[test]
    fn possessive_entity_and_attribute() {
        let tokens = match_with(&dictionaries(), "pixar's founded");
        assert_eq!(
            kinds(&tokens),
            vec![
                (0, TokenKind::Entity("pixar".into())),
                (8, TokenKind::Attribute("founded".into())),
            ]
        );
    }

    #[test]
    fn deselect_modifier_between_subjects() {
        let tokens = match_with(&dictionaries(), "movies without up");
        assert_eq!(
            kinds(&tokens),
            vec![
                (0, TokenKind::Collection("movies".into())),
                (7, TokenKind::Modifier(Modifier::Deselect)),
                (15, TokenKind::Entity("up".into())),
            ]
        );
    }

    #[test]
    fn plural_attribute_with_comparison() {
        let tokens = match_with(&dictionaries(), "salaries > 50000");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].kind, TokenKind::Attribute("salary".into()));
        assert_eq!(tokens[0].length, 8);
        assert!(matches!(tokens[1].kind, TokenKind::Operation(op) if op.symbol == ">"));
        assert_eq!(tokens[1].position, 9);
        assert_eq!(tokens[2].kind, TokenKind::Value(Value::Number(50000.0)));
        assert_eq!(tokens[2].position, 11);
    }

    #[test]
    fn longest_phrase_wins() {
        let tokens = match_with(&dictionaries(), "toy story with chris granger");
        assert_eq!(
            kinds(&tokens),
            vec![
                (0, TokenKind::Entity("toy story".into())),
                (15, TokenKind::Entity("chris granger".into())),
            ]
        );
    }

    #[test]
    fn singular_window_finds_plural_deck() {
        let tokens = match_with(&dictionaries(), "salary per department");
        assert_eq!(
            kinds(&tokens),
            vec![
                (0, TokenKind::Attribute("salary".into())),
                (7, TokenKind::Modifier(Modifier::Group)),
                (11, TokenKind::Collection("departments".into())),
            ]
        );
    }

    #[test]
    fn quoted_literal_is_one_value() {
        let tokens = match_with(&dictionaries(), "movies contains \"Toy Story\"");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[2].position, 16);
        assert_eq!(tokens[2].length, 11);
        assert_eq!(tokens[2].kind, TokenKind::Value(Value::text("Toy Story")));
    }

    #[test]
    fn unterminated_quote_runs_to_end() {
        let tokens = match_with(&dictionaries(), "\"up and away");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Value(Value::text("up and away")));
    }

    #[test]
    fn deck_words_name_all_decks() {
        let tokens = match_with(&dictionaries(), "decks with pixar");
        assert_eq!(tokens[0].kind, TokenKind::Collection("decks".into()));
    }

    #[test]
    fn empty_input_has_no_tokens() {
        assert!(match_with(&dictionaries(), "").is_empty());
        assert!(match_with(&dictionaries(), "   ").is_empty());
    }
}
