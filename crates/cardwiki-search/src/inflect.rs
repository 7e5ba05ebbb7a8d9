//! English number inflection for dictionary lookups.
//!
//! Users write "salaries" for an attribute named `salary` and "movie" for a
//! deck named `movies`. Only the last word of a phrase is inflected
//! ("toy stories" → "toy story").

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("man", "men"),
    ("woman", "women"),
    ("child", "children"),
    ("tooth", "teeth"),
    ("foot", "feet"),
    ("mouse", "mice"),
    ("goose", "geese"),
    ("ox", "oxen"),
];

const UNCOUNTABLE: &[&str] = &[
    "sheep",
    "fish",
    "deer",
    "series",
    "species",
    "news",
    "money",
    "information",
    "equipment",
    "rice",
    "data",
];

/// Nouns ending in "ie" whose plural is "-ies" but whose singular is not "-y".
const IE_NOUNS: &[&str] = &[
    "movie", "cookie", "pie", "tie", "lie", "rookie", "zombie", "calorie", "prairie", "selfie",
    "genie", "brownie", "smoothie", "hippie", "sortie",
];

/// Singular form of the phrase's last word.
pub fn singular(phrase: &str) -> String {
    inflect_last_word(phrase, singular_word)
}

/// Plural form of the phrase's last word.
pub fn plural(phrase: &str) -> String {
    inflect_last_word(phrase, plural_word)
}

fn inflect_last_word(phrase: &str, f: fn(&str) -> String) -> String {
    match phrase.rsplit_once(' ') {
        Some((head, last)) => format!("{head} {}", f(last)),
        None => f(phrase),
    }
}

fn singular_word(word: &str) -> String {
    if word.is_empty() || UNCOUNTABLE.contains(&word) {
        return word.to_string();
    }
    if let Some((single, _)) = IRREGULAR.iter().find(|(_, many)| *many == word) {
        return single.to_string();
    }
    if IRREGULAR.iter().any(|(single, _)| *single == word) {
        return word.to_string();
    }

    if let Some(stem) = word.strip_suffix("ies") {
        let as_ie = format!("{stem}ie");
        if IE_NOUNS.contains(&as_ie.as_str()) || stem.len() < 2 {
            return as_ie;
        }
        return format!("{stem}y");
    }
    if let Some(stem) = word.strip_suffix("ves") {
        if stem.ends_with('l') {
            return format!("{stem}f");
        }
        if matches!(stem, "kni" | "wi" | "li") {
            return format!("{stem}fe");
        }
        if matches!(stem, "lea" | "loa" | "thie" | "shea") {
            return format!("{stem}f");
        }
        return format!("{stem}ve");
    }
    for suffix in ["sses", "xes", "ches", "shes", "zzes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if let Some(stem) = word.strip_suffix("uses") {
        if !stem.ends_with(['a', 'o', 'u']) {
            return format!("{stem}us");
        }
    }
    if word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") {
        return word.to_string();
    }
    match word.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => word.to_string(),
    }
}

fn plural_word(word: &str) -> String {
    if word.is_empty() || UNCOUNTABLE.contains(&word) {
        return word.to_string();
    }
    if let Some((_, many)) = IRREGULAR.iter().find(|(single, _)| *single == word) {
        return many.to_string();
    }
    if IRREGULAR.iter().any(|(_, many)| *many == word) {
        return word.to_string();
    }

    if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
        return format!("{word}es");
    }
    if let Some(stem) = word.strip_suffix('y') {
        if !stem.is_empty() && !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }
    if let Some(stem) = word.strip_suffix("fe") {
        return format!("{stem}ves");
    }
    if let Some(stem) = word.strip_suffix("lf") {
        return format!("{stem}lves");
    }
    format!("{word}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singularizes_common_plurals() {
        assert_eq!(singular("salaries"), "salary");
        assert_eq!(singular("movies"), "movie");
        assert_eq!(singular("departments"), "department");
        assert_eq!(singular("boxes"), "box");
        assert_eq!(singular("classes"), "class");
        assert_eq!(singular("wolves"), "wolf");
        assert_eq!(singular("knives"), "knife");
        assert_eq!(singular("people"), "person");
        assert_eq!(singular("status"), "status");
        assert_eq!(singular("houses"), "house");
        assert_eq!(singular("buses"), "bus");
    }

    #[test]
    fn pluralizes_common_singulars() {
        assert_eq!(plural("salary"), "salaries");
        assert_eq!(plural("movie"), "movies");
        assert_eq!(plural("day"), "days");
        assert_eq!(plural("box"), "boxes");
        assert_eq!(plural("person"), "people");
        assert_eq!(plural("wife"), "wives");
        assert_eq!(plural("sheep"), "sheep");
    }

    #[test]
    fn only_the_last_word_changes() {
        assert_eq!(plural("toy story"), "toy stories");
        assert_eq!(singular("toy stories"), "toy story");
        assert_eq!(singular("chris granger"), "chris granger");
    }
}
