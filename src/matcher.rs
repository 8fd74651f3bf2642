use crate::storage::CatalogEntry;
use std::{fmt, str::FromStr};

/// Минимальный балл (строго больше), при котором нечёткое совпадение принимается.
pub const FUZZY_THRESHOLD: u8 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchStrategy {
    #[default]
    Substring,
    Fuzzy,
}

impl FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "substring" => Ok(Self::Substring),
            "fuzzy" => Ok(Self::Fuzzy),
            other => Err(format!("unknown match strategy `{other}`, expected `substring` or `fuzzy`")),
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Substring => "substring",
            Self::Fuzzy => "fuzzy",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    EmptyQuery,
    EmptyIndex,
    NotFound,
    Found(Vec<CatalogEntry>),
}

/// Ключ поиска: нижний регистр, пунктуация → пробел, пробелы схлопнуты.
/// `"Inception (2010)"` и `"inception 2010"` дают одно и то же.
pub fn fold(s: &str) -> String {
    let mapped: String = s
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Подстрока после `fold` с обеих сторон. Пустой запрос совпадает со всем.
pub fn contains(caption: &str, query: &str) -> bool {
    fold(caption).contains(&fold(query))
}

/// Похожесть 0..=100: максимум из полного и частичного отношения Левенштейна.
/// Частичное сравнивает короткую строку с лучшим окном той же длины в длинной,
/// поэтому `avatar` близко к `avatar (2009)`. Частичный балл штрафуется, когда
/// длины сильно различаются (×0.9 от 1.5 раза, ×0.6 от 8 раз).
pub fn similarity(a: &str, b: &str) -> u8 {
    let (a, b) = (fold(a), fold(b));
    let full = strsim::normalized_levenshtein(&a, &b);
    let score = full.max(partial_ratio(&a, &b)) * 100.0;
    score.round().clamp(0.0, 100.0) as u8
}

fn partial_ratio(a: &str, b: &str) -> f64 {
    let (a, b): (Vec<char>, Vec<char>) = (a.chars().collect(), b.chars().collect());
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() || short.len() == long.len() {
        return 0.0;
    }

    let short_str: String = short.iter().collect();
    let best = long
        .windows(short.len())
        .map(|w| strsim::normalized_levenshtein(&short_str, &w.iter().collect::<String>()))
        .fold(0.0, f64::max);

    let len_ratio = long.len() as f64 / short.len() as f64;
    let scale = if len_ratio >= 8.0 {
        0.6
    } else if len_ratio >= 1.5 {
        0.9
    } else {
        1.0
    };
    best * scale
}

pub fn lookup(strategy: MatchStrategy, entries: &[CatalogEntry], query: &str) -> Lookup {
    let query = fold(query);
    if query.is_empty() {
        return Lookup::EmptyQuery;
    }
    if entries.is_empty() {
        return Lookup::EmptyIndex;
    }

    let hits: Vec<CatalogEntry> = match strategy {
        MatchStrategy::Substring => entries
            .iter()
            .filter(|e| fold(&e.caption).contains(&query))
            .cloned()
            .collect(),
        MatchStrategy::Fuzzy => best_match(entries, &query).into_iter().cloned().collect(),
    };

    if hits.is_empty() { Lookup::NotFound } else { Lookup::Found(hits) }
}

// при равных баллах побеждает первая запись в порядке хранения
fn best_match<'a>(entries: &'a [CatalogEntry], query: &str) -> Option<&'a CatalogEntry> {
    let mut best: Option<(&CatalogEntry, u8)> = None;
    for e in entries {
        let score = similarity(&e.caption, query);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((e, score));
        }
    }
    best.filter(|(_, s)| *s > FUZZY_THRESHOLD).map(|(e, _)| e)
}
