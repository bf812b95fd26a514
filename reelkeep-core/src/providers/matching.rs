//! Disambiguation of catalog search results against a parsed title.
//!
//! Candidates are ordered by how well their title matches (exact normalized
//! equality, then edit distance, then token overlap), then by year distance,
//! poster presence, vote count and popularity. The sort is stable, so a full
//! tie keeps the catalog's own ordering and the first result wins.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::Datelike;
use ordered_float::NotNan;

use super::traits::{MovieCandidate, SeriesCandidate};

/// Accessors the ranker needs from a search result.
pub trait RankableCandidate {
    /// Display title first, then any alternates such as the original title.
    fn titles(&self) -> Vec<&str>;
    fn year(&self) -> Option<u16>;
    fn poster_path(&self) -> Option<&str>;
    fn vote_count(&self) -> u64;
    fn popularity(&self) -> f64;
}

impl RankableCandidate for MovieCandidate {
    fn titles(&self) -> Vec<&str> {
        let mut titles = vec![self.title.as_str()];
        titles.extend(self.original_title.as_deref());
        titles
    }

    fn year(&self) -> Option<u16> {
        self.release_date.and_then(|d| u16::try_from(d.year()).ok())
    }

    fn poster_path(&self) -> Option<&str> {
        self.poster_path.as_deref()
    }

    fn vote_count(&self) -> u64 {
        self.vote_count.map(u64::from).unwrap_or_default()
    }

    fn popularity(&self) -> f64 {
        self.popularity.unwrap_or_default()
    }
}

impl RankableCandidate for SeriesCandidate {
    fn titles(&self) -> Vec<&str> {
        let mut titles = vec![self.name.as_str()];
        titles.extend(self.original_name.as_deref());
        titles
    }

    fn year(&self) -> Option<u16> {
        self.first_air_date.and_then(|d| u16::try_from(d.year()).ok())
    }

    fn poster_path(&self) -> Option<&str> {
        self.poster_path.as_deref()
    }

    fn vote_count(&self) -> u64 {
        self.vote_count.map(u64::from).unwrap_or_default()
    }

    fn popularity(&self) -> f64 {
        self.popularity.unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
struct TitleKey {
    normalized: String,
    tokens: Vec<String>,
}

impl TitleKey {
    fn new(raw: &str) -> Self {
        let normalized = normalize_title(raw);
        let tokens = tokenize_title(&normalized);
        Self { normalized, tokens }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleMatch {
    pub exact_normalized: bool,
    /// `1000 - distance * 1000 / longest`, in basis points of a thousand.
    pub similarity_bp: u16,
    pub overlap_bp: u16,
    pub jaccard_bp: u16,
}

impl TitleMatch {
    fn cmp_best(self, other: Self) -> Ordering {
        self.exact_normalized
            .cmp(&other.exact_normalized)
            .then_with(|| self.similarity_bp.cmp(&other.similarity_bp))
            .then_with(|| self.overlap_bp.cmp(&other.overlap_bp))
            .then_with(|| self.jaccard_bp.cmp(&other.jaccard_bp))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearRank {
    NotApplicable,
    Diff(u16),
    Unknown,
}

impl YearRank {
    fn cmp_best(self, other: Self) -> Ordering {
        use YearRank::*;
        match (self, other) {
            (NotApplicable, _) | (_, NotApplicable) => Ordering::Equal,
            (Diff(a), Diff(b)) => b.cmp(&a), // lower diff is better
            (Diff(_), Unknown) => Ordering::Greater,
            (Unknown, Diff(_)) => Ordering::Less,
            (Unknown, Unknown) => Ordering::Equal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRank {
    pub title: TitleMatch,
    pub year: YearRank,
    pub has_poster: bool,
    pub vote_count: u64,
    pub popularity: NotNan<f64>,
}

impl CandidateRank {
    fn cmp_best(&self, other: &Self) -> Ordering {
        self.title
            .cmp_best(other.title)
            .then_with(|| self.year.cmp_best(other.year))
            .then_with(|| self.has_poster.cmp(&other.has_poster))
            .then_with(|| self.vote_count.cmp(&other.vote_count))
            .then_with(|| self.popularity.cmp(&other.popularity))
    }
}

#[derive(Debug, Clone)]
pub struct RankedCandidate<'a, T> {
    pub candidate: &'a T,
    pub rank: CandidateRank,
}

/// Calculate the Levenshtein (edit) distance between two strings, counted in
/// chars.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev_row: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr_row: Vec<usize> = vec![0; b_chars.len() + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_chars.len()]
}

fn normalize_title(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_stopword(token: &str) -> bool {
    matches!(
        token,
        "the" | "a" | "an" | "to" | "of" | "and" | "or" | "for" | "in" | "on"
            | "at" | "with" | "from" | "by"
    )
}

fn tokenize_title(normalized: &str) -> Vec<String> {
    normalized
        .split_whitespace()
        .filter(|token| token.chars().count() > 1 && !is_stopword(token))
        .map(str::to_string)
        .collect()
}

fn has_poster_path(poster_path: Option<&str>) -> bool {
    poster_path.is_some_and(|path| !path.trim().is_empty())
}

fn year_rank(query_year: Option<u16>, candidate_year: Option<u16>) -> YearRank {
    let Some(query_year) = query_year else {
        return YearRank::NotApplicable;
    };
    let Some(candidate_year) = candidate_year else {
        return YearRank::Unknown;
    };
    YearRank::Diff(query_year.abs_diff(candidate_year))
}

fn not_nan_or_zero(value: f64) -> NotNan<f64> {
    NotNan::new(value)
        .unwrap_or_else(|_| NotNan::new(0.0).expect("0 is not NaN"))
}

fn basis_points(part: usize, whole: usize) -> u16 {
    if whole == 0 {
        return 0;
    }
    (part.min(whole) * 1000 / whole) as u16
}

fn title_match(query: &TitleKey, candidate: &TitleKey) -> TitleMatch {
    let exact_normalized = query.normalized == candidate.normalized;

    let longest = query
        .normalized
        .chars()
        .count()
        .max(candidate.normalized.chars().count());
    let distance = levenshtein_distance(&query.normalized, &candidate.normalized);
    let similarity_bp = 1000 - basis_points(distance, longest);

    let query_set: HashSet<&str> = query.tokens.iter().map(String::as_str).collect();
    let candidate_set: HashSet<&str> =
        candidate.tokens.iter().map(String::as_str).collect();
    let intersection = query_set.intersection(&candidate_set).count();
    let union = query_set.union(&candidate_set).count();

    TitleMatch {
        exact_normalized,
        similarity_bp,
        overlap_bp: basis_points(intersection, query_set.len()),
        jaccard_bp: basis_points(intersection, union),
    }
}

fn best_title_match(query: &TitleKey, titles: &[&str]) -> Option<TitleMatch> {
    titles
        .iter()
        .map(|raw| title_match(query, &TitleKey::new(raw)))
        .reduce(|best, current| {
            if current.cmp_best(best) == Ordering::Greater {
                current
            } else {
                best
            }
        })
}

/// Ranks `results` best first.
pub fn rank_candidates<'a, T: RankableCandidate>(
    query_title: &str,
    query_year: Option<u16>,
    results: &'a [T],
) -> Vec<RankedCandidate<'a, T>> {
    let query = TitleKey::new(query_title);

    let mut ranked: Vec<_> = results
        .iter()
        .filter_map(|candidate| {
            let title = best_title_match(&query, &candidate.titles())?;
            let rank = CandidateRank {
                title,
                year: year_rank(query_year, candidate.year()),
                has_poster: has_poster_path(candidate.poster_path()),
                vote_count: candidate.vote_count(),
                popularity: not_nan_or_zero(candidate.popularity()),
            };
            Some(RankedCandidate { candidate, rank })
        })
        .collect();

    // stable: ties keep catalog order
    ranked.sort_by(|a, b| b.rank.cmp_best(&a.rank));
    ranked
}

pub fn best_candidate<'a, T: RankableCandidate>(
    query_title: &str,
    query_year: Option<u16>,
    results: &'a [T],
) -> Option<&'a T> {
    rank_candidates(query_title, query_year, results)
        .into_iter()
        .next()
        .map(|ranked| ranked.candidate)
}
