//! Filename heuristics.
//!
//! Everything here is pure: the same file name and [`ParserSettings`] always
//! produce the same result, which keeps re-scans stable.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::settings::ParserSettings;

static MOVIE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*)\((\d{4})\)").expect("movie pattern should compile")
});

static EPISODE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*?)S(\d{2})E(\d{2})(?:\D|$)")
        .expect("episode pattern should compile")
});

static LOOSE_EPISODE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.*?)\bs(\d{1,2})\s*[-.]?\s*e(\d{1,3})\b")
        .expect("loose episode pattern should compile")
});

static CROSS_EPISODE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.*?)\b(\d{1,2})x(\d{2,3})\b")
        .expect("cross episode pattern should compile")
});

static YEAR_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\[\(]?\b(\d{4})\b[\]\)]?")
        .expect("year token regex should compile")
});

static BRACKET_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[[^\]]*\]|\{[^}]*\}")
        .expect("bracket tag regex should compile")
});

static PAREN_GROUPS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\([^)]*\)").expect("paren group regex should compile")
});

static RELEASE_GROUP_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"-[A-Z0-9]{2,}$")
        .expect("release group regex should compile")
});

static NOISE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(2160p|1080p|720p|576p|480p|4k|uhd|hdr10|hdr",
        r"|bluray|blu-ray|brrip|bdrip|web-?dl|webrip|hdtv|dvdrip",
        r"|x264|x265|h\.?264|h\.?265|hevc|avc|xvid|divx",
        r"|aac|ac3|eac3|dts|ddp?5\.1|atmos",
        r"|remux|proper|repack|extended|unrated|subbed)\b",
    ))
    .expect("noise token regex should compile")
});

static COLLAPSE_WHITESPACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+").expect("whitespace regex should compile")
});

/// Which heuristic produced a parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseSource {
    /// The primary `<title>(<year>)` / `<title>SxxEyy` pattern.
    Pattern,
    /// The heavy sanitizer or the loose episode patterns.
    Sanitized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMovie {
    pub title: String,
    pub year: Option<u16>,
    pub source: ParseSource,
}

impl ParsedMovie {
    /// `false` when nothing usable could be recovered from the name.
    pub fn matched(&self) -> bool {
        !self.title.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEpisode {
    pub title: String,
    pub year: Option<u16>,
    /// Zero padded to at least two digits.
    pub season: String,
    /// Zero padded to at least two digits.
    pub episode: String,
    pub source: ParseSource,
}

impl ParsedEpisode {
    pub fn season_number(&self) -> u32 {
        self.season.parse().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FilenameParser {
    settings: ParserSettings,
}

impl FilenameParser {
    pub fn new(settings: ParserSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ParserSettings {
        &self.settings
    }

    /// Parses a movie file name.
    ///
    /// Never fails: when neither the primary pattern nor the heavy sanitizer
    /// yields a title the result carries an empty title and no year.
    pub fn parse_movie(&self, file_name: &str) -> ParsedMovie {
        if let Some(caps) = MOVIE_PATTERN.captures(file_name) {
            let title = sanitize_title(&caps[1]);
            if !title.is_empty() {
                return ParsedMovie {
                    title,
                    year: self.year_in_range(&caps[2]),
                    source: ParseSource::Pattern,
                };
            }
        }

        tracing::debug!(file_name, "Primary movie pattern failed, heavy sanitizing");
        let (title, year) = self.heavy_sanitize(strip_extension(file_name));
        ParsedMovie {
            title,
            year,
            source: ParseSource::Sanitized,
        }
    }

    /// Parses an episode file name. `None` when no season/episode marker
    /// with a preceding title is found.
    pub fn parse_episode(&self, file_name: &str) -> Option<ParsedEpisode> {
        let (working, year) = self.strip_year(file_name);
        self.match_episode(file_name, &working, year).or_else(|| {
            // The year token may have been the whole title ("1923 S01E01").
            year.and_then(|_| self.match_episode(file_name, file_name, None))
        })
    }

    fn match_episode(
        &self,
        file_name: &str,
        working: &str,
        year: Option<u16>,
    ) -> Option<ParsedEpisode> {
        if let Some(caps) = EPISODE_PATTERN.captures(working) {
            let title = sanitize_title(&caps[1]);
            if !title.is_empty() {
                return Some(ParsedEpisode {
                    title,
                    year,
                    season: caps[2].to_string(),
                    episode: caps[3].to_string(),
                    source: ParseSource::Pattern,
                });
            }
        }

        let loose = strip_extension(working).replace(['.', '_'], " ");
        let caps = LOOSE_EPISODE_PATTERN
            .captures(&loose)
            .or_else(|| CROSS_EPISODE_PATTERN.captures(&loose))?;
        let title = sanitize_title(&BRACKET_TAGS.replace_all(&caps[1], " "));
        if title.is_empty() {
            return None;
        }

        tracing::debug!(file_name, title = %title, "Episode parsed by loose pattern");
        Some(ParsedEpisode {
            title,
            year,
            season: pad_number(&caps[2])?,
            episode: pad_number(&caps[3])?,
            source: ParseSource::Sanitized,
        })
    }

    /// Aggressive cleanup for release style names such as
    /// `The.Dark.Knight.2008.1080p.BluRay.x264-GROUP`.
    pub fn heavy_sanitize(&self, name: &str) -> (String, Option<u16>) {
        let spaced = name.replace(['.', '_'], " ");
        let mut working = spaced.as_str();
        let mut year = None;
        let mut truncated = false;

        // The release year is the last one followed by nothing but release
        // noise ("Blade.Runner.2049.2017.1080p"); failing that, the first.
        let mut first = None;
        let mut trailing = None;
        for caps in YEAR_TOKEN.captures_iter(&spaced) {
            let Some(candidate) = self.year_in_range(&caps[1]) else {
                continue;
            };
            let Some(whole) = caps.get(0) else { continue };
            let prefix = &spaced[..whole.start()];
            if sanitize_title(&BRACKET_TAGS.replace_all(prefix, " ")).is_empty()
            {
                // A leading year is part of the title ("1917 (2019)").
                continue;
            }
            first.get_or_insert((candidate, whole.start()));
            if is_release_noise(&spaced[whole.end()..]) {
                trailing = Some((candidate, whole.start()));
            }
        }
        if let Some((candidate, start)) = trailing.or(first) {
            year = Some(candidate);
            working = &spaced[..start];
            truncated = true;
        }

        let untagged = BRACKET_TAGS.replace_all(working, " ");
        let mut cleaned = untagged.into_owned();
        let noise_cut = NOISE_TOKEN
            .find(&cleaned)
            .map(|noise| noise.start())
            .filter(|&start| !sanitize_title(&cleaned[..start]).is_empty());
        if let Some(start) = noise_cut {
            cleaned.truncate(start);
            truncated = true;
        }

        let mut cleaned = PAREN_GROUPS.replace_all(&cleaned, " ").into_owned();
        if !truncated {
            cleaned = RELEASE_GROUP_SUFFIX
                .replace(cleaned.trim_end(), "")
                .into_owned();
        }

        (sanitize_title(&cleaned), year)
    }

    /// Removes the first plausible year token from `name`.
    fn strip_year(&self, name: &str) -> (String, Option<u16>) {
        for caps in YEAR_TOKEN.captures_iter(name) {
            if let Some(year) = self.year_in_range(&caps[1])
                && let Some(whole) = caps.get(0)
            {
                let mut stripped = String::with_capacity(name.len());
                stripped.push_str(&name[..whole.start()]);
                stripped.push_str(&name[whole.end()..]);
                return (stripped, Some(year));
            }
        }
        (name.to_string(), None)
    }

    fn year_in_range(&self, token: &str) -> Option<u16> {
        token
            .parse::<u16>()
            .ok()
            .filter(|year| self.settings.accepts(*year))
    }
}

/// Normalizes separators, collapses whitespace and trims punctuation left
/// behind by the patterns.
pub fn sanitize_title(raw: &str) -> String {
    let mut title = raw.replace('_', " ");
    if !title.contains(char::is_whitespace) {
        title = title.replace('.', " ");
    }
    let collapsed = COLLAPSE_WHITESPACE.replace_all(&title, " ");
    collapsed
        .trim_start_matches(|c: char| {
            c.is_whitespace() || matches!(c, '-' | '.' | ',' | ';' | ':' | ')' | ']' | '}')
        })
        .trim_end_matches(|c: char| {
            c.is_whitespace() || matches!(c, '-' | '.' | ',' | ';' | ':' | '(' | '[' | '{')
        })
        .to_string()
}

/// `true` when `rest` holds no title words, only tags, quality markers
/// and a release group.
fn is_release_noise(rest: &str) -> bool {
    let untagged = BRACKET_TAGS.replace_all(rest, " ");
    let head = match NOISE_TOKEN.find(&untagged) {
        Some(noise) => &untagged[..noise.start()],
        None => &untagged[..],
    };
    let head = RELEASE_GROUP_SUFFIX.replace(head.trim_end(), "");
    sanitize_title(&head).is_empty()
}

fn strip_extension(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=4).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
                && !ext.chars().all(|c| c.is_ascii_digit()) =>
        {
            stem
        }
        _ => file_name,
    }
}

fn pad_number(token: &str) -> Option<String> {
    token.parse::<u32>().ok().map(|n| format!("{n:02}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> FilenameParser {
        FilenameParser::default()
    }

    #[test]
    fn movie_with_parenthesized_year() {
        let parsed = parser().parse_movie("North of the Sun (2016).mkv");
        assert_eq!(parsed.title, "North of the Sun");
        assert_eq!(parsed.year, Some(2016));
        assert_eq!(parsed.source, ParseSource::Pattern);
        assert!(parsed.matched());
    }

    #[test]
    fn movie_year_outside_range_is_dropped() {
        let parsed = FilenameParser::new(ParserSettings {
            min_year: 1950,
            max_year: 2030,
        })
        .parse_movie("Metropolis (1927).mkv");
        assert_eq!(parsed.title, "Metropolis");
        assert_eq!(parsed.year, None);
    }

    #[test]
    fn release_style_name_falls_back_to_heavy_sanitizer() {
        let parsed =
            parser().parse_movie("The.Dark.Knight.2008.1080p.BluRay.x264-GROUP.mkv");
        assert_eq!(parsed.title, "The Dark Knight");
        assert_eq!(parsed.year, Some(2008));
        assert_eq!(parsed.source, ParseSource::Sanitized);
    }

    #[test]
    fn heavy_sanitizer_keeps_leading_year_titles() {
        let (title, year) = parser().heavy_sanitize("1917 (2019) [1080p]");
        assert_eq!(title, "1917");
        assert_eq!(year, Some(2019));
    }

    #[test]
    fn heavy_sanitizer_strips_tags_without_year() {
        let (title, year) =
            parser().heavy_sanitize("[Group] Some_Movie_Name {extras} 720p WEBRip");
        assert_eq!(title, "Some Movie Name");
        assert_eq!(year, None);
    }

    #[test]
    fn heavy_sanitizer_keeps_hyphenated_titles() {
        let (title, _) = parser().heavy_sanitize("Spider-Man");
        assert_eq!(title, "Spider-Man");
    }

    #[test]
    fn unparseable_movie_has_empty_title() {
        let parsed = parser().parse_movie("(2001).mkv");
        assert!(!parsed.matched());
    }

    #[test]
    fn episode_primary_pattern() {
        let parsed = parser()
            .parse_episode("The Walking Dead S01E01.mkv")
            .expect("episode should parse");
        assert_eq!(parsed.title, "The Walking Dead");
        assert_eq!(parsed.season, "01");
        assert_eq!(parsed.episode, "01");
        assert_eq!(parsed.season_number(), 1);
        assert_eq!(parsed.year, None);
        assert_eq!(parsed.source, ParseSource::Pattern);
    }

    #[test]
    fn episode_year_is_stripped_before_matching() {
        let parsed = parser()
            .parse_episode("Doctor Who (2005) S03E10.mkv")
            .expect("episode should parse");
        assert_eq!(parsed.title, "Doctor Who");
        assert_eq!(parsed.year, Some(2005));
        assert_eq!(parsed.season, "03");
        assert_eq!(parsed.episode, "10");
    }

    #[test]
    fn episode_dotted_name() {
        let parsed = parser()
            .parse_episode("Breaking.Bad.S02E05.720p.HDTV.mkv")
            .expect("episode should parse");
        assert_eq!(parsed.title, "Breaking Bad");
        assert_eq!(parsed.season, "02");
        assert_eq!(parsed.episode, "05");
    }

    #[test]
    fn episode_loose_patterns_are_zero_padded() {
        let lower = parser()
            .parse_episode("the_office_s2e3.mp4")
            .expect("lowercase marker should parse");
        assert_eq!(lower.title, "the office");
        assert_eq!(lower.season, "02");
        assert_eq!(lower.episode, "03");
        assert_eq!(lower.source, ParseSource::Sanitized);

        let cross = parser()
            .parse_episode("Firefly 1x07.avi")
            .expect("NxNN marker should parse");
        assert_eq!(cross.title, "Firefly");
        assert_eq!(cross.season, "01");
        assert_eq!(cross.episode, "07");
    }

    #[test]
    fn year_title_survives_year_stripping() {
        let parsed = parser()
            .parse_episode("1923 S01E01.mkv")
            .expect("year titled show should parse");
        assert_eq!(parsed.title, "1923");
        assert_eq!(parsed.year, None);
        assert_eq!(parsed.season, "01");
        assert_eq!(parsed.episode, "01");
    }

    #[test]
    fn three_digit_episode_is_not_truncated() {
        let parsed = parser()
            .parse_episode("One Piece S01E100.mkv")
            .expect("long running show should parse");
        assert_eq!(parsed.title, "One Piece");
        assert_eq!(parsed.season, "01");
        assert_eq!(parsed.episode, "100");
    }

    #[test]
    fn heavy_sanitizer_prefers_release_year_over_title_number() {
        let (title, year) = parser().heavy_sanitize("Blade.Runner.2049.2017.1080p");
        assert_eq!(title, "Blade Runner 2049");
        assert_eq!(year, Some(2017));

        let parsed = parser().parse_movie("Blade.Runner.2049.2017.1080p.BluRay.x264-GRP.mkv");
        assert_eq!(parsed.title, "Blade Runner 2049");
        assert_eq!(parsed.year, Some(2017));
    }

    #[test]
    fn episode_without_marker_is_rejected() {
        assert!(parser().parse_episode("Home Video.mkv").is_none());
        assert!(parser().parse_episode("S01E01.mkv").is_none());
    }

    #[test]
    fn parsing_is_deterministic() {
        let p = parser();
        for name in [
            "North of the Sun (2016).mkv",
            "The.Dark.Knight.2008.1080p.BluRay.x264-GROUP.mkv",
            "[Group] Some_Movie_Name {extras} 720p WEBRip.mkv",
        ] {
            assert_eq!(p.parse_movie(name), p.parse_movie(name));
        }
        assert_eq!(
            p.parse_episode("The Walking Dead S01E01.mkv"),
            p.parse_episode("The Walking Dead S01E01.mkv")
        );
    }

    #[test]
    fn sanitize_trims_artifacts() {
        assert_eq!(sanitize_title("  North   of the Sun - "), "North of the Sun");
        assert_eq!(sanitize_title("The.Walking.Dead."), "The Walking Dead");
        assert_eq!(sanitize_title("Mr. Robot "), "Mr. Robot");
    }
}
