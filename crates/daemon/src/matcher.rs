//! Filename matcher for season/episode identifiers.
//!
//! Recognizes, in priority order:
//! - `Show.Name.S01E02.720p.mkv` (also `s01.e02`, `S01 - E02`, `S01][E02`)
//! - `Show Name - 1x02 - Title.avi`
//!
//! The first pattern that matches decides the result. A match whose numbers
//! do not fit in a `u32` is reported as no match.

use crate::episode::EpisodeKey;
use regex::Regex;
use tracing::debug;

/// `S<season>E<episode>` with optional separators between the markers.
pub const SEASON_EPISODE_PATTERN: &str = r"[Ss]([0-9]+)[\]\[ ._\-]*[Ee]([0-9]+)([^\\/]*)$";

/// `<season>x<episode>` preceded by a delimiter.
pub const CROSS_PATTERN: &str = r"[\\/._ \[(\-]([0-9]+)x([0-9]+)([^\\/]*)$";

/// Ordered set of patterns plus the hidden-file convention.
#[derive(Debug, Clone)]
pub struct FilenameMatcher {
    patterns: Vec<Regex>,
    hidden_prefix: String,
}

impl Default for FilenameMatcher {
    fn default() -> Self {
        Self::with_patterns(&[SEASON_EPISODE_PATTERN, CROSS_PATTERN], ".")
            .expect("built-in episode patterns are valid")
    }
}

impl FilenameMatcher {
    /// Build a matcher from patterns in priority order.
    ///
    /// Each pattern must expose the season as capture group 1 and the
    /// episode as capture group 2.
    pub fn with_patterns(patterns: &[&str], hidden_prefix: &str) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            hidden_prefix: hidden_prefix.to_string(),
        })
    }

    /// Default patterns with a custom hidden prefix.
    pub fn with_hidden_prefix(hidden_prefix: &str) -> Self {
        Self {
            hidden_prefix: hidden_prefix.to_string(),
            ..Self::default()
        }
    }

    /// Whether a file or folder name is hidden by convention.
    pub fn is_hidden(&self, name: &str) -> bool {
        !self.hidden_prefix.is_empty() && name.starts_with(&self.hidden_prefix)
    }

    pub fn hidden_prefix(&self) -> &str {
        &self.hidden_prefix
    }

    /// Extract the episode key from a bare filename.
    ///
    /// Hidden names are never matched.
    pub fn match_filename(&self, name: &str) -> Option<EpisodeKey> {
        if self.is_hidden(name) {
            return None;
        }

        let caps = self.patterns.iter().find_map(|p| p.captures(name))?;
        let season = caps.get(1)?.as_str().parse::<u32>();
        let episode = caps.get(2)?.as_str().parse::<u32>();

        match (season, episode) {
            (Ok(season), Ok(episode)) => Some(EpisodeKey::new(season, episode)),
            _ => {
                debug!(filename = name, "Episode numbers out of range, ignoring file");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(season: u32, episode: u32) -> Option<EpisodeKey> {
        Some(EpisodeKey::new(season, episode))
    }

    #[test]
    fn test_season_episode_variants() {
        let m = FilenameMatcher::default();
        assert_eq!(m.match_filename("ShowA.S01E02.mkv"), key(1, 2));
        assert_eq!(m.match_filename("show.s10e07.720p.HDTV.x264.mkv"), key(10, 7));
        assert_eq!(m.match_filename("Show S02 E03 - The Title.avi"), key(2, 3));
        assert_eq!(m.match_filename("Show_S03_E04.mp4"), key(3, 4));
        assert_eq!(m.match_filename("Show [S04][E05].mkv"), key(4, 5));
        assert_eq!(m.match_filename("Show-S05-E06.mkv"), key(5, 6));
    }

    #[test]
    fn test_cross_variants() {
        let m = FilenameMatcher::default();
        assert_eq!(m.match_filename("Show - 1x02 - Title.avi"), key(1, 2));
        assert_eq!(m.match_filename("Show.3x10.mkv"), key(3, 10));
        assert_eq!(m.match_filename("Show (2x01).mkv"), key(2, 1));
        assert_eq!(m.match_filename("Show_4x11_hdtv.mkv"), key(4, 11));
    }

    #[test]
    fn test_cross_requires_leading_delimiter() {
        let m = FilenameMatcher::default();
        assert_eq!(m.match_filename("1x02.mkv"), None);
    }

    #[test]
    fn test_first_pattern_wins() {
        let m = FilenameMatcher::default();
        // both patterns could match; S/E form has priority
        assert_eq!(m.match_filename("Show.1x09.S02E03.mkv"), key(2, 3));
    }

    #[test]
    fn test_non_matching_names() {
        let m = FilenameMatcher::default();
        assert_eq!(m.match_filename("Show.Name.2013.mkv"), None);
        assert_eq!(m.match_filename("cover.jpg"), None);
        assert_eq!(m.match_filename(""), None);
    }

    #[test]
    fn test_hidden_files_are_skipped() {
        let m = FilenameMatcher::default();
        assert_eq!(m.match_filename(".ShowA.S01E02.mkv"), None);
        assert!(m.is_hidden(".DS_Store"));
        assert!(!m.is_hidden("ShowA.S01E02.mkv"));
    }

    #[test]
    fn test_custom_hidden_prefix() {
        let m = FilenameMatcher::with_hidden_prefix("_");
        assert_eq!(m.match_filename("_ShowA.S01E02.mkv"), None);
        assert_eq!(m.match_filename(".ShowA.S01E02.mkv"), key(1, 2));
    }

    #[test]
    fn test_overflowing_numbers_are_no_match() {
        let m = FilenameMatcher::default();
        assert_eq!(m.match_filename("Show.S99999999999E01.mkv"), None);
        assert_eq!(m.match_filename("Show.S01E99999999999.mkv"), None);
    }

    #[test]
    fn test_invalid_custom_pattern_is_error() {
        assert!(FilenameMatcher::with_patterns(&["([0-9]+"], ".").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_season_episode_exact_regardless_of_suffix(
            show in "[A-Za-z][A-Za-z ]{0,15}",
            season in 0u32..100,
            episode in 0u32..1000,
            upper in proptest::bool::ANY,
            suffix in "[A-Za-z0-9 .\\-\\[\\]()]{0,30}",
        ) {
            let (s, e) = if upper { ("S", "E") } else { ("s", "e") };
            let name = format!("{}.{}{:02}{}{:02}{}.mkv", show, s, season, e, episode, suffix);
            let m = FilenameMatcher::default();
            prop_assert_eq!(m.match_filename(&name), Some(EpisodeKey::new(season, episode)));
        }

        #[test]
        fn prop_hidden_names_never_match(
            season in 0u32..100,
            episode in 0u32..100,
        ) {
            let name = format!(".Show.S{:02}E{:02}.mkv", season, episode);
            prop_assert_eq!(FilenameMatcher::default().match_filename(&name), None);
        }

        #[test]
        fn prop_never_panics(name in "\\PC{0,64}") {
            let _ = FilenameMatcher::default().match_filename(&name);
        }
    }
}
