//! Provenance classification for tracks.

use crate::track::{SourceType, Track};

/// Locator prefixes that mark a track as stored on the device.
pub const DEFAULT_LOCAL_PREFIXES: [&str; 5] =
    ["file://", "content://", "/storage/", "/sdcard/", "/data/user/"];

/// Decides the effective provenance of a track.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceClassifier {
    local_prefixes: Vec<String>,
}

impl Default for SourceClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_LOCAL_PREFIXES.iter().map(|p| p.to_string()))
    }
}

impl SourceClassifier {
    /// Creates a classifier with a custom set of local-storage prefixes.
    /// Blank entries are ignored.
    pub fn new<I>(local_prefixes: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            local_prefixes: local_prefixes
                .into_iter()
                .map(|prefix| prefix.trim().to_string())
                .filter(|prefix| !prefix.is_empty())
                .collect(),
        }
    }

    /// Returns the explicit `source_type` if set, otherwise `Download` for any
    /// locality hint and `Online` for everything else.
    pub fn classify(&self, track: &Track) -> SourceType {
        if let Some(source_type) = track.source_type {
            return source_type;
        }
        if self.has_local_hint(track) {
            SourceType::Download
        } else {
            SourceType::Online
        }
    }

    /// True when any field suggests the track lives on the device.
    pub fn has_local_hint(&self, track: &Track) -> bool {
        track.is_local
            || track.is_local_music
            || track.is_downloaded
            || track
                .path
                .as_deref()
                .is_some_and(|path| !path.trim().is_empty())
            || track
                .url
                .as_deref()
                .is_some_and(|url| self.is_local_locator(url))
    }

    fn is_local_locator(&self, url: &str) -> bool {
        let url = url.trim();
        self.local_prefixes
            .iter()
            .any(|prefix| url.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::SourceClassifier;
    use crate::track::{SourceType, Track};

    #[test]
    fn test_explicit_source_type_wins_over_locality_hints() {
        let classifier = SourceClassifier::default();
        let mut track = Track::new("a", "file:///sdcard/a.mp3").with_source_type(SourceType::Online);
        track.is_downloaded = true;
        assert_eq!(classifier.classify(&track), SourceType::Online);

        let library = Track::new("b", "file:///sdcard/b.mp3").with_source_type(SourceType::MyMusic);
        assert_eq!(classifier.classify(&library), SourceType::MyMusic);
    }

    #[test]
    fn test_locality_hints_classify_as_download() {
        let classifier = SourceClassifier::default();

        let mut flagged = Track::new("a", "https://cdn.example.com/a.mp3");
        flagged.is_local = true;
        assert_eq!(classifier.classify(&flagged), SourceType::Download);

        let mut library_flag = Track::new("b", "https://cdn.example.com/b.mp3");
        library_flag.is_local_music = true;
        assert_eq!(classifier.classify(&library_flag), SourceType::Download);

        let mut with_path = Track::new("c", "https://cdn.example.com/c.mp3");
        with_path.path = Some("/data/user/0/app/files/c.mp3".to_string());
        assert_eq!(classifier.classify(&with_path), SourceType::Download);

        for url in [
            "file:///music/d.mp3",
            "content://media/external/audio/12",
            "/storage/emulated/0/Music/d.flac",
            "/sdcard/Download/d.m4a",
        ] {
            let track = Track::new("d", url);
            assert_eq!(classifier.classify(&track), SourceType::Download, "{url}");
        }
    }

    #[test]
    fn test_remote_track_without_hints_is_online() {
        let classifier = SourceClassifier::default();
        assert_eq!(
            classifier.classify(&Track::new("a", "https://cdn.example.com/a.mp3")),
            SourceType::Online
        );

        let mut blank_path = Track::new("b", "https://cdn.example.com/b.mp3");
        blank_path.path = Some("  ".to_string());
        assert_eq!(classifier.classify(&blank_path), SourceType::Online);

        let mut no_url = Track::default();
        no_url.id = "c".to_string();
        assert_eq!(classifier.classify(&no_url), SourceType::Online);
    }

    #[test]
    fn test_custom_prefixes_replace_defaults() {
        let classifier = SourceClassifier::new(vec!["/mnt/media/".to_string(), " ".to_string()]);
        assert_eq!(
            classifier.classify(&Track::new("a", "/mnt/media/a.mp3")),
            SourceType::Download
        );
        assert_eq!(
            classifier.classify(&Track::new("b", "file:///b.mp3")),
            SourceType::Online
        );
    }
}
