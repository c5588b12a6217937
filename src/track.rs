//! Track value type and provenance classes.

use std::fmt;

/// Provenance class of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Online,   // Streamed from a remote URL
    Download, // Downloaded file stored on the device
    MyMusic,  // Track from the user's local library
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceType::Online => "online",
            SourceType::Download => "download",
            SourceType::MyMusic => "mymusic",
        };
        f.write_str(label)
    }
}

/// One playable track as seen by the playback engine and the UI.
///
/// Tracks are compared by `id` only when queues are deduplicated; the other
/// fields are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Stable identifier, unique within a queue.
    pub id: String,
    /// Playable locator (remote URL or local file reference).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub artwork: Option<String>,
    /// Duration in seconds, when known.
    #[serde(default)]
    pub duration: Option<f64>,
    /// Explicit provenance tag. Wins over every locality hint.
    #[serde(default)]
    pub source_type: Option<SourceType>,
    #[serde(default)]
    pub is_local: bool,
    #[serde(default)]
    pub is_local_music: bool,
    #[serde(default)]
    pub is_downloaded: bool,
    /// On-device file path for downloaded or library tracks.
    #[serde(default)]
    pub path: Option<String>,
}

impl Track {
    /// Creates a streamed track with only an id and a URL.
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Returns a copy tagged with an explicit provenance.
    pub fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = Some(source_type);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Marks the track as a downloaded file stored at `path`.
    pub fn downloaded_at(mut self, path: impl Into<String>) -> Self {
        self.is_local = true;
        self.is_downloaded = true;
        self.path = Some(path.into());
        self
    }

    /// True when the URL is present and non-blank.
    pub fn has_url(&self) -> bool {
        self.url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }
}
