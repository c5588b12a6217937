//! Ordered, id-unique track sequence.

use std::collections::HashSet;

use crate::track::Track;

/// Ordered list of tracks in which no two entries share an `id`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct Queue {
    tracks: Vec<Track>,
}

impl Queue {
    pub fn new() -> Self {
        Self { tracks: Vec::new() }
    }

    /// Builds a queue from arbitrary tracks. The first occurrence of an id wins.
    pub fn from_tracks<I>(tracks: I) -> Self
    where
        I: IntoIterator<Item = Track>,
    {
        let mut queue = Self::new();
        queue.extend(tracks);
        queue
    }

    /// Appends a track unless its id is already present. Returns whether it was added.
    pub fn push(&mut self, track: Track) -> bool {
        if self.contains(&track.id) {
            return false;
        }
        self.tracks.push(track);
        true
    }

    pub fn extend<I>(&mut self, tracks: I)
    where
        I: IntoIterator<Item = Track>,
    {
        let mut seen: HashSet<String> = self.tracks.iter().map(|t| t.id.clone()).collect();
        for track in tracks {
            if seen.insert(track.id.clone()) {
                self.tracks.push(track);
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.tracks.iter().position(|track| track.id == id)
    }

    /// Puts `anchor` at index 0, moving it when present and inserting it otherwise.
    pub fn ensure_front(&mut self, anchor: &Track) {
        match self.position(&anchor.id) {
            Some(0) => {}
            Some(index) => {
                let track = self.tracks.remove(index);
                self.tracks.insert(0, track);
            }
            None => self.tracks.insert(0, anchor.clone()),
        }
    }

    pub fn first(&self) -> Option<&Track> {
        self.tracks.first()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Track> {
        self.tracks.iter()
    }

    pub fn as_slice(&self) -> &[Track] {
        &self.tracks
    }

    pub fn ids(&self) -> Vec<String> {
        self.tracks.iter().map(|track| track.id.clone()).collect()
    }

    pub fn into_vec(self) -> Vec<Track> {
        self.tracks
    }
}

impl FromIterator<Track> for Queue {
    fn from_iter<I: IntoIterator<Item = Track>>(iter: I) -> Self {
        Self::from_tracks(iter)
    }
}

impl<'a> IntoIterator for &'a Queue {
    type Item = &'a Track;
    type IntoIter = std::slice::Iter<'a, Track>;

    fn into_iter(self) -> Self::IntoIter {
        self.tracks.iter()
    }
}
