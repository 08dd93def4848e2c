//! Pending-track queue
//!
//! Holds only tracks that have not started yet; the current track lives on
//! the session. Invariant: user-requested tracks (`requester != 0`) inserted
//! at the default index land after every other user track and before the
//! autoplay tail.

use lava_common::Track;
use rand::Rng;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct Queue {
    tracks: VecDeque<Track>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn back(&self) -> Option<&Track> {
        self.tracks.back()
    }

    /// Number of user-requested tracks
    pub fn user_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| !t.is_autoplay()).count()
    }

    /// Index a user track goes to when the caller gives none
    pub fn default_insert_index(&self) -> usize {
        self.user_track_count()
    }

    /// Insert at `index`, clamped to the queue length; returns the final index
    pub fn insert(&mut self, index: usize, track: Track) -> usize {
        let index = index.min(self.tracks.len());
        self.tracks.insert(index, track);
        index
    }

    pub fn push_back(&mut self, track: Track) {
        self.tracks.push_back(track);
    }

    pub fn push_front(&mut self, track: Track) {
        self.tracks.push_front(track);
    }

    pub fn pop_back(&mut self) -> Option<Track> {
        self.tracks.pop_back()
    }

    pub fn remove(&mut self, index: usize) -> Option<Track> {
        self.tracks.remove(index)
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    /// Take the next track to play: uniformly random with `shuffle`, else the head
    pub fn take_next(&mut self, shuffle: bool) -> Option<Track> {
        if self.tracks.is_empty() {
            return None;
        }

        let index = if shuffle {
            rand::thread_rng().gen_range(0..self.tracks.len())
        } else {
            0
        };
        self.tracks.remove(index)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.tracks.iter().any(|t| t.identifier == identifier)
    }

    pub fn identifiers(&self) -> HashSet<String> {
        self.tracks.iter().map(|t| t.identifier.clone()).collect()
    }

    /// Drop every autoplay entry; returns how many were removed
    pub fn remove_autoplay(&mut self) -> usize {
        let before = self.tracks.len();
        self.tracks.retain(|t| !t.is_autoplay());
        before - self.tracks.len()
    }

    /// Drop the first `count` entries
    pub fn drop_front(&mut self, count: usize) {
        let count = count.min(self.tracks.len());
        self.tracks.drain(..count);
    }

    /// Move the entry at `index` to the head
    pub fn move_to_front(&mut self, index: usize) -> bool {
        match self.tracks.remove(index) {
            Some(track) => {
                self.tracks.push_front(track);
                true
            }
            None => false,
        }
    }
}
