use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Curriculum language stage a project belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Track {
    Golang,
    Javascript,
    Rust,
    Java,
}

impl Track {
    pub const ALL: [Track; 4] = [Track::Golang, Track::Javascript, Track::Rust, Track::Java];

    pub fn as_str(&self) -> &'static str {
        match self {
            Track::Golang => "Golang",
            Track::Javascript => "Javascript",
            Track::Rust => "Rust",
            Track::Java => "Java",
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Track {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Track::ALL
            .into_iter()
            .find(|track| track.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown track '{value}'"))
    }
}

const GOLANG_PROJECTS: &[&str] = &[
    "go-reloaded",
    "ascii-art",
    "ascii-art-web",
    "groupie-tracker",
    "lem-in",
    "forum",
];

const JAVASCRIPT_PROJECTS: &[&str] = &[
    "make-your-game",
    "real-time-forum",
    "graphql",
    "social-network",
];

const RUST_PROJECTS: &[&str] = &[
    "smart-road",
    "filler",
    "rt",
    "multiplayer-fps",
];

const JAVA_PROJECTS: &[&str] = &["lets-play", "angul-it", "buy-01", "safe-zone"];

pub fn projects_for(track: Track) -> &'static [&'static str] {
    match track {
        Track::Golang => GOLANG_PROJECTS,
        Track::Javascript => JAVASCRIPT_PROJECTS,
        Track::Rust => RUST_PROJECTS,
        Track::Java => JAVA_PROJECTS,
    }
}

pub fn track_of(project: &str) -> Option<Track> {
    Track::ALL
        .into_iter()
        .find(|track| projects_for(*track).contains(&project))
}
