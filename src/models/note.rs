//! Musical note values and the note catalog parser.
//!
//! Level files name notes with solfège tokens such as `do4`, `fa#3` or `si♭5`.
//! Two notes compare equal when they sound the same, so `do#4 == re♭4`.

use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// The seven solfège note names, in ascending order inside an octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteName {
    Do,
    Re,
    Mi,
    Fa,
    Sol,
    La,
    Si,
}

impl NoteName {
    pub const ALL: [NoteName; 7] = [
        NoteName::Do,
        NoteName::Re,
        NoteName::Mi,
        NoteName::Fa,
        NoteName::Sol,
        NoteName::La,
        NoteName::Si,
    ];

    /// Looks up a lowercase name.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "do" => Some(NoteName::Do),
            "re" => Some(NoteName::Re),
            "mi" => Some(NoteName::Mi),
            "fa" => Some(NoteName::Fa),
            "sol" => Some(NoteName::Sol),
            "la" => Some(NoteName::La),
            "si" => Some(NoteName::Si),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NoteName::Do => "do",
            NoteName::Re => "re",
            NoteName::Mi => "mi",
            NoteName::Fa => "fa",
            NoteName::Sol => "sol",
            NoteName::La => "la",
            NoteName::Si => "si",
        }
    }

    /// Position of the name inside the diatonic scale (do = 0).
    pub fn diatonic_index(&self) -> i32 {
        match self {
            NoteName::Do => 0,
            NoteName::Re => 1,
            NoteName::Mi => 2,
            NoteName::Fa => 3,
            NoteName::Sol => 4,
            NoteName::La => 5,
            NoteName::Si => 6,
        }
    }

    /// Semitones above do for the natural note.
    fn semitone(&self) -> i32 {
        match self {
            NoteName::Do => 0,
            NoteName::Re => 2,
            NoteName::Mi => 4,
            NoteName::Fa => 5,
            NoteName::Sol => 7,
            NoteName::La => 9,
            NoteName::Si => 11,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alteration {
    Sharp,
    Flat,
    Natural,
}

impl Alteration {
    fn semitone_shift(&self) -> i32 {
        match self {
            Alteration::Sharp => 1,
            Alteration::Flat => -1,
            Alteration::Natural => 0,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Alteration::Sharp => "#",
            Alteration::Flat => "♭",
            Alteration::Natural => "",
        }
    }
}

/// A note as spelled in a level file.
///
/// Equality and hashing go through [`MusicalNote::pitch`], so enharmonic
/// spellings are interchangeable as map keys.
#[derive(Debug, Clone, Copy)]
pub struct MusicalNote {
    pub name: NoteName,
    pub alteration: Alteration,
    pub octave: u8,
}

impl MusicalNote {
    pub fn new(name: NoteName, alteration: Alteration, octave: u8) -> Self {
        Self {
            name,
            alteration,
            octave,
        }
    }

    pub fn natural(name: NoteName, octave: u8) -> Self {
        Self::new(name, Alteration::Natural, octave)
    }

    /// Absolute pitch in semitones, MIDI numbering (do4 = 60).
    pub fn pitch(&self) -> i32 {
        (self.octave as i32 + 1) * 12 + self.name.semitone() + self.alteration.semitone_shift()
    }

    /// Diatonic steps above mi4, the bottom line of the treble staff.
    ///
    /// Only the name and octave matter; accidentals sit on the same line.
    pub fn staff_offset(&self) -> i32 {
        (self.octave as i32 - 4) * 7 + self.name.diatonic_index() - NoteName::Mi.diatonic_index()
    }
}

impl PartialEq for MusicalNote {
    fn eq(&self, other: &Self) -> bool {
        self.pitch() == other.pitch()
    }
}

impl Eq for MusicalNote {}

impl Hash for MusicalNote {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pitch().hash(state);
    }
}

impl fmt::Display for MusicalNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.name.as_str(),
            self.alteration.symbol(),
            self.octave
        )
    }
}

impl std::str::FromStr for MusicalNote {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed note token {0:?}")]
    Malformed(String),
    #[error("unknown note name in {0:?}")]
    UnknownName(String),
}

/// Parses a note token: name, optional accidental, one octave digit (1-9).
pub fn parse(text: &str) -> Result<MusicalNote, ParseError> {
    let token = text.trim().to_lowercase();
    let malformed = || ParseError::Malformed(text.to_string());

    let mut chars: Vec<char> = token.chars().collect();

    let octave = chars
        .pop()
        .and_then(|c| c.to_digit(10))
        .filter(|d| *d > 0)
        .ok_or_else(malformed)? as u8;

    let marker = match chars.last() {
        Some('#' | '♯') => Some(Alteration::Sharp),
        Some('b' | '♭') => Some(Alteration::Flat),
        Some('♮') => Some(Alteration::Natural),
        _ => None,
    };
    if marker.is_some() {
        chars.pop();
    }
    let alteration = marker.unwrap_or(Alteration::Natural);

    if chars.is_empty() || !chars.iter().all(|c| c.is_ascii_alphabetic()) {
        return Err(malformed());
    }

    let name: String = chars.into_iter().collect();
    let name = NoteName::from_token(&name).ok_or_else(|| ParseError::UnknownName(text.to_string()))?;

    Ok(MusicalNote::new(name, alteration, octave))
}
