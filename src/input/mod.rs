//! Input side: the events the engine consumes and a simulated singer.
//!
//! No pitch detection happens here. The singer thread stands in for a
//! detector by reading the note the engine expects and sending it back over
//! the bus, with some misses and dropouts mixed in.

pub mod events;

use crate::input::events::InputEvent;
use crate::models::note::{MusicalNote, NoteName};
use crate::system::bus::EngineBus;
use crossbeam_channel::{Receiver, select};
use rand::Rng;
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::time::Instant;

/// How the simulated singer behaves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SingerProfile {
    /// Time between two detector events.
    pub period: Duration,
    /// Chance of singing the expected note.
    pub accuracy: f64,
    /// Chance of losing the note instead of singing.
    pub dropout: f64,
}

impl Default for SingerProfile {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(600),
            accuracy: 0.8,
            dropout: 0.05,
        }
    }
}

/// Spawns the singer thread.
///
/// `expected` is polled before every event. The thread stops when `stop_rx`
/// receives or disconnects, or when nobody reads the input channel anymore.
pub fn start_singer<F>(
    bus: EngineBus,
    profile: SingerProfile,
    stop_rx: Receiver<()>,
    expected: F,
) -> io::Result<JoinHandle<()>>
where
    F: Fn() -> Option<MusicalNote> + Send + 'static,
{
    thread::Builder::new()
        .name("Singer Thread".to_string())
        .spawn(move || {
            log::info!("INPUT: Singer started");
            let mut rng = rand::rng();

            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    default(profile.period) => {
                        let event = sing(&mut rng, &profile, expected());
                        if let Err(e) = bus.input_tx.send(event) {
                            log::error!("INPUT: Failed to send input (engine gone?): {}", e);
                            break;
                        }
                    }
                }
            }

            log::info!("INPUT: Singer stopped");
        })
}

fn sing<R: Rng>(rng: &mut R, profile: &SingerProfile, expected: Option<MusicalNote>) -> InputEvent {
    if rng.random_bool(profile.dropout.clamp(0.0, 1.0)) {
        return InputEvent::Lost;
    }

    let at = Instant::now();
    let Some(expected) = expected else {
        // Nothing on screen, or a placeholder block: any pitch will do.
        return InputEvent::Matched { at };
    };

    let note = if rng.random_bool(profile.accuracy.clamp(0.0, 1.0)) {
        expected
    } else {
        let name = NoteName::ALL[rng.random_range(0..NoteName::ALL.len())];
        MusicalNote::natural(name, expected.octave)
    };
    InputEvent::Sung { note, at }
}
