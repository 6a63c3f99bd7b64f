//! MIDI file summaries.

use std::collections::HashMap;

use cadence_core::{CadenceError, Result};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use serde_json::{json, Value};

/// Note positions are rounded to this fraction of a beat.
const QUANT_STEP: f64 = 0.25;

const DEFAULT_BPM: f64 = 120.0;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

const MAJOR_KEYS: [&str; 15] = [
    "Cb", "Gb", "Db", "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#",
];

const MINOR_KEYS: [&str; 15] = [
    "Abm", "Ebm", "Bbm", "Fm", "Cm", "Gm", "Dm", "Am", "Em", "Bm", "F#m", "C#m", "G#m", "D#m",
    "A#m",
];

/// Scientific pitch name, `60` => `C4`.
pub fn pitch_name(key: u8) -> String {
    let octave = i32::from(key / 12) - 1;
    format!("{}{octave}", NOTE_NAMES[usize::from(key % 12)])
}

fn key_name(sharps: i8, minor: bool) -> &'static str {
    let table = if minor { &MINOR_KEYS } else { &MAJOR_KEYS };
    usize::try_from(i16::from(sharps) + 7)
        .ok()
        .and_then(|idx| table.get(idx).copied())
        .unwrap_or("unknown")
}

fn quantize(beats: f64) -> f64 {
    (beats / QUANT_STEP).round() * QUANT_STEP
}

/// Summarize a Standard MIDI File as `{"meta": {...}, "notes": [...]}`.
///
/// Meta events come from the first track; defaults are 4/4, 120 BPM and an
/// unknown key. Notes come from the first track that has any, each as
/// `{start_beats, end_beats, name, velocity}`.
pub fn summarize_midi(bytes: &[u8]) -> Result<Value> {
    let smf = Smf::parse(bytes)
        .map_err(|e| CadenceError::SerializationError(format!("invalid MIDI data: {e}")))?;

    let mut time_signature = None;
    let mut bpm = None;
    let mut key = None;
    for event in smf.tracks.first().into_iter().flatten() {
        if let TrackEventKind::Meta(meta) = event.kind {
            match meta {
                MetaMessage::TimeSignature(num, den_pow, _, _) if time_signature.is_none() => {
                    time_signature = Some(format!("{num}/{}", 1u32 << den_pow.min(31)));
                }
                MetaMessage::Tempo(tempo) if bpm.is_none() => {
                    let micros = tempo.as_int();
                    bpm = Some(if micros == 0 {
                        DEFAULT_BPM
                    } else {
                        60_000_000.0 / f64::from(micros)
                    });
                }
                MetaMessage::KeySignature(sharps, minor) if key.is_none() => {
                    key = Some(key_name(sharps, minor));
                }
                _ => {}
            }
        }
    }
    let bpm = bpm.unwrap_or(DEFAULT_BPM);

    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(tpq) => f64::from(tpq.as_int()),
        Timing::Timecode(fps, subframes) => {
            f64::from(fps.as_f32()) * f64::from(subframes) * 60.0 / bpm
        }
    };
    if ticks_per_beat <= 0.0 {
        return Err(CadenceError::SerializationError(
            "MIDI timing has no ticks per beat".to_string(),
        ));
    }

    let notes = smf
        .tracks
        .iter()
        .map(|track| track_notes(track, ticks_per_beat))
        .find(|notes| !notes.is_empty())
        .unwrap_or_default();

    Ok(json!({
        "meta": {
            "time_signature": time_signature.unwrap_or_else(|| "4/4".to_string()),
            "bpm": bpm,
            "key": key.unwrap_or("unknown"),
        },
        "notes": notes,
    }))
}

fn track_notes(track: &[TrackEvent<'_>], ticks_per_beat: f64) -> Vec<Value> {
    let mut now: u64 = 0;
    // (channel, key) => (start tick, velocity)
    let mut active: HashMap<(u8, u8), (u64, u8)> = HashMap::new();
    let mut notes = Vec::new();

    for event in track {
        now += u64::from(event.delta.as_int());
        let TrackEventKind::Midi { channel, message } = event.kind else {
            continue;
        };
        let channel = channel.as_int();
        match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                active.insert((channel, key.as_int()), (now, vel.as_int()));
            }
            MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                let Some((start, velocity)) = active.remove(&(channel, key.as_int())) else {
                    continue;
                };
                let start_beats = quantize(start as f64 / ticks_per_beat);
                let end_beats = quantize(now as f64 / ticks_per_beat);
                if end_beats > start_beats {
                    notes.push(json!({
                        "start_beats": start_beats,
                        "end_beats": end_beats,
                        "name": pitch_name(key.as_int()),
                        "velocity": velocity,
                    }));
                }
            }
            _ => {}
        }
    }
    notes
}
