use std::path::{Path, PathBuf};

use midly::{Format, MidiMessage, Smf, Timing, TrackEventKind};

use crate::foundation::error::{ConvertError, ConvertResult};

/// Shape of a Standard MIDI File, as read back after rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiSummary {
    /// SMF format (0, 1 or 2).
    pub format: u16,
    /// Ticks per quarter note, `None` for timecode-based files.
    pub ticks_per_quarter: Option<u16>,
    /// Number of tracks.
    pub tracks: usize,
    /// Note-on events with non-zero velocity.
    pub note_ons: usize,
    /// Note-off events, including note-on with velocity 0.
    pub note_offs: usize,
}

/// Parse `bytes` as an SMF and count its notes.
pub fn summarize(bytes: &[u8]) -> ConvertResult<MidiSummary> {
    let smf = Smf::parse(bytes)
        .map_err(|e| ConvertError::write(format!("rendered MIDI is not a valid SMF: {e}")))?;

    let format = match smf.header.format {
        Format::SingleTrack => 0,
        Format::Parallel => 1,
        Format::Sequential => 2,
    };
    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(tpq) => Some(tpq.as_int()),
        Timing::Timecode(..) => None,
    };

    let mut note_ons = 0;
    let mut note_offs = 0;
    for event in smf.tracks.iter().flatten() {
        if let TrackEventKind::Midi { message, .. } = event.kind {
            match message {
                MidiMessage::NoteOn { vel, .. } if vel.as_int() > 0 => note_ons += 1,
                MidiMessage::NoteOn { .. } | MidiMessage::NoteOff { .. } => note_offs += 1,
                _ => {}
            }
        }
    }

    Ok(MidiSummary {
        format,
        ticks_per_quarter,
        tracks: smf.tracks.len(),
        note_ons,
        note_offs,
    })
}

/// The outcome of one conversion.
#[derive(Clone, Debug)]
pub struct MidiResult {
    bytes: Vec<u8>,
    path: Option<PathBuf>,
    summary: MidiSummary,
}

impl MidiResult {
    /// Wrap bytes read back from `path` (`None` when the file was a scratch file).
    pub fn new(bytes: Vec<u8>, path: Option<PathBuf>) -> ConvertResult<Self> {
        if bytes.is_empty() {
            return Err(ConvertError::write("rendered MIDI file is empty"));
        }
        let summary = summarize(&bytes)?;
        Ok(Self {
            bytes,
            path,
            summary,
        })
    }

    /// Encoded SMF bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Take the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Where the MIDI was persisted, if it was kept.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// SMF summary.
    pub fn summary(&self) -> MidiSummary {
        self.summary
    }
}
