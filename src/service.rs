use std::path::Path;

use crate::foundation::error::ConvertResult;
use crate::resolve::ResolvedFile;

/// Ticks per quarter note used when exporting MEI to MSM.
pub const DEFAULT_PPQ: u32 = 720;

/// Id of an object living inside a conversion service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

/// A loaded sequence representation (MSM), still carrying its sequencing maps.
#[derive(Debug, PartialEq, Eq)]
pub struct ScoreHandle {
    id: ObjectId,
    empty: bool,
}

impl ScoreHandle {
    /// Wrap a service-side score object.
    pub fn new(id: ObjectId, empty: bool) -> Self {
        Self { id, empty }
    }

    /// Service-side id.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// `true` when the score holds no sequence data.
    pub fn is_empty(&self) -> bool {
        self.empty
    }
}

/// A score whose repeats and jumps have been expanded into a linear sequence.
///
/// Only [`ConversionService::expand_sequencing`] produces one, by consuming the
/// [`ScoreHandle`]; the unexpanded score can't be used afterwards.
#[derive(Debug, PartialEq, Eq)]
pub struct ExpandedScore {
    id: ObjectId,
}

impl ExpandedScore {
    /// Wrap a service-side expanded score object.
    pub fn new(id: ObjectId) -> Self {
        Self { id }
    }

    /// Service-side id.
    pub fn id(&self) -> ObjectId {
        self.id
    }
}

/// A loaded performance description (MPM).
#[derive(Debug, PartialEq, Eq)]
pub struct PerformanceHandle {
    id: ObjectId,
    performances: usize,
}

impl PerformanceHandle {
    /// Wrap a service-side MPM object holding `performances` performances.
    pub fn new(id: ObjectId, performances: usize) -> Self {
        Self { id, performances }
    }

    /// Service-side id.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Number of performances in the description.
    pub fn performance_count(&self) -> usize {
        self.performances
    }
}

/// A rendered MIDI sequence that has not been written anywhere yet.
#[derive(Debug, PartialEq, Eq)]
pub struct MidiHandle {
    id: ObjectId,
}

impl MidiHandle {
    /// Wrap a service-side MIDI object.
    pub fn new(id: ObjectId) -> Self {
        Self { id }
    }

    /// Service-side id.
    pub fn id(&self) -> ObjectId {
        self.id
    }
}

/// Options for the MEI to MSM export.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MsmExportOpts {
    /// Time resolution in ticks per quarter note.
    pub ppq: u32,
    /// Keep MIDI channel 10 (percussion) out of channel assignment.
    pub dont_use_channel_10: bool,
    /// Ignore `<expansion>` elements in the MEI.
    pub ignore_expansions: bool,
    /// Drop the intermediate MEI data that meico attaches to the export.
    pub cleanup: bool,
}

impl Default for MsmExportOpts {
    fn default() -> Self {
        Self {
            ppq: DEFAULT_PPQ,
            dont_use_channel_10: false,
            ignore_expansions: false,
            cleanup: true,
        }
    }
}

/// Where the score comes from.
#[derive(Clone, Copy, Debug)]
pub enum ScoreSource<'a> {
    /// Load an MSM document directly.
    Msm(&'a ResolvedFile),
    /// Export the first movement of an MEI document to MSM.
    Mei {
        /// The MEI file.
        file: &'a ResolvedFile,
        /// Export options.
        export: MsmExportOpts,
    },
}

/// Options for expressive rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderOpts {
    /// Which performance of the MPM to apply.
    pub performance_index: usize,
    /// Write the rendered tempo map into the MIDI.
    pub export_tempo_map: bool,
}

impl Default for RenderOpts {
    fn default() -> Self {
        Self {
            performance_index: 0,
            export_tempo_map: true,
        }
    }
}

/// The capability the conversion pipeline drives.
///
/// Implementations own all musical semantics. Errors must use the
/// [`ConvertError`](crate::ConvertError) taxonomy: unparsable documents are `InvalidInput`,
/// empty documents or exports are `EmptyResult`, failed writes are `Write`.
pub trait ConversionService {
    /// Load or derive the score.
    fn parse_score(&mut self, source: ScoreSource<'_>) -> ConvertResult<ScoreHandle>;

    /// Load the performance description.
    fn parse_performance(&mut self, mpm: &ResolvedFile) -> ConvertResult<PerformanceHandle>;

    /// Remove all rests from the score, in place.
    fn strip_rests(&mut self, score: &mut ScoreHandle) -> ConvertResult<()>;

    /// Expand repeats, jumps and da capo structures; the sequencing maps are discarded.
    fn expand_sequencing(&mut self, score: ScoreHandle) -> ConvertResult<ExpandedScore>;

    /// Apply a performance to the expanded score.
    fn render(
        &mut self,
        score: &ExpandedScore,
        performance: &PerformanceHandle,
        opts: RenderOpts,
    ) -> ConvertResult<MidiHandle>;

    /// Write the rendered MIDI to `out`.
    fn encode_midi(&mut self, midi: &MidiHandle, out: &Path) -> ConvertResult<()>;

    /// Drop service-side objects created for one request.
    fn release(&mut self, ids: &[ObjectId]) -> ConvertResult<()> {
        let _ = ids;
        Ok(())
    }
}
