//! The fixed conversion sequence: score, performance, rest removal, sequencing expansion,
//! expressive rendering, MIDI write.
//!
//! Every run recomputes everything from its inputs. Nothing is cached between runs and no
//! step is retried.

use std::path::{Path, PathBuf};

use crate::document::{self, DocumentSummary};
use crate::foundation::error::{ConvertError, ConvertResult};
use crate::midi::MidiResult;
use crate::resolve::ResolvedFile;
use crate::service::{
    ConversionService, MidiHandle, MsmExportOpts, ObjectId, RenderOpts, ScoreHandle, ScoreSource,
};

/// File name written by the CLI when no `--out` is given.
pub const DEFAULT_OUTPUT: &str = "result.mid";

/// Resolved inputs of one conversion.
#[derive(Clone, Debug)]
pub struct ConversionInputs {
    /// Notation score; ignored when `msm` is present.
    pub mei: Option<ResolvedFile>,
    /// Sequence representation.
    pub msm: Option<ResolvedFile>,
    /// Performance description.
    pub mpm: ResolvedFile,
}

/// Where the rendered MIDI goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputTarget {
    /// Persist at this path and keep it.
    File(PathBuf),
    /// Write to a fresh uniquely named file in this directory, read it back, delete it.
    Scratch(PathBuf),
}

impl Default for OutputTarget {
    fn default() -> Self {
        OutputTarget::File(PathBuf::from(DEFAULT_OUTPUT))
    }
}

/// Run the pipeline against `service`.
///
/// Service-side objects created along the way are released before returning, whether the
/// conversion succeeded or not.
#[tracing::instrument(
    skip_all,
    fields(
        mei = ?inputs.mei.as_ref().map(|f| f.path().display().to_string()),
        msm = ?inputs.msm.as_ref().map(|f| f.path().display().to_string()),
        mpm = %inputs.mpm.path().display(),
    )
)]
pub fn convert<S: ConversionService + ?Sized>(
    service: &mut S,
    inputs: &ConversionInputs,
    target: &OutputTarget,
) -> ConvertResult<MidiResult> {
    let mut created = Vec::new();
    let result = run(service, inputs, target, &mut created);

    if let Err(e) = service.release(&created) {
        tracing::warn!(error = %e, "failed to release conversion objects");
    }

    match &result {
        Ok(midi) => {
            let s = midi.summary();
            tracing::info!(
                bytes = midi.bytes().len(),
                tracks = s.tracks,
                notes = s.note_ons,
                "conversion finished"
            );
        }
        Err(e) => tracing::debug!(error = %e, "conversion failed"),
    }
    result
}

fn run<S: ConversionService + ?Sized>(
    service: &mut S,
    inputs: &ConversionInputs,
    target: &OutputTarget,
    created: &mut Vec<ObjectId>,
) -> ConvertResult<MidiResult> {
    let mut score = load_score(service, inputs)?;
    created.push(score.id());
    if score.is_empty() {
        return Err(ConvertError::empty_export("No MSM data created."));
    }

    let DocumentSummary::Mpm { performances } = document::inspect(&inputs.mpm)? else {
        return Err(ConvertError::invalid_input("MPM file is not valid"));
    };
    let Some(applied) = performances.first() else {
        return Err(ConvertError::invalid_input(
            "MPM file is not valid: it contains no performance",
        ));
    };
    tracing::debug!(
        performances = performances.len(),
        applied = %applied,
        "MPM inspected"
    );
    let performance = service.parse_performance(&inputs.mpm)?;
    created.push(performance.id());
    if performance.performance_count() == 0 {
        return Err(ConvertError::invalid_input(
            "MPM file is not valid: it contains no performance",
        ));
    }

    service.strip_rests(&mut score)?;
    let expanded = service.expand_sequencing(score)?;
    let midi = service.render(&expanded, &performance, RenderOpts::default())?;
    created.push(midi.id());

    write_output(service, &midi, target)
}

fn load_score<S: ConversionService + ?Sized>(
    service: &mut S,
    inputs: &ConversionInputs,
) -> ConvertResult<ScoreHandle> {
    if let Some(msm) = &inputs.msm {
        if inputs.mei.is_some() {
            tracing::debug!("both MEI and MSM given; using MSM");
        }
        if let DocumentSummary::Msm { parts, notes, rests } = document::inspect(msm)? {
            tracing::debug!(parts, notes, rests, "MSM inspected");
        }
        return service.parse_score(ScoreSource::Msm(msm));
    }

    if let Some(mei) = &inputs.mei {
        tracing::debug!("deriving MSM from MEI");
        if let DocumentSummary::Mei { movements } = document::inspect(mei)? {
            tracing::debug!(movements, "MEI inspected");
        }
        return service.parse_score(ScoreSource::Mei {
            file: mei,
            export: MsmExportOpts::default(),
        });
    }

    Err(ConvertError::missing_input(
        "either an MEI or an MSM file must be present",
    ))
}

fn write_output<S: ConversionService + ?Sized>(
    service: &mut S,
    midi: &MidiHandle,
    target: &OutputTarget,
) -> ConvertResult<MidiResult> {
    match target {
        OutputTarget::File(path) => {
            let path = std::path::absolute(path).map_err(|e| {
                ConvertError::write(format!("invalid output path '{}': {e}", path.display()))
            })?;
            ensure_parent_dir(&path)?;
            // A stale file must not be mistaken for this run's output.
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ConvertError::write(format!(
                        "cannot replace '{}': {e}",
                        path.display()
                    )));
                }
            }

            tracing::debug!(path = %path.display(), "writing MIDI");
            service.encode_midi(midi, &path)?;
            let bytes = read_back(&path)?;
            MidiResult::new(bytes, Some(path))
        }
        OutputTarget::Scratch(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                ConvertError::write(format!(
                    "cannot create scratch directory '{}': {e}",
                    dir.display()
                ))
            })?;
            let scratch = tempfile::Builder::new()
                .prefix("mpm2midi-")
                .suffix(".mid")
                .tempfile_in(dir)
                .map_err(|e| ConvertError::write(format!("cannot create scratch file: {e}")))?
                .into_temp_path();

            tracing::debug!(path = %scratch.display(), "writing MIDI");
            service.encode_midi(midi, &scratch)?;
            let bytes = read_back(&scratch)?;
            MidiResult::new(bytes, None)
        }
    }
}

fn read_back(path: &Path) -> ConvertResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        ConvertError::write(format!(
            "MIDI was not written to '{}': {e}",
            path.display()
        ))
    })
}

fn ensure_parent_dir(path: &Path) -> ConvertResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConvertError::write(format!(
                "failed to create output directory '{}': {e}",
                parent.display()
            ))
        })?;
    }
    Ok(())
}
