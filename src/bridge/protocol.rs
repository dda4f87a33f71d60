//! Line protocol spoken with the bridge host over its stdin/stdout.
//!
//! One request per line, fields separated by `\t`. The host answers each request with exactly
//! one line: `ok[\t<field>...]` or `err\t<kind>\t<message>`. On startup it prints
//! `ready\t<meico version>` once.

use std::path::Path;

use crate::foundation::error::{ConvertError, ConvertResult};
use crate::service::{MsmExportOpts, ObjectId, RenderOpts};

/// A request to the bridge host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request<'a> {
    /// `new Msm(file)`.
    LoadMsm {
        /// MSM file.
        path: &'a Path,
    },
    /// `new Mei(file).exportMsm(...).get(0)`.
    ExportMei {
        /// MEI file.
        path: &'a Path,
        /// Export options.
        opts: MsmExportOpts,
    },
    /// `new Mpm(file)`.
    LoadMpm {
        /// MPM file.
        path: &'a Path,
    },
    /// `msm.removeRests()`.
    RemoveRests {
        /// Score object.
        id: ObjectId,
    },
    /// `msm.resolveSequencingMaps()`.
    ResolveSequencing {
        /// Score object.
        id: ObjectId,
    },
    /// `msm.exportExpressiveMidi(mpm.getPerformance(i), tempoMap)`.
    Render {
        /// Expanded score object.
        score: ObjectId,
        /// MPM object.
        performance: ObjectId,
        /// Render options.
        opts: RenderOpts,
    },
    /// `midi.writeMidi(file)`.
    WriteMidi {
        /// MIDI object.
        id: ObjectId,
        /// Output file.
        path: &'a Path,
    },
    /// Forget an object.
    Release {
        /// Object to drop.
        id: ObjectId,
    },
    /// Shut the host down.
    Quit,
}

impl Request<'_> {
    /// Encode as a single line without the trailing newline.
    pub fn encode(&self) -> ConvertResult<String> {
        let line = match self {
            Request::LoadMsm { path } => format!("msm\t{}", path_field(path)?),
            Request::ExportMei { path, opts } => format!(
                "mei\t{}\t{}\t{}\t{}\t{}",
                path_field(path)?,
                opts.ppq,
                opts.dont_use_channel_10,
                opts.ignore_expansions,
                opts.cleanup
            ),
            Request::LoadMpm { path } => format!("mpm\t{}", path_field(path)?),
            Request::RemoveRests { id } => format!("strip\t{}", id.0),
            Request::ResolveSequencing { id } => format!("expand\t{}", id.0),
            Request::Render {
                score,
                performance,
                opts,
            } => format!(
                "render\t{}\t{}\t{}\t{}",
                score.0, performance.0, opts.performance_index, opts.export_tempo_map
            ),
            Request::WriteMidi { id, path } => format!("write\t{}\t{}", id.0, path_field(path)?),
            Request::Release { id } => format!("release\t{}", id.0),
            Request::Quit => "quit".to_owned(),
        };
        Ok(line)
    }
}

fn path_field(path: &Path) -> ConvertResult<&str> {
    let s = path.to_str().ok_or_else(|| {
        ConvertError::invalid_input(format!(
            "path '{}' is not valid UTF-8",
            path.display()
        ))
    })?;
    if s.contains(['\t', '\n', '\r']) {
        return Err(ConvertError::invalid_input(format!(
            "path '{}' contains control characters",
            path.display()
        )));
    }
    Ok(s)
}

/// Failure category reported by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Document could not be parsed.
    Invalid,
    /// Source document has no content.
    EmptySource,
    /// Export yielded no sequence data.
    EmptyExport,
    /// MIDI could not be written.
    Write,
    /// Anything else (unknown object id, unexpected exception).
    Failed,
}

impl ErrorKind {
    fn parse(s: &str) -> Self {
        match s {
            "invalid" => ErrorKind::Invalid,
            "empty-source" => ErrorKind::EmptySource,
            "empty-export" => ErrorKind::EmptyExport,
            "write" => ErrorKind::Write,
            _ => ErrorKind::Failed,
        }
    }
}

/// A line received from the bridge host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// Startup banner.
    Ready {
        /// meico version string.
        version: String,
    },
    /// Success with positional result fields.
    Ok(Vec<String>),
    /// Failure.
    Err {
        /// Category.
        kind: ErrorKind,
        /// Message from the library.
        message: String,
    },
}

impl Reply {
    /// Parse one line (trailing newline allowed).
    pub fn parse(line: &str) -> ConvertResult<Self> {
        let line = line.trim_end_matches(['\n', '\r']);
        let mut fields = line.split('\t');
        match fields.next() {
            Some("ready") => Ok(Reply::Ready {
                version: fields.next().unwrap_or_default().to_owned(),
            }),
            Some("ok") => Ok(Reply::Ok(fields.map(str::to_owned).collect())),
            Some("err") => {
                let kind = ErrorKind::parse(fields.next().unwrap_or_default());
                let message = fields.collect::<Vec<_>>().join(" ");
                Ok(Reply::Err { kind, message })
            }
            _ => Err(ConvertError::bridge(format!(
                "unexpected reply from bridge host: '{line}'"
            ))),
        }
    }

    /// Unwrap an `ok` reply, turning `err` into the matching [`ConvertError`].
    pub fn into_fields(self) -> ConvertResult<Vec<String>> {
        match self {
            Reply::Ok(fields) => Ok(fields),
            Reply::Err { kind, message } => Err(match kind {
                ErrorKind::Invalid => ConvertError::invalid_input(message),
                ErrorKind::EmptySource => ConvertError::empty_source(message),
                ErrorKind::EmptyExport => ConvertError::empty_export(message),
                ErrorKind::Write => ConvertError::write(message),
                ErrorKind::Failed => ConvertError::bridge(message),
            }),
            Reply::Ready { .. } => Err(ConvertError::bridge("bridge host sent a second banner")),
        }
    }
}

/// Read field `idx` as an object id.
pub fn object_field(fields: &[String], idx: usize) -> ConvertResult<ObjectId> {
    number_field(fields, idx).map(ObjectId)
}

/// Read field `idx` as an unsigned number.
pub fn number_field(fields: &[String], idx: usize) -> ConvertResult<u32> {
    let raw = fields
        .get(idx)
        .ok_or_else(|| ConvertError::bridge(format!("bridge reply is missing field {idx}")))?;
    raw.parse()
        .map_err(|_| ConvertError::bridge(format!("bridge reply field {idx} is not a number: '{raw}'")))
}

/// Read field `idx` as a boolean (`true`/`false`).
pub fn flag_field(fields: &[String], idx: usize) -> ConvertResult<bool> {
    match fields.get(idx).map(String::as_str) {
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        other => Err(ConvertError::bridge(format!(
            "bridge reply field {idx} is not a flag: {other:?}"
        ))),
    }
}
