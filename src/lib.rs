//! mpm2midi renders a score with a performance description into expressive MIDI.
//!
//! The musical work is done by the [meico](https://github.com/cemfi/meico) Java library. This
//! crate orchestrates it:
//!
//! 1. **Resolve** input paths to canonical files ([`resolve()`]).
//! 2. **Inspect** them natively for well-formedness ([`document::inspect`]).
//! 3. **Convert** through a [`ConversionService`] in a fixed step order ([`convert`]).
//! 4. **Serve** the same pipeline over HTTP ([`server::router`]).
//!
//! [`BridgeRuntime`] is the production `ConversionService`: it owns a JVM child process
//! hosting meico and speaks a line protocol with it.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// JVM bridge to meico.
pub mod bridge;
/// Native inspection of MEI/MSM/MPM documents.
pub mod document;
/// MIDI result and SMF summary.
pub mod midi;
/// The conversion pipeline.
pub mod pipeline;
/// File resolution.
pub mod resolve;
/// HTTP adapter.
pub mod server;
/// The conversion capability trait and its handle types.
pub mod service;

pub use crate::bridge::runtime::BridgeRuntime;
pub use crate::foundation::config::{
    BridgeConfig, DEFAULT_ADDR, DEFAULT_JVM_ARGS, MEICO_JAR, ServerConfig, default_artifact_path,
};
pub use crate::foundation::error::{ConvertError, ConvertResult};
pub use crate::midi::{MidiResult, MidiSummary};
pub use crate::pipeline::{ConversionInputs, DEFAULT_OUTPUT, OutputTarget, convert};
pub use crate::resolve::{InputRole, ResolvedFile, resolve, resolve_optional};
pub use crate::service::{
    ConversionService, DEFAULT_PPQ, ExpandedScore, MidiHandle, MsmExportOpts, ObjectId,
    PerformanceHandle, RenderOpts, ScoreHandle, ScoreSource,
};
