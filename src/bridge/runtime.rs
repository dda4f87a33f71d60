use std::collections::VecDeque;
use std::io::{BufRead as _, BufReader, Write as _};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::bridge::protocol::{self, Reply, Request};
use crate::foundation::config::BridgeConfig;
use crate::foundation::error::{ConvertError, ConvertResult};
use crate::resolve::ResolvedFile;
use crate::service::{
    ConversionService, ExpandedScore, MidiHandle, ObjectId, PerformanceHandle, RenderOpts,
    ScoreHandle, ScoreSource,
};

const HOST_SOURCE: &str = include_str!("MeicoHost.java");
const HOST_FILE_NAME: &str = "MeicoHost.java";

/// How long `stop()` waits for the host to exit after `quit` before killing it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Lines of host stderr kept for startup diagnostics.
const STDERR_TAIL: usize = 20;

/// Lifecycle owner of the JVM child process that hosts meico.
///
/// `start()` and `stop()` are idempotent. Dropping the runtime stops it, so every exit path
/// (including `?` and panics unwinding through the owner) tears the child down.
pub struct BridgeRuntime {
    config: BridgeConfig,
    session: Option<Session>,
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr_drain: Option<JoinHandle<VecDeque<String>>>,
    version: String,
    // Holds the host source file for the lifetime of the child.
    _host_dir: tempfile::TempDir,
}

impl BridgeRuntime {
    /// Create a runtime that is not started yet.
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    /// Start the runtime if it is not already running.
    ///
    /// A host that has exited since the last call is reaped and replaced.
    pub fn start(&mut self) -> ConvertResult<()> {
        if let Some(session) = self.session.as_mut() {
            match session.child.try_wait() {
                Ok(None) => return Ok(()),
                Ok(Some(status)) => {
                    tracing::warn!(%status, "bridge host exited unexpectedly; restarting")
                }
                Err(e) => tracing::warn!(error = %e, "cannot poll bridge host; restarting"),
            }
            self.stop();
        }

        let session = Session::spawn(&self.config)?;
        tracing::info!(
            version = %session.version,
            artifact = %self.config.artifact.display(),
            "bridge host started"
        );
        self.session = Some(session);
        Ok(())
    }

    /// Stop the runtime. Does nothing when it is not running.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.shutdown();
            tracing::debug!("bridge host stopped");
        }
    }

    /// `true` while a host process is attached.
    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// meico version reported by the running host.
    pub fn version(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.version.as_str())
    }

    /// The configuration this runtime launches with.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn call(&mut self, request: Request<'_>) -> ConvertResult<Vec<String>> {
        let line = request.encode()?;
        self.start()?;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| ConvertError::bridge("bridge host is not running"))?;

        tracing::debug!(request = %line, "bridge request");
        match session.roundtrip(&line) {
            Ok(reply) => reply.into_fields(),
            Err(e) => {
                // The pipe is out of sync or gone; the next call starts a fresh host.
                self.stop();
                Err(e)
            }
        }
    }
}

impl Drop for BridgeRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Session {
    fn spawn(config: &BridgeConfig) -> ConvertResult<Self> {
        if !config.artifact.is_file() {
            return Err(ConvertError::missing_dependency(format!(
                "cannot find '{}'; place meico.jar next to the executable or set MPM2MIDI_MEICO_JAR",
                config.artifact.display()
            )));
        }

        let host_dir = tempfile::Builder::new()
            .prefix("mpm2midi-host-")
            .tempdir()
            .map_err(|e| ConvertError::bridge(format!("cannot create bridge host directory: {e}")))?;
        let host_src = host_dir.path().join(HOST_FILE_NAME);
        std::fs::write(&host_src, HOST_SOURCE)
            .map_err(|e| ConvertError::bridge(format!("cannot write bridge host source: {e}")))?;

        let mut cmd = Command::new(&config.java);
        cmd.args(&config.jvm_args)
            .arg("-cp")
            .arg(&config.artifact)
            .arg(&host_src)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            ConvertError::missing_dependency(format!(
                "failed to start Java runtime '{}' (set MPM2MIDI_JAVA or JAVA_HOME): {e}",
                config.java.display()
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ConvertError::bridge("failed to open bridge host stdin (unexpected)"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConvertError::bridge("failed to open bridge host stdout (unexpected)"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ConvertError::bridge("failed to open bridge host stderr (unexpected)"))?;

        let stderr_drain = std::thread::spawn(move || {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL);
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                tracing::debug!(target: "mpm2midi::bridge::host", "{line}");
                if tail.len() == STDERR_TAIL {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail
        });

        let mut session = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr_drain: Some(stderr_drain),
            version: String::new(),
            _host_dir: host_dir,
        };

        match session.read_reply() {
            Ok(Reply::Ready { version }) => {
                session.version = version;
                Ok(session)
            }
            Ok(other) => {
                session.shutdown();
                Err(ConvertError::bridge(format!(
                    "bridge host did not announce itself: {other:?}"
                )))
            }
            Err(_) => Err(session.startup_failure()),
        }
    }

    fn roundtrip(&mut self, line: &str) -> ConvertResult<Reply> {
        writeln!(self.stdin, "{line}")
            .and_then(|_| self.stdin.flush())
            .map_err(|e| ConvertError::bridge(format!("failed to write to bridge host: {e}")))?;
        self.read_reply()
    }

    fn read_reply(&mut self) -> ConvertResult<Reply> {
        let mut buf = String::new();
        let n = self
            .stdout
            .read_line(&mut buf)
            .map_err(|e| ConvertError::bridge(format!("failed to read from bridge host: {e}")))?;
        if n == 0 {
            return Err(ConvertError::bridge("bridge host closed its output"));
        }
        Reply::parse(&buf)
    }

    /// Reap a host that died before its banner and explain why.
    fn startup_failure(mut self) -> ConvertError {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
        }
        let status = self.child.wait();
        let tail = self
            .stderr_drain
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        let detail = tail.into_iter().collect::<Vec<_>>().join(" | ");
        let status = match status {
            Ok(s) => s.to_string(),
            Err(e) => e.to_string(),
        };
        ConvertError::missing_dependency(format!(
            "bridge host exited before becoming ready ({status}): {detail}"
        ))
    }

    fn shutdown(self) {
        let Session {
            mut child,
            mut stdin,
            stdout,
            stderr_drain,
            ..
        } = self;

        let _ = writeln!(stdin, "quit").and_then(|_| stdin.flush());
        drop(stdin);
        drop(stdout);

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(%status, "bridge host exited");
                    break;
                }
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(20))
                }
                Ok(None) | Err(_) => {
                    tracing::warn!("bridge host did not exit after quit; killing it");
                    let _ = child.kill();
                    let _ = child.wait();
                    break;
                }
            }
        }

        if let Some(handle) = stderr_drain {
            let _ = handle.join();
        }
    }
}

impl ConversionService for BridgeRuntime {
    fn parse_score(&mut self, source: ScoreSource<'_>) -> ConvertResult<ScoreHandle> {
        let fields = match source {
            ScoreSource::Msm(file) => self.call(Request::LoadMsm { path: file.path() })?,
            ScoreSource::Mei { file, export } => self.call(Request::ExportMei {
                path: file.path(),
                opts: export,
            })?,
        };
        Ok(ScoreHandle::new(
            protocol::object_field(&fields, 0)?,
            protocol::flag_field(&fields, 1)?,
        ))
    }

    fn parse_performance(&mut self, mpm: &ResolvedFile) -> ConvertResult<PerformanceHandle> {
        let fields = self.call(Request::LoadMpm { path: mpm.path() })?;
        Ok(PerformanceHandle::new(
            protocol::object_field(&fields, 0)?,
            protocol::number_field(&fields, 1)? as usize,
        ))
    }

    fn strip_rests(&mut self, score: &mut ScoreHandle) -> ConvertResult<()> {
        self.call(Request::RemoveRests { id: score.id() })?;
        Ok(())
    }

    fn expand_sequencing(&mut self, score: ScoreHandle) -> ConvertResult<ExpandedScore> {
        self.call(Request::ResolveSequencing { id: score.id() })?;
        Ok(ExpandedScore::new(score.id()))
    }

    fn render(
        &mut self,
        score: &ExpandedScore,
        performance: &PerformanceHandle,
        opts: RenderOpts,
    ) -> ConvertResult<MidiHandle> {
        let fields = self.call(Request::Render {
            score: score.id(),
            performance: performance.id(),
            opts,
        })?;
        Ok(MidiHandle::new(protocol::object_field(&fields, 0)?))
    }

    fn encode_midi(&mut self, midi: &MidiHandle, out: &Path) -> ConvertResult<()> {
        self.call(Request::WriteMidi {
            id: midi.id(),
            path: out,
        })?;
        Ok(())
    }

    fn release(&mut self, ids: &[ObjectId]) -> ConvertResult<()> {
        // Objects die with the host; a restarted host has none of ours.
        if !self.is_running() {
            return Ok(());
        }
        for &id in ids {
            self.call(Request::Release { id })?;
        }
        Ok(())
    }
}
