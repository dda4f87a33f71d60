use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// File name of the meico artifact looked up next to the executable.
pub const MEICO_JAR: &str = "meico.jar";

/// JVM arguments used when `MPM2MIDI_JVM_ARGS` is unset.
pub const DEFAULT_JVM_ARGS: &[&str] = &["-ea"];

/// Default bind address for the HTTP adapter.
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// How to launch the bridge process.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Java launcher (`java` binary, Java 11+ for single-file source launch).
    pub java: PathBuf,
    /// Path to `meico.jar`.
    pub artifact: PathBuf,
    /// Extra JVM arguments placed before `-cp`.
    pub jvm_args: Vec<String>,
}

impl BridgeConfig {
    /// Build a config from explicit overrides, falling back to the environment.
    ///
    /// `java` falls back to `$JAVA_HOME/bin/java`, then to `java` on `PATH`. `artifact` falls
    /// back to `meico.jar` in the directory of the running executable.
    pub fn from_overrides(java: Option<PathBuf>, artifact: Option<PathBuf>) -> Self {
        let java = java.unwrap_or_else(|| {
            std::env::var_os("JAVA_HOME")
                .map(|home| PathBuf::from(home).join("bin").join(java_binary_name()))
                .filter(|p| p.is_file())
                .unwrap_or_else(|| PathBuf::from(java_binary_name()))
        });
        let artifact = artifact.unwrap_or_else(default_artifact_path);
        let jvm_args = std::env::var("MPM2MIDI_JVM_ARGS")
            .map(|raw| parse_jvm_args(&raw))
            .unwrap_or_else(|_| DEFAULT_JVM_ARGS.iter().map(|s| s.to_string()).collect());

        Self {
            java,
            artifact,
            jvm_args,
        }
    }
}

/// Settings for `mpm2midi serve`.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Socket address to bind.
    pub addr: SocketAddr,
    /// Directory for per-request MIDI scratch files.
    pub scratch_dir: PathBuf,
}

impl ServerConfig {
    /// Build a server config; `scratch_dir` defaults to the system temp directory.
    pub fn new(addr: SocketAddr, scratch_dir: Option<PathBuf>) -> Self {
        Self {
            addr,
            scratch_dir: scratch_dir.unwrap_or_else(std::env::temp_dir),
        }
    }
}

/// `meico.jar` next to the current executable, or in the working directory if the
/// executable path is unknown.
pub fn default_artifact_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(MEICO_JAR)
}

fn parse_jvm_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_owned).collect()
}

fn java_binary_name() -> &'static str {
    if cfg!(windows) { "java.exe" } else { "java" }
}
