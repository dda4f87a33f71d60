use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mpm2midi::{
    BridgeConfig, BridgeRuntime, ConversionInputs, ConvertError, ConvertResult, DEFAULT_ADDR,
    DEFAULT_OUTPUT, InputRole, MidiResult, OutputTarget, ServerConfig,
};

/// Apply an MPM performance to an MEI or MSM score and write expressive MIDI.
#[derive(Parser, Debug)]
#[command(name = "mpm2midi", version, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    cmd: Option<Command>,

    #[command(flatten)]
    convert: ConvertArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve `POST /convert` over HTTP.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// MEI input file.
    #[arg(short = 's', long = "mei", value_name = "PATH")]
    mei: Option<PathBuf>,

    /// MSM input file (takes precedence over --mei).
    #[arg(short = 'm', long = "msm", value_name = "PATH")]
    msm: Option<PathBuf>,

    /// Output MIDI path.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_OUTPUT)]
    out: PathBuf,

    /// MPM performance description (a file named "serve" must be given as ./serve).
    #[arg(value_name = "MPM_PATH")]
    mpm: Option<PathBuf>,

    #[command(flatten)]
    bridge: BridgeArgs,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "MPM2MIDI_ADDR", default_value = DEFAULT_ADDR)]
    addr: SocketAddr,

    /// Directory for per-request scratch MIDI files (defaults to the system temp dir).
    #[arg(long, value_name = "DIR")]
    scratch_dir: Option<PathBuf>,

    #[command(flatten)]
    bridge: BridgeArgs,
}

#[derive(Args, Debug)]
struct BridgeArgs {
    /// Java launcher used to host meico.
    #[arg(long, env = "MPM2MIDI_JAVA", value_name = "PATH")]
    java: Option<PathBuf>,

    /// Path to meico.jar (defaults to the executable's directory).
    #[arg(long, env = "MPM2MIDI_MEICO_JAR", value_name = "PATH")]
    meico_jar: Option<PathBuf>,
}

impl BridgeArgs {
    fn config(&self) -> BridgeConfig {
        BridgeConfig::from_overrides(self.java.clone(), self.meico_jar.clone())
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Some(Command::Serve(args)) => match cmd_serve(args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!("{e:#}");
                let code = e
                    .downcast_ref::<ConvertError>()
                    .map(ConvertError::exit_code)
                    .unwrap_or(1);
                ExitCode::from(code)
            }
        },
        None => cmd_convert(cli.convert),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn cmd_convert(args: ConvertArgs) -> ExitCode {
    let mut runtime = BridgeRuntime::new(args.bridge.config());
    let result = run_convert(&mut runtime, &args);
    runtime.stop();

    match result {
        Ok(midi) => {
            let s = midi.summary();
            tracing::info!(
                format = s.format,
                tracks = s.tracks,
                note_ons = s.note_ons,
                note_offs = s.note_offs,
                "midi summary"
            );
            if let Some(path) = midi.path() {
                eprintln!("wrote {}", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run_convert(runtime: &mut BridgeRuntime, args: &ConvertArgs) -> ConvertResult<MidiResult> {
    runtime.start()?;

    let inputs = ConversionInputs {
        mei: mpm2midi::resolve_optional(args.mei.as_deref(), InputRole::Mei)?,
        msm: mpm2midi::resolve_optional(args.msm.as_deref(), InputRole::Msm)?,
        mpm: mpm2midi::resolve(args.mpm.clone().unwrap_or_default(), InputRole::Mpm)?,
    };

    mpm2midi::convert(runtime, &inputs, &OutputTarget::File(args.out.clone()))
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut runtime = BridgeRuntime::new(args.bridge.config());
    runtime.start()?;

    let config = ServerConfig::new(args.addr, args.scratch_dir);
    let service = Arc::new(Mutex::new(runtime));

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start tokio runtime")?;
    let served = rt.block_on(mpm2midi::server::serve(Arc::clone(&service), &config));

    if let Ok(mut runtime) = service.lock() {
        runtime.stop();
    }
    served.with_context(|| format!("serve on {}", config.addr))
}
