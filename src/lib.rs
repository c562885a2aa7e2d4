use anyhow::Context;
use ihex::LoadOptions;
use plusarg::PlusArgMatcher;
use std::{fs::File, path::PathBuf, sync::Mutex};
use tracing::Level;
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter, FmtSubscriber};

pub mod dpi;
pub mod drive;
pub mod ihex;
pub mod model;
pub mod plusarg;
pub mod trace;

pub struct SimArgs {
  /// Path to the log file
  pub log_file: Option<PathBuf>,

  pub log_level: String,

  /// VCD output, `None` when tracing is off
  pub wave_path: Option<PathBuf>,

  /// stop the run loop once simulated time passes this
  pub max_time: Option<u64>,

  pub load_options: LoadOptions,

  /// handed to the model runtime as-is
  pub runtime_args: Vec<String>,
}

impl SimArgs {
  pub fn setup_logger(&self) -> anyhow::Result<()> {
    let log_level: Level = self
      .log_level
      .parse()
      .with_context(|| format!("invalid +log-level={}", self.log_level))?;
    let filter = EnvFilter::try_from_default_env()
      .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));

    let (writer, ansi) = match &self.log_file {
      Some(path) => {
        let file = File::create(path).with_context(|| format!("creating log file {}", path.display()))?;
        (BoxMakeWriter::new(Mutex::new(file)), false)
      }
      None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    let global_logger = FmtSubscriber::builder()
      .with_env_filter(filter)
      .with_writer(writer)
      .without_time()
      .with_target(false)
      .with_ansi(ansi)
      .compact()
      .finish();
    tracing::subscriber::set_global_default(global_logger)
      .with_context(|| "internal error: fail to setup log subscriber")?;
    Ok(())
  }

  pub fn from_plusargs(matcher: &PlusArgMatcher) -> anyhow::Result<Self> {
    let wave_path = match matcher.try_match("wave-path") {
      Some(path) => Some(PathBuf::from(path)),
      None if matcher.has("trace") => Some(PathBuf::from(trace::DEFAULT_WAVE_PATH)),
      None => None,
    };

    Ok(Self {
      log_file: matcher.try_match("log-file").map(PathBuf::from),
      log_level: matcher.try_match("log-level").unwrap_or("info").into(),
      wave_path,
      max_time: matcher.try_match_parse("max-time")?,
      load_options: LoadOptions {
        verify_checksum: matcher.has("hex-verify-checksum"),
        extended_records: matcher.has("hex-extended-records"),
      },
      runtime_args: matcher.raw_args().to_vec(),
    })
  }
}
