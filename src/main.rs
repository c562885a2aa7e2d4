use archtest_dpi::{
  dpi,
  drive::simulate,
  model::VerilatedTop,
  plusarg::PlusArgMatcher,
  trace::{VcdTrace, WaveTrace},
  SimArgs,
};
use tracing::error;

fn main() {
  let plusargs = PlusArgMatcher::from_args();
  let args = match SimArgs::from_plusargs(&plusargs) {
    Ok(args) => args,
    Err(e) => {
      eprintln!("{e:#}");
      return;
    }
  };
  if let Err(e) = args.setup_logger() {
    eprintln!("{e:#}");
  }
  dpi::configure(args.load_options);

  let model = match VerilatedTop::new(&args.runtime_args) {
    Ok(model) => model,
    Err(e) => {
      error!("{e:#}");
      return;
    }
  };

  let trace = args.wave_path.as_deref().and_then(|path| match VcdTrace::create(path) {
    Ok(trace) => Some(Box::new(trace) as Box<dyn WaveTrace>),
    Err(e) => {
      error!("{e:#}, running without waves");
      None
    }
  });

  simulate(model, trace, &args);
}
