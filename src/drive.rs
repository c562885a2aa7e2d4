use tracing::{debug, error, info};

use crate::{model::SimModel, trace::WaveTrace, SimArgs};

/// Clock edges issued while reset is held.
pub const RESET_TOGGLES: u32 = 10;
/// Simulated time between two clock edges.
pub const TIME_STEP: u64 = 5;

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SimState {
  Reset = 0,
  Running,
  Finished,
  Timeout,
}

/// Owns the model and the optional trace for one run.
pub struct Driver<M: SimModel> {
  model: M,
  trace: Option<Box<dyn WaveTrace>>,

  pub(crate) time: u64,
  pub(crate) max_time: Option<u64>,
  pub(crate) state: SimState,
}

impl<M: SimModel> Driver<M> {
  pub fn new(model: M, trace: Option<Box<dyn WaveTrace>>, args: &SimArgs) -> Self {
    Self { model, trace, time: 0, max_time: args.max_time, state: SimState::Reset }
  }

  pub fn time(&self) -> u64 {
    self.time
  }

  pub fn state(&self) -> SimState {
    self.state
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  fn toggle_clk(&mut self) {
    let clk = self.model.clk();
    self.model.set_clk(!clk);
    self.model.eval();
  }

  /// Holds reset low for five clock periods, then releases it.
  pub fn reset(&mut self) {
    self.model.set_rst_n(false);
    self.model.eval();
    for _ in 0..RESET_TOGGLES {
      self.toggle_clk();
    }
    self.model.set_rst_n(true);
    self.state = SimState::Running;
    debug!("reset released after {RESET_TOGGLES} clock edges");
  }

  /// One half clock period, unless the model has already finished. Returns
  /// the state after the step.
  pub fn step(&mut self) -> SimState {
    if self.state != SimState::Running {
      return self.state;
    }
    if self.model.got_finish() {
      self.state = SimState::Finished;
      return self.state;
    }

    self.toggle_clk();

    if let Some(trace) = self.trace.as_mut() {
      if let Err(e) = trace.dump(self.time, &self.model.signals()) {
        error!("[{}] wave dump failed, tracing stopped: {e:#}", self.time);
        self.trace = None;
      }
    }

    self.time += TIME_STEP;
    self.model.time_inc(TIME_STEP);

    if let Some(max_time) = self.max_time.filter(|max| self.time > *max) {
      error!("[{}] watchdog timeout (max_time={max_time})", self.time);
      self.state = SimState::Timeout;
    }
    self.state
  }

  /// Steps until the model finishes or the watchdog fires.
  pub fn run(&mut self) -> SimState {
    while self.step() == SimState::Running {}
    self.state
  }

  /// Closes the trace and drops the model. Always succeeds.
  pub fn finish(mut self) -> SimState {
    if let Some(mut trace) = self.trace.take() {
      if let Err(e) = trace.close() {
        error!("closing wave trace: {e:#}");
      }
    }
    match self.state {
      SimState::Finished => info!("sim_final: finished at time {}", self.time),
      SimState::Timeout => error!("sim_final: Timeout at time {}", self.time),
      SimState::Reset | SimState::Running => error!("sim_final: stopped early at time {}", self.time),
    }
    self.state
  }
}

/// Reset, run until `$finish`, tear down. The exit status of the process does
/// not depend on the outcome.
pub fn simulate<M: SimModel>(model: M, trace: Option<Box<dyn WaveTrace>>, args: &SimArgs) -> SimState {
  let mut driver = Driver::new(model, trace, args);
  driver.reset();
  driver.run();
  driver.finish()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ihex::LoadOptions;
  use crate::trace::{Signal, VcdTrace};
  use std::cell::RefCell;
  use std::rc::Rc;

  /// Counts edges and finishes after a fixed number of rising edges out of
  /// reset.
  #[derive(Default)]
  struct Counter {
    clk: bool,
    rst_n: bool,
    evals: u32,
    evals_in_reset: u32,
    rising_out_of_reset: u32,
    finish_after: u32,
    prev_clk: bool,
    time: u64,
  }

  impl SimModel for Counter {
    fn set_rst_n(&mut self, level: bool) {
      self.rst_n = level;
    }
    fn rst_n(&self) -> bool {
      self.rst_n
    }
    fn set_clk(&mut self, level: bool) {
      self.clk = level;
    }
    fn clk(&self) -> bool {
      self.clk
    }
    fn eval(&mut self) {
      self.evals += 1;
      if !self.rst_n {
        self.evals_in_reset += 1;
      } else if self.clk && !self.prev_clk {
        self.rising_out_of_reset += 1;
      }
      self.prev_clk = self.clk;
    }
    fn got_finish(&self) -> bool {
      self.rising_out_of_reset >= self.finish_after
    }
    fn time_inc(&mut self, delta: u64) {
      self.time += delta;
    }
  }

  fn args(max_time: Option<u64>) -> SimArgs {
    SimArgs {
      log_file: None,
      log_level: "info".into(),
      wave_path: None,
      max_time,
      load_options: LoadOptions::default(),
      runtime_args: Vec::new(),
    }
  }

  #[derive(Clone, Default)]
  struct Recorder(Rc<RefCell<Vec<(u64, Vec<Signal>)>>>, Rc<RefCell<bool>>);

  impl WaveTrace for Recorder {
    fn dump(&mut self, time: u64, signals: &[Signal]) -> anyhow::Result<()> {
      self.0.borrow_mut().push((time, signals.to_vec()));
      Ok(())
    }
    fn close(&mut self) -> anyhow::Result<()> {
      *self.1.borrow_mut() = true;
      Ok(())
    }
  }

  #[test]
  fn reset_holds_for_ten_edges() {
    let mut driver = Driver::new(Counter { finish_after: 1, ..Default::default() }, None, &args(None));
    driver.reset();
    let model = driver.model();
    assert_eq!(model.evals_in_reset, 1 + RESET_TOGGLES);
    assert!(model.rst_n);
    // an even number of toggles leaves the clock where it started
    assert!(!model.clk);
    assert_eq!(driver.state(), SimState::Running);
    assert_eq!(driver.time(), 0);
  }

  #[test]
  fn runs_until_finish() {
    let mut driver = Driver::new(Counter { finish_after: 3, ..Default::default() }, None, &args(None));
    driver.reset();
    assert_eq!(driver.run(), SimState::Finished);
    // three rising edges need five half periods: r f r f r
    assert_eq!(driver.model().evals, 1 + RESET_TOGGLES + 5);
    assert_eq!(driver.time(), 5 * TIME_STEP);
    assert_eq!(driver.model().time, driver.time());
    assert_eq!(driver.finish(), SimState::Finished);
  }

  #[test]
  fn finish_during_reset_skips_the_run_loop() {
    let mut driver = Driver::new(Counter { finish_after: 0, ..Default::default() }, None, &args(None));
    driver.reset();
    assert_eq!(driver.run(), SimState::Finished);
    assert_eq!(driver.model().evals, 1 + RESET_TOGGLES);
    assert_eq!(driver.time(), 0);
    assert_eq!(driver.model().time, 0);
  }

  #[test]
  fn watchdog_stops_a_model_that_never_finishes() {
    let mut driver = Driver::new(Counter { finish_after: u32::MAX, ..Default::default() }, None, &args(Some(100)));
    driver.reset();
    assert_eq!(driver.run(), SimState::Timeout);
    assert_eq!(driver.time(), 105);
    // no further stepping once stopped
    assert_eq!(driver.step(), SimState::Timeout);
    assert_eq!(driver.time(), 105);
  }

  #[test]
  fn trace_sees_every_run_step_and_is_closed() {
    let recorder = Recorder::default();
    let state = simulate(
      Counter { finish_after: 2, ..Default::default() },
      Some(Box::new(recorder.clone())),
      &args(None),
    );
    assert_eq!(state, SimState::Finished);

    let dumps = recorder.0.borrow();
    let times: Vec<u64> = dumps.iter().map(|(t, _)| *t).collect();
    assert_eq!(times, vec![0, 5, 10]);
    assert_eq!(dumps[0].1, vec![Signal::bit("clk", true), Signal::bit("rst_n", true)]);
    assert_eq!(dumps[1].1[0], Signal::bit("clk", false));
    assert!(*recorder.1.borrow());
  }

  #[test]
  fn vcd_trace_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("waveform.vcd");
    let trace = VcdTrace::create(&path).unwrap();
    simulate(Counter { finish_after: 2, ..Default::default() }, Some(Box::new(trace)), &args(None));

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("$enddefinitions $end"));
    assert!(text.contains("#5\n0!\n"));
    assert!(text.contains("#10\n1!\n"));
  }
}
