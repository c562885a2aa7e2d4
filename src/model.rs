use crate::trace::Signal;

/// The hardware model under test, as seen by the driver.
///
/// `readmemh` calls made by the model land in [`crate::dpi`]; models that
/// live on the Rust side hold a [`MemoryFill`](crate::dpi::MemoryFill) for
/// that instead.
pub trait SimModel {
  fn set_rst_n(&mut self, level: bool);
  fn rst_n(&self) -> bool;

  fn set_clk(&mut self, level: bool);
  fn clk(&self) -> bool;

  /// Settle the model for the current inputs.
  fn eval(&mut self);

  /// `$finish` reached.
  fn got_finish(&self) -> bool;

  /// Advance the runtime's notion of simulated time.
  fn time_inc(&mut self, _delta: u64) {}

  /// Values recorded by the wave trace.
  fn signals(&self) -> Vec<Signal> {
    vec![Signal::bit("clk", self.clk()), Signal::bit("rst_n", self.rst_n())]
  }
}

#[cfg(feature = "verilator")]
pub use verilated::VerilatedTop;

#[cfg(feature = "verilator")]
mod verilated {
  use super::SimModel;
  use std::ffi::{c_char, c_int, CString};
  use tracing::debug;

  mod bindings {
    use std::ffi::{c_char, c_int, c_void};
    extern "C" {
      /// Runs `Verilated::commandArgs` and allocates `Vtb_top`.
      pub fn tb_top_new(argc: c_int, argv: *const *const c_char) -> *mut c_void;
      pub fn tb_top_destroy(top: *mut c_void);
      pub fn tb_top_eval(top: *mut c_void);
      pub fn tb_top_set_clk(top: *mut c_void, level: u8);
      pub fn tb_top_get_clk(top: *const c_void) -> u8;
      pub fn tb_top_set_rst_n(top: *mut c_void, level: u8);
      pub fn tb_top_get_rst_n(top: *const c_void) -> u8;
      pub fn tb_top_got_finish() -> u8;
      pub fn tb_top_time_inc(delta: u64);
    }
  }

  /// Owns one Verilator-generated `Vtb_top` through its C shim.
  pub struct VerilatedTop {
    v: *mut std::ffi::c_void,
  }

  impl VerilatedTop {
    /// `args` are handed to the Verilator runtime as `argv[1..]`.
    pub fn new(args: &[String]) -> anyhow::Result<Self> {
      let argv0 = std::env::args().next().unwrap_or_else(|| "tb_top".to_string());
      let owned = std::iter::once(argv0)
        .chain(args.iter().cloned())
        .map(CString::new)
        .collect::<Result<Vec<_>, _>>()?;
      let argv: Vec<*const c_char> = owned.iter().map(|a| a.as_ptr()).collect();
      debug!("creating Vtb_top with {} runtime args", args.len());

      let v = unsafe { bindings::tb_top_new(argv.len() as c_int, argv.as_ptr()) };
      if v.is_null() {
        anyhow::bail!("Vtb_top allocation failed");
      }
      Ok(Self { v })
    }
  }

  impl SimModel for VerilatedTop {
    fn set_rst_n(&mut self, level: bool) {
      unsafe { bindings::tb_top_set_rst_n(self.v, level as u8) }
    }

    fn rst_n(&self) -> bool {
      unsafe { bindings::tb_top_get_rst_n(self.v) != 0 }
    }

    fn set_clk(&mut self, level: bool) {
      unsafe { bindings::tb_top_set_clk(self.v, level as u8) }
    }

    fn clk(&self) -> bool {
      unsafe { bindings::tb_top_get_clk(self.v) != 0 }
    }

    fn eval(&mut self) {
      unsafe { bindings::tb_top_eval(self.v) }
    }

    fn got_finish(&self) -> bool {
      unsafe { bindings::tb_top_got_finish() != 0 }
    }

    fn time_inc(&mut self, delta: u64) {
      unsafe { bindings::tb_top_time_inc(delta) }
    }
  }

  impl Drop for VerilatedTop {
    fn drop(&mut self) {
      unsafe { bindings::tb_top_destroy(self.v) }
    }
  }
}
