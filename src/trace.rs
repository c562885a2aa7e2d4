//! Waveform tracing. Only VCD is written; signals come from the model's
//! [`SimModel::signals`](crate::model::SimModel::signals).

use anyhow::Context;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

pub const DEFAULT_WAVE_PATH: &str = "waveform.vcd";

/// A sampled signal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
  pub name: &'static str,
  pub width: u32,
  pub value: u64,
}

impl Signal {
  pub fn bit(name: &'static str, level: bool) -> Self {
    Self { name, width: 1, value: level as u64 }
  }
}

pub trait WaveTrace {
  /// Record `signals` at simulated `time`.
  fn dump(&mut self, time: u64, signals: &[Signal]) -> anyhow::Result<()>;
  /// Flush everything recorded so far.
  fn close(&mut self) -> anyhow::Result<()>;
}

pub struct VcdTrace<W: Write> {
  out: W,
  scope: String,
  /// last value per declared signal, in declaration order
  vars: Vec<(Signal, String)>,
  header_done: bool,
}

impl VcdTrace<BufWriter<File>> {
  pub fn create(path: &Path) -> anyhow::Result<Self> {
    let file = File::create(path).with_context(|| format!("creating wave file {}", path.display()))?;
    info!("dumping waves to {}", path.display());
    Ok(Self::new(BufWriter::new(file), "tb_top"))
  }
}

impl<W: Write> VcdTrace<W> {
  pub fn new(out: W, scope: &str) -> Self {
    Self { out, scope: scope.to_owned(), vars: Vec::new(), header_done: false }
  }

  pub fn into_inner(self) -> W {
    self.out
  }

  /// VCD identifier codes: printable ASCII from '!' to '~', base 94.
  fn id_code(mut index: usize) -> String {
    let mut code = String::new();
    loop {
      code.push((b'!' + (index % 94) as u8) as char);
      index /= 94;
      if index == 0 {
        break;
      }
      index -= 1;
    }
    code
  }

  fn write_value(out: &mut W, signal: &Signal, id: &str) -> std::io::Result<()> {
    if signal.width == 1 {
      writeln!(out, "{}{id}", signal.value & 1)
    } else {
      writeln!(out, "b{:b} {id}", signal.value)
    }
  }

  fn write_header(&mut self, time: u64, signals: &[Signal]) -> anyhow::Result<()> {
    let out = &mut self.out;
    writeln!(out, "$version {} {} $end", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "$timescale 1ps $end")?;
    writeln!(out, "$scope module {} $end", self.scope)?;
    for (i, signal) in signals.iter().enumerate() {
      let id = Self::id_code(i);
      writeln!(out, "$var wire {} {id} {} $end", signal.width, signal.name)?;
      self.vars.push((*signal, id));
    }
    writeln!(out, "$upscope $end")?;
    writeln!(out, "$enddefinitions $end")?;

    writeln!(out, "#{time}")?;
    writeln!(out, "$dumpvars")?;
    for (signal, id) in &self.vars {
      Self::write_value(out, signal, id)?;
    }
    writeln!(out, "$end")?;
    self.header_done = true;
    debug!("vcd header written with {} signals", self.vars.len());
    Ok(())
  }
}

impl<W: Write> WaveTrace for VcdTrace<W> {
  fn dump(&mut self, time: u64, signals: &[Signal]) -> anyhow::Result<()> {
    if !self.header_done {
      self.write_header(time, signals)?;
    }
    let out = &mut self.out;

    let mut stamped = false;
    for (signal, id) in self.vars.iter_mut() {
      // signals not declared in the header are not traced
      let Some(now) = signals.iter().find(|s| s.name == signal.name) else {
        continue;
      };
      if now.value == signal.value {
        continue;
      }
      if !stamped {
        writeln!(out, "#{time}")?;
        stamped = true;
      }
      signal.value = now.value;
      Self::write_value(out, signal, id)?;
    }
    Ok(())
  }

  fn close(&mut self) -> anyhow::Result<()> {
    self.out.flush().with_context(|| "flushing wave file")
  }
}
