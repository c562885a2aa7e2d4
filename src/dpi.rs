use std::ffi::{c_char, c_uint, CStr};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, error, info, warn};

use crate::ihex::{self, LoadOptions};
use crate::plusarg::PlusArgMatcher;
use crate::SimArgs;

pub type SvBitVecVal = u32;

// --------------------------
// preparing data structures
// --------------------------

static LOAD_OPTIONS: OnceLock<LoadOptions> = OnceLock::new();

/// Sets the loader policy used by the `readmemh` symbol. Only the first call
/// takes effect; returns whether this one did.
pub fn configure(options: LoadOptions) -> bool {
  LOAD_OPTIONS.set(options).is_ok()
}

fn load_options() -> LoadOptions {
  LOAD_OPTIONS.get().copied().unwrap_or_default()
}

#[cfg(feature = "vpi")]
fn sim_time() -> u64 {
  svdpi::get_time()
}

#[cfg(not(feature = "vpi"))]
fn sim_time() -> u64 {
  0
}

/// Something a simulation model can call to populate one of its memories.
pub trait MemoryFill {
  fn fill(&self, path: &Path, mem: &mut [u32]);
}

/// Fills memories from Intel HEX files. Failures are logged and leave the
/// memory as it was; nothing is returned to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct HexBridge {
  options: LoadOptions,
}

impl HexBridge {
  pub fn new(options: LoadOptions) -> Self {
    Self { options }
  }
}

impl MemoryFill for HexBridge {
  fn fill(&self, path: &Path, mem: &mut [u32]) {
    match ihex::load_hex_file(path, mem, &self.options) {
      Ok(summary) => {
        info!("Loaded HEX file: {}", path.display());
        debug!(
          "[{}] {}: {} records, {} words written, {} dropped, {} skipped, {} malformed",
          sim_time(),
          path.display(),
          summary.records,
          summary.words_written,
          summary.words_dropped,
          summary.records_skipped,
          summary.malformed
        );
        if summary.words_dropped > 0 {
          warn!(
            "{}: {} words beyond the {}-word memory were dropped",
            path.display(),
            summary.words_dropped,
            mem.len()
          );
        }
      }
      Err(e) => error!("{e:#}"),
    }
  }
}

//----------------------
// dpi functions
//----------------------

/// `readmemh(const char* filename, uint32_t* mem, unsigned int words)`, called
/// from the testbench's C++ DPI glue with a plain pointer to the memory's
/// backing words, not an SV open-array handle.
///
/// # Safety
///
/// `filename` must be NUL-terminated and `mem` must be valid for `words`
/// writes for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn readmemh(filename: *const c_char, mem: *mut SvBitVecVal, words: c_uint) {
  if filename.is_null() || mem.is_null() {
    error!("readmemh called with a null filename or memory pointer");
    return;
  }
  let filename = CStr::from_ptr(filename).to_string_lossy();
  debug!("[{}] readmemh (filename={filename}, words={words})", sim_time());

  let mem = std::slice::from_raw_parts_mut(mem, words as usize);
  HexBridge::new(load_options()).fill(Path::new(&*filename), mem);
}

/// Entry hook for testbenches whose main loop is not ours: sets up logging
/// and the loader policy from plusargs.
#[no_mangle]
unsafe extern "C" fn sim_init() {
  let plusargs = PlusArgMatcher::from_args();
  let args = match SimArgs::from_plusargs(&plusargs) {
    Ok(args) => args,
    Err(e) => {
      eprintln!("sim_init: {e:#}");
      return;
    }
  };
  if let Err(e) = args.setup_logger() {
    eprintln!("sim_init: {e:#}");
  }
  if !configure(args.load_options) {
    debug!("sim_init: loader already configured");
  }
}
