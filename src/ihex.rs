//! Intel HEX loader for word-addressed memories.
//!
//! Each `:LLAAAATT[DD...]CC` line is decoded independently. Data records are
//! packed four bytes at a time into little-endian words at
//! `(address + offset) >> 2`; words that fall outside the buffer are dropped.

use anyhow::Context;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, trace, warn};

const START_CODE: u8 = b':';
/// byte count, address (2), record type
const HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
  Data,
  EndOfFile,
  ExtendedSegmentAddress,
  StartSegmentAddress,
  ExtendedLinearAddress,
  StartLinearAddress,
  Unknown(u8),
}

impl From<u8> for RecordType {
  fn from(value: u8) -> Self {
    match value {
      0x00 => RecordType::Data,
      0x01 => RecordType::EndOfFile,
      0x02 => RecordType::ExtendedSegmentAddress,
      0x03 => RecordType::StartSegmentAddress,
      0x04 => RecordType::ExtendedLinearAddress,
      0x05 => RecordType::StartLinearAddress,
      other => RecordType::Unknown(other),
    }
  }
}

impl From<RecordType> for u8 {
  fn from(value: RecordType) -> Self {
    match value {
      RecordType::Data => 0x00,
      RecordType::EndOfFile => 0x01,
      RecordType::ExtendedSegmentAddress => 0x02,
      RecordType::StartSegmentAddress => 0x03,
      RecordType::ExtendedLinearAddress => 0x04,
      RecordType::StartLinearAddress => 0x05,
      RecordType::Unknown(other) => other,
    }
  }
}

/// One decoded record line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecord {
  pub len: u8,
  pub addr: u16,
  pub kind: RecordType,
  pub data: Vec<u8>,
  /// `None` when the line ends right after the payload or the checksum
  /// field is not valid hex.
  pub checksum: Option<u8>,
}

impl HexRecord {
  /// Decodes a single line, start code included. Trailing whitespace
  /// (including `\r` from CRLF files) is ignored, and so is anything past the
  /// checksum byte.
  pub fn parse(line: &[u8]) -> anyhow::Result<Self> {
    let line = line.trim_ascii_end();
    let Some((&START_CODE, body)) = line.split_first() else {
      anyhow::bail!("record does not start with ':'");
    };

    if body.len() < HEADER_LEN * 2 {
      anyhow::bail!("truncated record header ({} chars)", body.len());
    }
    let header = hex::decode(&body[..HEADER_LEN * 2]).with_context(|| "decoding record header")?;
    let len = header[0];
    let addr = u16::from_be_bytes([header[1], header[2]]);
    let kind = RecordType::from(header[3]);

    let data_end = (HEADER_LEN + len as usize) * 2;
    if body.len() < data_end {
      anyhow::bail!(
        "truncated record payload: expected {len} bytes, got {} chars",
        body.len() - HEADER_LEN * 2
      );
    }
    let data = hex::decode(&body[HEADER_LEN * 2..data_end]).with_context(|| "decoding record payload")?;

    // only looked at when checksums are verified
    let checksum = body
      .get(data_end..data_end + 2)
      .and_then(|cc| hex::decode(cc).ok())
      .map(|cc| cc[0]);

    Ok(Self { len, addr, kind, data, checksum })
  }

  /// Two's complement checksum over the header and payload.
  pub fn expected_checksum(&self) -> u8 {
    let [hi, lo] = self.addr.to_be_bytes();
    let sum = [self.len, hi, lo, u8::from(self.kind)]
      .iter()
      .chain(self.data.iter())
      .fold(0u8, |acc, b| acc.wrapping_add(*b));
    sum.wrapping_neg()
  }

  pub fn checksum_ok(&self) -> bool {
    self.checksum == Some(self.expected_checksum())
  }

  /// Big-endian value carried by an extended address record.
  fn address_value(&self) -> Option<u32> {
    match self.data.as_slice() {
      [hi, lo] => Some(u16::from_be_bytes([*hi, *lo]) as u32),
      _ => None,
    }
  }

  /// Payload regrouped as `(byte_offset, word)`, little-endian, with a short
  /// trailing group zero-extended.
  pub fn words(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
    self.data.chunks(4).enumerate().map(|(i, chunk)| {
      let word = chunk
        .iter()
        .enumerate()
        .fold(0u32, |acc, (j, b)| acc | (*b as u32) << (j * 8));
      (i * 4, word)
    })
  }
}

impl FromStr for HexRecord {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s.as_bytes())
  }
}

/// Loader policy. The default is lenient: no checksum check, every
/// non-data record ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
  /// Skip records whose checksum is missing or wrong.
  pub verify_checksum: bool,
  /// Honor extended segment/linear address records and stop at end-of-file.
  pub extended_records: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
  /// data records applied to memory
  pub records: usize,
  pub words_written: usize,
  /// words whose index fell outside the buffer
  pub words_dropped: usize,
  /// non-data records passed over
  pub records_skipped: usize,
  pub malformed: usize,
}

pub fn load_hex_file(path: &Path, mem: &mut [u32], options: &LoadOptions) -> anyhow::Result<LoadSummary> {
  let file = File::open(path).with_context(|| format!("Cannot open HEX file: {}", path.display()))?;
  load_hex(BufReader::new(file), mem, options).with_context(|| format!("reading HEX file {}", path.display()))
}

pub fn load_hex<R: BufRead>(reader: R, mem: &mut [u32], options: &LoadOptions) -> anyhow::Result<LoadSummary> {
  let mut summary = LoadSummary::default();
  // upper address bits from type 02/04 records, only with extended_records
  let mut base: u64 = 0;

  for (lineno, line) in reader.split(b'\n').enumerate() {
    let line = line?;
    if line.first() != Some(&START_CODE) {
      continue;
    }

    let record = match HexRecord::parse(&line) {
      Ok(record) => record,
      Err(e) => {
        warn!("line {}: skipping malformed record: {e:#}", lineno + 1);
        summary.malformed += 1;
        continue;
      }
    };

    if options.verify_checksum && !record.checksum_ok() {
      warn!(
        "line {}: checksum mismatch (expected {:#04x}, found {:?}), record skipped",
        lineno + 1,
        record.expected_checksum(),
        record.checksum
      );
      summary.malformed += 1;
      continue;
    }

    match record.kind {
      RecordType::Data => {}
      RecordType::EndOfFile if options.extended_records => {
        debug!("line {}: end of file record", lineno + 1);
        break;
      }
      RecordType::ExtendedSegmentAddress | RecordType::ExtendedLinearAddress
        if options.extended_records =>
      {
        let Some(value) = record.address_value() else {
          warn!("line {}: address record with {} data bytes", lineno + 1, record.data.len());
          summary.malformed += 1;
          continue;
        };
        base = if record.kind == RecordType::ExtendedLinearAddress {
          (value as u64) << 16
        } else {
          (value as u64) << 4
        };
        debug!("line {}: address base set to {base:#x}", lineno + 1);
        continue;
      }
      kind => {
        trace!("line {}: ignoring {kind:?} record", lineno + 1);
        summary.records_skipped += 1;
        continue;
      }
    }

    summary.records += 1;
    let addr = base + record.addr as u64;
    for (offset, word) in record.words() {
      let word_addr = (addr + offset as u64) >> 2;
      match mem.get_mut(word_addr as usize) {
        Some(slot) => {
          *slot = word;
          summary.words_written += 1;
        }
        None => {
          trace!("dropping word {word:#010x} at index {word_addr:#x} (capacity {})", mem.len());
          summary.words_dropped += 1;
        }
      }
    }
  }

  Ok(summary)
}
