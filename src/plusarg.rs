use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn plusarg_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^\+([^=]+)(?:=(.*))?$").expect("plusarg pattern is valid"))
}

/// Simulator-style `+key` / `+key=value` arguments. The full argument list is
/// kept as well so it can be handed to the model runtime untouched.
pub struct PlusArgMatcher {
  plusargs: HashMap<String, Option<String>>,
  raw: Vec<String>,
}

impl PlusArgMatcher {
  pub fn from_args() -> Self {
    Self::new(std::env::args().skip(1))
  }

  pub fn new<I, S>(args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let re = plusarg_re();
    let mut plusargs = HashMap::new();
    let raw: Vec<String> = args.into_iter().map(Into::into).collect();

    for caps in raw.iter().filter_map(|arg| re.captures(arg)) {
      let key = caps[1].to_string();
      let value = caps.get(2).map(|m| m.as_str().to_string());
      plusargs.insert(key, value);
    }

    Self { plusargs, raw }
  }

  /// Value of `+name=value`; `None` if absent or given without a value.
  pub fn try_match(&self, name: &str) -> Option<&str> {
    self.plusargs.get(name).and_then(|v| v.as_deref())
  }

  pub fn try_match_parse<T>(&self, name: &str) -> anyhow::Result<Option<T>>
  where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
  {
    self
      .try_match(name)
      .map(|v| v.parse::<T>().map_err(|e| anyhow::anyhow!("invalid +{name}={v}: {e}")))
      .transpose()
  }

  /// Whether `+name` was given at all, with or without a value.
  pub fn has(&self, name: &str) -> bool {
    self.plusargs.contains_key(name)
  }

  pub fn raw_args(&self) -> &[String] {
    &self.raw
  }
}
