use std::env;

fn main() {
  if env::var_os("CARGO_FEATURE_VERILATOR").is_some() {
    // Vtb_top and its C shim come out of the verilator build
    println!(
      "cargo::rustc-link-search=native={}",
      env::var("VERILATED_LIB_DIR").expect("VERILATED_LIB_DIR should be set")
    );
    println!(
      "cargo::rustc-link-lib=static={}",
      env::var("VERILATED_TOP").unwrap_or_else(|_| "Vtb_top".to_string())
    );
    println!("cargo::rustc-link-lib=static=verilated");
    println!("cargo::rustc-link-lib=stdc++");

    println!("cargo::rerun-if-env-changed=VERILATED_LIB_DIR");
    println!("cargo::rerun-if-env-changed=VERILATED_TOP");
  }
}
