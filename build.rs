//! Build script for lvmkit
//!
//! Links `liblvm2app` when the `lvm2app` feature is enabled. The library is
//! located through pkg-config (`lvm2app.pc`); without a `.pc` file the script
//! falls back to the standard system library paths.
//!
//! # Environment Variables
//!
//! - `LVM2APP_DIR` - Installation prefix to search first (default: none)

use std::env;
use std::path::PathBuf;

fn main() {
    if env::var_os("CARGO_FEATURE_LVM2APP").is_none() {
        return;
    }

    println!("cargo:rerun-if-env-changed=LVM2APP_DIR");

    if let Some(dir) = env::var_os("LVM2APP_DIR").map(PathBuf::from) {
        for sub in ["lib", "lib64"] {
            let lib = dir.join(sub);
            if lib.exists() {
                println!("cargo:rustc-link-search=native={}", lib.display());
            }
        }
    }

    if find_with_pkg_config() {
        return;
    }

    println!("cargo:warning=lvm2app.pc not found, linking -llvm2app from system paths");
    println!("cargo:rustc-link-search=native=/usr/lib");
    println!("cargo:rustc-link-search=native=/usr/lib64");
    println!("cargo:rustc-link-search=native=/usr/local/lib");
    println!("cargo:rustc-link-search=native=/usr/local/lib64");
    println!("cargo:rustc-link-lib=lvm2app");
}

#[cfg(feature = "lvm2app")]
fn find_with_pkg_config() -> bool {
    pkg_config::Config::new().probe("lvm2app").is_ok()
}

#[cfg(not(feature = "lvm2app"))]
fn find_with_pkg_config() -> bool {
    false
}
