// build.rs

use chrono::Utc;
use std::env;
use std::fs;
use std::path::PathBuf;

// stamps BUILD_DATE into $OUT_DIR/build_info.rs for the startup banner
fn main() {
    let out_dir = PathBuf::from(env::var_os("OUT_DIR").expect("cargo sets OUT_DIR"));
    let build_date = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");

    fs::write(
        out_dir.join("build_info.rs"),
        format!("pub const BUILD_DATE: &str = \"{}\";\n", build_date),
    )
    .expect("write build_info.rs");

    println!("cargo:rerun-if-changed=build.rs");
}
