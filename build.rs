#[macro_use]
extern crate trackable;

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use trackable::error::Failure;

macro_rules! track_any_err_unwrap {
    ($expr:expr) => {
        track_try_unwrap!(track_any_err!($expr))
    };
}

/// `fdfs --version`の詳細表示に使うビルド情報を`$OUT_DIR/build_information.rs`に書き出す。
fn main() {
    // https://doc.rust-lang.org/cargo/reference/environment-variables.html#environment-variables-cargo-sets-for-build-scripts
    let profile = track_any_err_unwrap!(env::var("PROFILE"));
    let version = track_try_unwrap!(rustc_version());

    let out_dir = track_any_err_unwrap!(env::var("OUT_DIR"));
    let dest_path = Path::new(&out_dir).join("build_information.rs");
    let mut file = track_any_err_unwrap!(File::create(&dest_path));
    track_any_err_unwrap!(writeln!(
        file,
        "/// The cargo profile (\"debug\" or \"release\") of this build.\n\
         pub static BUILD_PROFILE: &str = {:?};\n\n\
         /// The rustc version of this build.\n\
         pub static BUILD_VERSION: &str = {:?};",
        profile, version
    ));
}

fn rustc_version() -> Result<String, Failure> {
    let rustc = track_any_err!(env::var("RUSTC"))?;
    let output = track_any_err!(Command::new(rustc).arg("--version").output())?;
    let version = track_any_err!(String::from_utf8(output.stdout))?;
    Ok(version.trim().to_owned())
}
