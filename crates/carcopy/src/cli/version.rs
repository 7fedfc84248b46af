//! `carcopy version`

use anyhow::Result;

pub const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commit suffix injected at build time, e.g. `CARCOPY_COMMIT=git.1a2b3c4`.
const CURRENT_COMMIT: Option<&str> = option_env!("CARCOPY_COMMIT");

pub fn run() -> Result<()> {
    println!("version: {}", user_version());
    Ok(())
}

pub fn user_version() -> String {
    let ignore_commit = std::env::var("CARCOPY_VERSION_IGNORE_COMMIT").as_deref() == Ok("1");
    format_version(CURRENT_COMMIT.unwrap_or_default(), ignore_commit)
}

fn format_version(commit: &str, ignore_commit: bool) -> String {
    if ignore_commit || commit.is_empty() {
        BUILD_VERSION.to_string()
    } else {
        format!("{}+{}", BUILD_VERSION, commit)
    }
}
