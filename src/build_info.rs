//! Build information captured at compile time.

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Short git commit hash (7 chars).
pub const BUILD_HASH: &str = env!("BUILD_HASH");

/// Whether the build was from a dirty working directory (as string).
const BUILD_DIRTY_STR: &str = env!("BUILD_DIRTY");

/// Full version string including hash and dirty indicator.
///
/// Format: `0.1.0 (abc1234)` or `0.1.0 (abc1234*)` if dirty.
#[must_use]
pub fn version_string() -> String {
    let dirty = if BUILD_DIRTY_STR == "true" { "*" } else { "" };
    format!("{VERSION} ({BUILD_HASH}{dirty})")
}
