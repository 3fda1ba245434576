use thiserror::Error;

use crate::common::Distro;

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("`{command}` failed (exit code {code:?}){}", format_output(.output))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("No user-repository helper found (tried: {0})")]
    NoUserRepoHelper(String),

    #[error("{origin} packages cannot be installed on {distro}")]
    UnsupportedOrigin { distro: Distro, origin: String },

    #[error("Provenance store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Unrecognized distribution: {0}")]
    UnknownDistro(String),
}

fn format_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}
