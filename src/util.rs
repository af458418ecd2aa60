use std::path::PathBuf;

use rand::{RngCore, rng};

/// Expand a leading `~` or `~/` to the user's home directory.
pub fn expand_tilde(value: &str) -> String {
    if value == "~" {
        if let Some(home) = home_dir() {
            return home.to_string_lossy().into_owned();
        }
    }
    if let Some(rest) = value.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(rest).to_string_lossy().into_owned();
        }
    }
    value.to_string()
}

pub fn home_dir() -> Option<PathBuf> {
    #[cfg(unix)]
    let var = std::env::var_os("HOME");
    #[cfg(not(unix))]
    let var = std::env::var_os("USERPROFILE");
    var.map(PathBuf::from)
}

/// Random identifier of `bytes` random bytes, hex-encoded.
pub fn random_id_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{b:02x}")).collect()
}
