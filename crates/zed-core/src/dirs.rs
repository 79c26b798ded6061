//! Config-directory resolution.
//!
//! Layout on disk:
//!
//! ```text
//! $XDG_CONFIG_HOME/zed/  (else $HOME/.zed/)  (0700)
//! ├── config.json                            (0600, contexts minus secrets)
//! └── secrets.bin                            (0600, file secret backend only)
//! ```

use std::io;
use std::path::PathBuf;

/// Resolves the zed config directory without creating it.
///
/// `$XDG_CONFIG_HOME/zed/` when `XDG_CONFIG_HOME` is set and non-empty,
/// `$HOME/.zed/` otherwise.
///
/// # Errors
///
/// Fails when neither `$XDG_CONFIG_HOME` nor `$HOME` is set.
pub fn config_dir() -> io::Result<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg).join("zed"));
    }
    let home = std::env::var_os("HOME").filter(|v| !v.is_empty()).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "neither XDG_CONFIG_HOME nor HOME environment variable is set",
        )
    })?;
    Ok(PathBuf::from(home).join(".zed"))
}

/// Creates `dir` (and parents) with owner-only permissions.
pub fn ensure_private_dir(dir: &std::path::Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn private_dir_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("zed");
        ensure_private_dir(&dir).unwrap();
        let mode = std::fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
