//! Data directory selection
//!
//! The data root lives next to the executable so an installation stays portable and
//! several installations can run side by side. When the executable's location cannot
//! be determined the home directory is used instead.

use anyhow::Context;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Name of the data directory
pub const DATA_DIR_NAME: &str = ".xdschat";

/// Select the data root for this process
pub fn select_data_dir_root() -> Result<PathBuf> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    let home = dirs::home_dir();

    let root = data_dir_root_from(exe_dir.as_deref(), home.as_deref())
        .context("neither the executable directory nor the home directory is known")?;
    Ok(root)
}

/// Resolve the data root from the executable directory, falling back to home
pub fn data_dir_root_from(exe_dir: Option<&Path>, home: Option<&Path>) -> Option<PathBuf> {
    exe_dir.or(home).map(|base| base.join(DATA_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_executable_directory() {
        let root = data_dir_root_from(Some(Path::new("/opt/xdschat")), Some(Path::new("/home/u")));
        assert_eq!(root, Some(PathBuf::from("/opt/xdschat/.xdschat")));
    }

    #[test]
    fn test_falls_back_to_home() {
        let root = data_dir_root_from(None, Some(Path::new("/home/u")));
        assert_eq!(root, Some(PathBuf::from("/home/u/.xdschat")));
        assert_eq!(data_dir_root_from(None, None), None);
    }

    #[test]
    fn test_select_uses_data_dir_name() {
        let root = select_data_dir_root().unwrap();
        assert!(root.ends_with(DATA_DIR_NAME));
    }
}
