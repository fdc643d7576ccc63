use std::path::PathBuf;

/// Standardized application directories for chatprobe.
///
/// - Project-level: ./.chatprobe
/// - User-level config: OS-specific dirs
pub struct AppPaths;

impl AppPaths {
    /// Return the project-level .chatprobe directory (relative to current working dir)
    pub fn project_dir() -> PathBuf {
        PathBuf::from(".chatprobe")
    }

    /// Return the project-level config path: ./.chatprobe/config.toml
    pub fn project_config() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    /// Return the user-level config directory (platform-specific)
    pub fn user_config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "chatprobe").map(|d| d.config_dir().to_path_buf())
    }

    pub fn user_config() -> Option<PathBuf> {
        Self::user_config_dir().map(|d| d.join("config.toml"))
    }

    /// Config file used when none is given explicitly: the project file if
    /// it exists, else the user file if it exists.
    pub fn discover_config() -> Option<PathBuf> {
        let project = Self::project_config();
        if project.is_file() {
            return Some(project);
        }
        Self::user_config().filter(|user| user.is_file())
    }
}
