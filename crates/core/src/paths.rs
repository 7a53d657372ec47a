use std::path::{Path, PathBuf};

pub const DEFAULT_ZIP_FILENAME: &str = "timestamp_clips.zip";

pub fn get_root_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("clipmark")
}

pub fn get_config_path() -> PathBuf {
    get_root_config_dir().join("config.toml")
}

/// Directory backing the durable session entries
pub fn get_session_dir() -> PathBuf {
    get_root_config_dir().join("session")
}

pub fn get_download_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Where an archive lands inside `dir`. Only the last component of the
/// server supplied name is used.
pub fn get_archive_path(dir: &Path, zip_filename: Option<&str>) -> PathBuf {
    let name = zip_filename
        .and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_ZIP_FILENAME);
    dir.join(name)
}
