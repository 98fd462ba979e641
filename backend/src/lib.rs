pub mod types;
pub mod helpers;
pub mod roman;
pub mod classifier;
pub mod segmenter;
pub mod metadata;
pub mod enrich;
pub mod assembler;
pub mod sink;
pub mod source;
pub mod pipeline;
pub mod chunker;
pub mod answer;
pub mod config;
pub mod logger;

use std::env;
use std::fs::create_dir_all;
use std::path::PathBuf;
use std::error::Error;
use app_dirs::{get_app_root, AppDataType, AppInfo};

/// Placeholder stored for every metadata field without a known value.
pub static NOT_AVAILABLE: &str = "Not_Available";

pub const APP_INFO: AppInfo = AppInfo{name: "kinhsach", author: "kinhsach"};

/// Returns the data directory used for logs and the metadata cache.
///
/// Precedence:
/// - the KINHSACH_DIR environment variable
/// - the platform user data folder, e.g. ~/.local/share/kinhsach
pub fn get_create_kinhsach_dir() -> Result<PathBuf, Box<dyn Error>> {
    let p = match env::var("KINHSACH_DIR") {
        Ok(s) if !s.is_empty() => PathBuf::from(s),
        _ => get_app_root(AppDataType::UserData, &APP_INFO)?,
    };
    if !p.exists() {
        create_dir_all(&p)?;
    }
    Ok(p)
}
