//! Resolves where the persisted state described in spec §6 lives: the
//! known-servers/settings JSON file and the server identity cookie file,
//! both under the user config directory.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

/// Directory holding `session_settings.json` and `server_cookie`, created on
/// first use.
pub fn config_dir() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(std::env::temp_dir);
    base.join("wivrn-core")
}

pub fn session_settings_path() -> PathBuf {
    config_dir().join("session_settings.json")
}

pub fn cookie_path() -> PathBuf {
    config_dir().join("server_cookie")
}

pub fn log_dir() -> PathBuf {
    config_dir().join("logs")
}

fn ensure_config_dir() -> io::Result<()> {
    fs::create_dir_all(config_dir())
}

/// Loads the 32-char random server identity, creating it if absent.
pub fn load_or_create_cookie() -> io::Result<String> {
    ensure_config_dir()?;
    let path = cookie_path();
    match fs::read_to_string(&path) {
        Ok(cookie) if cookie.len() == 32 => Ok(cookie),
        _ => {
            let cookie = generate_cookie();
            fs::write(&path, &cookie)?;
            Ok(cookie)
        }
    }
}

fn generate_cookie() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> io::Result<()> {
    ensure_config_dir()?;
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(path, json)
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<T> {
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
