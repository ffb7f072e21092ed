pub mod config;
pub mod file;
pub mod prices;
pub mod stdin;

use serde::de::DeserializeOwned;

/// Request body from `--input <file.json>`, else from piped stdin.
pub fn read_request<T: DeserializeOwned>(
    path: Option<&str>,
) -> Result<T, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        return file::read_json(path);
    }
    stdin::read_piped()?.ok_or_else(|| "--input is required (or pipe JSON on stdin)".into())
}
