use serde::de::DeserializeOwned;
use std::io::{self, Read};

/// Deserialize a request piped on stdin.
///
/// `None` when stdin is a terminal or carries only whitespace, so the
/// caller can report which flag was missing.
pub fn read_piped<T: DeserializeOwned>() -> Result<Option<T>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut body = String::new();
    io::stdin().lock().read_to_string(&mut body)?;
    if body.trim().is_empty() {
        return Ok(None);
    }

    let request = serde_json::from_str(&body)
        .map_err(|e| format!("Stdin is not a valid request: {}", e))?;
    Ok(Some(request))
}
