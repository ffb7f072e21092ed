use serde_json::Value;
use std::io::{self, Write};

/// Pretty JSON on stdout. The envelope is streamed rather than built as
/// one string, since pipeline output carries full matrices.
pub fn print_json(value: &Value) {
    let mut out = io::stdout().lock();
    let written = serde_json::to_writer_pretty(&mut out, value)
        .map_err(io::Error::from)
        .and_then(|_| writeln!(out));
    if let Err(e) = written {
        tracing::error!(error = %e, "failed to write JSON output");
    }
}
