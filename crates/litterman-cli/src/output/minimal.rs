use serde_json::Value;

use super::format_cell;

/// Key answer of each command, as JSON pointers into the result object.
const PRIORITY_POINTERS: &[&str] = &[
    "/sharpe_ratio",
    "/optimization/sharpe_ratio",
    "/delta",
    "/shrinkage_intensity",
    "/selected",
    "/applied",
    "/posterior/values",
];

/// Print just the key answer value from the output, falling back to the
/// first field of the result.
pub fn print_minimal(value: &Value) {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    for pointer in PRIORITY_POINTERS {
        if let Some(val) = result.pointer(pointer) {
            if !val.is_null() {
                println!("{}", format_cell(val));
                return;
            }
        }
    }

    if let Some((key, val)) = result.as_object().and_then(|m| m.iter().next()) {
        println!("{}: {}", key, format_cell(val));
        return;
    }

    println!("{}", format_cell(result));
}
