//! New-file materialization: template placeholder substitution and empty
//! scene stubs for supported authoring software

use pulsar_common::{Error, Result};

/// Extension and content of an empty scene recognized by `software`
///
/// Returns `None` for software without a known text stub.
pub fn software_stub(software: &str, name: &str) -> Option<(&'static str, String)> {
    match software.to_ascii_lowercase().as_str() {
        "maya" => Some((
            "ma",
            format!(
                "//Maya ASCII scene\n//Name: {name}.ma\nrequires maya \"2018\";\ncurrentUnit -l centimeter -a degree -t film;\n"
            ),
        )),
        "nuke" => Some((
            "nk",
            format!("#! nuke -nx\nversion 12.0\nRoot {{\n inputs 0\n name {name}.nk\n}}\n"),
        )),
        _ => None,
    }
}

/// Replace every `{{key}}` in `content` with its value
///
/// Substituted values are copied as-is and never rescanned. Unknown
/// placeholders are left in place.
pub fn render_template(content: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let value = after.find("}}").and_then(|end| {
            vars.iter()
                .find(|(key, _)| *key == &after[..end])
                .map(|(_, value)| (*value, end))
        });
        match value {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Check that `value` can be used as a single path component
pub fn validate_component(kind: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{} name is empty", kind)));
    }
    if value.starts_with('.') || value.contains(['/', '\\']) || value.contains('\0') {
        return Err(Error::InvalidInput(format!(
            "{} name '{}' is not a plain name",
            kind, value
        )));
    }
    Ok(())
}
