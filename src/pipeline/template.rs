// src/pipeline/template.rs

//! `{name}` placeholder templates used in stage paths and arguments.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid")
});

/// Placeholders available to `input_dir` / `output_dir`.
pub const DIR_PLACEHOLDERS: &[&str] = &["run_dir", "run", "settled_path"];

/// Placeholders available to `args` of every stage.
pub const ARG_PLACEHOLDERS: &[&str] = &[
    "run_dir",
    "run",
    "settled_path",
    "input_dir",
    "output_dir",
];

/// Extra placeholders available to `args` of stages with `units`.
pub const UNIT_PLACEHOLDERS: &[&str] = &["unit", "unit_name", "index"];

/// Names of all placeholders in `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// First placeholder in `template` that is not in `allowed`.
pub fn unknown_placeholder<'a>(template: &'a str, allowed: &[&str]) -> Option<&'a str> {
    placeholders(template)
        .into_iter()
        .find(|name| !allowed.contains(name))
}

/// Substitute every `{name}` with its value from `vars`.
///
/// Fails on the first placeholder without a value.
pub fn render(template: &str, vars: &BTreeMap<&str, String>) -> Result<String, String> {
    if let Some(missing) = placeholders(template)
        .into_iter()
        .find(|name| !vars.contains_key(name))
    {
        return Err(format!(
            "no value for placeholder '{{{missing}}}' in template '{template}'"
        ));
    }

    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        vars.get(&caps[1]).cloned().unwrap_or_default()
    });
    Ok(rendered.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("run_dir", "run0042".to_string()),
            ("run", "0042".to_string()),
        ])
    }

    #[test]
    fn renders_known_placeholders() {
        let out = render("/data/fitted/{run_dir}/run-{run}.root", &vars()).unwrap();
        assert_eq!(out, "/data/fitted/run0042/run-0042.root");
    }

    #[test]
    fn missing_value_is_an_error() {
        let err = render("{run_dir}/{unit}", &vars()).unwrap_err();
        assert!(err.contains("{unit}"), "{err}");
    }

    #[test]
    fn text_without_placeholders_passes_through() {
        assert_eq!(render("--verbose", &vars()).unwrap(), "--verbose");
        assert_eq!(render("{ not a placeholder }", &vars()).unwrap(), "{ not a placeholder }");
    }

    #[test]
    fn reports_unknown_placeholder() {
        assert_eq!(
            unknown_placeholder("/x/{run_dir}/{segment}", DIR_PLACEHOLDERS),
            Some("segment")
        );
        assert_eq!(unknown_placeholder("/x/{run_dir}", DIR_PLACEHOLDERS), None);
    }
}
