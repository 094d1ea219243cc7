//! Configuration constants, option validation and template loading.

use std::fs;
use std::path::Path;

use crate::error::{Result, TranscodeError};
use crate::template::Template;

/// Default field delimiter.
pub const DEFAULT_DELIMITER: &str = "|";

/// Default number of processed records held before the output is flushed.
///
/// Trades memory for fewer write syscalls; each record is the complete text
/// of one matched subtree.
pub const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Report progress every this many processed records.
pub const PROGRESS_INTERVAL: usize = 100;

/// Spinner redraw interval in milliseconds.
pub const PROGRESS_TICK_MS: u64 = 100;

/// Values of the `strip` option that disable whitespace stripping.
const STRIP_FALSE_VALUES: [&str; 4] = ["false", "no", "n", "0"];

/// Validate the field delimiter.
///
/// # Examples
/// ```
/// use xml2delim::config::validate_delimiter;
///
/// assert!(validate_delimiter("|").is_ok());
/// assert!(validate_delimiter("\t").is_ok());
/// assert!(validate_delimiter("").is_err());
/// ```
pub fn validate_delimiter(delimiter: &str) -> Result<()> {
    let reason = if delimiter.is_empty() {
        "must not be empty"
    } else if delimiter.contains('\n') {
        "must not contain a newline"
    } else {
        return Ok(());
    };

    Err(TranscodeError::InvalidOption {
        name: "delimiter".to_string(),
        value: delimiter.to_string(),
        reason: reason.to_string(),
    })
}

/// Validate the pending-record buffer size.
pub fn validate_buffer_size(size: usize) -> Result<()> {
    if size == 0 {
        return Err(TranscodeError::InvalidOption {
            name: "buffer-size".to_string(),
            value: size.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

/// Interpret a `strip` flag value.
///
/// `false`, `no`, `n` and `0` (any case) disable stripping; anything else
/// enables it.
///
/// # Examples
/// ```
/// use xml2delim::config::parse_strip_flag;
///
/// assert!(parse_strip_flag("true"));
/// assert!(parse_strip_flag("yes"));
/// assert!(!parse_strip_flag("No"));
/// assert!(!parse_strip_flag("0"));
/// ```
#[must_use]
pub fn parse_strip_flag(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    !STRIP_FALSE_VALUES.contains(&value.as_str())
}

/// Options given as trailing `key=value` arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyOptions {
    /// `bar=<delimiter>`
    pub delimiter: Option<String>,
    /// `strip=<flag>`
    pub strip_whitespace: Option<bool>,
}

/// Parse trailing `key=value` arguments.
///
/// Arguments without `=` are ignored with a warning, as are unknown keys.
pub fn parse_legacy_options<S: AsRef<str>>(args: &[S]) -> LegacyOptions {
    let mut options = LegacyOptions::default();

    for arg in args {
        let arg = arg.as_ref();
        let Some((key, value)) = arg.split_once('=') else {
            tracing::warn!(argument = %arg, "Ignoring argument without '='");
            continue;
        };
        match key {
            "bar" => options.delimiter = Some(value.to_string()),
            "strip" => options.strip_whitespace = Some(parse_strip_flag(value)),
            _ => tracing::warn!(option = %key, "Ignoring unknown option"),
        }
    }

    options
}

/// Check input files exist and the output directory is present.
///
/// An output path without a directory component refers to the current
/// directory.
pub fn validate_paths(source: &Path, template: &Path, output: &Path) -> Result<()> {
    for input in [source, template] {
        if !input.is_file() {
            return Err(TranscodeError::InputNotFound(input.to_path_buf()));
        }
    }

    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.is_dir() {
            return Err(TranscodeError::OutputDirMissing(dir.to_path_buf()));
        }
    }

    Ok(())
}

/// Template file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFormat {
    Json,
    Yaml,
}

impl TemplateFormat {
    /// Pick the format from the file extension; JSON unless `.yaml`/`.yml`.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml" | "yml") => Self::Yaml,
            _ => Self::Json,
        }
    }
}

/// Parse template text in the given format.
pub fn parse_template(text: &str, format: TemplateFormat, path: &Path) -> Result<Template> {
    let parsed = match format {
        TemplateFormat::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        TemplateFormat::Yaml => serde_yaml_ng::from_str(text).map_err(|e| e.to_string()),
    };

    parsed.map_err(|message| TranscodeError::ConfigParse {
        path: path.to_path_buf(),
        message,
    })
}

/// Load a template file, keeping key order.
pub fn load_template(path: &Path) -> Result<Template> {
    let text = fs::read_to_string(path).map_err(|source| TranscodeError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let format = TemplateFormat::from_path(path);
    let template = parse_template(&text, format, path)?;

    tracing::debug!(
        path = %path.display(),
        ?format,
        entries = template.len(),
        "Loaded template"
    );
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_constants_are_reasonable() {
        assert!(DEFAULT_BUFFER_SIZE >= PROGRESS_INTERVAL);
        assert!(validate_delimiter(DEFAULT_DELIMITER).is_ok());
    }

    #[test]
    fn test_validate_delimiter() {
        assert!(validate_delimiter(",").is_ok());
        assert!(validate_delimiter("||").is_ok());
        assert!(validate_delimiter("").is_err());
        assert!(validate_delimiter("\n").is_err());
    }

    #[test]
    fn test_validate_buffer_size() {
        assert!(validate_buffer_size(1).is_ok());
        assert!(validate_buffer_size(0).is_err());
    }

    #[test]
    fn test_parse_strip_flag() {
        for off in ["false", "FALSE", "no", "n", "N", "0", " no "] {
            assert!(!parse_strip_flag(off), "{off:?} should disable stripping");
        }
        for on in ["true", "yes", "1", "y", "whatever", ""] {
            assert!(parse_strip_flag(on), "{on:?} should enable stripping");
        }
    }

    #[test]
    fn test_parse_legacy_options() {
        let options = parse_legacy_options(&["bar=;", "strip=no", "verbose", "other=1"]);
        assert_eq!(
            options,
            LegacyOptions {
                delimiter: Some(";".to_string()),
                strip_whitespace: Some(false),
            }
        );

        assert_eq!(parse_legacy_options::<&str>(&[]), LegacyOptions::default());
        // value may itself contain '='
        assert_eq!(
            parse_legacy_options(&["bar=a=b"]).delimiter.as_deref(),
            Some("a=b")
        );
    }

    #[test]
    fn test_template_format_from_path() {
        assert_eq!(TemplateFormat::from_path(Path::new("t.json")), TemplateFormat::Json);
        assert_eq!(TemplateFormat::from_path(Path::new("t.YAML")), TemplateFormat::Yaml);
        assert_eq!(TemplateFormat::from_path(Path::new("t.yml")), TemplateFormat::Yaml);
        assert_eq!(TemplateFormat::from_path(Path::new("template")), TemplateFormat::Json);
    }

    #[test]
    fn test_validate_paths() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.xml");
        let template = dir.path().join("t.json");
        std::fs::write(&source, "<r/>").unwrap();
        std::fs::write(&template, "{}").unwrap();

        assert!(validate_paths(&source, &template, &dir.path().join("out.txt")).is_ok());
        assert!(validate_paths(&source, &template, Path::new("out.txt")).is_ok());

        let missing = dir.path().join("nope.xml");
        assert!(matches!(
            validate_paths(&missing, &template, &dir.path().join("out.txt")),
            Err(TranscodeError::InputNotFound(p)) if p == missing
        ));
        assert!(matches!(
            validate_paths(&source, &template, &dir.path().join("no/such/out.txt")),
            Err(TranscodeError::OutputDirMissing(_))
        ));
    }

    #[test]
    fn test_load_template_json_and_yaml() {
        let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(json, r#"{{"root": {{"R": ["=id"]}}}}"#).unwrap();
        let mut yaml = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        write!(yaml, "root:\n  R: ['=id']\n").unwrap();

        let from_json = load_template(json.path()).unwrap();
        let from_yaml = load_template(yaml.path()).unwrap();
        assert_eq!(from_json, from_yaml);
        assert_eq!(from_json, Template::new().with_sub("root", Template::new().with_fields("R", ["=id"])));
    }

    #[test]
    fn test_load_template_errors() {
        let missing = load_template(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(missing, TranscodeError::ConfigRead { .. }));

        let mut bad = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(bad, r#"{{"root": 5}}"#).unwrap();
        let err = load_template(bad.path()).unwrap_err();
        assert!(matches!(err, TranscodeError::ConfigParse { .. }));
    }
}
