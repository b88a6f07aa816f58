//! Pre-flight checks for `narrate check`.
//!
//! Verifies that a run would get past setup: configuration, credential,
//! script and output location.

use crate::config::Config;
use crate::error::Result;
use crate::script::Script;
use owo_colors::OwoColorize;
use std::path::Path;

/// Result of a single check.
#[derive(Debug, PartialEq)]
pub enum CheckResult {
    /// Everything fine, with a short detail
    Ok(String),
    /// Usable, but worth a look
    Warning(String),
    /// A run would fail
    Failed(String),
}

impl CheckResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, CheckResult::Failed(_))
    }
}

/// Configuration as a run would load it, and its validity.
///
/// `loaded` is the result of loading `path` with environment and command-line
/// overrides applied.
pub fn check_config(loaded: Result<Config>, path: &Path) -> (CheckResult, Option<Config>) {
    let config = match loaded {
        Ok(config) => config,
        Err(e) => return (CheckResult::Failed(e.to_string()), None),
    };
    let result = match config.validate() {
        Ok(()) if path.exists() => CheckResult::Ok(path.display().to_string()),
        Ok(()) => CheckResult::Ok(format!("{} not found, using defaults", path.display())),
        Err(e) => CheckResult::Failed(e.to_string()),
    };
    (result, Some(config))
}

/// The API key variable is set and non-empty.
pub fn check_credential(config: &Config) -> CheckResult {
    match config.api_key() {
        Ok(_) => CheckResult::Ok(format!("{} is set", config.provider.api_key_env)),
        Err(e) => CheckResult::Failed(e.to_string()),
    }
}

/// The script parses and its menu is consistent.
pub fn check_script(config: &Config) -> CheckResult {
    let script = match Script::load_or_embedded(config.script_path().as_deref()) {
        Ok(script) => script,
        Err(e) => return CheckResult::Failed(e.to_string()),
    };
    match script.validate() {
        Ok(warnings) if warnings.is_empty() => CheckResult::Ok(format!(
            "{} sections, {} menu entries",
            script.len(),
            script.menu.len()
        )),
        Ok(warnings) => CheckResult::Warning(warnings.join("; ")),
        Err(e) => CheckResult::Failed(e.to_string()),
    }
}

/// The output location is a directory, or can be created.
pub fn check_output_dir(dir: &Path) -> CheckResult {
    if dir.is_dir() {
        return CheckResult::Ok(format!("{} (will be cleared)", dir.display()));
    }
    if dir.exists() {
        return CheckResult::Failed(format!("{} exists but is not a directory", dir.display()));
    }
    CheckResult::Warning(format!("{} does not exist yet, will be created", dir.display()))
}

fn print_result(label: &str, result: &CheckResult) {
    print!("{label}: ");
    match result {
        CheckResult::Ok(detail) => println!("{} {}", "✓ OK".green(), detail),
        CheckResult::Warning(msg) => println!("{} {}", "⚠ WARNING:".yellow(), msg),
        CheckResult::Failed(msg) => println!("{} {}", "✗ FAILED:".red(), msg),
    }
}

/// Run all checks and print results. Returns `false` if any check failed.
pub fn run_checks(loaded: Result<Config>, config_path: &Path) -> bool {
    println!("Checking narration setup...\n");

    let (config_result, config) = check_config(loaded, config_path);
    print_result("Configuration", &config_result);

    let Some(config) = config else {
        return false;
    };

    let results = [
        ("Credential", check_credential(&config)),
        ("Script", check_script(&config)),
        ("Output directory", check_output_dir(&config.output.dir)),
    ];
    for (label, result) in &results {
        print_result(label, result);
    }

    let ok = !config_result.is_failed() && !results.iter().any(|(_, r)| r.is_failed());
    println!();
    if ok {
        println!("{}", "Ready to generate.".green());
    } else {
        println!("{}", "Fix the failures above before generating.".red());
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{apply_cli_overrides, load_config};
    use crate::cli::Cli;
    use crate::error::NarrateError;
    use clap::Parser;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn loaded_for(args: &[&str]) -> Result<Config> {
        let cli = Cli::try_parse_from(args).unwrap();
        load_config(cli.config.as_deref()).map(|config| apply_cli_overrides(config, &cli))
    }

    #[test]
    fn test_missing_default_config_uses_defaults() {
        let (result, config) = check_config(
            Ok(Config::default()),
            Path::new("/nonexistent/narrate.toml"),
        );
        assert!(matches!(result, CheckResult::Ok(ref d) if d.contains("using defaults")));
        assert!(config.is_some());
    }

    #[test]
    fn test_explicit_missing_config_fails() {
        let path = Path::new("/nonexistent/narrate/check.toml");
        let (result, config) = check_config(
            loaded_for(&["narrate", "check", "--config", "/nonexistent/narrate/check.toml"]),
            path,
        );
        assert!(result.is_failed());
        assert!(config.is_none());
    }

    #[test]
    fn test_invalid_config_fails() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[generation]\nconcurrency = 0\n").unwrap();

        let (result, _) = check_config(Config::load(file.path()), file.path());
        assert!(result.is_failed());
    }

    #[test]
    fn test_unparseable_config_fails_without_config() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[generation\n").unwrap();

        let (result, config) = check_config(Config::load(file.path()), file.path());
        assert!(result.is_failed());
        assert!(config.is_none());
    }

    #[test]
    fn test_command_line_concurrency_is_checked() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[generation]\nconcurrency = 4\n").unwrap();
        let path = file.path().to_str().unwrap();

        let (result, config) =
            check_config(loaded_for(&["narrate", "check", "--config", path, "-j", "0"]), file.path());
        assert!(result.is_failed(), "{result:?}");
        assert_eq!(config.unwrap().generation.concurrency, 0);
    }

    #[test]
    fn test_command_line_script_is_checked() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"").unwrap();
        let path = file.path().to_str().unwrap();

        let loaded = loaded_for(&[
            "narrate",
            "check",
            "--config",
            path,
            "--script",
            "/nonexistent/other-script.toml",
        ]);
        let (_, config) = check_config(loaded, file.path());
        let config = config.unwrap();

        assert_eq!(config.script.path, "/nonexistent/other-script.toml");
        assert!(check_script(&config).is_failed());
    }

    #[test]
    fn test_run_checks_fails_on_missing_script_override() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"").unwrap();
        let path = file.path().to_str().unwrap();

        let loaded = loaded_for(&[
            "narrate",
            "check",
            "--config",
            path,
            "--script",
            "/nonexistent/other-script.toml",
        ]);
        assert!(!run_checks(loaded, file.path()));
    }

    #[test]
    fn test_load_error_is_reported() {
        let (result, _) = check_config(
            Err(NarrateError::ConfigParse {
                message: "bad".to_string(),
            }),
            Path::new("/etc/narrate.toml"),
        );
        assert_eq!(
            result,
            CheckResult::Failed("Failed to parse configuration: bad".to_string())
        );
    }

    #[test]
    fn test_credential_missing() {
        let mut config = Config::default();
        config.provider.api_key_env = "NARRATE_DIAG_KEY_NEVER_SET".to_string();
        assert!(check_credential(&config).is_failed());
    }

    #[test]
    fn test_embedded_script_passes_with_known_warning() {
        let result = check_script(&Config::default());
        assert!(!result.is_failed(), "{result:?}");
    }

    #[test]
    fn test_output_dir_states() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(check_output_dir(dir.path()), CheckResult::Ok(_)));
        assert!(matches!(
            check_output_dir(&dir.path().join("new")),
            CheckResult::Warning(_)
        ));

        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert!(check_output_dir(&file).is_failed());
    }
}
