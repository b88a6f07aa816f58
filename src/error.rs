//! Error types for narrate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NarrateError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Missing credential: environment variable {var} is not set")]
    MissingCredential { var: String },

    // Script errors
    #[error("Invalid dialogue script: {message}")]
    Script { message: String },

    // Audio container errors
    #[error("Invalid audio container: {message}")]
    AudioFormat { message: String },

    #[error("Audio format mismatch: expected {expected}, got {actual}")]
    AudioFormatMismatch { expected: String, actual: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    // Provider errors
    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Voice classification failed: {message}")]
    Classification { message: String },

    #[error("Provider request failed: {message}")]
    Provider { message: String },

    // Pipeline errors
    #[error("Failed to stitch segments for section {index}: {message}")]
    Stitch { index: usize, message: String },

    #[error("Failed to prepare output location {path}: {message}")]
    OutputSetup { path: String, message: String },

    #[error("Interrupted")]
    Interrupted,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, NarrateError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_invalid_value_display() {
        let error = NarrateError::ConfigInvalidValue {
            key: "generation.concurrency".to_string(),
            message: "must be at least 1".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for generation.concurrency: must be at least 1"
        );
    }

    #[test]
    fn test_missing_credential_display() {
        let error = NarrateError::MissingCredential {
            var: "OPENAI_API_KEY".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Missing credential: environment variable OPENAI_API_KEY is not set"
        );
    }

    #[test]
    fn test_audio_format_display() {
        let error = NarrateError::AudioFormat {
            message: "missing RIFF tag".to_string(),
        };
        assert_eq!(error.to_string(), "Invalid audio container: missing RIFF tag");
    }

    #[test]
    fn test_audio_format_mismatch_display() {
        let error = NarrateError::AudioFormatMismatch {
            expected: "24000 Hz, 1 ch, 16 bit".to_string(),
            actual: "44100 Hz, 2 ch, 16 bit".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Audio format mismatch: expected 24000 Hz, 1 ch, 16 bit, got 44100 Hz, 2 ch, 16 bit"
        );
    }

    #[test]
    fn test_stitch_display_names_section() {
        let error = NarrateError::Stitch {
            index: 7,
            message: "chunk file missing".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to stitch segments for section 7: chunk file missing"
        );
    }

    #[test]
    fn test_output_setup_display() {
        let error = NarrateError::OutputSetup {
            path: "/read-only/out".to_string(),
            message: "permission denied".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to prepare output location /read-only/out: permission denied"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: NarrateError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: NarrateError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error: NarrateError = json_error.into();
        assert!(error.to_string().starts_with("JSON error"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: NarrateError = io_error.into();

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<NarrateError>();
        assert_sync::<NarrateError>();
    }
}
