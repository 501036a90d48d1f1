//! Errors raised while preparing a run

use thiserror::Error;

/// Setup failures: settings, credentials and input files.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No usable API key could be resolved
    #[error("credentials unavailable: {0}")]
    Credentials(String),

    /// Input directory or block files cannot be used
    #[error("input error: {0}")]
    Input(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_identify_the_stage() {
        assert_eq!(
            Error::Config("workers must be greater than 0".into()).to_string(),
            "invalid configuration: workers must be greater than 0"
        );
        assert_eq!(
            Error::Credentials("no keys set".into()).to_string(),
            "credentials unavailable: no keys set"
        );
        assert_eq!(
            Error::Input("audio-input missing".into()).to_string(),
            "input error: audio-input missing"
        );
    }

    #[test]
    fn io_and_toml_errors_convert() {
        let io: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(io, Error::Io(_)));
        assert!(io.to_string().starts_with("I/O error:"), "got: {io}");

        let toml_err: Error = toml::from_str::<toml::Table>("workers = ")
            .unwrap_err()
            .into();
        assert!(matches!(toml_err, Error::Toml(_)));
        assert!(toml_err.to_string().starts_with("malformed TOML:"));
    }
}
