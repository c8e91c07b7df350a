//! Error types for configuration resolution.

/// Errors that can occur while resolving the cache configuration.
///
/// None of these are fatal to the driver: a failed resolution disables the
/// cache for the lifetime of the process.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No environment variable named a location and the working directory
    /// could not be determined.
    #[error("cannot determine cache directory: {0}")]
    NoCacheDirectory(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_no_cache_directory() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "cwd removed");
        let err = ConfigError::NoCacheDirectory(io_err);
        let display = format!("{err}");
        assert!(display.starts_with("cannot determine cache directory:"));
        assert!(display.contains("cwd removed"));
    }
}
