//! Cache directory and size budget resolution.

use std::path::PathBuf;

use crate::env::EnvSource;
use crate::error::ConfigError;
use crate::types::{
    CACHE_DIR_NAME, CACHE_DIR_VAR, CACHE_SIZE_VAR, DEFAULT_MAX_SIZE_BYTES, HIDDEN_CACHE_PATH,
    HOME_VAR, XDG_CACHE_HOME_VAR,
};

/// Resolves the cache directory from the environment.
///
/// Returns `Ok(None)` when `ZE_INTEL_NPU_CACHE_DIR` is set to an empty string,
/// which turns the cache off. Empty `XDG_CACHE_HOME` and `HOME` values are
/// treated as unset. The working directory is only consulted when no
/// variable applies.
pub fn resolve_cache_dir(env: &impl EnvSource) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(dir) = env.var(CACHE_DIR_VAR) {
        if dir.is_empty() {
            return Ok(None);
        }
        return Ok(Some(PathBuf::from(dir)));
    }

    if let Some(xdg) = env.var(XDG_CACHE_HOME_VAR).filter(|v| !v.is_empty()) {
        return Ok(Some(PathBuf::from(xdg).join(CACHE_DIR_NAME)));
    }

    if let Some(home) = env.var(HOME_VAR).filter(|v| !v.is_empty()) {
        return Ok(Some(PathBuf::from(home).join(HIDDEN_CACHE_PATH)));
    }

    let cwd = env.current_dir()?;
    Ok(Some(cwd.join(HIDDEN_CACHE_PATH)))
}

/// Resolves the cache size budget in bytes.
///
/// Absent or unparsable values fall back to the 4 GiB default.
pub fn resolve_max_size(env: &impl EnvSource) -> u64 {
    let Some(raw) = env.var(CACHE_SIZE_VAR) else {
        return DEFAULT_MAX_SIZE_BYTES;
    };

    match raw.to_str().map(str::trim).map(str::parse::<u64>) {
        Some(Ok(bytes)) => bytes,
        _ => {
            tracing::warn!(
                value = ?raw,
                "ignoring unparsable {CACHE_SIZE_VAR}, using default of {DEFAULT_MAX_SIZE_BYTES} bytes"
            );
            DEFAULT_MAX_SIZE_BYTES
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnv;

    #[test]
    fn explicit_override_wins() {
        let env = MapEnv::new()
            .with_var(CACHE_DIR_VAR, "/opt/npu-cache")
            .with_var(XDG_CACHE_HOME_VAR, "/home/u/.xdg")
            .with_var(HOME_VAR, "/home/u")
            .with_current_dir("/work");
        assert_eq!(
            resolve_cache_dir(&env).unwrap(),
            Some(PathBuf::from("/opt/npu-cache"))
        );
    }

    #[test]
    fn empty_override_disables_cache() {
        let env = MapEnv::new()
            .with_var(CACHE_DIR_VAR, "")
            .with_var(HOME_VAR, "/home/u");
        assert_eq!(resolve_cache_dir(&env).unwrap(), None);
    }

    #[test]
    fn xdg_cache_home_is_second() {
        let env = MapEnv::new()
            .with_var(XDG_CACHE_HOME_VAR, "/home/u/.xdg")
            .with_var(HOME_VAR, "/home/u");
        assert_eq!(
            resolve_cache_dir(&env).unwrap(),
            Some(PathBuf::from("/home/u/.xdg/ze_intel_npu_cache"))
        );
    }

    #[test]
    fn home_is_third() {
        let env = MapEnv::new()
            .with_var(HOME_VAR, "/home/u")
            .with_current_dir("/work");
        assert_eq!(
            resolve_cache_dir(&env).unwrap(),
            Some(PathBuf::from("/home/u/.cache/ze_intel_npu_cache"))
        );
    }

    #[test]
    fn empty_xdg_falls_through_to_home() {
        let env = MapEnv::new()
            .with_var(XDG_CACHE_HOME_VAR, "")
            .with_var(HOME_VAR, "/home/u");
        assert_eq!(
            resolve_cache_dir(&env).unwrap(),
            Some(PathBuf::from("/home/u/.cache/ze_intel_npu_cache"))
        );
    }

    #[test]
    fn working_directory_is_last() {
        let env = MapEnv::new().with_current_dir("/work");
        assert_eq!(
            resolve_cache_dir(&env).unwrap(),
            Some(PathBuf::from("/work/.cache/ze_intel_npu_cache"))
        );
    }

    #[test]
    fn no_location_at_all_errors() {
        let err = resolve_cache_dir(&MapEnv::new()).unwrap_err();
        assert!(matches!(err, ConfigError::NoCacheDirectory(_)));
    }

    #[test]
    fn size_defaults_when_absent() {
        assert_eq!(resolve_max_size(&MapEnv::new()), DEFAULT_MAX_SIZE_BYTES);
    }

    #[test]
    fn size_parses_byte_count() {
        let env = MapEnv::new().with_var(CACHE_SIZE_VAR, "1048576");
        assert_eq!(resolve_max_size(&env), 1_048_576);
    }

    #[test]
    fn size_tolerates_surrounding_whitespace() {
        let env = MapEnv::new().with_var(CACHE_SIZE_VAR, " 4096\n");
        assert_eq!(resolve_max_size(&env), 4096);
    }

    #[test]
    fn size_allows_zero() {
        let env = MapEnv::new().with_var(CACHE_SIZE_VAR, "0");
        assert_eq!(resolve_max_size(&env), 0);
    }

    #[test]
    fn unparsable_size_uses_default() {
        for bad in ["", "4GB", "-1", "12abc", "99999999999999999999999"] {
            let env = MapEnv::new().with_var(CACHE_SIZE_VAR, bad);
            assert_eq!(resolve_max_size(&env), DEFAULT_MAX_SIZE_BYTES, "input {bad:?}");
        }
    }
}
