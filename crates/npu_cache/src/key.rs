//! Cache key derivation from compilation inputs.
//!
//! A key is the hex digest of every input that can change the compiler's
//! output, fed in a fixed order. The order and the presence of each field
//! are part of the on-disk contract: reordering them silently invalidates
//! every existing cache.

use std::fmt;
use std::ops::BitOr;

use npu_common::Digest;
use serde::Serialize;

use crate::error::GraphError;

/// Driver build identifier mixed into every key.
///
/// Bump this whenever the driver changes how it consumes compiled blobs, so
/// that stale entries stop matching instead of being migrated.
pub const DRIVER_VERSION: u32 = 0x0001_0000;

/// The encoding of a graph description's input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphFormat {
    /// A ready-to-run compiled blob.
    Native,
    /// An intermediate representation that must be compiled.
    Intermediate,
}

impl GraphFormat {
    /// Returns the numeric discriminator used in key derivation.
    pub fn as_raw(self) -> u32 {
        match self {
            GraphFormat::Native => 0x1,
            GraphFormat::Intermediate => 0x2,
        }
    }

    /// Decodes a numeric discriminator.
    pub fn from_raw(raw: u32) -> Result<Self, GraphError> {
        match raw {
            0x1 => Ok(GraphFormat::Native),
            0x2 => Ok(GraphFormat::Intermediate),
            other => Err(GraphError::UnsupportedFormat(other)),
        }
    }
}

/// Graph creation flags.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct GraphFlags(u32);

impl GraphFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Bypass the disk cache for this graph.
    pub const DISABLE_CACHING: Self = Self(0x1);
    /// Compile with profiling enabled.
    pub const ENABLE_PROFILING: Self = Self(0x2);

    /// Creates flags from raw bits. Unknown bits are kept.
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every bit in `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for GraphFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Identity of the compiler that produces blobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompilerProperties {
    /// Compiler identification string.
    pub id: String,
    /// Numeric compiler version.
    pub version: u32,
    /// Bitmask of supported operation sets.
    pub supported_opsets: u64,
}

/// A request to turn a graph into a compiled blob.
#[derive(Debug, Clone, Copy)]
pub struct GraphDesc<'a> {
    /// Encoding of `input`.
    pub format: GraphFormat,
    /// Raw graph bytes.
    pub input: &'a [u8],
    /// Extra compiler options, if any.
    pub build_flags: Option<&'a str>,
    /// Creation flags.
    pub flags: GraphFlags,
}

impl<'a> GraphDesc<'a> {
    /// Creates a description with no build flags and no creation flags.
    pub fn new(format: GraphFormat, input: &'a [u8]) -> Self {
        Self {
            format,
            input,
            build_flags: None,
            flags: GraphFlags::NONE,
        }
    }

    /// Sets the build flags string.
    pub fn with_build_flags(mut self, build_flags: &'a str) -> Self {
        self.build_flags = Some(build_flags);
        self
    }

    /// Sets the creation flags.
    pub fn with_flags(mut self, flags: GraphFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// The name of a cache entry.
///
/// An empty key means "do not cache". Non-empty keys are guaranteed to be a
/// single path component.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// The key returned while the cache is disabled.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Validates a key given as text, e.g. from the command line.
    ///
    /// Returns `None` for anything that is not a single plain path component.
    pub fn parse(text: &str) -> Option<Self> {
        let valid = !text.is_empty()
            && text != "."
            && text != ".."
            && !text.contains(['/', '\\', '\0']);
        valid.then(|| Self(text.to_string()))
    }

    /// Returns the key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the "do not cache" key.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the cache key for a compilation request.
///
/// Fields are fed in this order: driver version, compiler id, version and
/// opset mask (all skipped when `compiler` is `None`), format discriminator,
/// input bytes, build flags (skipped when absent), and creation flags.
/// Integers are fed little-endian.
pub fn derive_key<D: Digest>(
    driver_version: u32,
    compiler: Option<&CompilerProperties>,
    desc: &GraphDesc<'_>,
) -> CacheKey {
    let mut hasher = D::default();
    hasher.update(&driver_version.to_le_bytes());
    if let Some(props) = compiler {
        hasher.update(props.id.as_bytes());
        hasher.update(&props.version.to_le_bytes());
        hasher.update(&props.supported_opsets.to_le_bytes());
    }
    hasher.update(&desc.format.as_raw().to_le_bytes());
    hasher.update(desc.input);
    if let Some(build_flags) = desc.build_flags {
        hasher.update(build_flags.as_bytes());
    }
    hasher.update(&desc.flags.bits().to_le_bytes());

    CacheKey(hasher.finalize().to_hex())
}

#[cfg(test)]
mod tests {
    use super::*;
    use npu_common::Sha1;

    const MODEL: &[u8] = b"<model resnet-50-pytorch>random</model>";

    fn props() -> CompilerProperties {
        CompilerProperties {
            id: "npu-compiler".to_string(),
            version: 7,
            supported_opsets: 0b1011,
        }
    }

    fn key(compiler: Option<&CompilerProperties>, desc: &GraphDesc<'_>) -> CacheKey {
        derive_key::<Sha1>(DRIVER_VERSION, compiler, desc)
    }

    #[test]
    fn key_is_deterministic() {
        let desc = GraphDesc::new(GraphFormat::Intermediate, MODEL).with_build_flags("-O2");
        assert_eq!(key(Some(&props()), &desc), key(Some(&props()), &desc));
    }

    #[test]
    fn key_is_hex_and_path_safe() {
        let k = key(None, &GraphDesc::new(GraphFormat::Intermediate, MODEL));
        assert_eq!(k.as_str().len(), 40);
        assert!(k.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(CacheKey::parse(k.as_str()), Some(k));
    }

    #[test]
    fn empty_desc_still_yields_key() {
        let k = key(None, &GraphDesc::new(GraphFormat::Intermediate, b""));
        assert!(!k.is_empty());
    }

    #[test]
    fn every_input_changes_the_key() {
        let base = GraphDesc::new(GraphFormat::Intermediate, MODEL);
        let p = props();
        let base_key = key(Some(&p), &base);

        let variants = [
            key(Some(&p), &GraphDesc::new(GraphFormat::Intermediate, b"<model other/>")),
            key(Some(&p), &base.with_build_flags("extra-precision-param")),
            key(Some(&p), &base.with_flags(GraphFlags::ENABLE_PROFILING)),
            key(Some(&p), &GraphDesc::new(GraphFormat::Native, MODEL)),
            key(None, &base),
            derive_key::<Sha1>(DRIVER_VERSION + 1, Some(&p), &base),
        ];
        for (i, variant) in variants.iter().enumerate() {
            assert_ne!(*variant, base_key, "variant {i} collided with base key");
        }
    }

    #[test]
    fn compiler_fields_change_the_key() {
        let desc = GraphDesc::new(GraphFormat::Intermediate, MODEL);
        let base = props();
        let base_key = key(Some(&base), &desc);

        let mut other_id = base.clone();
        other_id.id = "other-compiler".to_string();
        let mut other_version = base.clone();
        other_version.version += 1;
        let mut other_opsets = base.clone();
        other_opsets.supported_opsets = 0;

        for changed in [other_id, other_version, other_opsets] {
            assert_ne!(key(Some(&changed), &desc), base_key);
        }
    }

    #[test]
    fn flag_combinations_differ() {
        let desc = GraphDesc::new(GraphFormat::Intermediate, MODEL).with_build_flags("b");
        let build_key = key(None, &desc);
        let flag_key = key(
            None,
            &desc.with_flags(GraphFlags::ENABLE_PROFILING | GraphFlags::DISABLE_CACHING),
        );
        assert_ne!(build_key, flag_key);
    }

    #[test]
    fn key_matches_manual_digest() {
        let desc = GraphDesc::new(GraphFormat::Intermediate, b"abc").with_build_flags("f");
        let mut h = Sha1::default();
        h.update(&DRIVER_VERSION.to_le_bytes());
        h.update(&2u32.to_le_bytes());
        h.update(b"abc");
        h.update(b"f");
        h.update(&0u32.to_le_bytes());
        assert_eq!(key(None, &desc).as_str(), h.finalize().to_hex());
    }

    #[test]
    fn format_raw_roundtrip() {
        for format in [GraphFormat::Native, GraphFormat::Intermediate] {
            assert_eq!(GraphFormat::from_raw(format.as_raw()).unwrap(), format);
        }
        assert!(matches!(
            GraphFormat::from_raw(0x9),
            Err(GraphError::UnsupportedFormat(0x9))
        ));
    }

    #[test]
    fn flags_contains() {
        let flags = GraphFlags::DISABLE_CACHING | GraphFlags::ENABLE_PROFILING;
        assert!(flags.contains(GraphFlags::DISABLE_CACHING));
        assert!(flags.contains(GraphFlags::ENABLE_PROFILING));
        assert!(!GraphFlags::NONE.contains(GraphFlags::DISABLE_CACHING));
        assert_eq!(GraphFlags::from_bits(0x3), flags);
    }

    #[test]
    fn parse_rejects_path_components() {
        for bad in ["", ".", "..", "a/b", "../etc", "a\\b", "nul\0"] {
            assert!(CacheKey::parse(bad).is_none(), "accepted {bad:?}");
        }
        assert!(CacheKey::parse("0123abcd").is_some());
    }
}
