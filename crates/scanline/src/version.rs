// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client and firmware version information.
//!
//! The wire layout of [`VersionInformation`] must never change; it is the
//! first thing parsed out of a status message and is how a version mismatch
//! between client and scan head firmware is detected before anything else
//! is trusted.

/// Version flag bits carried in the `flags` field.
pub mod flags {
    /// Built from a tree with uncommitted changes.
    pub const DIRTY: u16 = 1 << 0;
    /// Built from a development branch.
    pub const DEVELOP: u16 = 1 << 1;
}

/// Semantic version plus build provenance for one side of the connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionInformation {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// Abbreviated commit hash of the build, as a number.
    pub commit: u32,
    /// Product identifier reported by firmware; zero for the client.
    pub product: u16,
    pub flags: u16,
}

impl VersionInformation {
    /// Version information of this client build, from Cargo metadata.
    pub fn client() -> Self {
        Self {
            major: parse_env(env!("CARGO_PKG_VERSION_MAJOR")),
            minor: parse_env(env!("CARGO_PKG_VERSION_MINOR")),
            patch: parse_env(env!("CARGO_PKG_VERSION_PATCH")),
            commit: option_env!("SCANLINE_BUILD_COMMIT")
                .and_then(|s| u32::from_str_radix(s, 16).ok())
                .unwrap_or(0),
            product: 0,
            flags: 0,
        }
    }

    /// Two versions are compatible iff their major numbers agree. Minor
    /// and patch differences are wire-compatible by contract.
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

fn parse_env(s: &str) -> u32 {
    s.parse().unwrap_or(0)
}

impl std::fmt::Display for VersionInformation {
    /// Renders e.g. `2.11.2-dirty-develop+1234abcd`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.flags & flags::DIRTY != 0 {
            write!(f, "-dirty")?;
        }
        if self.flags & flags::DEVELOP != 0 {
            write!(f, "-develop")?;
        }
        write!(f, "+{:x}", self.commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ver(major: u32, minor: u32, patch: u32) -> VersionInformation {
        VersionInformation {
            major,
            minor,
            patch,
            commit: 0xabcd,
            product: 1,
            flags: 0,
        }
    }

    #[test]
    fn compatibility_is_major_only() {
        let combos = [
            (ver(2, 0, 0), ver(2, 0, 0), true),
            (ver(2, 0, 0), ver(2, 5, 9), true),
            (ver(2, 11, 2), ver(2, 0, 17), true),
            (ver(1, 0, 0), ver(2, 0, 0), false),
            (ver(3, 0, 0), ver(2, 0, 0), false),
            (ver(0, 1, 0), ver(1, 1, 0), false),
            (ver(4, 2, 2), ver(4, 2, 2), true),
            (ver(2, 9, 9), ver(3, 0, 0), false),
        ];

        for (a, b, expect) in combos {
            assert_eq!(a.is_compatible_with(&b), expect, "{} vs {}", a, b);
            // Compatibility is symmetric.
            assert_eq!(b.is_compatible_with(&a), expect, "{} vs {}", b, a);
        }
    }

    #[test]
    fn display_renders_flags() {
        let mut v = ver(2, 11, 2);
        assert_eq!(v.to_string(), "2.11.2+abcd");
        v.flags = flags::DIRTY | flags::DEVELOP;
        assert_eq!(v.to_string(), "2.11.2-dirty-develop+abcd");
    }

    #[test]
    fn client_version_matches_package() {
        let v = VersionInformation::client();
        assert!(v.major > 0 || v.minor > 0);
    }
}
