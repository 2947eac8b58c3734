//! Bit flag sets and render size selection.

use clipcache_media::ProxySize;
use serde::{Deserialize, Serialize};

macro_rules! flag_set {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($(#[$fmeta:meta])* $flag:ident = $bit:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            $($(#[$fmeta])* pub const $flag: Self = Self($bit);)*

            pub const fn empty() -> Self {
                Self(0)
            }

            pub const fn bits(self) -> u32 {
                self.0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }

            pub fn set(&mut self, other: Self, on: bool) {
                if on {
                    self.insert(other);
                } else {
                    self.remove(other);
                }
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }
    };
}

flag_set! {
    /// Per-clip behaviour switches.
    ClipFlags {
        /// Read frames from proxies when the user asks for a reduced size.
        USE_PROXY = 1 << 0;
    }
}

flag_set! {
    /// Per-request render switches. Part of the raw cache key when proxies
    /// are in use.
    RenderFlags {
        /// Produce lens-undistorted frames.
        UNDISTORTED = 1 << 0;
        /// Retry at full size when a proxy frame is unavailable.
        USE_FALLBACK = 1 << 1;
    }
}

flag_set! {
    /// Channel masking applied after undistortion.
    PostprocessFlags {
        DISABLE_RED = 1 << 0;
        DISABLE_GREEN = 1 << 1;
        DISABLE_BLUE = 1 << 2;
        PREVIEW_GRAYSCALE = 1 << 3;
    }
}

/// Resolution a user asks frames at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RenderSize {
    #[default]
    Full,
    P25,
    P50,
    P75,
    P100,
}

impl RenderSize {
    /// Proxy tier serving this size.
    pub fn proxy(self) -> ProxySize {
        match self {
            Self::Full => ProxySize::None,
            Self::P25 => ProxySize::P25,
            Self::P50 => ProxySize::P50,
            Self::P75 => ProxySize::P75,
            Self::P100 => ProxySize::P100,
        }
    }
}
