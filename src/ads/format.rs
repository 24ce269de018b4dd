//! Ad formats, banner sizes and the opaque presentation token.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Format of an ad placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdFormat {
    Banner,
    AdaptiveBanner,
    Interstitial,
    Rewarded,
    RewardedInterstitial,
}

impl AdFormat {
    /// Banners are laid out by the caller's own view hierarchy.
    #[inline]
    pub fn is_banner(self) -> bool {
        matches!(self, AdFormat::Banner | AdFormat::AdaptiveBanner)
    }

    /// Full-screen formats are presented through the slot's `show_ad`.
    #[inline]
    pub fn is_fullscreen(self) -> bool {
        !self.is_banner()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AdFormat::Banner => "banner",
            AdFormat::AdaptiveBanner => "adaptive_banner",
            AdFormat::Interstitial => "interstitial",
            AdFormat::Rewarded => "rewarded",
            AdFormat::RewardedInterstitial => "rewarded_interstitial",
        }
    }
}

impl fmt::Display for AdFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Width/height in points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// How a banner size is interpreted by the partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BannerKind {
    #[default]
    Fixed,
    Adaptive,
}

/// Requested or delivered banner dimensions.
///
/// ## Rules
/// - width must be within `50..=1800`
/// - height is either `0` (flexible, adaptive banners) or within `50..=1800`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BannerSize {
    pub size: Size,
    pub kind: BannerKind,
}

const VALID_DIMENSION: std::ops::RangeInclusive<u32> = 50..=1800;

impl BannerSize {
    /// 320x50.
    pub const STANDARD: BannerSize = BannerSize::fixed(320, 50);
    /// 300x250.
    pub const MEDIUM: BannerSize = BannerSize::fixed(300, 250);
    /// 728x90.
    pub const LEADERBOARD: BannerSize = BannerSize::fixed(728, 90);

    pub const fn fixed(width: u32, height: u32) -> Self {
        Self {
            size: Size::new(width, height),
            kind: BannerKind::Fixed,
        }
    }

    pub const fn adaptive(width: u32, height: u32) -> Self {
        Self {
            size: Size::new(width, height),
            kind: BannerKind::Adaptive,
        }
    }

    /// Returns `true` if the size may be requested from partners.
    pub fn is_valid(&self) -> bool {
        VALID_DIMENSION.contains(&self.size.width)
            && (self.size.height == 0 || VALID_DIMENSION.contains(&self.size.height))
    }

    /// Returns `true` if `self` does not fit inside `requested`.
    ///
    /// A requested height of `0` leaves the height unconstrained.
    pub fn exceeds(&self, requested: &BannerSize) -> bool {
        self.size.width > requested.size.width
            || (requested.size.height > 0 && self.size.height > requested.size.height)
    }
}

/// Opaque presentation context handed through to partner load/show calls.
///
/// The engine never looks inside; adapters downcast it to whatever their
/// platform needs.
#[derive(Clone)]
pub struct Viewport(Arc<dyn Any + Send + Sync>);

impl Viewport {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Viewport(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_size_bounds() {
        assert!(BannerSize::STANDARD.is_valid());
        assert!(BannerSize::adaptive(400, 0).is_valid());
        assert!(BannerSize::fixed(1800, 1800).is_valid());

        assert!(!BannerSize::fixed(49, 50).is_valid());
        assert!(!BannerSize::fixed(320, 49).is_valid());
        assert!(!BannerSize::fixed(1801, 50).is_valid());
        assert!(!BannerSize::fixed(0, 0).is_valid());
    }

    #[test]
    fn test_exceeds_ignores_flexible_height() {
        let requested = BannerSize::adaptive(320, 0);
        assert!(!BannerSize::fixed(320, 250).exceeds(&requested));
        assert!(BannerSize::fixed(321, 50).exceeds(&requested));

        let fixed = BannerSize::STANDARD;
        assert!(BannerSize::fixed(320, 51).exceeds(&fixed));
        assert!(!BannerSize::fixed(300, 50).exceeds(&fixed));
    }

    #[test]
    fn test_format_classification() {
        assert!(AdFormat::Banner.is_banner());
        assert!(AdFormat::AdaptiveBanner.is_banner());
        assert!(AdFormat::Interstitial.is_fullscreen());
        assert!(AdFormat::Rewarded.is_fullscreen());
        assert!(AdFormat::RewardedInterstitial.is_fullscreen());
    }

    #[test]
    fn test_viewport_downcast() {
        let vp = Viewport::new(String::from("root"));
        assert_eq!(vp.downcast_ref::<String>().map(String::as_str), Some("root"));
        assert!(vp.downcast_ref::<u32>().is_none());
    }
}
