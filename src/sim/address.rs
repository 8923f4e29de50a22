use crate::config::SsdConfig;
use std::fmt::{self, Display};

/// Depth to which the prefix fields of an [`Address`] are meaningful.
/// `Block` means package/die/plane/block are valid but the page is not.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    None,
    Package,
    Die,
    Plane,
    Block,
    Page,
}

/// A physical flash location. Plain fields for quick access, with the
/// validity depth carried alongside so partially-resolved addresses (for
/// example a plane cursor) can flow through the same type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Address {
    pub package: u32,
    pub die: u32,
    pub plane: u32,
    pub block: u32,
    pub page: u32,
    pub level: Level,
}

impl Address {
    pub const fn none() -> Self {
        Address {
            package: 0,
            die: 0,
            plane: 0,
            block: 0,
            page: 0,
            level: Level::None,
        }
    }

    /// Map a linear logical page to its physical location. Stateless;
    /// page varies fastest, package slowest.
    pub fn decode(logical_page: u64, cfg: &SsdConfig) -> Self {
        let mut l = logical_page;
        let page = (l % cfg.block_size as u64) as u32;
        l /= cfg.block_size as u64;
        let block = (l % cfg.plane_size as u64) as u32;
        l /= cfg.plane_size as u64;
        let plane = (l % cfg.die_size as u64) as u32;
        l /= cfg.die_size as u64;
        let die = (l % cfg.package_size as u64) as u32;
        l /= cfg.package_size as u64;
        let package = (l % cfg.ssd_size as u64) as u32;
        Address {
            package,
            die,
            plane,
            block,
            page,
            level: Level::Page,
        }
    }

    /// The channel serving this address. The low `bank_group_bit` page bits
    /// replace the low package bits, spreading sequential pages of one
    /// package across neighbouring channels. With the bit count at 0 this
    /// is just the package index.
    pub fn channel(&self, cfg: &SsdConfig) -> u32 {
        let b = cfg.bank_group_bit;
        if b == 0 {
            return self.package;
        }
        let mask = (1u32 << b) - 1;
        (self.package & !mask) | (self.page & mask)
    }

    /// Depth to which two addresses refer to the same hardware unit,
    /// limited to the fields both sides hold valid.
    pub fn match_depth(&self, other: &Address) -> Level {
        let mut depth = Level::None;
        let pairs = [
            (self.package, other.package, Level::Package),
            (self.die, other.die, Level::Die),
            (self.plane, other.plane, Level::Plane),
            (self.block, other.block, Level::Block),
            (self.page, other.page, Level::Page),
        ];
        for (a, b, level) in pairs {
            if a == b && self.level >= level && other.level >= level {
                depth = level;
            } else {
                break;
            }
        }
        depth
    }

    /// Clamp the validity depth to the in-bounds prefix of the address.
    /// The depth can only shrink; out-of-range fields invalidate everything
    /// below them.
    pub fn check_bounds(&mut self, cfg: &SsdConfig) -> Level {
        let mut depth = Level::None;
        if self.level >= Level::Package && self.package < cfg.ssd_size {
            depth = Level::Package;
            if self.level >= Level::Die && self.die < cfg.package_size {
                depth = Level::Die;
                if self.level >= Level::Plane && self.plane < cfg.die_size {
                    depth = Level::Plane;
                    if self.level >= Level::Block && self.block < cfg.plane_size {
                        depth = Level::Block;
                        if self.level >= Level::Page && self.page < cfg.block_size {
                            depth = Level::Page;
                        }
                    }
                }
            }
        }
        self.level = depth;
        depth
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {}, {:?})",
            self.package, self.die, self.plane, self.block, self.page, self.level
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_zero() {
        let cfg = SsdConfig::default();
        let a = Address::decode(0, &cfg);
        assert_eq!((a.package, a.die, a.plane, a.block, a.page), (0, 0, 0, 0, 0));
        assert_eq!(a.level, Level::Page);
    }

    #[test]
    fn test_decode_crosses_block_boundary() {
        // 64 pages per block: logical 64 is page 0 of the next block.
        let mut cfg = SsdConfig::default();
        cfg.plane_size = 4;
        let a = Address::decode(64, &cfg);
        assert_eq!((a.package, a.die, a.plane, a.block, a.page), (0, 0, 0, 1, 0));
    }

    #[test]
    fn test_decode_walks_hierarchy() {
        let cfg = SsdConfig::default();
        // pages per plane = 64, per die = 128, per package = 256
        let a = Address::decode(64, &cfg);
        assert_eq!((a.plane, a.block, a.page), (1, 0, 0));
        let a = Address::decode(128, &cfg);
        assert_eq!((a.die, a.plane, a.page), (1, 0, 0));
        let a = Address::decode(256, &cfg);
        assert_eq!((a.package, a.die, a.plane, a.page), (1, 0, 0, 0));
        let a = Address::decode(255, &cfg);
        assert_eq!((a.package, a.die, a.plane, a.block, a.page), (0, 3, 1, 0, 63));
    }

    #[test]
    fn test_channel_is_package_without_bank_groups() {
        let cfg = SsdConfig::default();
        let a = Address::decode(256 * 5 + 17, &cfg);
        assert_eq!(a.channel(&cfg), a.package);
    }

    #[test]
    fn test_channel_bank_group_interleave() {
        let mut cfg = SsdConfig::default();
        cfg.bank_group_bit = 2;
        let mut a = Address::decode(0, &cfg);
        a.package = 4;
        a.page = 3;
        // low two package bits replaced by low two page bits
        assert_eq!(a.channel(&cfg), 4 | 3);
        a.page = 4;
        assert_eq!(a.channel(&cfg), 4);
    }

    #[test]
    fn test_match_depth() {
        let cfg = SsdConfig::default();
        let a = Address::decode(0, &cfg);
        let mut b = a;
        assert_eq!(a.match_depth(&b), Level::Page);
        b.page = 5;
        assert_eq!(a.match_depth(&b), Level::Block);
        b.die = 1;
        assert_eq!(a.match_depth(&b), Level::Package);
        b.level = Level::None;
        assert_eq!(a.match_depth(&b), Level::None);
    }

    #[test]
    fn test_check_bounds_shrinks_validity() {
        let cfg = SsdConfig::default();
        let mut a = Address::decode(0, &cfg);
        a.plane = 99;
        assert_eq!(a.check_bounds(&cfg), Level::Die);
        assert_eq!(a.level, Level::Die);
    }
}
