//! Kit configuration
//!
//! Everything the firmware used to fix at build time per board variant:
//! names, default addresses, the timers of the main loop and the wiring
//! of the single-wire pin table. With the `std` feature a configuration
//! can be loaded from a RON file:
//!
//! ```ron
//! (
//!     short_name: "CK590 ",
//!     rediscover_interval_ms: 2000,
//!     swi_pin_count: 2,
//!     i2c_speed: Fast,
//! )
//! ```
//!
//! Fields left out keep their defaults.

use heapless::String;

use crate::discover::{DiscoveryPlan, MAX_DEVICES};
use crate::phys::i2c::{I2cTiming, FAST_MODE, STANDARD_MODE};
use crate::{aes132, sha204};

/// Longest kit name
pub const NAME_MAX: usize = 24;

/// Two-wire clock profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "std", derive(serde::Deserialize))]
pub enum I2cSpeed {
    /// 100 kHz
    Standard,
    /// 400 kHz
    #[default]
    Fast,
}

impl I2cSpeed {
    /// Bit-bang timing for this profile
    pub const fn timing(self) -> I2cTiming {
        match self {
            Self::Standard => STANDARD_MODE,
            Self::Fast => FAST_MODE,
        }
    }
}

/// Board configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(serde::Deserialize))]
#[cfg_attr(feature = "std", serde(default))]
pub struct KitConfig {
    /// Long name, reported by the firmware version query
    pub kit_name: String<NAME_MAX>,
    /// Short name, reported by the board version query
    pub short_name: String<NAME_MAX>,
    /// Module number reported until the host sets another one
    pub module_number: u8,
    /// Start with periodic discovery enabled
    pub discovery_enabled: bool,
    /// Time between two periodic discovery passes
    pub rediscover_interval_ms: u32,
    /// Time between two idle keep-alives to an awake CryptoAuth chip
    pub keepalive_interval_ms: u32,
    /// Entries in the single-wire pin table walked by discovery
    pub swi_pin_count: u8,
    /// Two-wire clock profile
    pub i2c_speed: I2cSpeed,
    /// SHA204 two-wire address
    pub sha204_address: u8,
    /// ECC108 two-wire address
    pub ecc108_address: u8,
    /// AES132 two-wire address
    pub aes132_address: u8,
}

impl Default for KitConfig {
    fn default() -> Self {
        Self {
            kit_name: name("AT88CK590 "),
            short_name: name("CK590 "),
            module_number: 0,
            discovery_enabled: true,
            rediscover_interval_ms: 1_000,
            keepalive_interval_ms: 1_000,
            swi_pin_count: MAX_DEVICES as u8,
            i2c_speed: I2cSpeed::default(),
            sha204_address: sha204::SHA204_I2C_ADDRESS,
            ecc108_address: sha204::ECC108_I2C_ADDRESS,
            aes132_address: aes132::I2C_ADDRESS,
        }
    }
}

fn name(s: &str) -> String<NAME_MAX> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Reason a configuration was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalid {
    /// More single-wire pins than the device table can hold
    PinCount(u8),
    /// Two-wire address with the read bit set
    OddAddress(u8),
}

impl core::fmt::Display for Invalid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::PinCount(n) => write!(
                f,
                "swi_pin_count {} exceeds the device table capacity of {}",
                n, MAX_DEVICES
            ),
            Self::OddAddress(a) => write!(f, "bus address 0x{:02X} has the read bit set", a),
        }
    }
}

impl KitConfig {
    /// Check the values that would otherwise misbehave at run time
    pub fn validate(&self) -> Result<(), Invalid> {
        if self.swi_pin_count as usize > MAX_DEVICES {
            return Err(Invalid::PinCount(self.swi_pin_count));
        }
        for address in [self.sha204_address, self.ecc108_address, self.aes132_address] {
            if address & 1 != 0 {
                return Err(Invalid::OddAddress(address));
            }
        }
        Ok(())
    }

    /// What discovery walks: the pin table, then the two-wire addresses
    /// with ECC108 first
    pub fn discovery_plan(&self) -> DiscoveryPlan {
        DiscoveryPlan {
            swi_pins: self.swi_pin_count,
            crypto_auth: [self.ecc108_address, self.sha204_address],
            aes132: self.aes132_address,
        }
    }
}

#[cfg(feature = "std")]
mod load {
    use super::{Invalid, KitConfig};
    use std::path::Path;

    /// Errors loading a configuration file
    #[derive(Debug, thiserror::Error)]
    pub enum ConfigError {
        /// File could not be read
        #[error("reading configuration: {0}")]
        Io(#[from] std::io::Error),
        /// File is not valid RON for [`KitConfig`]
        #[error("parsing configuration: {0}")]
        Parse(#[from] ron::error::SpannedError),
        /// Values parsed but are not usable
        #[error("invalid configuration: {0}")]
        Validation(Invalid),
    }

    impl KitConfig {
        /// Parse and validate a RON document
        pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
            let config: Self = ron::from_str(text)?;
            config.validate().map_err(ConfigError::Validation)?;
            Ok(config)
        }

        /// Load a RON file
        pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
            let text = std::fs::read_to_string(path.as_ref())?;
            let config = Self::from_ron(&text)?;
            log::debug!("configuration loaded from {}", path.as_ref().display());
            Ok(config)
        }
    }
}

#[cfg(feature = "std")]
pub use load::ConfigError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = KitConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.short_name.as_str(), "CK590 ");
        assert_eq!(config.discovery_plan(), DiscoveryPlan::default());
    }

    #[test]
    fn test_validation_rejects() {
        let mut config = KitConfig {
            swi_pin_count: MAX_DEVICES as u8 + 1,
            ..KitConfig::default()
        };
        assert_eq!(config.validate(), Err(Invalid::PinCount(5)));
        config.swi_pin_count = 2;
        config.aes132_address = 0xA1;
        assert_eq!(config.validate(), Err(Invalid::OddAddress(0xA1)));
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_ron_partial_document() {
        let config = KitConfig::from_ron("(swi_pin_count: 2, i2c_speed: Standard)").unwrap();
        assert_eq!(config.swi_pin_count, 2);
        assert_eq!(config.discovery_plan().swi_pins, 2);
        assert_eq!(config.i2c_speed, I2cSpeed::Standard);
        assert_eq!(config.kit_name.as_str(), "AT88CK590 ");
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_ron_errors() {
        assert!(matches!(
            KitConfig::from_ron("(swi_pin_count: "),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            KitConfig::from_ron("(sha204_address: 0xC9)"),
            Err(ConfigError::Validation(Invalid::OddAddress(0xC9)))
        ));
    }
}
