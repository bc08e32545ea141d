//! The board: drivers, the active interface and per-family links
//!
//! The kit drives one electrical interface at a time because the
//! interfaces share pins. [`Board`] owns one optional driver per
//! interface (a `None` slot means the interface is not part of this
//! build), remembers which one is active and hands out framing layers
//! bound to it.

use crate::aes132::{self, Aes132Comm, Aes132Phy, I2cAes132, SpiAes132, StatusReg};
use crate::clock::Clock;
use crate::error::{Aes132Error, KitError, Sha204Error};
use crate::phys::{I2cBus, InterfaceId, SpiBus, SwiBus};
use crate::sha204::{self, CryptoAuthPhy, I2cCryptoAuth, Sha204Comm, SwiCryptoAuth};

/// SHA204 / ECC108 physical adapter for whichever bus is active
pub enum CryptoAuthLink<'a, W, T, C> {
    /// Single-wire
    Swi(SwiCryptoAuth<'a, W, C>),
    /// Two-wire
    I2c(I2cCryptoAuth<'a, T, C>),
}

impl<W: SwiBus, T: I2cBus, C: Clock> CryptoAuthPhy for CryptoAuthLink<'_, W, T, C> {
    fn wakeup(&mut self) -> Result<(), Sha204Error> {
        match self {
            Self::Swi(p) => p.wakeup(),
            Self::I2c(p) => p.wakeup(),
        }
    }

    fn send_command(&mut self, frame: &[u8]) -> Result<(), Sha204Error> {
        match self {
            Self::Swi(p) => p.send_command(frame),
            Self::I2c(p) => p.send_command(frame),
        }
    }

    fn receive_response(&mut self, buf: &mut [u8]) -> Result<(), Sha204Error> {
        match self {
            Self::Swi(p) => p.receive_response(buf),
            Self::I2c(p) => p.receive_response(buf),
        }
    }

    fn idle(&mut self) -> Result<(), Sha204Error> {
        match self {
            Self::Swi(p) => p.idle(),
            Self::I2c(p) => p.idle(),
        }
    }

    fn sleep(&mut self) -> Result<(), Sha204Error> {
        match self {
            Self::Swi(p) => p.sleep(),
            Self::I2c(p) => p.sleep(),
        }
    }

    fn reset_io(&mut self) -> Result<(), Sha204Error> {
        match self {
            Self::Swi(p) => p.reset_io(),
            Self::I2c(p) => p.reset_io(),
        }
    }

    fn resync(&mut self, buf: &mut [u8]) -> Result<(), Sha204Error> {
        match self {
            Self::Swi(p) => p.resync(buf),
            Self::I2c(p) => p.resync(buf),
        }
    }
}

/// AES132 physical adapter for whichever bus is active
pub enum Aes132Link<'a, T, S> {
    /// Two-wire
    I2c(I2cAes132<'a, T>),
    /// Serial peripheral
    Spi(SpiAes132<'a, S>),
}

impl<T: I2cBus, S: SpiBus> Aes132Phy for Aes132Link<'_, T, S> {
    fn write_memory(&mut self, address: u16, data: &[u8]) -> Result<(), Aes132Error> {
        match self {
            Self::I2c(p) => p.write_memory(address, data),
            Self::Spi(p) => p.write_memory(address, data),
        }
    }

    fn read_memory(&mut self, address: u16, buf: &mut [u8]) -> Result<(), Aes132Error> {
        match self {
            Self::I2c(p) => p.read_memory(address, buf),
            Self::Spi(p) => p.read_memory(address, buf),
        }
    }

    fn read_status(&mut self) -> Result<StatusReg, Aes132Error> {
        match self {
            Self::I2c(p) => p.read_status(),
            Self::Spi(p) => p.read_status(),
        }
    }

    fn select(&mut self, id: u8) -> Result<(), Aes132Error> {
        match self {
            Self::I2c(p) => p.select(id),
            Self::Spi(p) => p.select(id),
        }
    }

    fn resync(&mut self) -> Result<(), Aes132Error> {
        match self {
            Self::I2c(p) => p.resync(),
            Self::Spi(p) => p.resync(),
        }
    }

    fn enable(&mut self) {
        match self {
            Self::I2c(p) => p.enable(),
            Self::Spi(p) => p.enable(),
        }
    }

    fn disable(&mut self) {
        match self {
            Self::I2c(p) => p.disable(),
            Self::Spi(p) => p.disable(),
        }
    }
}

/// Framing layer for a SHA204 / ECC108 on the active bus
pub type CryptoAuthComm<'a, W, T, C> = Sha204Comm<CryptoAuthLink<'a, W, T, C>, C>;

/// Framing layer for an AES132 on the active bus
pub type Aes132BoardComm<'a, T, S, C> = Aes132Comm<Aes132Link<'a, T, S>, C>;

/// Drivers plus the interface state
pub struct Board<W, T, S, C> {
    swi: Option<W>,
    i2c: Option<T>,
    spi: Option<S>,
    clock: C,
    active: InterfaceId,
    enabled: bool,
    crypto_auth_address: u8,
    aes132_address: u8,
}

impl<W: SwiBus, T: I2cBus, S: SpiBus, C: Clock> Board<W, T, S, C> {
    /// Board with the given drivers; nothing is enabled yet
    pub fn new(swi: Option<W>, i2c: Option<T>, spi: Option<S>, clock: C) -> Self {
        Self {
            swi,
            i2c,
            spi,
            clock,
            active: InterfaceId::Unknown,
            enabled: false,
            crypto_auth_address: sha204::SHA204_I2C_ADDRESS,
            aes132_address: aes132::I2C_ADDRESS,
        }
    }

    /// Currently active interface
    pub fn active(&self) -> InterfaceId {
        self.active
    }

    /// True while the active interface is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// A handle to the board clock
    pub fn clock(&self) -> C {
        self.clock.clone()
    }

    /// True when a driver for `id` is part of this build
    pub fn has(&self, id: InterfaceId) -> bool {
        match id {
            InterfaceId::Swi => self.swi.is_some(),
            InterfaceId::I2c => self.i2c.is_some(),
            InterfaceId::Spi => self.spi.is_some(),
            InterfaceId::Unknown | InterfaceId::Uart => false,
        }
    }

    /// Single-wire driver
    pub fn swi(&mut self) -> Result<&mut W, KitError> {
        self.swi.as_mut().ok_or(KitError::InvalidIfFunction)
    }

    /// Two-wire driver
    pub fn i2c(&mut self) -> Result<&mut T, KitError> {
        self.i2c.as_mut().ok_or(KitError::InvalidIfFunction)
    }

    /// Serial-peripheral driver
    pub fn spi(&mut self) -> Result<&mut S, KitError> {
        self.spi.as_mut().ok_or(KitError::InvalidIfFunction)
    }

    /// Enable the active interface
    pub fn enable(&mut self) {
        match self.active {
            InterfaceId::Swi => self.swi.iter_mut().for_each(|b| b.enable()),
            InterfaceId::I2c => self.i2c.iter_mut().for_each(|b| b.enable()),
            InterfaceId::Spi => self.spi.iter_mut().for_each(|b| b.enable()),
            InterfaceId::Unknown | InterfaceId::Uart => return,
        }
        self.enabled = true;
    }

    /// Disable the active interface
    pub fn disable(&mut self) {
        match self.active {
            InterfaceId::Swi => self.swi.iter_mut().for_each(|b| b.disable()),
            InterfaceId::I2c => self.i2c.iter_mut().for_each(|b| b.disable()),
            InterfaceId::Spi => self.spi.iter_mut().for_each(|b| b.disable()),
            InterfaceId::Unknown | InterfaceId::Uart => {}
        }
        self.enabled = false;
    }

    /// Make `id` the active interface and enable it
    ///
    /// The previously active interface is disabled first. Activating the
    /// interface that is already active just makes sure it is enabled.
    pub fn activate(&mut self, id: InterfaceId) -> Result<(), KitError> {
        if !self.has(id) {
            return Err(KitError::InvalidIfFunction);
        }
        if self.active != id {
            self.disable();
            log::debug!("interface {:?} -> {:?}", self.active, id);
            self.active = id;
        }
        if !self.enabled {
            self.enable();
        }
        Ok(())
    }

    /// Host-requested interface switch
    ///
    /// Switching to the interface that is already active, or to one that
    /// is not part of this build, is rejected.
    pub fn switch_interface(&mut self, id: InterfaceId) -> Result<(), KitError> {
        if id == self.active || !self.has(id) {
            return Err(KitError::InvalidParams);
        }
        self.activate(id)
    }

    /// Select a CryptoAuth device: pin index on single-wire, address on
    /// two-wire
    pub fn select_crypto_auth(&mut self, id: u8) -> Result<(), KitError> {
        match self.active {
            InterfaceId::Swi => {
                self.swi()?.select(id);
                Ok(())
            }
            InterfaceId::I2c => {
                self.crypto_auth_address = id & !1;
                Ok(())
            }
            _ => Err(KitError::InvalidIfFunction),
        }
    }

    /// Select an AES132: address on two-wire, chip select on serial
    /// peripheral
    pub fn select_aes132(&mut self, id: u8) -> Result<(), Aes132Error> {
        match self.active {
            InterfaceId::I2c => {
                self.aes132_address = id & !1;
                Ok(())
            }
            InterfaceId::Spi => self
                .spi
                .as_mut()
                .ok_or(Aes132Error::NotImplemented)?
                .select_device(id)
                .map_err(|_| Aes132Error::DeviceSelectFail),
            _ => Err(Aes132Error::NotImplemented),
        }
    }

    /// Two-wire address used for CryptoAuth devices
    pub fn crypto_auth_address(&self) -> u8 {
        self.crypto_auth_address
    }

    /// Two-wire address used for AES132 devices
    pub fn aes132_address(&self) -> u8 {
        self.aes132_address
    }

    /// CryptoAuth adapter on the active bus
    pub fn crypto_auth_phy(&mut self) -> Result<CryptoAuthLink<'_, W, T, C>, KitError> {
        let clock = self.clock.clone();
        match self.active {
            InterfaceId::Swi => {
                let bus = self.swi.as_mut().ok_or(KitError::InvalidIfFunction)?;
                Ok(CryptoAuthLink::Swi(SwiCryptoAuth::new(bus, clock)))
            }
            InterfaceId::I2c => {
                let address = self.crypto_auth_address;
                let bus = self.i2c.as_mut().ok_or(KitError::InvalidIfFunction)?;
                Ok(CryptoAuthLink::I2c(I2cCryptoAuth::new(bus, clock, address)))
            }
            _ => Err(KitError::InvalidIfFunction),
        }
    }

    /// CryptoAuth framing layer on the active bus
    pub fn crypto_auth(&mut self) -> Result<CryptoAuthComm<'_, W, T, C>, KitError> {
        let clock = self.clock.clone();
        Ok(Sha204Comm::new(self.crypto_auth_phy()?, clock))
    }

    /// AES132 adapter on the active bus
    pub fn aes132_phy(&mut self) -> Result<Aes132Link<'_, T, S>, Aes132Error> {
        match self.active {
            InterfaceId::I2c => {
                let address = self.aes132_address;
                let bus = self.i2c.as_mut().ok_or(Aes132Error::NotImplemented)?;
                Ok(Aes132Link::I2c(I2cAes132::new(bus, address)))
            }
            InterfaceId::Spi => {
                let bus = self.spi.as_mut().ok_or(Aes132Error::NotImplemented)?;
                Ok(Aes132Link::Spi(SpiAes132::new(bus)))
            }
            _ => Err(Aes132Error::NotImplemented),
        }
    }

    /// AES132 framing layer on the active bus
    pub fn aes132(&mut self) -> Result<Aes132BoardComm<'_, T, S, C>, Aes132Error> {
        let clock = self.clock.clone();
        Ok(Aes132Comm::new(self.aes132_phy()?, clock))
    }
}
