/*
 *  pins/mod.rs
 *
 *  LcdRelay - two rows, sixteen cells
 *  (c) 2020-26 Stuart Hunter
 *
 *  GPIO pin bank abstraction for the parallel LCD bus
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::fmt;

use embedded_hal::digital::OutputPin;
use serde::{Deserialize, Serialize};

use crate::lcd::error::LcdError;

pub mod mock;
pub mod sysfs;

#[cfg(feature = "rppal")]
pub mod rpi;

pub use mock::{pair_latches, Latch, MockBank, MockDelay, MockPin, PinEvent, Recorder, Transfer};
pub use sysfs::SysfsBank;

#[cfg(feature = "rppal")]
pub use rpi::RppalBank;

/// Highest BCM line number on the Raspberry Pi header
pub const MAX_BCM_PIN: u8 = 53;

/// A bank of GPIO lines that hands out output pins.
///
/// Each backend's constructor is its `open()`: it claims the bank for the
/// process and fails with [`LcdError::HardwareUnavailable`] when it cannot.
/// After [`PinBank::close`] the bank must not configure further pins.
pub trait PinBank: Send + 'static {
    /// The output pin type this bank produces
    type Pin: OutputPin + Send + 'static;

    /// Declare `index` as a digital output and hand it out
    fn configure(&mut self, index: u8) -> Result<Self::Pin, LcdError>;

    /// Release the bank
    fn close(&mut self) -> Result<(), LcdError>;
}

/// Which LCD signal a pin carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinRole {
    RegisterSelect,
    Enable,
    D4,
    D5,
    D6,
    D7,
}

impl PinRole {
    pub const ALL: [PinRole; 6] = [
        PinRole::RegisterSelect,
        PinRole::Enable,
        PinRole::D4,
        PinRole::D5,
        PinRole::D6,
        PinRole::D7,
    ];
}

impl fmt::Display for PinRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PinRole::RegisterSelect => "RS",
            PinRole::Enable => "E",
            PinRole::D4 => "D4",
            PinRole::D5 => "D5",
            PinRole::D6 => "D6",
            PinRole::D7 => "D7",
        };
        f.write_str(name)
    }
}

/// BCM line numbers of the six LCD signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pinout {
    pub rs: u8,
    pub e: u8,
    pub d4: u8,
    pub d5: u8,
    pub d6: u8,
    pub d7: u8,
}

impl Default for Pinout {
    fn default() -> Self {
        Self { rs: 6, e: 5, d4: 25, d5: 24, d6: 23, d7: 17 }
    }
}

impl Pinout {
    pub fn index(&self, role: PinRole) -> u8 {
        match role {
            PinRole::RegisterSelect => self.rs,
            PinRole::Enable => self.e,
            PinRole::D4 => self.d4,
            PinRole::D5 => self.d5,
            PinRole::D6 => self.d6,
            PinRole::D7 => self.d7,
        }
    }

    pub fn role_of(&self, index: u8) -> Option<PinRole> {
        PinRole::ALL.into_iter().find(|role| self.index(*role) == index)
    }

    /// All six lines must be distinct and on the header
    pub fn validate(&self) -> Result<(), LcdError> {
        let mut seen: Vec<u8> = Vec::with_capacity(PinRole::ALL.len());
        for role in PinRole::ALL {
            let index = self.index(role);
            if index > MAX_BCM_PIN {
                return Err(LcdError::InvalidPinout(format!(
                    "{} on BCM {} is beyond BCM {}", role, index, MAX_BCM_PIN
                )));
            }
            if seen.contains(&index) {
                return Err(LcdError::InvalidPinout(format!(
                    "{} reuses BCM {}", role, index
                )));
            }
            seen.push(index);
        }
        Ok(())
    }
}
