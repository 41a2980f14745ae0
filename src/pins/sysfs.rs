/*
 *  pins/sysfs.rs
 *
 *  LcdRelay - two rows, sixteen cells
 *  (c) 2020-26 Stuart Hunter
 *
 *  Linux sysfs GPIO pin bank
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

use std::path::Path;

use linux_embedded_hal::SysfsPin;
use linux_embedded_hal::sysfs_gpio::{self, Direction};
use log::{debug, info, warn};

use crate::lcd::error::LcdError;
use crate::pins::PinBank;

const SYSFS_GPIO: &str = "/sys/class/gpio";

/// Pin bank backed by `/sys/class/gpio`
///
/// Lines are exported on [`PinBank::configure`] and unexported again on
/// [`PinBank::close`].
#[derive(Debug)]
pub struct SysfsBank {
    exported: Vec<u8>,
    closed: bool,
}

impl SysfsBank {
    pub fn open() -> Result<Self, LcdError> {
        let export = Path::new(SYSFS_GPIO).join("export");
        if !export.exists() {
            return Err(LcdError::HardwareUnavailable(format!(
                "{} not present", export.display()
            )));
        }
        info!("Opened sysfs GPIO bank at {}", SYSFS_GPIO);
        Ok(Self { exported: Vec::with_capacity(6), closed: false })
    }
}

impl PinBank for SysfsBank {
    type Pin = SysfsPin;

    fn configure(&mut self, index: u8) -> Result<SysfsPin, LcdError> {
        if self.closed {
            return Err(LcdError::HardwareUnavailable(format!(
                "sysfs bank closed, cannot configure BCM {}", index
            )));
        }
        let pin = SysfsPin::new(u64::from(index));
        pin.export()
            .map_err(|e| LcdError::HardwareUnavailable(format!("export BCM {}: {}", index, e)))?;
        self.exported.push(index);
        pin.set_direction(Direction::Out)
            .map_err(|e| LcdError::HardwareUnavailable(format!("direction BCM {}: {}", index, e)))?;
        debug!("BCM {} configured as output", index);
        Ok(pin)
    }

    fn close(&mut self) -> Result<(), LcdError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        for index in self.exported.drain(..) {
            if let Err(e) = sysfs_gpio::Pin::new(u64::from(index)).unexport() {
                warn!("Failed to unexport BCM {}: {}", index, e);
            }
        }
        info!("Released sysfs GPIO bank");
        Ok(())
    }
}
