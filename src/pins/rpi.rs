/*
 *  pins/rpi.rs
 *
 *  LcdRelay - two rows, sixteen cells
 *  (c) 2020-26 Stuart Hunter
 *
 *  Raspberry Pi GPIO pin bank via rppal (/dev/gpiomem)
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

use std::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin};
use log::info;
use rppal::gpio::Gpio;

use crate::lcd::error::LcdError;
use crate::pins::PinBank;

/// Pin bank over the memory mapped BCM283x GPIO block
pub struct RppalBank {
    gpio: Option<Gpio>,
}

impl RppalBank {
    pub fn open() -> Result<Self, LcdError> {
        let gpio = Gpio::new()
            .map_err(|e| LcdError::HardwareUnavailable(format!("rppal: {}", e)))?;
        info!("Opened rppal GPIO bank");
        Ok(Self { gpio: Some(gpio) })
    }
}

impl PinBank for RppalBank {
    type Pin = RppalPin;

    fn configure(&mut self, index: u8) -> Result<RppalPin, LcdError> {
        let gpio = self.gpio.as_ref().ok_or_else(|| {
            LcdError::HardwareUnavailable(format!("rppal bank closed, cannot configure BCM {}", index))
        })?;
        let mut pin = gpio
            .get(index)
            .map_err(|e| LcdError::HardwareUnavailable(format!("BCM {}: {}", index, e)))?
            .into_output_low();
        // the driver parks the lines itself on shutdown
        pin.set_reset_on_drop(false);
        Ok(RppalPin(pin))
    }

    fn close(&mut self) -> Result<(), LcdError> {
        if self.gpio.take().is_some() {
            info!("Released rppal GPIO bank");
        }
        Ok(())
    }
}

/// rppal output line behind the embedded-hal 1.0 trait
pub struct RppalPin(rppal::gpio::OutputPin);

impl ErrorType for RppalPin {
    type Error = Infallible;
}

impl OutputPin for RppalPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_low();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_high();
        Ok(())
    }
}
