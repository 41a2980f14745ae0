/*
 *  lcd/error.rs
 *
 *  LcdRelay - two rows, sixteen cells
 *  (c) 2020-26 Stuart Hunter
 *
 *  Error types for the LCD subsystem
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

use thiserror::Error;

use crate::pins::PinRole;

/// Unified error type for all LCD operations
#[derive(Debug, Error)]
pub enum LcdError {
    /// Pin bank or an individual line could not be claimed
    #[error("GPIO hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// A write to a configured line failed mid transmission
    #[error("Pin write fault on {role} (BCM {pin}): {reason}")]
    PinWriteFault { role: PinRole, pin: u8, reason: String },

    /// Render request carried more rows than the panel has
    #[error("Too many lines: {rows} given, {max} shown")]
    TooManyRows { rows: usize, max: usize },

    /// Pin assignment is unusable
    #[error("Invalid pinout: {0}")]
    InvalidPinout(String),

    /// Worker thread could not be started
    #[error("LCD worker failed to start: {0}")]
    Worker(#[from] std::io::Error),
}

impl LcdError {
    /// Faults that leave the controller in an unknown state
    pub fn is_hardware_fault(&self) -> bool {
        matches!(self, LcdError::PinWriteFault { .. })
    }
}
