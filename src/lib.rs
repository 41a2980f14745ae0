/*
 *  lib.rs
 *
 *  LcdRelay - two rows, sixteen cells
 *  (c) 2020-26 Stuart Hunter
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

//! Drive a 2x16 HD44780 character LCD over a 4-bit GPIO bus.
//!
//! [`lcd::Lcd`] owns the bus through a single worker thread; callers hand it
//! text with [`lcd::Lcd::show`] and shut it down with [`lcd::Lcd::close`].
//! Pin banks live in [`pins`], including a recording mock for running
//! without hardware.

pub mod config;
pub mod feed;
pub mod lcd;
pub mod pacer;
pub mod pins;

pub use lcd::{Lcd, LcdError, LcdState};
