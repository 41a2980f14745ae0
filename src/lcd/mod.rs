/*
 *  lcd/mod.rs
 *
 *  LcdRelay - two rows, sixteen cells
 *  (c) 2020-26 Stuart Hunter
 *
 *  Character LCD subsystem
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

pub mod actor;
pub mod error;
pub mod hd44780;
pub mod text;

// Re-exports for convenience
pub use actor::{Lcd, LcdState, LcdStats};
pub use error::LcdError;
pub use hd44780::{Hd44780, Mode, Timing, LCD_LINE_1, LCD_LINE_2};
pub use text::{Layout, Row, LCD_ROWS, LCD_WIDTH};
