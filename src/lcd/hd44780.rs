/*
 *  lcd/hd44780.rs
 *
 *  LcdRelay - two rows, sixteen cells
 *  (c) 2020-26 Stuart Hunter
 *
 *  HD44780 character LCD driven over a 4-bit parallel bus
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

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{OutputPin, PinState};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::lcd::error::LcdError;
use crate::lcd::text::{LCD_ROWS, Row};
use crate::pins::{PinBank, PinRole, Pinout};

// DDRAM base address of each line
pub const LCD_LINE_1: u8 = 0x80;
pub const LCD_LINE_2: u8 = 0xC0;

// 4-bit, 2 lines, 5x8 font
pub const CMD_FUNCTION_SET: u8 = 0x28;
// display on, cursor off, blink off
pub const CMD_DISPLAY_ON: u8 = 0x0C;
// cursor moves right, no shift
pub const CMD_ENTRY_MODE: u8 = 0x06;
pub const CMD_CLEAR: u8 = 0x01;

const NIBBLE_INIT: u8 = 0x3;
const NIBBLE_FOUR_BIT: u8 = 0x2;

const POWER_ON_SETTLE_MS: u32 = 5;
const INIT_SETTLE_US: u32 = 120;
const CLEAR_SETTLE_MS: u32 = 5;
const FAREWELL_PAUSE_MS: u32 = 1000;

/// Bus timing in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    /// Wait around each edge of the enable pulse
    pub toggle_us: u32,
    /// Wait after every byte (or lone init nibble)
    pub settle_us: u32,
}

impl Timing {
    pub const MIN_TOGGLE_US: u32 = 1;
    pub const MIN_SETTLE_US: u32 = 50;
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            toggle_us: Self::MIN_TOGGLE_US,
            settle_us: Self::MIN_SETTLE_US,
        }
    }
}

/// Register the controller routes a byte to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// RS low: instruction register
    Command,
    /// RS high: data register (character)
    Character,
}

impl Mode {
    fn rs_level(self) -> bool {
        matches!(self, Mode::Character)
    }
}

/// DDRAM address command for a panel line (0 = top)
pub fn line_address(line: usize) -> u8 {
    if line == 0 { LCD_LINE_1 } else { LCD_LINE_2 }
}

struct Bus<P: OutputPin> {
    rs: P,
    e: P,
    d4: P,
    d5: P,
    d6: P,
    d7: P,
}

impl<P: OutputPin> Bus<P> {
    fn pin_mut(&mut self, role: PinRole) -> &mut P {
        match role {
            PinRole::RegisterSelect => &mut self.rs,
            PinRole::Enable => &mut self.e,
            PinRole::D4 => &mut self.d4,
            PinRole::D5 => &mut self.d5,
            PinRole::D6 => &mut self.d6,
            PinRole::D7 => &mut self.d7,
        }
    }
}

/// Blocking HD44780 driver.
///
/// Owns the pin bank and the six lines taken from it. Construction runs the
/// power-on sequence; [`Hd44780::shutdown`] blanks the panel, parks the
/// lines low and releases the bank.
pub struct Hd44780<B: PinBank, D: DelayNs> {
    bank: B,
    bus: Bus<B::Pin>,
    pinout: Pinout,
    timing: Timing,
    delay: D,
}

impl<B: PinBank, D: DelayNs> Hd44780<B, D> {
    /// Claim the six lines from `bank` and bring the controller up.
    ///
    /// On any failure the bank is released before the error is returned.
    pub fn new(mut bank: B, pinout: Pinout, timing: Timing, delay: D) -> Result<Self, LcdError> {
        let bus = match pinout.validate().and_then(|_| Self::claim(&mut bank, &pinout)) {
            Ok(bus) => bus,
            Err(e) => {
                release(&mut bank);
                return Err(e);
            }
        };

        let mut lcd = Self { bank, bus, pinout, timing, delay };
        if let Err(e) = lcd.reset() {
            release(&mut lcd.bank);
            return Err(e);
        }
        Ok(lcd)
    }

    fn claim(bank: &mut B, pinout: &Pinout) -> Result<Bus<B::Pin>, LcdError> {
        Ok(Bus {
            rs: bank.configure(pinout.rs)?,
            e: bank.configure(pinout.e)?,
            d4: bank.configure(pinout.d4)?,
            d5: bank.configure(pinout.d5)?,
            d6: bank.configure(pinout.d6)?,
            d7: bank.configure(pinout.d7)?,
        })
    }

    fn reset(&mut self) -> Result<(), LcdError> {
        info!("Initialising HD44780 in 4-bit mode");

        self.write_nibble_settled(NIBBLE_INIT, Mode::Command)?;
        self.delay.delay_ms(POWER_ON_SETTLE_MS);
        self.write_nibble_settled(NIBBLE_INIT, Mode::Command)?;
        self.delay.delay_us(INIT_SETTLE_US);
        self.write_nibble_settled(NIBBLE_INIT, Mode::Command)?;
        self.delay.delay_us(INIT_SETTLE_US);

        self.write_nibble_settled(NIBBLE_FOUR_BIT, Mode::Command)?;
        self.delay.delay_us(INIT_SETTLE_US);

        self.command(CMD_FUNCTION_SET)?;
        self.command(CMD_DISPLAY_ON)?;
        self.command(CMD_ENTRY_MODE)?;
        self.command(CMD_CLEAR)?;
        self.delay.delay_ms(CLEAR_SETTLE_MS);

        info!("HD44780 initialised");
        Ok(())
    }

    fn drive(&mut self, role: PinRole, high: bool) -> Result<(), LcdError> {
        let pin = self.pinout.index(role);
        self.bus
            .pin_mut(role)
            .set_state(PinState::from(high))
            .map_err(|e| LcdError::PinWriteFault { role, pin, reason: format!("{:?}", e) })
    }

    fn pulse_enable(&mut self) -> Result<(), LcdError> {
        self.delay.delay_us(self.timing.toggle_us);
        self.drive(PinRole::Enable, true)?;
        self.delay.delay_us(self.timing.toggle_us);
        self.drive(PinRole::Enable, false)?;
        self.delay.delay_us(self.timing.toggle_us);
        Ok(())
    }

    /// Clock the low four bits of `bits` onto D4..D7 (bit0 on D4)
    fn write_nibble(&mut self, bits: u8, mode: Mode) -> Result<(), LcdError> {
        self.drive(PinRole::RegisterSelect, mode.rs_level())?;
        self.drive(PinRole::D4, bits & 0x01 != 0)?;
        self.drive(PinRole::D5, bits & 0x02 != 0)?;
        self.drive(PinRole::D6, bits & 0x04 != 0)?;
        self.drive(PinRole::D7, bits & 0x08 != 0)?;
        self.pulse_enable()
    }

    fn write_nibble_settled(&mut self, bits: u8, mode: Mode) -> Result<(), LcdError> {
        self.write_nibble(bits, mode)?;
        self.delay.delay_us(self.timing.settle_us);
        Ok(())
    }

    /// Send a full byte, high nibble first, RS held for both halves
    pub fn write_byte(&mut self, bits: u8, mode: Mode) -> Result<(), LcdError> {
        self.write_nibble(bits >> 4, mode)?;
        self.write_nibble(bits & 0x0F, mode)?;
        self.delay.delay_us(self.timing.settle_us);
        Ok(())
    }

    pub fn command(&mut self, cmd: u8) -> Result<(), LcdError> {
        self.write_byte(cmd, Mode::Command)
    }

    /// Address `line` and write all sixteen cells of `row`
    pub fn write_row(&mut self, line: usize, row: &Row) -> Result<(), LcdError> {
        debug_assert!(line < LCD_ROWS);
        self.command(line_address(line))?;
        for &cell in row.as_bytes() {
            self.write_byte(cell, Mode::Character)?;
        }
        Ok(())
    }

    /// Blank both lines, hold a moment, clear, park the bus low and
    /// release the bank.
    ///
    /// The bank is released even when a write fails; the first fault is
    /// returned.
    pub fn shutdown(mut self) -> Result<(), LcdError> {
        let farewell = self.farewell();
        if let Err(e) = &farewell {
            warn!("LCD farewell sequence aborted: {}", e);
        }
        let parked = self.park();
        release(&mut self.bank);
        farewell.and(parked)
    }

    fn farewell(&mut self) -> Result<(), LcdError> {
        let blank = Row::blank();
        for line in 0..LCD_ROWS {
            self.write_row(line, &blank)?;
        }
        self.delay.delay_ms(FAREWELL_PAUSE_MS);

        self.command(CMD_CLEAR)?;
        self.command(CMD_DISPLAY_ON)
    }

    /// Drive every line low, continuing past failures
    fn park(&mut self) -> Result<(), LcdError> {
        let mut first = Ok(());
        for role in PinRole::ALL {
            if let Err(e) = self.drive(role, false) {
                warn!("Failed to park {}: {}", role, e);
                if first.is_ok() {
                    first = Err(e);
                }
            }
        }
        debug!("LCD bus parked low");
        first
    }
}

fn release<B: PinBank>(bank: &mut B) {
    if let Err(e) = bank.close() {
        warn!("Failed to release pin bank: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins::mock::{pair_latches, Latch, MockBank, MockDelay, PinEvent, Recorder, Transfer};

    fn open(recorder: &Recorder) -> Hd44780<MockBank, MockDelay> {
        let bank = MockBank::open(recorder).unwrap();
        Hd44780::new(bank, recorder.pinout(), Timing::default(), MockDelay::new(recorder)).unwrap()
    }

    fn cmd(byte: u8) -> Transfer {
        Transfer { rs: false, byte }
    }

    #[test]
    fn test_init_sequence() {
        let recorder = Recorder::new(Pinout::default());
        let _lcd = open(&recorder);

        let latches = recorder.latches();
        let init: Vec<u8> = latches[..4].iter().map(|l| l.nibble).collect();
        assert_eq!(init, vec![0x3, 0x3, 0x3, 0x2]);
        assert!(latches.iter().all(|l| !l.rs));
        assert_eq!(
            pair_latches(&latches[4..]),
            vec![cmd(0x28), cmd(0x0C), cmd(0x06), cmd(0x01)]
        );
    }

    #[test]
    fn test_init_settle_delays() {
        let recorder = Recorder::new(Pinout::default());
        let _lcd = open(&recorder);

        // long waits only: the 1us toggles and 50us settles are noise here
        let long: Vec<u64> = recorder
            .delays_since((0, 0))
            .into_iter()
            .filter(|ns| *ns > 50_000)
            .collect();
        assert_eq!(long, vec![5_000_000, 120_000, 120_000, 120_000, 5_000_000]);
    }

    #[test]
    fn test_pins_configured_before_writes() {
        let pinout = Pinout::default();
        let recorder = Recorder::new(pinout);
        let _lcd = open(&recorder);

        let events = recorder.events();
        let configured: Vec<u8> = events
            .iter()
            .take(6)
            .filter_map(|e| match e {
                PinEvent::Configure(i) => Some(*i),
                _ => None,
            })
            .collect();
        assert_eq!(configured, vec![6, 5, 25, 24, 23, 17]);
    }

    #[test]
    fn test_write_byte_nibble_order_and_rs() {
        let recorder = Recorder::new(Pinout::default());
        let mut lcd = open(&recorder);

        for byte in [0x00u8, 0x5A, 0xA5, 0xFF, b'H'] {
            let mark = recorder.mark();
            lcd.write_byte(byte, Mode::Character).unwrap();
            assert_eq!(
                recorder.latches_since(mark),
                vec![
                    Latch { rs: true, nibble: byte >> 4 },
                    Latch { rs: true, nibble: byte & 0x0F },
                ]
            );
        }
    }

    #[test]
    fn test_enable_pulse_timing() {
        let pinout = Pinout::default();
        let recorder = Recorder::new(pinout);
        let mut lcd = open(&recorder);

        let mark = recorder.mark();
        lcd.command(CMD_CLEAR).unwrap();
        let events = recorder.events_since(mark);

        let toggle = PinEvent::Delay { ns: 1_000 };
        let pulse = [toggle, PinEvent::High(pinout.e), toggle, PinEvent::Low(pinout.e), toggle];
        let pulses = events.windows(5).filter(|w| *w == pulse).count();
        assert_eq!(pulses, 2);
        assert_eq!(events.last(), Some(&PinEvent::Delay { ns: 50_000 }));
    }

    #[test]
    fn test_write_row_addresses() {
        let recorder = Recorder::new(Pinout::default());
        let mut lcd = open(&recorder);

        let mark = recorder.mark();
        lcd.write_row(1, &Row::fit("ab")).unwrap();
        let transfers = recorder.transfers_since(mark);
        assert_eq!(transfers.len(), 17);
        assert_eq!(transfers[0], cmd(LCD_LINE_2));
        assert_eq!(transfers[1], Transfer { rs: true, byte: b'a' });
        assert!(transfers[3..].iter().all(|t| *t == Transfer { rs: true, byte: b' ' }));
    }

    #[test]
    fn test_init_failure_releases_bank() {
        let recorder = Recorder::new(Pinout::default());
        recorder.fail_writes_on(Some(PinRole::D5));
        let bank = MockBank::open(&recorder).unwrap();

        let result = Hd44780::new(bank, recorder.pinout(), Timing::default(), MockDelay::new(&recorder));
        assert!(matches!(result, Err(LcdError::PinWriteFault { role: PinRole::D5, .. })));
        assert!(!recorder.is_claimed());
    }

    #[test]
    fn test_invalid_pinout_releases_bank() {
        let pinout = Pinout { d4: 6, ..Pinout::default() };
        let recorder = Recorder::new(pinout);
        let bank = MockBank::open(&recorder).unwrap();

        let result = Hd44780::new(bank, pinout, Timing::default(), MockDelay::new(&recorder));
        assert!(matches!(result, Err(LcdError::InvalidPinout(_))));
        assert_eq!(recorder.release_count(), 1);
    }

    #[test]
    fn test_shutdown_sequence() {
        let pinout = Pinout::default();
        let recorder = Recorder::new(pinout);
        let lcd = open(&recorder);

        let mark = recorder.mark();
        lcd.shutdown().unwrap();

        let transfers = recorder.transfers_since(mark);
        assert_eq!(transfers.len(), 36);
        assert_eq!(transfers[0], cmd(LCD_LINE_1));
        assert_eq!(transfers[17], cmd(LCD_LINE_2));
        assert_eq!(&transfers[34..], &[cmd(CMD_CLEAR), cmd(CMD_DISPLAY_ON)]);

        assert!(recorder.delays_since(mark).contains(&1_000_000_000));
        for role in PinRole::ALL {
            assert_eq!(recorder.level(role), Some(false));
        }
        assert_eq!(recorder.events().last(), Some(&PinEvent::Release));
        assert!(!recorder.is_claimed());
    }

    #[test]
    fn test_shutdown_fault_still_releases() {
        let recorder = Recorder::new(Pinout::default());
        let lcd = open(&recorder);

        recorder.fail_writes_on(Some(PinRole::Enable));
        let result = lcd.shutdown();
        assert!(result.is_err());
        assert_eq!(recorder.level(PinRole::D4), Some(false));
        assert!(!recorder.is_claimed());
    }
}
