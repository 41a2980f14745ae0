/*
 *  pins/mock.rs
 *
 *  LcdRelay - two rows, sixteen cells
 *  (c) 2020-26 Stuart Hunter
 *
 *  Recording pin bank and delay for running without hardware
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

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, ErrorKind, ErrorType, OutputPin};

use crate::lcd::error::LcdError;
use crate::pins::{PinBank, PinRole, Pinout};

/// One observable action on the mock bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinEvent {
    Configure(u8),
    High(u8),
    Low(u8),
    Delay { ns: u64 },
    Release,
}

/// Data lines sampled on a falling edge of E, i.e. what the controller latched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Latch {
    /// RS level (true = character register)
    pub rs: bool,
    /// D7..D4 as bit3..bit0
    pub nibble: u8,
}

/// Two consecutive latches folded back into the byte they carried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub rs: bool,
    pub byte: u8,
}

/// Shared state behind a [`Recorder`]
#[derive(Debug, Default)]
struct MockBankState {
    /// Everything that happened, in order
    events: Vec<PinEvent>,

    /// Latched nibbles, in order
    latches: Vec<Latch>,

    /// Last level driven on each configured line
    levels: HashMap<u8, bool>,

    /// A bank currently holds the lines
    claimed: bool,

    /// Number of times a bank was released
    release_count: usize,

    /// Trim `events` and `latches` to this many entries
    history_limit: Option<usize>,

    /// Simulate failures (for error testing)
    fail_next_open: bool,
    fail_writes_on: Option<u8>,
}

impl MockBankState {
    fn push(&mut self, event: PinEvent) {
        self.events.push(event);
        if let Some(limit) = self.history_limit {
            if self.events.len() > limit * 2 {
                let excess = self.events.len() - limit;
                self.events.drain(..excess);
            }
        }
    }

    fn latch(&mut self, latch: Latch) {
        self.latches.push(latch);
        if let Some(limit) = self.history_limit {
            if self.latches.len() > limit * 2 {
                let excess = self.latches.len() - limit;
                self.latches.drain(..excess);
            }
        }
    }
}

/// Inspection handle over the recorded bus traffic.
///
/// Cloning is cheap; every clone sees the same state. Hand one to
/// [`MockBank::open`] and [`MockDelay::new`], keep another for assertions.
#[derive(Debug, Clone)]
pub struct Recorder {
    pinout: Pinout,
    state: Arc<Mutex<MockBankState>>,
}

impl Recorder {
    pub fn new(pinout: Pinout) -> Self {
        Self {
            pinout,
            state: Arc::new(Mutex::new(MockBankState::default())),
        }
    }

    /// Recorder that only keeps recent history, for long running dry runs
    pub fn bounded(pinout: Pinout, limit: usize) -> Self {
        let recorder = Self::new(pinout);
        recorder.lock().history_limit = Some(limit.max(1));
        recorder
    }

    pub fn pinout(&self) -> Pinout {
        self.pinout
    }

    fn lock(&self) -> MutexGuard<'_, MockBankState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<PinEvent> {
        self.lock().events.clone()
    }

    pub fn latches(&self) -> Vec<Latch> {
        self.lock().latches.clone()
    }

    /// Position to diff against with the `*_since` accessors
    pub fn mark(&self) -> (usize, usize) {
        let state = self.lock();
        (state.events.len(), state.latches.len())
    }

    pub fn events_since(&self, mark: (usize, usize)) -> Vec<PinEvent> {
        self.lock().events.get(mark.0..).map(<[PinEvent]>::to_vec).unwrap_or_default()
    }

    pub fn latches_since(&self, mark: (usize, usize)) -> Vec<Latch> {
        self.lock().latches.get(mark.1..).map(<[Latch]>::to_vec).unwrap_or_default()
    }

    /// Pair the latches recorded since `mark` into bytes, high nibble first
    pub fn transfers_since(&self, mark: (usize, usize)) -> Vec<Transfer> {
        pair_latches(&self.latches_since(mark))
    }

    /// High/low writes since `mark`, ignoring delays and lifecycle events
    pub fn pin_writes_since(&self, mark: (usize, usize)) -> usize {
        self.events_since(mark)
            .iter()
            .filter(|e| matches!(e, PinEvent::High(_) | PinEvent::Low(_)))
            .count()
    }

    pub fn delays_since(&self, mark: (usize, usize)) -> Vec<u64> {
        self.events_since(mark)
            .iter()
            .filter_map(|e| match e {
                PinEvent::Delay { ns } => Some(*ns),
                _ => None,
            })
            .collect()
    }

    pub fn level(&self, role: PinRole) -> Option<bool> {
        self.lock().levels.get(&self.pinout.index(role)).copied()
    }

    pub fn is_claimed(&self) -> bool {
        self.lock().claimed
    }

    pub fn release_count(&self) -> usize {
        self.lock().release_count
    }

    /// Make every write to `role` fail until cleared with `None`
    pub fn fail_writes_on(&self, role: Option<PinRole>) {
        self.lock().fail_writes_on = role.map(|r| self.pinout.index(r));
    }

    /// Make the next [`MockBank::open`] fail as if the bank were missing
    pub fn fail_next_open(&self) {
        self.lock().fail_next_open = true;
    }

    fn drive(&self, index: u8, high: bool) -> Result<(), MockPinError> {
        let mut state = self.lock();
        if state.fail_writes_on == Some(index) {
            return Err(MockPinError { index });
        }
        state.push(if high { PinEvent::High(index) } else { PinEvent::Low(index) });
        let was_high = state.levels.insert(index, high).unwrap_or(false);

        // falling edge on E: the controller samples RS and D4..D7
        if index == self.pinout.e && was_high && !high {
            let level = |i: u8| state.levels.get(&i).copied().unwrap_or(false);
            let nibble = (level(self.pinout.d4) as u8)
                | (level(self.pinout.d5) as u8) << 1
                | (level(self.pinout.d6) as u8) << 2
                | (level(self.pinout.d7) as u8) << 3;
            let rs = level(self.pinout.rs);
            state.latch(Latch { rs, nibble });
        }
        Ok(())
    }
}

/// Fold latches pairwise into bytes; a trailing odd latch is ignored
pub fn pair_latches(latches: &[Latch]) -> Vec<Transfer> {
    latches
        .chunks_exact(2)
        .map(|pair| Transfer {
            rs: pair[0].rs,
            byte: (pair[0].nibble << 4) | pair[1].nibble,
        })
        .collect()
}

/// Pin bank that records instead of touching hardware
#[derive(Debug)]
pub struct MockBank {
    recorder: Recorder,
    closed: bool,
}

impl MockBank {
    /// Claim the recorder's bank; fails if another bank still holds it
    pub fn open(recorder: &Recorder) -> Result<Self, LcdError> {
        let mut state = recorder.lock();
        if state.fail_next_open {
            state.fail_next_open = false;
            return Err(LcdError::HardwareUnavailable("simulated open failure".to_string()));
        }
        if state.claimed {
            return Err(LcdError::HardwareUnavailable("mock bank already claimed".to_string()));
        }
        state.claimed = true;
        drop(state);

        Ok(Self { recorder: recorder.clone(), closed: false })
    }
}

impl PinBank for MockBank {
    type Pin = MockPin;

    fn configure(&mut self, index: u8) -> Result<MockPin, LcdError> {
        if self.closed {
            return Err(LcdError::HardwareUnavailable(format!(
                "mock bank closed, cannot configure BCM {}", index
            )));
        }
        self.recorder.lock().push(PinEvent::Configure(index));
        Ok(MockPin { index, recorder: self.recorder.clone() })
    }

    fn close(&mut self) -> Result<(), LcdError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut state = self.recorder.lock();
        state.push(PinEvent::Release);
        state.claimed = false;
        state.release_count += 1;
        Ok(())
    }
}

/// Output line on a [`MockBank`]
#[derive(Debug)]
pub struct MockPin {
    index: u8,
    recorder: Recorder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockPinError {
    pub index: u8,
}

impl digital::Error for MockPinError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl ErrorType for MockPin {
    type Error = MockPinError;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.recorder.drive(self.index, false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.recorder.drive(self.index, true)
    }
}

/// Delay that records the requested wait and returns immediately, or
/// also sleeps it out when built with [`MockDelay::sleeping`]
#[derive(Debug, Clone)]
pub struct MockDelay {
    recorder: Recorder,
    sleep: bool,
}

impl MockDelay {
    pub fn new(recorder: &Recorder) -> Self {
        Self { recorder: recorder.clone(), sleep: false }
    }

    /// Recording delay that blocks for the real duration
    pub fn sleeping(recorder: &Recorder) -> Self {
        Self { recorder: recorder.clone(), sleep: true }
    }

    fn record(&mut self, ns: u64) {
        self.recorder.lock().push(PinEvent::Delay { ns });
        if self.sleep {
            thread::sleep(Duration::from_nanos(ns));
        }
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.record(u64::from(ns));
    }

    fn delay_us(&mut self, us: u32) {
        self.record(u64::from(us) * 1_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.record(u64::from(ms) * 1_000_000);
    }
}
