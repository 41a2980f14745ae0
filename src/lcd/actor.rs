/*
 *  lcd/actor.rs
 *
 *  LcdRelay - two rows, sixteen cells
 *  (c) 2020-26 Stuart Hunter
 *
 *  LCD handle and the worker thread that owns the bus
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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot, watch};

use crate::lcd::error::LcdError;
use crate::lcd::hd44780::{Hd44780, Timing};
use crate::lcd::text::{LCD_ROWS, Layout, Row};
use crate::pins::{PinBank, Pinout};

/// Lifecycle of the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LcdState {
    Uninitialized,
    Ready,
    Closing,
    Closed,
}

/// Counters kept alongside the row buffers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LcdStats {
    /// Render requests taken off the inbox while ready
    pub renders: u64,
    /// Rows actually transmitted
    pub rows_written: u64,
    /// Rows skipped because the panel already showed them
    pub rows_suppressed: u64,
    /// Rows past the second line
    pub rows_dropped: u64,
    /// Renders abandoned on a pin write fault
    pub faults: u64,
}

/// State shared between the worker and the handles
#[derive(Debug)]
struct Frame {
    active: bool,
    /// What each line physically shows; `None` until written or after a fault
    rows: [Option<Row>; LCD_ROWS],
    stats: LcdStats,
}

enum Request {
    Show(String),
    Flush(oneshot::Sender<()>),
    Close,
}

/// Handle to a running display.
///
/// Cloning is cheap and every clone talks to the same worker. The worker owns
/// the bus exclusively; requests reach it one at a time through an inbox of
/// depth one, so [`Lcd::show`] waits while the previous text is still being
/// clocked out. Dropping every handle closes the display as
/// [`Lcd::close`] would.
#[derive(Debug, Clone)]
pub struct Lcd {
    inbox: mpsc::Sender<Request>,
    closing: Arc<AtomicBool>,
    frame: Arc<Mutex<Frame>>,
    state: watch::Receiver<LcdState>,
}

impl Lcd {
    /// Bring the panel up on `bank` and start the worker.
    ///
    /// Blocks for the power-on sequence (tens of milliseconds). Fails if the
    /// lines cannot be claimed or driven; the bank is released in that case.
    pub fn open<B, D>(bank: B, pinout: Pinout, timing: Timing, delay: D) -> Result<Self, LcdError>
    where
        B: PinBank,
        D: DelayNs + Send + 'static,
    {
        let (state_tx, state_rx) = watch::channel(LcdState::Uninitialized);
        let driver = Hd44780::new(bank, pinout, timing, delay)?;
        state_tx.send_replace(LcdState::Ready);

        let (inbox, rx) = mpsc::channel(1);
        let closing = Arc::new(AtomicBool::new(false));
        let frame = Arc::new(Mutex::new(Frame {
            active: true,
            rows: [None; LCD_ROWS],
            stats: LcdStats::default(),
        }));

        let worker = Worker {
            driver: Some(driver),
            inbox: rx,
            closing: Arc::clone(&closing),
            frame: Arc::clone(&frame),
            state: state_tx,
        };
        thread::Builder::new()
            .name("lcd-worker".to_string())
            .spawn(move || worker.run())?;

        Ok(Self { inbox, closing, frame, state: state_rx })
    }

    /// Queue `text` for display; rows are separated by `\n`.
    ///
    /// A no-op once the display is closing.
    pub async fn show(&self, text: impl Into<String>) {
        if self.closing.load(Ordering::SeqCst) {
            debug!("Lcd.show after close, dropped");
            return;
        }
        if self.inbox.send(Request::Show(text.into())).await.is_err() {
            debug!("Lcd.show: worker gone, dropped");
        }
    }

    /// Wait until everything queued before this call has been rendered
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.inbox.send(Request::Flush(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Blank and release the display, returning once it is closed.
    ///
    /// Safe to call from any task and any number of times.
    pub async fn close(&self) {
        if !self.closing.swap(true, Ordering::SeqCst) {
            info!("Lcd.close requested");
            // the worker may already be gone if every other handle was dropped
            let _ = self.inbox.send(Request::Close).await;
        }
        self.closed().await;
    }

    /// Resolves once the bank has been released
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == LcdState::Closed).await;
    }

    pub fn state(&self) -> LcdState {
        *self.state.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.lock_frame().active
    }

    /// Rows as last written to the panel
    pub fn rows(&self) -> [Option<Row>; LCD_ROWS] {
        self.lock_frame().rows
    }

    pub fn stats(&self) -> LcdStats {
        self.lock_frame().stats
    }

    fn lock_frame(&self) -> MutexGuard<'_, Frame> {
        lock(&self.frame)
    }
}

fn lock(frame: &Mutex<Frame>) -> MutexGuard<'_, Frame> {
    frame.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Worker<B: PinBank, D: DelayNs> {
    driver: Option<Hd44780<B, D>>,
    inbox: mpsc::Receiver<Request>,
    closing: Arc<AtomicBool>,
    frame: Arc<Mutex<Frame>>,
    state: watch::Sender<LcdState>,
}

impl<B: PinBank, D: DelayNs> Worker<B, D> {
    fn run(mut self) {
        debug!("LCD worker started");
        while let Some(request) = self.inbox.blocking_recv() {
            // shutdown wins over anything still queued
            if self.closing.load(Ordering::SeqCst) {
                break;
            }
            match request {
                Request::Show(text) => self.render(&text),
                Request::Flush(done) => {
                    let _ = done.send(());
                }
                Request::Close => break,
            }
        }
        self.teardown();
    }

    fn render(&mut self, text: &str) {
        let Some(driver) = self.driver.as_mut() else {
            return;
        };
        let stored = {
            let frame = lock(&self.frame);
            if !frame.active {
                debug!("Lcd.display on inactive panel, dropped");
                return;
            }
            frame.rows
        };

        debug!("Lcd.display({:?})", text);
        let layout = Layout::from_text(text);
        if layout.overflow > 0 {
            warn!("{}", LcdError::TooManyRows { rows: layout.segments(), max: LCD_ROWS });
        }

        let mut written = 0;
        let mut suppressed = 0;
        let mut fault = None;
        for (line, row) in layout.rows.iter().enumerate() {
            if stored[line].as_ref() == Some(row) {
                debug!("Row {} unchanged, skipped", line + 1);
                suppressed += 1;
                continue;
            }
            match driver.write_row(line, row) {
                Ok(()) => {
                    written += 1;
                    lock(&self.frame).rows[line] = Some(*row);
                }
                Err(e) => {
                    // half written: force a rewrite next time
                    lock(&self.frame).rows[line] = None;
                    fault = Some(e);
                    break;
                }
            }
        }

        let mut frame = lock(&self.frame);
        frame.stats.renders += 1;
        frame.stats.rows_written += written;
        frame.stats.rows_suppressed += suppressed;
        frame.stats.rows_dropped += layout.overflow as u64;
        if let Some(e) = fault {
            frame.stats.faults += 1;
            drop(frame);
            error!("Lcd.display abandoned: {}", e);
        }
    }

    fn teardown(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        let Some(driver) = self.driver.take() else {
            return;
        };

        {
            let frame = lock(&self.frame);
            debug!("Lcd.close() active: {}", frame.active);
            self.state.send_replace(LcdState::Closing);
        }

        if let Err(e) = driver.shutdown() {
            if e.is_hardware_fault() {
                error!("LCD shutdown incomplete, bus state unknown: {}", e);
            } else {
                error!("LCD shutdown incomplete: {}", e);
            }
        }

        let mut frame = lock(&self.frame);
        frame.active = false;
        frame.rows = [None; LCD_ROWS];
        self.state.send_replace(LcdState::Closed);
        drop(frame);
        info!("LCD closed, pin bank released");
    }
}

impl<B: PinBank, D: DelayNs> Drop for Worker<B, D> {
    fn drop(&mut self) {
        // covers a failed spawn or a panic inside the loop
        self.teardown();
    }
}
