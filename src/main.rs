/*
 *  main.rs
 *
 *  LcdRelay - two rows, sixteen cells
 *	(c) 2020-26 Stuart Hunter
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */

use anyhow::Context;
use env_logger::Env;
use log::{error, info};
use tokio::signal::unix::{signal, SignalKind};

use lcdrelay::config::{self, Backend, Config};
use lcdrelay::feed::Feed;
use lcdrelay::lcd::{Lcd, LcdError};
use lcdrelay::pins::{MockBank, MockDelay, Recorder, SysfsBank};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

// dry runs only keep this much bus history
const MOCK_HISTORY: usize = 4096;

/// Asynchronously waits for a SIGINT, SIGTERM, or SIGHUP signal.
async fn signal_handler() -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

/// Claim the configured pin bank and bring the panel up
fn open_lcd(cfg: &Config) -> Result<Lcd, LcdError> {
    let pinout = cfg.pinout();
    let timing = cfg.timing();
    info!("LCD on {:?} bank, pins {:?}, timing {:?}", cfg.backend(), pinout, timing);

    match cfg.backend() {
        Backend::Sysfs => {
            let bank = SysfsBank::open()?;
            Lcd::open(bank, pinout, timing, linux_embedded_hal::Delay)
        }
        #[cfg(feature = "rppal")]
        Backend::Rppal => {
            let bank = lcdrelay::pins::RppalBank::open()?;
            Lcd::open(bank, pinout, timing, linux_embedded_hal::Delay)
        }
        #[cfg(not(feature = "rppal"))]
        Backend::Rppal => Err(LcdError::HardwareUnavailable(
            "built without the 'rppal' feature".to_string(),
        )),
        Backend::Mock => {
            let recorder = Recorder::bounded(pinout, MOCK_HISTORY);
            let bank = MockBank::open(&recorder)?;
            Lcd::open(bank, pinout, timing, MockDelay::new(&recorder))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;

    env_logger::Builder::from_env(Env::default().default_filter_or(cfg.log_filter()))
        .format_timestamp_secs()
        .init();

    info!("{} v.{} built {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), BUILD_DATE);

    let listen = cfg.listen_addr()?;

    // no display, no purpose: construction faults end the process
    let lcd = open_lcd(&cfg).context("LCD initialisation failed")?;

    let mut feed = match Feed::bind(listen, cfg.hold()).await {
        Ok(feed) => feed,
        Err(e) => {
            lcd.close().await;
            return Err(e.into());
        }
    };

    let greeting = cfg.greeting();
    if !greeting.is_empty() {
        lcd.show(greeting).await;
        feed.hold_current();
    }

    tokio::select! {
        result = signal_handler() => {
            if let Err(e) = result {
                error!("Signal handler setup failed: {}", e);
            }
        }
        _ = feed.run(lcd.clone()) => {
            info!("Status feed stopped.");
        }
    }

    info!("Main application exiting. Clearing display.");
    lcd.close().await;
    Ok(())
}
