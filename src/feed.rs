/*
 *  feed.rs
 *
 *  LcdRelay - two rows, sixteen cells
 *  (c) 2020-26 Stuart Hunter
 *
 *  UDP status feed: datagrams in, display text out
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

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::net::UdpSocket;

use crate::lcd::Lcd;
use crate::pacer::Pacer;

/// Largest datagram we bother reading
pub const MAX_DATAGRAM: usize = 2048;

const RECV_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Failed to bind status feed on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    text: Option<String>,
    line1: Option<String>,
    line2: Option<String>,
}

/// Reading pushed by the shelf sensor client
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SensorReading {
    name: String,
    #[serde(default)]
    wght: i64,
    #[serde(default)]
    current_no: i64,
    #[serde(default)]
    capacity: i64,
    #[serde(default)]
    temp: i64,
    #[serde(default)]
    hmd: i64,
}

impl SensorReading {
    fn to_text(&self) -> String {
        format!(
            "{} Wt:{}\n{}/{} T:{} H:{}",
            self.name, self.wght, self.current_no, self.capacity, self.temp, self.hmd
        )
    }
}

/// Turn a datagram into display text.
///
/// Understands `{"text": ...}`, `{"line1": ..., "line2": ...}`, sensor
/// readings (`{"Name": ..., "Wght": ..., ...}`) and bare JSON strings;
/// anything else is shown as (lossy) UTF-8.
pub fn decode_payload(bytes: &[u8]) -> String {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::String(s)) => s,
        Ok(value @ Value::Object(_)) => decode_object(&value).unwrap_or_else(|| raw_text(bytes)),
        _ => raw_text(bytes),
    }
}

fn decode_object(value: &Value) -> Option<String> {
    match StatusPayload::deserialize(value) {
        Ok(StatusPayload { text: Some(text), .. }) => return Some(text),
        Ok(StatusPayload { line1, line2, .. }) if line1.is_some() || line2.is_some() => {
            return Some(format!("{}\n{}", line1.unwrap_or_default(), line2.unwrap_or_default()));
        }
        Ok(_) => {}
        Err(e) => debug!("Not a text payload: {}", e),
    }
    match SensorReading::deserialize(value) {
        Ok(reading) => Some(reading.to_text()),
        Err(e) => {
            warn!("Unrecognised status payload ({}), showing raw", e);
            None
        }
    }
}

fn raw_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

/// Receives status datagrams and forwards them to the display
pub struct Feed {
    socket: UdpSocket,
    pacer: Pacer,
}

impl Feed {
    pub async fn bind(addr: SocketAddr, hold: Duration) -> Result<Self, FeedError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| FeedError::Bind { addr, source })?;
        info!("Status feed listening on {}", addr);
        Ok(Self { socket, pacer: Pacer::new(hold) })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Give whatever the panel shows right now (the greeting) a full hold
    /// before the first datagram replaces it
    pub fn hold_current(&mut self) {
        self.pacer.shown(Instant::now());
    }

    /// Forward datagrams until the task is dropped
    pub async fn run(mut self, lcd: Lcd) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, peer)) => {
                    let text = decode_payload(&buf[..len]);
                    debug!("Feed datagram from {} ({} bytes): {:?}", peer, len, text);
                    self.pacer.wait().await;
                    lcd.show(text).await;
                    self.pacer.shown(Instant::now());
                }
                Err(e) => {
                    error!("Status feed receive failed: {}", e);
                    tokio::time::sleep(RECV_BACKOFF).await;
                }
            }
        }
    }
}
