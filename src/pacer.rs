/*
 *  pacer.rs
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
use std::time::{Duration, Instant};

/// Keeps each text on the glass for at least `hold` before the next one
pub struct Pacer {
    next_deadline: Option<Instant>,
    hold: Duration,
}

impl Pacer {
    pub fn new(hold: Duration) -> Self {
        Self { next_deadline: None, hold }
    }

    /// Time left before the next text may go out, relative to `now`
    #[inline]
    pub fn remaining(&self, now: Instant) -> Duration {
        self.next_deadline
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Call right after a text went out
    #[inline]
    pub fn shown(&mut self, now: Instant) {
        self.next_deadline = Some(now + self.hold);
    }

    /// Sleep out whatever is left of the current hold
    pub async fn wait(&self) {
        let left = self.remaining(Instant::now());
        if !left.is_zero() {
            tokio::time::sleep(left).await;
        }
    }
}
