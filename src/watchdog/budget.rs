// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Fixed-window restart budget

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Window {
    count: u32,
    start: Instant,
}

/// Caps restart actions per window. `try_spend` is serialized, so concurrent
/// callers can never exceed `max` within one window.
#[derive(Debug)]
pub struct RestartBudget {
    max: u32,
    window: Duration,
    state: Mutex<Window>,
}

impl RestartBudget {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            state: Mutex::new(Window {
                count: 0,
                start: Instant::now(),
            }),
        }
    }

    /// Take one unit from the current window. Returns false once the window is exhausted.
    pub fn try_spend(&self) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let now = Instant::now();
        if now.duration_since(state.start) >= self.window {
            state.start = now;
            state.count = 0;
        }

        if state.count >= self.max {
            return false;
        }
        state.count += 1;
        true
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}
