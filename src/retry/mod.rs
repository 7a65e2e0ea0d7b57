// Copyright 2017 CoreOS, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Retry an operation while it fails in a way worth waiting out.
//!
//! Machine operations never retry on their own; this is for callers, e.g.
//! waiting for another user to give a console back.

use std::thread;
use std::time::Duration;

use slog_scope::info;

#[derive(Clone, Debug)]
pub struct Retry {
    initial_backoff: Duration,
    max_backoff: Duration,
    max_retries: u32,
}

impl Default for Retry {
    fn default() -> Self {
        Retry {
            initial_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(60),
            max_retries: 0,
        }
    }
}

impl Retry {
    /// Build a new retrying driver.
    ///
    /// This defaults to a single attempt; waits start at 10 seconds and
    /// double up to one minute.
    pub fn new() -> Self {
        Retry::default()
    }

    /// Set the initial backoff.
    pub fn initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    /// Set the maximum backoff.
    pub fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Maximum number of retries after the initial attempt.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Run `try_fn` until it succeeds, fails with an error `retryable`
    /// rejects, or runs out of retries. The last result is returned.
    pub fn retry_while<F, P, R, E>(self, mut try_fn: F, retryable: P) -> Result<R, E>
    where
        F: FnMut(u32) -> Result<R, E>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut delay = self.initial_backoff;
        let mut attempts = 0;

        loop {
            let err = match try_fn(attempts) {
                Ok(r) => return Ok(r),
                Err(e) => e,
            };
            if attempts >= self.max_retries || !retryable(&err) {
                return Err(err);
            }
            attempts = attempts.saturating_add(1);

            info!("{}; retrying in {:?}", err, delay);
            thread::sleep(delay);

            delay = (delay * 2).min(self.max_backoff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn driver(retries: u32) -> Retry {
        let timings = Duration::from_millis(10);
        Retry::new()
            .initial_backoff(timings)
            .max_backoff(timings)
            .max_retries(retries)
    }

    #[test]
    fn test_no_retries() {
        let res: Result<(), String> = driver(0).retry_while(
            |attempt| {
                assert_eq!(attempt, 0, "unreachable attempt {attempt}");
                Err("busy".to_string())
            },
            |_| true,
        );
        assert_eq!(res, Err("busy".to_string()));
    }

    #[test]
    fn test_succeeds_after_retries() {
        let res: Result<u32, String> = driver(5).retry_while(
            |attempt| {
                if attempt < 3 {
                    Err("busy".to_string())
                } else {
                    Ok(attempt)
                }
            },
            |_| true,
        );
        assert_eq!(res, Ok(3));
    }

    #[test]
    fn test_max_retries() {
        let calls = Cell::new(0);
        let res: Result<(), String> = driver(3).retry_while(
            |_| {
                calls.set(calls.get() + 1);
                Err("busy".to_string())
            },
            |_| true,
        );
        res.unwrap_err();
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_stops_on_fatal_error() {
        let calls = Cell::new(0);
        let res: Result<(), String> = driver(10).retry_while(
            |attempt| {
                calls.set(calls.get() + 1);
                if attempt == 0 {
                    Err("busy".to_string())
                } else {
                    Err("broken".to_string())
                }
            },
            |e| e == "busy",
        );
        assert_eq!(res, Err("broken".to_string()));
        assert_eq!(calls.get(), 2);
    }
}
