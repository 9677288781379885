//
//  Copyright (C) 2022-2024  Chase Ruskin
//
//  This program is free software: you can redistribute it and/or modify
//  it under the terms of the GNU General Public License as published by
//  the Free Software Foundation, either version 3 of the License, or
//  (at your option) any later version.
//
//  This program is distributed in the hope that it will be useful,
//  but WITHOUT ANY WARRANTY; without even the implied warranty of
//  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//  GNU General Public License for more details.
//
//  You should have received a copy of the GNU General Public License
//  along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::util::anyerror::Fault;
use std::time::Duration;

/// Stderr fragments reported by git when a failure is worth another attempt.
const GIT_TRANSIENT: [&str; 9] = [
    "remote error: internal server error",
    "the remote end hung up unexpectedly",
    "connection timed out",
    "operation timed out",
    "failed to connect to",
    "connection reset by peer",
    "ssl_error_syscall",
    "rpc failed",
    "early eof",
];

/// Stderr fragments that always mark a permanent git failure.
const GIT_PERMANENT: [&str; 5] = [
    "did not match any file(s) known to git",
    "couldn't find remote ref",
    "repository not found",
    "permission denied",
    "could not read from remote repository",
];

/// Outcome of one failed attempt.
#[derive(Debug)]
pub enum Attempt {
    Transient(Fault),
    Permanent(Fault),
}

#[derive(Debug, PartialEq, Clone)]
pub struct RetryPolicy {
    retries: u32,
    factor: u32,
    min_timeout: Duration,
    max_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            factor: 10,
            min_timeout: Duration::from_millis(10_000),
            max_timeout: Duration::from_millis(60_000),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retries(mut self, n: u32) -> Self {
        self.retries = n;
        self
    }

    pub fn factor(mut self, n: u32) -> Self {
        self.factor = n;
        self
    }

    pub fn min_timeout(mut self, d: Duration) -> Self {
        self.min_timeout = d;
        self
    }

    pub fn max_timeout(mut self, d: Duration) -> Self {
        self.max_timeout = d;
        self
    }

    pub fn get_retries(&self) -> u32 {
        self.retries
    }

    /// Checks if another try is allowed after `attempt` retries were already made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.retries
    }

    /// Computes the wait before the retry numbered `attempt` (starting at 0).
    ///
    /// The wait grows geometrically by the factor from the minimum timeout and
    /// saturates at the maximum timeout.
    pub fn delay(&self, attempt: u32) -> Duration {
        let scale = (self.factor.max(1) as u64).saturating_pow(attempt);
        let ms = (self.min_timeout.as_millis() as u64).saturating_mul(scale);
        Duration::from_millis(ms).min(self.max_timeout)
    }

    /// Runs `op` until it succeeds, fails permanently, or runs out of retries.
    pub fn run<T, F>(&self, what: &str, mut op: F) -> Result<T, Fault>
    where
        F: FnMut() -> Result<T, Attempt>,
    {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(r) => return Ok(r),
                Err(Attempt::Permanent(e)) => return Err(e),
                Err(Attempt::Transient(e)) => {
                    if self.should_retry(attempt) == false {
                        return Err(e);
                    }
                    let wait = self.delay(attempt);
                    log::warn!(
                        "retrying {} in {}ms after transient failure: {}",
                        what,
                        wait.as_millis(),
                        e
                    );
                    std::thread::sleep(wait);
                    attempt += 1;
                }
            }
        }
    }
}

/// Checks if a transfer error from curl is worth retrying.
pub fn is_transient_curl(e: &curl::Error) -> bool {
    e.is_couldnt_connect()
        || e.is_operation_timedout()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
}

/// Checks if an HTTP response code signals a temporary server condition.
pub fn is_transient_status(code: u32) -> bool {
    match code {
        429 | 502 | 503 | 504 => true,
        _ => false,
    }
}

/// Classifies a failed git invocation by its standard error output.
///
/// Unknown failures are not retried.
pub fn is_transient_git(stderr: &str) -> bool {
    let text = stderr.to_lowercase();
    if GIT_PERMANENT.iter().any(|p| text.contains(p)) == true {
        return false;
    }
    GIT_TRANSIENT.iter().any(|p| text.contains(p))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::anyerror::AnyError;

    #[test]
    fn backoff_saturates() {
        let p = RetryPolicy::new()
            .factor(2)
            .min_timeout(Duration::from_millis(100))
            .max_timeout(Duration::from_millis(500));
        assert_eq!(p.delay(0), Duration::from_millis(100));
        assert_eq!(p.delay(1), Duration::from_millis(200));
        assert_eq!(p.delay(2), Duration::from_millis(400));
        assert_eq!(p.delay(3), Duration::from_millis(500));
        assert_eq!(p.delay(60), Duration::from_millis(500));
    }

    fn instant() -> RetryPolicy {
        RetryPolicy::new()
            .retries(2)
            .min_timeout(Duration::ZERO)
            .max_timeout(Duration::ZERO)
    }

    #[test]
    fn transient_failures_are_bounded() {
        let mut calls = 0;
        let r: Result<(), Fault> = instant().run("test", || {
            calls += 1;
            Err(Attempt::Transient(AnyError::from("reset").into()))
        });
        assert!(r.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn permanent_failures_are_not_retried() {
        let mut calls = 0;
        let r: Result<(), Fault> = instant().run("test", || {
            calls += 1;
            Err(Attempt::Permanent(AnyError::from("gone").into()))
        });
        assert!(r.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn recovers_after_transient_failure() {
        let mut calls = 0;
        let r = instant().run("test", || {
            calls += 1;
            match calls {
                1 => Err(Attempt::Transient(AnyError::from("timeout").into())),
                _ => Ok(calls),
            }
        });
        assert_eq!(r.unwrap(), 2);
    }

    #[test]
    fn git_stderr_classification() {
        assert_eq!(
            is_transient_git("fatal: The remote end hung up unexpectedly"),
            true
        );
        assert_eq!(
            is_transient_git("error: pathspec 'v9' did not match any file(s) known to git"),
            false
        );
        assert_eq!(is_transient_git("fatal: something odd"), false);
        assert_eq!(is_transient_status(503), true);
        assert_eq!(is_transient_status(404), false);
    }
}
