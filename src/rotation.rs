// Copyright 2024 FastLabs Developers
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

//! Swap the active log file when the calendar date changes.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use jiff::Zoned;

use crate::Error;
use crate::clock::Clock;
use crate::logger::Logger;
use crate::sink::FileSink;
use crate::state::Destination;
use crate::state::LoggerState;

/// The name of the log file for the given date, such as `5January2024.log`.
///
/// Day of month, English month name and year are concatenated without separators.
pub fn log_filename(date: &Zoned) -> String {
    date.strftime("%-d%B%Y.log").to_string()
}

/// The outcome of a rotation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rotation {
    /// The active destination already matches the current date.
    Unchanged,
    /// A new file was opened and is now receiving entries.
    Rotated(PathBuf),
    /// File logging is disabled; entries go to the screen.
    ScreenOnly,
    /// Opening the new file failed; the previous destination stays active.
    Failed,
}

/// Owns the decision of when the active log destination is replaced.
#[derive(Debug)]
pub struct Rotator {
    state: Arc<LoggerState>,
    logger: Arc<Logger>,
    clock: Clock,
    log_dir: PathBuf,
    file_backed: bool,
    // serializes check-open-swap so concurrent checks open the file once
    rotating: Mutex<()>,
}

impl Rotator {
    pub(crate) fn new(
        state: Arc<LoggerState>,
        logger: Arc<Logger>,
        clock: Clock,
        log_dir: PathBuf,
        file_backed: bool,
    ) -> Self {
        Self {
            state,
            logger,
            clock,
            log_dir,
            file_backed,
            rotating: Mutex::new(()),
        }
    }

    /// The path of the file that should be active right now.
    pub fn target_path(&self) -> PathBuf {
        self.log_dir.join(log_filename(&self.clock.now()))
    }

    /// Make sure the active destination matches the current date.
    ///
    /// Idempotent: within one calendar day only the first call performs file I/O. A failure is
    /// logged through the error path of the façade, so it lands in the still-active file, and is
    /// otherwise swallowed. The next check retries independently.
    pub fn ensure_current_rotation(&self) -> Rotation {
        match self.try_rotate() {
            Ok(rotation) => rotation,
            Err(err) => {
                let _ = self.logger.error("failed to update logger", &err);
                Rotation::Failed
            }
        }
    }

    pub(crate) fn try_rotate(&self) -> Result<Rotation, Error> {
        let _rotating = self.rotating.lock().unwrap_or_else(PoisonError::into_inner);

        let target = self.target_path();
        if self.file_backed && self.state.is_active(&target) {
            return Ok(Rotation::Unchanged);
        }
        if !self.file_backed && self.state.is_screen_only() {
            return Ok(Rotation::Unchanged);
        }
        self.open_rotated_file(target)
    }

    /// Open `target` and make it the active destination.
    ///
    /// In screen-only mode no directory or file is touched. Rotation is all-or-nothing: if the
    /// file cannot be opened, the shared state is left as it was.
    pub fn open_rotated_file(&self, target: PathBuf) -> Result<Rotation, Error> {
        if !self.file_backed {
            self.close_previous(self.state.replace(Destination::Screen));
            return Ok(Rotation::ScreenOnly);
        }

        // may already exist; a real problem surfaces when opening the file
        let _ = fs::create_dir_all(&self.log_dir);

        let sink = FileSink::open(&target)?;
        let previous = self.state.replace(Destination::File {
            path: target.clone(),
            sink,
        });
        self.close_previous(previous);
        Ok(Rotation::Rotated(target))
    }

    // Called after the write lock is released, so no write holds `previous` anymore.
    fn close_previous(&self, previous: Option<FileSink>) {
        if let Some(previous) = previous {
            if let Err(err) = previous.flush() {
                let msg = format_args!(
                    "failed to flush previous log file {}",
                    previous.path().display()
                );
                let _ = self.logger.error(msg, &err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::str::FromStr;
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering;
    use std::thread;
    use std::time::Duration;
    use std::time::Instant;

    use jiff::ToSpan;
    use tempfile::TempDir;

    use super::*;
    use crate::clock::ManualClock;
    use crate::scheduler::DailySchedule;
    use crate::scheduler::MissedFire;
    use crate::scheduler::Scheduler;

    fn zoned(s: &str) -> Zoned {
        Zoned::from_str(s).unwrap()
    }

    fn rotator(log_dir: PathBuf, clock: &ManualClock, file_backed: bool) -> Rotator {
        let clock = Clock::ManualClock(clock.clone());
        let state = Arc::new(LoggerState::new());
        let logger = Arc::new(Logger::new(state.clone(), clock.clone()));
        Rotator::new(state, logger, clock, log_dir, file_backed)
    }

    #[test]
    fn test_log_filename() {
        let cases = [
            ("2024-01-05T12:00:00+00:00[UTC]", "5January2024.log"),
            ("2025-03-03T00:00:00+00:00[UTC]", "3March2025.log"),
            ("2024-12-31T23:59:59+00:00[UTC]", "31December2024.log"),
            ("2024-09-10T08:00:00+08:00[Asia/Shanghai]", "10September2024.log"),
        ];
        for (date, expected) in cases {
            assert_eq!(log_filename(&zoned(date)), expected);
        }
    }

    #[test]
    fn test_rotation_is_idempotent() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let log_dir = temp_dir.path().join("log");
        let clock = ManualClock::new(zoned("2024-01-05T09:00:00+00:00[UTC]"));
        let rotator = rotator(log_dir.clone(), &clock, true);

        let expected = log_dir.join("5January2024.log");
        assert_eq!(
            rotator.ensure_current_rotation(),
            Rotation::Rotated(expected.clone())
        );
        assert!(expected.exists());

        // a second check on the same day must not touch the filesystem
        fs::remove_file(&expected).unwrap();
        clock.set_now(zoned("2024-01-05T23:59:59+00:00[UTC]"));
        assert_eq!(rotator.ensure_current_rotation(), Rotation::Unchanged);
        assert!(!expected.exists());
        assert_eq!(rotator.state.active_path(), Some(expected));
    }

    #[test]
    fn test_rotation_across_day_boundary() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let log_dir = temp_dir.path().join("log");
        let clock = ManualClock::new(zoned("2024-01-05T23:59:58+01:00[+01:00]"));
        let rotator = rotator(log_dir.clone(), &clock, true);
        let logger = rotator.logger.clone();

        let day_n = log_dir.join("5January2024.log");
        let day_n1 = log_dir.join("6January2024.log");

        assert_eq!(
            rotator.ensure_current_rotation(),
            Rotation::Rotated(day_n.clone())
        );
        logger.info("before midnight").unwrap();
        let before = fs::read_to_string(&day_n).unwrap();
        assert!(before.contains("before midnight"));

        clock.set_now(zoned("2024-01-06T00:00:00+01:00[+01:00]"));
        assert_eq!(
            rotator.ensure_current_rotation(),
            Rotation::Rotated(day_n1.clone())
        );
        assert_eq!(rotator.state.active_path(), Some(day_n1.clone()));
        logger.info("after midnight").unwrap();

        assert_eq!(fs::read_to_string(&day_n).unwrap(), before);
        let after = fs::read_to_string(&day_n1).unwrap();
        assert!(after.contains("after midnight"));
        assert!(!after.contains("before midnight"));
    }

    #[test]
    fn test_rotation_appends_to_existing_file() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let log_dir = temp_dir.path().join("log");
        fs::create_dir_all(&log_dir).unwrap();
        let path = log_dir.join("5January2024.log");
        fs::write(&path, "from an earlier run\n").unwrap();

        let clock = ManualClock::new(zoned("2024-01-05T09:00:00+00:00[UTC]"));
        let rotator = rotator(log_dir, &clock, true);
        rotator.ensure_current_rotation();
        rotator.logger.info("restarted").unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("from an earlier run\n"));
        assert!(text.contains("restarted"));
    }

    #[test]
    fn test_screen_only_creates_nothing() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let log_dir = temp_dir.path().join("log");
        let clock = ManualClock::new(zoned("2024-01-05T09:00:00+00:00[UTC]"));
        let rotator = rotator(log_dir.clone(), &clock, false);

        assert_eq!(rotator.ensure_current_rotation(), Rotation::ScreenOnly);
        assert!(rotator.state.is_screen_only());
        assert_eq!(rotator.ensure_current_rotation(), Rotation::Unchanged);

        clock.set_now(zoned("2024-01-06T00:00:00+00:00[UTC]"));
        assert_eq!(rotator.ensure_current_rotation(), Rotation::Unchanged);
        assert!(!log_dir.exists());
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_rotation_keeps_previous_file() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let log_dir = temp_dir.path().join("log");
        let clock = ManualClock::new(zoned("2024-01-05T12:00:00+00:00[UTC]"));
        let rotator = rotator(log_dir.clone(), &clock, true);

        let day_n = log_dir.join("5January2024.log");
        rotator.ensure_current_rotation();

        // a directory in the way makes opening the next file fail
        let day_n1 = log_dir.join("6January2024.log");
        fs::create_dir_all(&day_n1).unwrap();

        clock.set_now(zoned("2024-01-06T00:00:00+00:00[UTC]"));
        assert_eq!(rotator.ensure_current_rotation(), Rotation::Failed);
        assert_eq!(rotator.state.active_path(), Some(day_n.clone()));

        let text = fs::read_to_string(&day_n).unwrap();
        assert!(text.contains("level=ERROR"));
        assert!(text.contains("failed to update logger: failed to open log file"));

        // the next check retries on its own
        fs::remove_dir(&day_n1).unwrap();
        assert_eq!(
            rotator.ensure_current_rotation(),
            Rotation::Rotated(day_n1.clone())
        );
        assert_eq!(rotator.state.active_path(), Some(day_n1));
    }

    #[test]
    fn test_concurrent_writes_during_rotation() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let log_dir = temp_dir.path().join("log");
        let clock = ManualClock::new(zoned("2024-01-05T23:59:59+00:00[UTC]"));
        let rotator = Arc::new(rotator(log_dir.clone(), &clock, true));
        rotator.ensure_current_rotation();

        let stop = Arc::new(AtomicBool::new(false));
        let writers = (0..8)
            .map(|i| {
                let logger = rotator.logger.clone();
                let stop = stop.clone();
                thread::spawn(move || {
                    let mut written = 0;
                    while !stop.load(Ordering::Relaxed) || written < 100 {
                        logger.info(format_args!("writer {i} line {written}")).unwrap();
                        written += 1;
                    }
                    written
                })
            })
            .collect::<Vec<_>>();

        let days = ["2024-01-06", "2024-01-07", "2024-01-08"];
        for day in days {
            clock.set_now(zoned(&format!("{day}T00:00:00+00:00[UTC]")));
            assert!(matches!(
                rotator.ensure_current_rotation(),
                Rotation::Rotated(_)
            ));
            thread::yield_now();
        }
        stop.store(true, Ordering::Relaxed);

        let total: usize = writers.into_iter().map(|h| h.join().unwrap()).sum();

        let mut lines = 0;
        for entry in fs::read_dir(&log_dir).unwrap() {
            let text = fs::read_to_string(entry.unwrap().path()).unwrap();
            for line in text.lines() {
                assert!(line.starts_with("time="), "corrupted line: {line}");
                assert!(line.contains(" level=INFO msg=\"writer "), "corrupted line: {line}");
                lines += 1;
            }
        }
        assert_eq!(lines, total);
        assert_eq!(fs::read_dir(&log_dir).unwrap().count(), 4);
        assert_eq!(
            rotator.state.active_path(),
            Some(log_dir.join("8January2024.log"))
        );
    }

    fn wait_for_active(state: &LoggerState, expected: &Path) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while state.active_path().as_deref() != Some(expected) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(state.active_path().as_deref(), Some(expected));
    }

    #[test]
    fn test_scheduler_tick_rotates_to_next_day() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let log_dir = temp_dir.path().join("log");
        let clock = ManualClock::new(zoned("2024-01-05T23:59:59+00:00[UTC]"));
        let rotator = Arc::new(rotator(log_dir.clone(), &clock, true));

        let schedule = DailySchedule::midnight()
            .missed_fire(MissedFire::Immediately)
            .period(10.milliseconds());
        let guard = Scheduler::with_clock(schedule, Clock::ManualClock(clock.clone()))
            .spawn({
                let rotator = rotator.clone();
                move || {
                    rotator.ensure_current_rotation();
                }
            })
            .unwrap();

        let day_n = log_dir.join("5January2024.log");
        wait_for_active(&rotator.state, &day_n);
        rotator.logger.info("before midnight").unwrap();

        clock.set_now(zoned("2024-01-06T00:00:00.5+00:00[UTC]"));
        let day_n1 = log_dir.join("6January2024.log");
        wait_for_active(&rotator.state, &day_n1);
        rotator.logger.info("after midnight").unwrap();
        guard.cancel();

        let before = fs::read_to_string(&day_n).unwrap();
        let after = fs::read_to_string(&day_n1).unwrap();
        assert!(before.contains("before midnight"), "{before}");
        assert!(!before.contains("after midnight"), "{before}");
        assert!(after.contains("after midnight"), "{after}");
        assert_eq!(fs::read_dir(&log_dir).unwrap().count(), 2);
    }
}
