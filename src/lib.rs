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

//! Daylog writes log entries to a file named after the current date, such as
//! `log/5January2024.log`, and switches to a new file at local midnight.
//!
//! # Overview
//!
//! [`init`] opens today's file (or selects screen-only mode) and starts a background scheduler
//! that re-checks the date at the configured local time of day. The returned [`DailyLog`] hands
//! out the [`Logger`] façade, whose writes never overlap with a file swap.
//!
//! # Examples
//!
//! ```no_run
//! let handle = daylog::init(daylog::Config::from_env()).unwrap();
//!
//! let logger = handle.logger();
//! logger.info("server started").unwrap();
//! logger.error("failed to accept connection", "connection reset").unwrap();
//! ```
//!
//! Route records of the [`log`] crate into the same files:
//!
//! ```no_run
//! daylog::init(daylog::Config::new(true)).unwrap().apply();
//!
//! log::info!("This is an info message.");
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

use std::sync::Arc;

pub mod filter;
pub mod layout;
pub mod rotation;
pub mod scheduler;
pub mod timezone;
pub mod trap;

mod clock;
mod config;
mod error;
mod logger;
mod sink;
mod state;

pub use self::config::Config;
pub use self::config::FILE_BACKED_ENV;
pub use self::error::Error;
pub use self::logger::Logger;
pub use self::rotation::Rotation;
pub use self::rotation::Rotator;
pub use self::state::LoggerState;

use self::clock::Clock;
use self::scheduler::DailySchedule;
use self::scheduler::Scheduler;
use self::scheduler::SchedulerGuard;
use self::trap::Trap;

/// Set up daily log files.
///
/// Performs the first rotation check, then starts the background scheduler that repeats the
/// check at the configured time of day.
///
/// # Errors
///
/// Returns an error if the time of day or period is invalid, the resolved local timezone cannot
/// be loaded, the first log file cannot be opened in file-backed mode, or the scheduler thread
/// cannot be spawned.
pub fn init(config: Config) -> Result<DailyLog, Error> {
    let Config {
        file_backed,
        log_dir,
        time_of_day,
        period,
        missed_fire,
        localtime_link,
        filter,
        trap,
        file_layout,
        screen_layout,
    } = config;

    let schedule = DailySchedule::new(&time_of_day)?
        .period(period)
        .missed_fire(missed_fire);

    // the logger is not up yet, hold the fallback notice until it is
    let deferred = DeferredTrap::default();
    let tz = scheduler::local_timezone(&localtime_link, &deferred)?;
    let clock = Clock::DefaultClock(tz);

    let state = Arc::new(LoggerState::new());
    let logger = Arc::new(
        Logger::new(state.clone(), clock.clone())
            .with_filter(filter)
            .with_trap(trap)
            .with_file_layout(file_layout)
            .with_screen_layout(screen_layout),
    );
    let rotator = Arc::new(Rotator::new(
        state,
        logger.clone(),
        clock.clone(),
        log_dir,
        file_backed,
    ));

    rotator.try_rotate()?;
    for err in deferred.take() {
        let _ = logger.warn(&err);
    }

    let scheduler = Scheduler::with_clock(schedule, clock)
        .trap(SchedulerTrap(logger.clone()))
        .spawn({
            let rotator = rotator.clone();
            move || {
                rotator.ensure_current_rotation();
            }
        })?;

    Ok(DailyLog {
        logger,
        rotator,
        scheduler,
    })
}

/// The handle returned by [`init`].
///
/// Dropping it stops the rotation scheduler; the logger keeps writing to the last active
/// destination. Call [`DailyLog::apply`] to keep it alive for the rest of the process as the
/// global `log` logger.
#[derive(Debug)]
pub struct DailyLog {
    logger: Arc<Logger>,
    rotator: Arc<Rotator>,
    scheduler: SchedulerGuard,
}

impl DailyLog {
    /// The logging façade.
    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    /// The rotation controller driven by the scheduler.
    pub fn rotator(&self) -> &Arc<Rotator> {
        &self.rotator
    }

    /// The shared state of the active destination.
    pub fn state(&self) -> &Arc<LoggerState> {
        self.logger.state()
    }

    /// Stop the scheduler and flush the active destination.
    pub fn shutdown(self) {
        let DailyLog {
            logger, scheduler, ..
        } = self;
        scheduler.cancel();
        log::Log::flush(&*logger);
    }

    /// Set up the global logger of the `log` crate.
    ///
    /// # Errors
    ///
    /// Returns an error if a global logger has already been set.
    pub fn try_apply(self) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(log::LevelFilter::Trace);
        Ok(())
    }

    /// Set up the global logger of the `log` crate.
    ///
    /// # Panics
    ///
    /// Panics if a global logger has already been set.
    pub fn apply(self) {
        self.try_apply()
            .expect("DailyLog::apply must be called before the global logger initialized");
    }
}

impl log::Log for DailyLog {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        log::Log::enabled(&*self.logger, metadata)
    }

    fn log(&self, record: &log::Record) {
        log::Log::log(&*self.logger, record)
    }

    fn flush(&self) {
        log::Log::flush(&*self.logger)
    }
}

// Reports scheduling failures through the logger's error path.
#[derive(Debug)]
struct SchedulerTrap(Arc<Logger>);

impl Trap for SchedulerTrap {
    fn trap(&self, err: &Error) {
        let _ = self.0.error("failed to run log rotation check", err);
    }
}

#[derive(Debug, Default)]
struct DeferredTrap(std::sync::Mutex<Vec<String>>);

impl DeferredTrap {
    fn take(self) -> Vec<String> {
        self.0
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Trap for DeferredTrap {
    fn trap(&self, err: &Error) {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(err.to_string());
    }
}
