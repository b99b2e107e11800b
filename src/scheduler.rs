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

//! Run a callback at a fixed local time of day, every period thereafter.
//!
//! # Example
//!
//! ```no_run
//! use jiff::ToSpan;
//!
//! let guard = daylog::scheduler::schedule_daily("00:00:00", 1.day(), || {
//!     println!("a new day has begun");
//! })
//! .unwrap();
//!
//! // the callback stops firing once the guard is dropped
//! drop(guard);
//! ```

use std::panic;
use std::panic::AssertUnwindSafe;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use crossbeam_channel::Sender;
use crossbeam_channel::bounded;
use jiff::Span;
use jiff::ToSpan;
use jiff::Zoned;
use jiff::civil::Time;
use jiff::tz::TimeZone;

use crate::Error;
use crate::clock::Clock;
use crate::timezone;
use crate::trap::DefaultTrap;
use crate::trap::Trap;

const THREAD_NAME: &str = "daylog-scheduler";

/// What to do when the time of day has already passed at the time the scheduler starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissedFire {
    /// Fire right away, then continue with the regular period.
    Immediately,
    /// Wait for the next day's occurrence.
    #[default]
    NextDay,
}

/// A recurring fire time: a local time of day and a fixed period.
#[derive(Debug, Clone)]
pub struct DailySchedule {
    time_of_day: Time,
    period: Span,
    missed_fire: MissedFire,
}

impl DailySchedule {
    /// Create a schedule firing at `time_of_day`, formatted as `HH:MM:SS`, once per day.
    ///
    /// # Errors
    ///
    /// Returns an error if `time_of_day` is not a valid `HH:MM:SS` time.
    pub fn new(time_of_day: &str) -> Result<Self, Error> {
        let time_of_day = Time::strptime("%H:%M:%S", time_of_day).map_err(|err| {
            Error::new("invalid time of day")
                .with_context("time_of_day", time_of_day)
                .with_source(err)
        })?;
        Ok(Self {
            time_of_day,
            period: 1.day(),
            missed_fire: MissedFire::default(),
        })
    }

    /// A schedule firing at local midnight once per day.
    pub fn midnight() -> Self {
        Self {
            time_of_day: Time::midnight(),
            period: 1.day(),
            missed_fire: MissedFire::default(),
        }
    }

    /// Sets the period between two fires.
    ///
    /// Calendar units are applied in the local timezone, so a period of one day keeps firing at
    /// the same wall-clock time across daylight saving changes.
    pub fn period(mut self, period: Span) -> Self {
        self.period = period;
        self
    }

    /// Sets the policy for a time of day that has already passed on the first day.
    pub fn missed_fire(mut self, missed_fire: MissedFire) -> Self {
        self.missed_fire = missed_fire;
        self
    }

    /// The configured time of day.
    pub fn time_of_day(&self) -> Time {
        self.time_of_day
    }

    /// The instant of the first fire for a scheduler started at `now`.
    ///
    /// This may be earlier than `now` under [`MissedFire::Immediately`].
    pub fn first_fire(&self, now: &Zoned) -> Result<Zoned, Error> {
        let tz = now.time_zone().clone();
        let today = now
            .date()
            .to_datetime(self.time_of_day)
            .to_zoned(tz.clone())
            .map_err(schedule_error)?;
        if today >= *now {
            return Ok(today);
        }

        match self.missed_fire {
            MissedFire::Immediately => Ok(today),
            MissedFire::NextDay => now
                .date()
                .tomorrow()
                .map_err(schedule_error)?
                .to_datetime(self.time_of_day)
                .to_zoned(tz)
                .map_err(schedule_error),
        }
    }

    /// The instant of the fire following `previous`, strictly after `now`.
    ///
    /// Fires missed while the host was suspended are skipped.
    pub fn next_fire(&self, previous: &Zoned, now: &Zoned) -> Result<Zoned, Error> {
        let mut next = previous.checked_add(self.period).map_err(schedule_error)?;
        if next <= *now && !self.has_calendar_units() {
            // clock units have a fixed length, skip the whole periods at once
            let step = previous.duration_until(&next).as_nanos();
            let behind = next.duration_until(now).as_nanos();
            if step > 0 {
                let skip = i64::try_from(behind / step).unwrap_or(i64::MAX);
                let jump = self.period.checked_mul(skip).map_err(schedule_error)?;
                next = next.checked_add(jump).map_err(schedule_error)?;
            }
        }
        while next <= *now {
            next = next.checked_add(self.period).map_err(schedule_error)?;
        }
        Ok(next)
    }

    fn has_calendar_units(&self) -> bool {
        let period = &self.period;
        period.get_years() != 0
            || period.get_months() != 0
            || period.get_weeks() != 0
            || period.get_days() != 0
    }

    fn validate(&self) -> Result<(), Error> {
        if self.period.signum() <= 0 {
            return Err(Error::new("invalid schedule period").with_context("period", self.period));
        }
        Ok(())
    }
}

fn schedule_error(err: jiff::Error) -> Error {
    Error::new("failed to compute fire time").with_source(err)
}

/// Runs a [`DailySchedule`] on a dedicated thread.
#[derive(Debug)]
pub struct Scheduler {
    schedule: DailySchedule,
    clock: Clock,
    trap: Box<dyn Trap>,
}

impl Scheduler {
    /// Create a scheduler evaluating `schedule` in the given timezone.
    pub fn new(schedule: DailySchedule, tz: TimeZone) -> Self {
        Self::with_clock(schedule, Clock::DefaultClock(tz))
    }

    pub(crate) fn with_clock(schedule: DailySchedule, clock: Clock) -> Self {
        Self {
            schedule,
            clock,
            trap: Box::new(DefaultTrap::default()),
        }
    }

    /// Sets the trap that receives callback panics and scheduling errors.
    pub fn trap(mut self, trap: impl Into<Box<dyn Trap>>) -> Self {
        self.trap = trap.into();
        self
    }

    /// Start firing `callback` on a background thread.
    ///
    /// The callback fires on every tick including the first. It keeps firing until the returned
    /// guard is dropped or cancelled.
    pub fn spawn<F>(self, callback: F) -> Result<SchedulerGuard, Error>
    where
        F: Fn() + Send + 'static,
    {
        self.schedule.validate()?;
        let first = self.schedule.first_fire(&self.clock.now())?;

        let (shutdown, shutdown_receiver) = bounded::<()>(0);
        let Scheduler {
            schedule,
            clock,
            trap,
        } = self;

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let mut next = first;
                loop {
                    let delay = Duration::try_from(clock.now().duration_until(&next))
                        .unwrap_or(Duration::ZERO);

                    match shutdown_receiver.recv_timeout(delay) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    // the wall clock may lag the monotonic timer
                    if clock.now() < next {
                        continue;
                    }

                    if panic::catch_unwind(AssertUnwindSafe(&callback)).is_err() {
                        trap.trap(&Error::new("scheduled callback panicked"));
                    }

                    next = match schedule.next_fire(&next, &clock.now()) {
                        Ok(next) => next,
                        Err(err) => {
                            trap.trap(&err);
                            break;
                        }
                    };
                }
            })
            .map_err(|err| Error::new("failed to spawn scheduler thread").with_source(err))?;

        Ok(SchedulerGuard {
            handle: Some(handle),
            shutdown: Some(shutdown),
        })
    }
}

/// Stops the scheduler thread when dropped.
#[derive(Debug)]
pub struct SchedulerGuard {
    handle: Option<JoinHandle<()>>,
    shutdown: Option<Sender<()>>,
}

impl SchedulerGuard {
    /// Stop the scheduler and wait for an in-progress callback to return.
    pub fn cancel(mut self) {
        self.stop();
    }

    /// Whether the scheduler thread is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn stop(&mut self) {
        // disconnecting wakes the thread up
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for SchedulerGuard {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run `callback` at `time_of_day` (`HH:MM:SS`) in the host's local timezone, then every `period`.
///
/// The local timezone comes from [`timezone::LOCALTIME_LINK`]. If the link is missing or
/// malformed, the host default timezone is used and the failure is reported to the default trap.
///
/// # Errors
///
/// Returns an error if `time_of_day` or `period` is invalid, the link names an unknown timezone,
/// or the scheduler thread cannot be spawned.
pub fn schedule_daily<F>(
    time_of_day: &str,
    period: Span,
    callback: F,
) -> Result<SchedulerGuard, Error>
where
    F: Fn() + Send + 'static,
{
    let schedule = DailySchedule::new(time_of_day)?.period(period);
    schedule.validate()?;
    let tz = local_timezone(timezone::LOCALTIME_LINK, &DefaultTrap::default())?;
    Scheduler::new(schedule, tz).spawn(callback)
}

/// Resolve and load the local timezone behind `link`.
///
/// A missing or malformed link falls back to the host default timezone and reports the failure
/// to `trap`. A link naming a timezone the database does not know is a hard error.
pub(crate) fn local_timezone(
    link: impl AsRef<std::path::Path>,
    trap: &dyn Trap,
) -> Result<TimeZone, Error> {
    match timezone::read_timezone_link(link.as_ref()) {
        Ok(name) => timezone::load_timezone(&name),
        Err(err) => {
            trap.trap(&Error::new("falling back to the host default timezone").with_source(err));
            Ok(TimeZone::system())
        }
    }
}
