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

use std::path::PathBuf;

use jiff::Span;
use jiff::ToSpan;

use crate::filter::EnvFilter;
use crate::layout::Layout;
use crate::layout::LogfmtLayout;
use crate::layout::TextLayout;
use crate::scheduler::MissedFire;
use crate::timezone::LOCALTIME_LINK;
use crate::trap::DefaultTrap;
use crate::trap::Trap;

/// The environment variable that switches on file-backed logging when set to `true`.
pub const FILE_BACKED_ENV: &str = "TUNWG_RUN_SERVER";

/// Configuration for [`init`][crate::init].
///
/// # Examples
///
/// ```
/// use daylog::Config;
/// use daylog::scheduler::MissedFire;
///
/// let config = Config::new(true)
///     .log_dir("/var/log/my_service")
///     .missed_fire(MissedFire::NextDay);
/// ```
#[derive(Debug)]
pub struct Config {
    pub(crate) file_backed: bool,
    pub(crate) log_dir: PathBuf,
    pub(crate) time_of_day: String,
    pub(crate) period: Span,
    pub(crate) missed_fire: MissedFire,
    pub(crate) localtime_link: PathBuf,
    pub(crate) filter: EnvFilter,
    pub(crate) trap: Box<dyn Trap>,
    pub(crate) file_layout: Box<dyn Layout>,
    pub(crate) screen_layout: Box<dyn Layout>,
}

impl Config {
    /// Create a configuration. With `file_backed` false, entries go to standard error and no
    /// file is ever created.
    pub fn new(file_backed: bool) -> Self {
        Self {
            file_backed,
            log_dir: PathBuf::from("log"),
            time_of_day: "00:00:00".to_string(),
            period: 1.day(),
            missed_fire: MissedFire::default(),
            localtime_link: PathBuf::from(LOCALTIME_LINK),
            filter: EnvFilter::default(),
            trap: Box::new(DefaultTrap::default()),
            file_layout: Box::new(LogfmtLayout::default()),
            screen_layout: Box::new(TextLayout::default()),
        }
    }

    /// Create a configuration from the process environment.
    ///
    /// File-backed logging is on only when [`FILE_BACKED_ENV`] is exactly `true`. The filter is
    /// read from `RUST_LOG`, defaulting to `info`.
    pub fn from_env() -> Self {
        let file_backed = file_backed_from(std::env::var(FILE_BACKED_ENV).ok().as_deref());
        Config::new(file_backed).filter(EnvFilter::from_default_env_or("info"))
    }

    /// Sets the directory log files are created in. Default to `log`.
    pub fn log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    /// Sets the local time of day, formatted as `HH:MM:SS`, of the rotation check. Default to
    /// `00:00:00`.
    pub fn time_of_day(mut self, time_of_day: impl Into<String>) -> Self {
        self.time_of_day = time_of_day.into();
        self
    }

    /// Sets the period between rotation checks. Default to one day.
    pub fn period(mut self, period: Span) -> Self {
        self.period = period;
        self
    }

    /// Sets what happens when the time of day has already passed at start-up.
    pub fn missed_fire(mut self, missed_fire: MissedFire) -> Self {
        self.missed_fire = missed_fire;
        self
    }

    /// Sets the link the local timezone is resolved from. Default to `/etc/localtime`.
    pub fn localtime_link(mut self, link: impl Into<PathBuf>) -> Self {
        self.localtime_link = link.into();
        self
    }

    /// Sets the filter of entries. Default to enabling every level.
    pub fn filter(mut self, filter: impl Into<EnvFilter>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Sets the trap that receives write failures. Default to [`DefaultTrap`].
    pub fn trap(mut self, trap: impl Into<Box<dyn Trap>>) -> Self {
        self.trap = trap.into();
        self
    }

    /// Sets the layout of file entries. Default to [`LogfmtLayout`].
    pub fn file_layout(mut self, layout: impl Into<Box<dyn Layout>>) -> Self {
        self.file_layout = layout.into();
        self
    }

    /// Sets the layout of screen entries. Default to [`TextLayout`].
    pub fn screen_layout(mut self, layout: impl Into<Box<dyn Layout>>) -> Self {
        self.screen_layout = layout.into();
        self
    }
}

fn file_backed_from(value: Option<&str>) -> bool {
    value == Some("true")
}
