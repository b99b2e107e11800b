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

//! The logging façade.

use std::fmt;
use std::io;
use std::io::Write;
use std::sync::Arc;

use log::Level;

use crate::Error;
use crate::clock::Clock;
use crate::filter::EnvFilter;
use crate::layout::Entry;
use crate::layout::Layout;
use crate::layout::LogfmtLayout;
use crate::layout::TextLayout;
use crate::state::Destination;
use crate::state::LoggerState;
use crate::trap::DefaultTrap;
use crate::trap::Trap;

// Target used for façade entries, so that only global filter directives apply to them.
const FACADE_TARGET: &str = "";

/// Level-tagged write operations routed to the active log file or the screen.
///
/// Every write holds the read lock of the shared [`LoggerState`] for its whole duration, so a
/// concurrent rotation either happens before or after it, never in the middle.
///
/// Write failures are returned to the caller and also reported to the configured [`Trap`].
///
/// `Logger` implements [`log::Log`], so records of the `log` crate can be routed into the same
/// destination.
#[derive(Debug)]
pub struct Logger {
    state: Arc<LoggerState>,
    clock: Clock,
    file_layout: Box<dyn Layout>,
    screen_layout: Box<dyn Layout>,
    filter: EnvFilter,
    trap: Box<dyn Trap>,
    screen: Screen,
}

impl Logger {
    pub(crate) fn new(state: Arc<LoggerState>, clock: Clock) -> Self {
        Self {
            state,
            clock,
            file_layout: Box::new(LogfmtLayout::default()),
            screen_layout: Box::new(TextLayout::default()),
            filter: EnvFilter::default(),
            trap: Box::new(DefaultTrap::default()),
            screen: Screen::Stderr,
        }
    }

    pub(crate) fn with_filter(mut self, filter: EnvFilter) -> Self {
        self.filter = filter;
        self
    }

    pub(crate) fn with_trap(mut self, trap: Box<dyn Trap>) -> Self {
        self.trap = trap;
        self
    }

    pub(crate) fn with_file_layout(mut self, layout: Box<dyn Layout>) -> Self {
        self.file_layout = layout;
        self
    }

    pub(crate) fn with_screen_layout(mut self, layout: Box<dyn Layout>) -> Self {
        self.screen_layout = layout;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_screen(mut self, screen: Screen) -> Self {
        self.screen = screen;
        self
    }

    /// The shared state this logger reads its destination from.
    pub fn state(&self) -> &Arc<LoggerState> {
        &self.state
    }

    /// Log a message at info level.
    pub fn info(&self, msg: impl fmt::Display) -> Result<(), Error> {
        self.log_facade(Level::Info, format_args!("{msg}"))
    }

    /// Log a message at warn level.
    pub fn warn(&self, msg: impl fmt::Display) -> Result<(), Error> {
        self.log_facade(Level::Warn, format_args!("{msg}"))
    }

    /// Log a message at error level, followed by the description of the error.
    ///
    /// The entry reads `<msg>: <err>`.
    pub fn error(&self, msg: impl fmt::Display, err: impl fmt::Display) -> Result<(), Error> {
        self.log_facade(Level::Error, format_args!("{msg}: {err}"))
    }

    /// Log a message at warn level and terminate the process with exit status 1.
    ///
    /// The entry is written regardless of the configured filter.
    pub fn fatal(&self, msg: impl fmt::Display) -> ! {
        let _ = self.write(Level::Warn, None, format_args!("{msg}"));
        std::process::exit(1)
    }

    fn log_facade(&self, level: Level, message: fmt::Arguments) -> Result<(), Error> {
        if !self.filter.enabled_level(FACADE_TARGET, level) {
            return Ok(());
        }
        self.write(level, None, message)
    }

    fn write(
        &self,
        level: Level,
        target: Option<&str>,
        message: fmt::Arguments,
    ) -> Result<(), Error> {
        let time = self.clock.now();
        let entry = Entry {
            time: &time,
            level,
            target,
            message,
        };

        let result = {
            let destination = self.state.read();
            match &*destination {
                Destination::File { sink, .. } => {
                    self.file_layout.format(&entry).and_then(|mut bytes| {
                        bytes.push(b'\n');
                        sink.write_line(&bytes)
                    })
                }
                Destination::Screen | Destination::Uninit => {
                    self.screen_layout.format(&entry).and_then(|mut bytes| {
                        bytes.push(b'\n');
                        self.screen.write_line(&bytes)
                    })
                }
            }
        };

        // the trap runs outside the lock, it may log again
        if let Err(err) = &result {
            self.trap.trap(err);
        }
        result
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // failures already went to the trap
        let _ = self.write(record.level(), Some(record.target()), *record.args());
    }

    fn flush(&self) {
        let result = match &*self.state.read() {
            Destination::File { sink, .. } => sink.flush(),
            Destination::Screen | Destination::Uninit => self.screen.flush(),
        };
        if let Err(err) = result {
            self.trap.trap(&err);
        }
    }
}

/// The standard diagnostic stream, replaceable by a buffer in tests.
#[derive(Debug, Clone)]
pub(crate) enum Screen {
    Stderr,
    #[cfg(test)]
    Buffer(Arc<std::sync::Mutex<Vec<u8>>>),
}

impl Screen {
    fn write_line(&self, line: &[u8]) -> Result<(), Error> {
        match self {
            Screen::Stderr => io::stderr()
                .lock()
                .write_all(line)
                .map_err(|err| Error::new("failed to write log entry").with_source(err)),
            #[cfg(test)]
            Screen::Buffer(buf) => {
                buf.lock().unwrap().extend_from_slice(line);
                Ok(())
            }
        }
    }

    fn flush(&self) -> Result<(), Error> {
        match self {
            Screen::Stderr => io::stderr().flush().map_err(Error::from_io_error),
            #[cfg(test)]
            Screen::Buffer(_) => Ok(()),
        }
    }
}
