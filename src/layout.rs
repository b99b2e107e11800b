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

//! Layouts for formatting log entries.

use std::fmt;
use std::fmt::Write;

use jiff::Zoned;
use log::Level;

use crate::Error;

/// A single log entry to be formatted.
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
    /// When the entry was produced, in the logger's timezone.
    pub time: &'a Zoned,
    /// Severity of the entry.
    pub level: Level,
    /// Target of a record bridged from the `log` crate.
    pub target: Option<&'a str>,
    /// The message.
    pub message: fmt::Arguments<'a>,
}

/// A layout turns an [`Entry`] into the bytes of one line, without the trailing newline.
pub trait Layout: fmt::Debug + Send + Sync + 'static {
    /// Format the entry.
    fn format(&self, entry: &Entry) -> Result<Vec<u8>, Error>;
}

impl<T: Layout> From<T> for Box<dyn Layout> {
    fn from(value: T) -> Self {
        Box::new(value)
    }
}

fn format_time(time: &Zoned) -> impl fmt::Display + '_ {
    time.strftime("%Y-%m-%dT%H:%M:%S.%6f%:z")
}

/// A logfmt layout, used for file entries.
///
/// Output format:
///
/// ```text
/// time=2024-01-05T10:11:12.123456+01:00 level=INFO msg="server started"
/// time=2024-01-05T10:11:13.000102+01:00 level=ERROR msg="failed to update logger: disk full"
/// time=2024-01-05T10:11:14.004711+01:00 level=WARN target=app::db msg=reconnecting
/// ```
#[derive(Default, Debug, Clone)]
#[non_exhaustive]
pub struct LogfmtLayout {}

// Quote values the same way go-logfmt does.
fn encode_key_value(result: &mut String, key: &str, value: &str) -> Result<(), Error> {
    let needs_quote = value.is_empty()
        || value
            .chars()
            .any(|c| c <= ' ' || c == '=' || c == '"' || c == '\u{7f}');

    let res = if needs_quote {
        write!(result, " {key}=\"{}\"", value.escape_debug())
    } else {
        write!(result, " {key}={value}")
    };
    res.map_err(|err| Error::new("failed to perform format").with_source(err))
}

impl Layout for LogfmtLayout {
    fn format(&self, entry: &Entry) -> Result<Vec<u8>, Error> {
        let mut text = format!("time={}", format_time(entry.time));
        encode_key_value(&mut text, "level", entry.level.as_str())?;
        if let Some(target) = entry.target {
            encode_key_value(&mut text, "target", target)?;
        }
        encode_key_value(&mut text, "msg", &entry.message.to_string())?;
        Ok(text.into_bytes())
    }
}

/// A layout that formats entries as human-readable text, used for the screen.
///
/// Output format:
///
/// ```text
/// 2024-01-05T10:11:12.123456+01:00  INFO server started
/// 2024-01-05T10:11:13.000102+01:00 ERROR failed to update logger: disk full
/// 2024-01-05T10:11:14.004711+01:00  WARN app::db: reconnecting
/// ```
///
/// With the `colored` feature enabled, levels are colored unless [`TextLayout::no_color`] is set.
#[derive(Default, Debug, Clone)]
pub struct TextLayout {
    #[cfg_attr(not(feature = "colored"), allow(dead_code))]
    no_color: bool,
}

impl TextLayout {
    /// Disable colored levels.
    pub fn no_color(mut self) -> Self {
        self.no_color = true;
        self
    }

    fn level(&self, level: Level) -> String {
        #[cfg(feature = "colored")]
        if !self.no_color {
            use colored::Colorize;

            let text = format!("{:>5}", level.as_str());
            let text = text.as_str();
            return match level {
                Level::Error => text.red(),
                Level::Warn => text.yellow(),
                Level::Info => text.green(),
                Level::Debug => text.blue(),
                Level::Trace => text.magenta(),
            }
            .to_string();
        }

        format!("{:>5}", level.as_str())
    }
}

impl Layout for TextLayout {
    fn format(&self, entry: &Entry) -> Result<Vec<u8>, Error> {
        let time = format_time(entry.time);
        let level = self.level(entry.level);
        let message = entry.message;
        let text = match entry.target {
            Some(target) => format!("{time} {level} {target}: {message}"),
            None => format!("{time} {level} {message}"),
        };
        Ok(text.into_bytes())
    }
}
