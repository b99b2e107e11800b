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

//! Filter log entries by level and target with [`env_filter`] directives.

use std::borrow::Cow;

use log::Level;
use log::LevelFilter;
use log::Metadata;

/// The default environment variable for filtering logs.
pub const DEFAULT_FILTER_ENV: &str = "RUST_LOG";

/// A filter consists of one or more comma-separated directives which match on a target and level.
///
/// The directive syntax is similar to that of [`env_logger`](https://crates.io/crates/env_logger)'s.
#[derive(Debug)]
pub struct EnvFilter(env_filter::Filter);

impl Default for EnvFilter {
    /// A filter that enables every level.
    fn default() -> Self {
        EnvFilter::from(LevelFilter::Trace)
    }
}

impl EnvFilter {
    /// Initializes the filter from the builder.
    pub fn new(mut builder: EnvFilterBuilder) -> Self {
        EnvFilter(builder.0.build())
    }

    /// Initializes the filter from the environment using specific variable name.
    /// If the variable is not set, the default value will be used.
    ///
    /// # Examples
    ///
    /// ```
    /// use daylog::filter::EnvFilter;
    /// let filter = EnvFilter::from_env_or("MY_LOG", "info");
    /// ```
    pub fn from_env_or<'a, 'b, E, V>(name: E, default: V) -> Self
    where
        E: Into<Cow<'a, str>>,
        V: Into<Cow<'b, str>>,
    {
        let name = name.into();
        let default = default.into();

        let builder = EnvFilterBuilder::new();
        if let Ok(s) = std::env::var(&*name) {
            EnvFilter::new(builder.parse(&s))
        } else {
            EnvFilter::new(builder.parse(&default))
        }
    }

    /// Initializes the filter from `RUST_LOG`, falling back to the given default.
    pub fn from_default_env_or<'a, V>(default: V) -> Self
    where
        V: Into<Cow<'a, str>>,
    {
        EnvFilter::from_env_or(DEFAULT_FILTER_ENV, default)
    }

    pub(crate) fn enabled(&self, metadata: &Metadata) -> bool {
        self.0.enabled(metadata)
    }

    pub(crate) fn enabled_level(&self, target: &str, level: Level) -> bool {
        let metadata = Metadata::builder().target(target).level(level).build();
        self.0.enabled(&metadata)
    }
}

impl From<LevelFilter> for EnvFilter {
    fn from(filter: LevelFilter) -> Self {
        EnvFilter::new(EnvFilterBuilder::new().filter_level(filter))
    }
}

impl<'a> From<&'a str> for EnvFilter {
    fn from(filter: &'a str) -> Self {
        EnvFilter::new(EnvFilterBuilder::new().parse(filter))
    }
}

/// A builder for [`EnvFilter`].
#[derive(Debug, Default)]
pub struct EnvFilterBuilder(env_filter::Builder);

impl EnvFilterBuilder {
    /// Initializes the filter builder with defaults.
    pub fn new() -> Self {
        EnvFilterBuilder(env_filter::Builder::new())
    }

    /// Adds a directive to the filter for all modules.
    pub fn filter_level(mut self, level: LevelFilter) -> Self {
        self.0.filter_level(level);
        self
    }

    /// Adds a directive to the filter for a specific module.
    pub fn filter_module(mut self, module: &str, level: LevelFilter) -> Self {
        self.0.filter_module(module, level);
        self
    }

    /// Parses the directives string in the same form as the `RUST_LOG` environment variable.
    pub fn parse(mut self, filters: &str) -> Self {
        self.0.parse(filters);
        self
    }
}
