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

use std::path::Path;
use std::path::PathBuf;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;

use crate::sink::FileSink;

/// Where log entries currently go.
///
/// The variants make the mode invariant structural: either entries go to the screen, or there is
/// exactly one open file whose path is the active filename.
#[derive(Debug, Default)]
pub(crate) enum Destination {
    /// Not set up yet. Entries fall back to the screen.
    #[default]
    Uninit,
    /// File logging is disabled.
    Screen,
    /// Entries are appended to the active file.
    File { path: PathBuf, sink: FileSink },
}

/// The shared, lock-protected record of the active log destination.
///
/// Log writes hold the read lock for the whole write, and rotation replaces the destination under
/// the write lock. Many writes may proceed together, but never alongside a swap.
#[derive(Debug, Default)]
pub struct LoggerState {
    destination: RwLock<Destination>,
}

impl LoggerState {
    /// Create an uninitialized state.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Destination> {
        self.destination
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The path of the file currently receiving entries, if any.
    pub fn active_path(&self) -> Option<PathBuf> {
        match &*self.read() {
            Destination::File { path, .. } => Some(path.clone()),
            _ => None,
        }
    }

    /// Whether entries go to the screen because file logging is disabled.
    pub fn is_screen_only(&self) -> bool {
        matches!(&*self.read(), Destination::Screen)
    }

    pub(crate) fn is_active(&self, target: &Path) -> bool {
        match &*self.read() {
            Destination::File { path, .. } => path == target,
            _ => false,
        }
    }

    /// Replace the destination, returning the previous file sink if there was one.
    ///
    /// The previous sink is returned instead of dropped so the caller closes it after the write
    /// lock is released. No reader can still hold it at that point.
    pub(crate) fn replace(&self, new: Destination) -> Option<FileSink> {
        let mut destination = self
            .destination
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *destination, new) {
            Destination::File { sink, .. } => Some(sink),
            _ => None,
        }
    }
}
