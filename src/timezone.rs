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

//! Resolve the IANA name of the host's local timezone.
//!
//! Hosts conventionally point `/etc/localtime` at a file inside a zoneinfo database, such as
//! `/usr/share/zoneinfo/America/New_York`. The last two segments of that target are the IANA
//! `Region/City` name.

use std::fs;
use std::path::Component;
use std::path::Path;

use jiff::tz::TimeZone;

use crate::Error;

/// The conventional location of the host's local-time link.
pub const LOCALTIME_LINK: &str = "/etc/localtime";

/// Resolve the IANA name of the host's local timezone from [`LOCALTIME_LINK`].
///
/// # Errors
///
/// Returns an error if the link cannot be read, its target has fewer than two path segments, or
/// the composed name is not a recognized timezone.
pub fn resolve_local_timezone() -> Result<String, Error> {
    resolve_timezone_from(LOCALTIME_LINK)
}

/// Resolve the IANA timezone name that the given link points at.
///
/// # Examples
///
/// ```no_run
/// let name = daylog::timezone::resolve_timezone_from("/etc/localtime").unwrap();
/// println!("local timezone: {name}");
/// ```
pub fn resolve_timezone_from(link: impl AsRef<Path>) -> Result<String, Error> {
    let name = read_timezone_link(link.as_ref())?;
    load_timezone(&name)?;
    Ok(name)
}

/// Read `link` and compose the IANA name of its target, without loading it.
pub(crate) fn read_timezone_link(link: &Path) -> Result<String, Error> {
    let target = fs::read_link(link).map_err(|err| {
        Error::new("failed to read timezone link")
            .with_context("link", link.display())
            .with_source(err)
    })?;
    iana_name_from_target(&target)
}

/// Extract the `Region/City` pair from the last two segments of a link target.
///
/// The composed name is not validated against the timezone database.
pub fn iana_name_from_target(target: &Path) -> Result<String, Error> {
    let malformed =
        || Error::new("malformed timezone link").with_context("target", target.display());

    let segments = target
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_str()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(malformed)?;

    match segments.as_slice() {
        [.., region, city] => Ok(format!("{region}/{city}")),
        _ => Err(malformed()),
    }
}

/// Load the timezone with the given IANA name.
pub(crate) fn load_timezone(name: &str) -> Result<TimeZone, Error> {
    TimeZone::get(name).map_err(|err| {
        Error::new("unrecognized timezone")
            .with_context("name", name)
            .with_source(err)
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_iana_name_from_target() {
        let cases = [
            ("/usr/share/zoneinfo/America/New_York", "America/New_York"),
            ("/usr/share/zoneinfo/Europe/Berlin", "Europe/Berlin"),
            ("../usr/share/zoneinfo/Asia/Shanghai", "Asia/Shanghai"),
            ("/var/db/timezone/zoneinfo/Australia/Sydney/", "Australia/Sydney"),
            ("America/Argentina", "America/Argentina"),
        ];
        for (target, expected) in cases {
            let name = iana_name_from_target(&PathBuf::from(target)).unwrap();
            assert_eq!(name, expected, "target: {target}");
        }
    }

    #[test]
    fn test_iana_name_from_short_target() {
        for target in ["UTC", "/UTC", "", "/", "../UTC"] {
            let err = iana_name_from_target(&PathBuf::from(target)).unwrap_err();
            assert_eq!(err.message(), "malformed timezone link", "target: {target}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_timezone_from_link() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let link = temp_dir.path().join("localtime");
        // the target does not need to exist, only the link text matters
        std::os::unix::fs::symlink("/usr/share/zoneinfo/Europe/Berlin", &link).unwrap();

        assert_eq!(resolve_timezone_from(&link).unwrap(), "Europe/Berlin");
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_timezone_from_unknown_zone() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let link = temp_dir.path().join("localtime");
        std::os::unix::fs::symlink("/usr/share/zoneinfo/Nowhere/Atlantis", &link).unwrap();

        let err = resolve_timezone_from(&link).unwrap_err();
        assert_eq!(err.message(), "unrecognized timezone");
        assert_eq!(err.context("name"), Some("Nowhere/Atlantis"));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_timezone_from_malformed_link() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let link = temp_dir.path().join("localtime");
        std::os::unix::fs::symlink("UTC", &link).unwrap();

        let err = resolve_timezone_from(&link).unwrap_err();
        assert_eq!(err.message(), "malformed timezone link");
    }

    #[test]
    fn test_resolve_timezone_from_missing_link() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let err = resolve_timezone_from(temp_dir.path().join("missing")).unwrap_err();
        assert_eq!(err.message(), "failed to read timezone link");
    }

    #[test]
    fn test_resolve_timezone_from_regular_file() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let file = temp_dir.path().join("localtime");
        fs::write(&file, b"TZif").unwrap();

        let err = resolve_timezone_from(&file).unwrap_err();
        assert_eq!(err.message(), "failed to read timezone link");
    }
}
