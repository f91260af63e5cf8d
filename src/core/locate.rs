//! Purpose: Turn a platform family plus optional override into a concrete GEOS library path.
//! Exports: `Platform`, `LibrarySearch`, `SystemSearch`, `candidate_names`, `locate_library`.
//! Role: First half of the load sequence; never opens the library itself.
//! Invariants: An explicit override short-circuits platform checks and name search.
//! Invariants: Unsupported platforms fail before any search is attempted.
//! Invariants: Candidates are tried in order and the first hit wins.
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
#[cfg(target_os = "linux")]
use std::process::Command;

use crate::core::config::{ConfigSource, library_override};
use crate::core::error::{Error, ErrorKind};

const WINDOWS_NAMES: &[&str] = &["geos_c", "libgeos_c-1"];
const POSIX_NAMES: &[&str] = &["geos_c", "GEOS"];

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Platform {
    Windows,
    Posix,
    Other(String),
}

impl Platform {
    pub fn current() -> Self {
        Self::from_family(env::consts::FAMILY)
    }

    /// Maps a `std::env::consts::FAMILY` style identifier.
    pub fn from_family(family: &str) -> Self {
        match family {
            "windows" => Platform::Windows,
            "unix" => Platform::Posix,
            other => Platform::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Windows => f.write_str("windows"),
            Platform::Posix => f.write_str("unix"),
            Platform::Other(name) => f.write_str(name),
        }
    }
}

pub fn candidate_names(platform: &Platform) -> Result<&'static [&'static str], Error> {
    match platform {
        Platform::Windows => Ok(WINDOWS_NAMES),
        Platform::Posix => Ok(POSIX_NAMES),
        Platform::Other(name) => Err(Error::new(ErrorKind::Unsupported)
            .with_message(format!("unsupported OS \"{name}\""))),
    }
}

/// Name to path lookup through the platform's shared-library search rules.
pub trait LibrarySearch: Send + Sync {
    fn find(&self, name: &str) -> Option<PathBuf>;
}

/// Where the library came from, for diagnostics.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Located {
    Override(PathBuf),
    Search { name: String, path: PathBuf },
}

impl Located {
    pub fn path(&self) -> &Path {
        match self {
            Located::Override(path) => path,
            Located::Search { path, .. } => path,
        }
    }
}

pub fn locate_library(
    platform: &Platform,
    config: &dyn ConfigSource,
    search: &dyn LibrarySearch,
) -> Result<Located, Error> {
    if let Some(path) = library_override(config) {
        tracing::debug!(path = %path.display(), "using configured GEOS library path");
        return Ok(Located::Override(path));
    }

    let names = candidate_names(platform)?;
    for name in names {
        if let Some(path) = search.find(name) {
            tracing::debug!(name, path = %path.display(), "found GEOS library");
            return Ok(Located::Search {
                name: (*name).to_string(),
                path,
            });
        }
        tracing::debug!(name, "GEOS library candidate not found");
    }

    Err(Error::new(ErrorKind::Config)
        .with_message(format!(
            "could not find the GEOS library (tried \"{}\")",
            names.join("\", \"")
        ))
        .with_hint(format!(
            "try setting {} (or geos_library_path in the settings file)",
            crate::core::config::LIBRARY_PATH_VAR
        )))
}

/// Host search: `ldconfig -p` plus library directories on Linux, dyld search
/// paths on macOS, `PATH` on Windows.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemSearch;

impl LibrarySearch for SystemSearch {
    fn find(&self, name: &str) -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            if let Some(path) =
                ldconfig_cache().and_then(|cache| parse_ldconfig(&cache, name, abi_tag()))
            {
                return Some(path);
            }
        }
        scan_dirs(&search_dirs(), &file_patterns(name))
    }
}

#[cfg(target_os = "linux")]
fn ldconfig_cache() -> Option<String> {
    for program in ["/sbin/ldconfig", "ldconfig"] {
        let output = match Command::new(program).arg("-p").output() {
            Ok(output) => output,
            Err(_) => continue,
        };
        if output.status.success() {
            return Some(String::from_utf8_lossy(&output.stdout).into_owned());
        }
    }
    None
}

/// Picks the first `lib<name>.so*` entry from `ldconfig -p` output whose
/// tag list names `abi`. Entries built for another ABI are skipped. Without a
/// known `abi`, the first `libc6` entry is taken.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_ldconfig(cache: &str, name: &str, abi: Option<&str>) -> Option<PathBuf> {
    let prefix = format!("lib{name}.so");
    for line in cache.lines() {
        let line = line.trim();
        let Some((soname, rest)) = line.split_once(' ') else {
            continue;
        };
        if soname != prefix && !soname.starts_with(&format!("{prefix}.")) {
            continue;
        }
        let Some((tags, path)) = rest.split_once("=>") else {
            continue;
        };
        let tags: Vec<&str> = tags
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split(',')
            .map(str::trim)
            .collect();
        let matches = match abi {
            Some(abi) => tags.contains(&abi),
            None => tags.first() == Some(&"libc6"),
        };
        if matches {
            return Some(PathBuf::from(path.trim()));
        }
    }
    None
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn abi_tag() -> Option<&'static str> {
    if cfg!(target_arch = "x86_64") {
        Some("x86-64")
    } else if cfg!(target_arch = "aarch64") {
        Some("AArch64")
    } else {
        None
    }
}

fn search_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let vars: &[&str] = if cfg!(windows) {
        &["PATH"]
    } else if cfg!(target_os = "macos") {
        &["DYLD_LIBRARY_PATH", "DYLD_FALLBACK_LIBRARY_PATH"]
    } else {
        &["LD_LIBRARY_PATH"]
    };
    for var in vars {
        if let Some(value) = env::var_os(var) {
            dirs.extend(env::split_paths(&value).filter(|dir| !dir.as_os_str().is_empty()));
        }
    }

    if cfg!(target_os = "macos") {
        if let Some(home) = env::var_os("HOME") {
            dirs.push(PathBuf::from(home).join("lib"));
        }
        dirs.extend(
            ["/opt/homebrew/lib", "/usr/local/lib", "/lib", "/usr/lib"]
                .iter()
                .map(PathBuf::from),
        );
    } else if cfg!(unix) {
        dirs.extend(
            [
                "/usr/local/lib",
                "/usr/local/lib64",
                "/usr/lib",
                "/usr/lib64",
                "/lib",
                "/lib64",
                "/usr/lib/x86_64-linux-gnu",
                "/usr/lib/aarch64-linux-gnu",
            ]
            .iter()
            .map(PathBuf::from),
        );
    }
    dirs
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum FilePattern {
    /// File name must match exactly.
    Exact(String),
    /// File name must start with the prefix (versioned sonames).
    Prefix(String),
}

impl FilePattern {
    fn matches(&self, file_name: &str) -> bool {
        match self {
            FilePattern::Exact(name) => file_name == name,
            FilePattern::Prefix(prefix) => file_name.starts_with(prefix.as_str()),
        }
    }
}

pub(crate) fn file_patterns(name: &str) -> Vec<FilePattern> {
    if cfg!(windows) {
        let mut patterns = vec![FilePattern::Exact(format!("{name}.dll"))];
        if name.to_ascii_lowercase().ends_with(".dll") {
            patterns.insert(0, FilePattern::Exact(name.to_string()));
        }
        patterns
    } else if cfg!(target_os = "macos") {
        vec![
            FilePattern::Exact(format!("lib{name}.dylib")),
            FilePattern::Exact(format!("{name}.dylib")),
            FilePattern::Exact(format!("{name}.framework/{name}")),
        ]
    } else {
        vec![
            FilePattern::Exact(format!("lib{name}.so")),
            FilePattern::Prefix(format!("lib{name}.so.")),
        ]
    }
}

/// Directories are searched in order; within a directory, patterns in order.
pub(crate) fn scan_dirs(dirs: &[PathBuf], patterns: &[FilePattern]) -> Option<PathBuf> {
    for dir in dirs {
        for pattern in patterns {
            if let FilePattern::Exact(name) = pattern {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
                continue;
            }

            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };
            let mut hits: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| {
                    entry
                        .file_name()
                        .to_str()
                        .is_some_and(|file_name| pattern.matches(file_name))
                })
                .map(|entry| entry.path())
                .filter(|path| path.is_file())
                .collect();
            hits.sort();
            if let Some(path) = hits.into_iter().next() {
                return Some(path);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{
        FilePattern, LibrarySearch, Located, Platform, candidate_names, locate_library,
        parse_ldconfig, scan_dirs,
    };
    use crate::core::config::Settings;
    use crate::core::error::ErrorKind;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSearch {
        known: HashMap<String, PathBuf>,
        asked: Mutex<Vec<String>>,
    }

    impl RecordingSearch {
        fn with(mut self, name: &str, path: &str) -> Self {
            self.known.insert(name.to_string(), PathBuf::from(path));
            self
        }

        fn asked(&self) -> Vec<String> {
            self.asked.lock().expect("lock").clone()
        }
    }

    impl LibrarySearch for RecordingSearch {
        fn find(&self, name: &str) -> Option<PathBuf> {
            self.asked.lock().expect("lock").push(name.to_string());
            self.known.get(name).cloned()
        }
    }

    #[test]
    fn platform_families_map() {
        assert_eq!(Platform::from_family("windows"), Platform::Windows);
        assert_eq!(Platform::from_family("unix"), Platform::Posix);
        assert_eq!(
            Platform::from_family("plan9"),
            Platform::Other("plan9".to_string())
        );
        assert_ne!(Platform::current(), Platform::Other(String::new()));
    }

    #[test]
    fn candidate_order_is_stable() {
        assert_eq!(
            candidate_names(&Platform::Windows).expect("names"),
            &["geos_c", "libgeos_c-1"]
        );
        assert_eq!(
            candidate_names(&Platform::Posix).expect("names"),
            &["geos_c", "GEOS"]
        );
    }

    #[test]
    fn missing_library_lists_every_candidate() {
        for platform in [Platform::Windows, Platform::Posix] {
            let search = RecordingSearch::default();
            let err = locate_library(&platform, &Settings::default(), &search)
                .expect_err("nothing to find");
            assert_eq!(err.kind(), ErrorKind::Config);
            let message = err.message().expect("message");
            for name in candidate_names(&platform).expect("names") {
                assert!(message.contains(&format!("\"{name}\"")), "{message}");
            }
            assert!(err.hint().expect("hint").contains("GEOS_LIBRARY_PATH"));
            assert_eq!(search.asked().len(), 2);
        }
    }

    #[test]
    fn unsupported_platform_fails_before_search() {
        let search = RecordingSearch::default().with("geos_c", "/usr/lib/libgeos_c.so");
        let err = locate_library(
            &Platform::Other("riscos".to_string()),
            &Settings::default(),
            &search,
        )
        .expect_err("unsupported");
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(err.message().expect("message").contains("riscos"));
        assert!(search.asked().is_empty());
    }

    #[test]
    fn override_skips_search_and_platform_check() {
        let search = RecordingSearch::default().with("geos_c", "/usr/lib/libgeos_c.so");
        let located = locate_library(
            &Platform::Other("riscos".to_string()),
            &Settings::with_library_path("/opt/geos/libgeos_c.so"),
            &search,
        )
        .expect("override");
        assert_eq!(
            located,
            Located::Override(PathBuf::from("/opt/geos/libgeos_c.so"))
        );
        assert!(search.asked().is_empty());
    }

    #[test]
    fn first_candidate_hit_wins() {
        let search = RecordingSearch::default()
            .with("GEOS", "/Library/Frameworks/GEOS.framework/GEOS")
            .with("geos_c", "/usr/lib/libgeos_c.so.1");
        let located =
            locate_library(&Platform::Posix, &Settings::default(), &search).expect("found");
        assert_eq!(located.path(), PathBuf::from("/usr/lib/libgeos_c.so.1"));
        assert_eq!(search.asked(), vec!["geos_c".to_string()]);

        let fallback = RecordingSearch::default().with("GEOS", "/opt/GEOS");
        let located =
            locate_library(&Platform::Posix, &Settings::default(), &fallback).expect("found");
        assert_eq!(
            located,
            Located::Search {
                name: "GEOS".to_string(),
                path: PathBuf::from("/opt/GEOS"),
            }
        );
    }

    #[test]
    fn ldconfig_output_is_parsed() {
        let cache = "\
1234 libs found in cache `/etc/ld.so.cache'
\tlibgeos_c.so.1 (libc6,x86-64) => /usr/lib/x86_64-linux-gnu/libgeos_c.so.1
\tlibgeos_c.so.1 (libc6,AArch64) => /usr/lib/aarch64-linux-gnu/libgeos_c.so.1
\tlibgeos_cpp.so (libc6,x86-64) => /usr/lib/x86_64-linux-gnu/libgeos_cpp.so
";
        assert_eq!(
            parse_ldconfig(cache, "geos_c", Some("x86-64")),
            Some(PathBuf::from("/usr/lib/x86_64-linux-gnu/libgeos_c.so.1"))
        );
        assert_eq!(
            parse_ldconfig(cache, "geos_c", Some("AArch64")),
            Some(PathBuf::from("/usr/lib/aarch64-linux-gnu/libgeos_c.so.1"))
        );
        assert_eq!(parse_ldconfig(cache, "GEOS", Some("x86-64")), None);
    }

    #[test]
    fn ldconfig_entries_for_another_abi_are_skipped() {
        let cache =
            "\tlibgeos_c.so.1 (libc6,AArch64) => /usr/lib/aarch64-linux-gnu/libgeos_c.so.1\n";
        assert_eq!(parse_ldconfig(cache, "geos_c", Some("x86-64")), None);
        assert_eq!(
            parse_ldconfig(cache, "geos_c", None),
            Some(PathBuf::from("/usr/lib/aarch64-linux-gnu/libgeos_c.so.1"))
        );
    }

    #[test]
    fn directory_scan_matches_versioned_sonames() {
        let temp = tempfile::tempdir().expect("tempdir");
        let first = temp.path().join("first");
        let second = temp.path().join("second");
        std::fs::create_dir_all(&first).expect("mkdir");
        std::fs::create_dir_all(&second).expect("mkdir");
        std::fs::write(second.join("libgeos_c.so.1.17.1"), b"").expect("write");

        let patterns = vec![
            FilePattern::Exact("libgeos_c.so".to_string()),
            FilePattern::Prefix("libgeos_c.so.".to_string()),
        ];
        let found = scan_dirs(&[first.clone(), second.clone()], &patterns).expect("found");
        assert_eq!(found, second.join("libgeos_c.so.1.17.1"));

        std::fs::write(first.join("libgeos_c.so"), b"").expect("write");
        let found = scan_dirs(&[first.clone(), second], &patterns).expect("found");
        assert_eq!(found, first.join("libgeos_c.so"));
    }
}
