//! ITS file names and their Unix spellings.
//!
//! An ITS file is named by three SIXBIT words: the directory (UFD) and two
//! file name words. On the Unix side they map to `ufd/fn1.fn2`, lower case,
//! with the characters that are special on one side or the other swapped:
//! `.` becomes `_`, `/` becomes `{`, `_` becomes `}` and space becomes `~`.

use std::fmt;
use std::path::{Path, PathBuf};

const MAX_COMPONENT: usize = 6;

/// A three-component ITS file name, stored in ITS spelling (upper case).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItsName {
    pub ufd: String,
    pub fn1: String,
    pub fn2: String,
}

impl ItsName {
    pub fn new(ufd: &str, fn1: &str, fn2: &str) -> ItsName {
        ItsName {
            ufd: truncate(ufd),
            fn1: truncate(fn1),
            fn2: truncate(fn2),
        }
    }

    /// Derive an ITS name from a Unix path: the last directory component is
    /// the UFD, the file name splits at its first dot, and missing pieces
    /// get placeholder names.
    pub fn from_unix(path: &Path) -> ItsName {
        let file = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ufd = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (fn1, fn2) = match file.find('.') {
            Some(dot) => {
                let rest = &file[dot + 1..];
                // A second dot ends the type field.
                let fn2 = match rest.find('.') {
                    Some(d) => &rest[..d],
                    None => rest,
                };
                (&file[..dot], fn2)
            }
            None => (file.as_str(), ""),
        };

        let mut name = ItsName::new(&to_its(&ufd), &to_its(fn1), &to_its(fn2));
        if name.ufd.is_empty() {
            name.ufd = "UFD".to_string();
        }
        if name.fn1.is_empty() {
            name.fn1 = "FN1".to_string();
        }
        if name.fn2.is_empty() {
            name.fn2 = "FN2".to_string();
        }
        name
    }

    /// The Unix path `ufd/fn1.fn2` this name extracts to.
    pub fn to_unix(&self) -> PathBuf {
        let mut path = PathBuf::from(to_unix_component(&self.ufd));
        path.push(format!(
            "{}.{}",
            to_unix_component(&self.fn1),
            to_unix_component(&self.fn2)
        ));
        path
    }
}

impl fmt::Display for ItsName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{} {}", self.ufd, self.fn1, self.fn2)
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(MAX_COMPONENT).collect()
}

/// One name component, ITS to Unix spelling.
pub fn to_unix_component(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '.' => '_',
            '/' => '{',
            '_' => '}',
            ' ' => '~',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

/// One name component, Unix to ITS spelling.
pub fn to_its(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '_' => '.',
            '{' => '/',
            '}' => '_',
            '~' => ' ',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}
