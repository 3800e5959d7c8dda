use std::fmt;
use std::str::FromStr;

use crate::FatError;

/// Access mode a file is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
}

impl OpenMode {
    pub fn is_readable(self) -> bool {
        matches!(self, OpenMode::Read | OpenMode::ReadWrite)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, OpenMode::Write | OpenMode::ReadWrite)
    }

    /// Human-facing description used in CLI confirmations.
    pub fn description(self) -> &'static str {
        match self {
            OpenMode::Read => "read-only",
            OpenMode::Write => "write-only",
            OpenMode::ReadWrite => "read-write",
        }
    }
}

impl FromStr for OpenMode {
    type Err = FatError;

    fn from_str(s: &str) -> Result<Self, FatError> {
        match s {
            "r" => Ok(OpenMode::Read),
            "w" => Ok(OpenMode::Write),
            "rw" => Ok(OpenMode::ReadWrite),
            other => Err(FatError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpenMode::Read => "r",
            OpenMode::Write => "w",
            OpenMode::ReadWrite => "rw",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_modes() {
        assert_eq!("r".parse::<OpenMode>().unwrap(), OpenMode::Read);
        assert_eq!("w".parse::<OpenMode>().unwrap(), OpenMode::Write);
        assert_eq!("rw".parse::<OpenMode>().unwrap(), OpenMode::ReadWrite);
        assert!("rx".parse::<OpenMode>().is_err());
        assert!("".parse::<OpenMode>().is_err());
    }

    #[test]
    fn access_predicates() {
        assert!(OpenMode::Read.is_readable());
        assert!(!OpenMode::Read.is_writable());
        assert!(!OpenMode::Write.is_readable());
        assert!(OpenMode::Write.is_writable());
        assert!(OpenMode::ReadWrite.is_readable());
        assert!(OpenMode::ReadWrite.is_writable());
    }
}
