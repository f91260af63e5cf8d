// GEOS version string parsing ("3.9.1-CAPI-1.14.2" -> 3.9.1).
use std::fmt;

use serde::Serialize;

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct GeosVersion {
    pub major: u32,
    pub minor: u32,
    pub subminor: u32,
}

impl GeosVersion {
    pub const fn new(major: u32, minor: u32, subminor: u32) -> Self {
        Self {
            major,
            minor,
            subminor,
        }
    }

    pub fn as_tuple(&self) -> (u32, u32, u32) {
        (self.major, self.minor, self.subminor)
    }

    /// Reads the leading dotted numeric run; trailing tags (`dev`, `-CAPI-...`)
    /// are ignored and missing components count as zero.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let mut parts = [0u32; 3];
        let mut count = 0;
        for component in raw.trim().split('.') {
            let digits: &str = {
                let end = component
                    .find(|ch: char| !ch.is_ascii_digit())
                    .unwrap_or(component.len());
                &component[..end]
            };
            if digits.is_empty() {
                break;
            }
            let value = digits.parse::<u32>().map_err(|err| {
                Error::new(ErrorKind::Geos)
                    .with_message(format!("invalid GEOS version \"{raw}\""))
                    .with_source(err)
            })?;
            if count < parts.len() {
                parts[count] = value;
            }
            count += 1;
            if digits.len() != component.len() {
                break;
            }
        }

        if count == 0 {
            return Err(Error::new(ErrorKind::Geos)
                .with_message(format!("invalid GEOS version \"{raw}\"")));
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for GeosVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.subminor)
    }
}
