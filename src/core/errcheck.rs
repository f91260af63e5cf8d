// Stock result checks for GEOS sentinel return values.
use libc::{c_char, c_int};

use crate::core::error::{Error, ErrorKind};

fn geos_error(symbol: &str, message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Geos)
        .with_message(message)
        .with_symbol(symbol)
}

/// Null pointer returns (geometry constructors, prepared geometries, coordinate
/// sequences) mean GEOS already reported an error.
pub fn check_nonnull<T>(ptr: *mut T, symbol: &str) -> Result<*mut T, Error> {
    if ptr.is_null() {
        return Err(geos_error(symbol, "GEOS returned a null pointer"));
    }
    Ok(ptr)
}

pub fn check_string(ptr: *const c_char, symbol: &str) -> Result<*const c_char, Error> {
    if ptr.is_null() {
        return Err(geos_error(symbol, "GEOS returned a null string"));
    }
    Ok(ptr)
}

/// For functions returning 1 on success and 0 on failure.
pub fn check_zero(value: c_int, symbol: &str) -> Result<c_int, Error> {
    if value == 0 {
        return Err(geos_error(symbol, "GEOS reported failure (0)"));
    }
    Ok(value)
}

pub fn check_minus_one(value: c_int, symbol: &str) -> Result<c_int, Error> {
    if value == -1 {
        return Err(geos_error(symbol, "GEOS reported failure (-1)"));
    }
    Ok(value)
}

/// Unary/binary predicates: 0 false, 1 true, 2 exception.
pub fn check_predicate(value: c_char, symbol: &str) -> Result<c_char, Error> {
    match value {
        0 | 1 => Ok(value),
        other => Err(geos_error(
            symbol,
            format!("GEOS predicate returned {other}"),
        )),
    }
}
