// Raw GEOS C ABI types: opaque handles and the entry-point signatures this crate relies on.
#![allow(non_camel_case_types)]

use std::ffi::c_void;
use std::marker::{PhantomData, PhantomPinned};
use std::ptr;

use libc::c_char;

macro_rules! opaque {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[repr(C)]
            pub struct $name {
                _data: [u8; 0],
                _marker: PhantomData<(*mut u8, PhantomPinned)>,
            }
        )*
    };
}

opaque! {
    /// `GEOSGeometry`.
    GEOSGeom_t;
    /// `GEOSPreparedGeometry`.
    GEOSPrepGeom_t;
    /// `GEOSCoordSequence`.
    GEOSCoordSeq_t;
    /// Per-thread token required by every `_r` entry point.
    GEOSContextHandle_t;
}

pub type GeomPtr = *mut GEOSGeom_t;
pub type PrepGeomPtr = *mut GEOSPrepGeom_t;
pub type CoordSeqPtr = *mut GEOSCoordSeq_t;
pub type ContextPtr = *mut GEOSContextHandle_t;

/// `GEOSMessageHandler`, narrowed to the single substitution argument GEOS
/// actually passes.
pub type MessageHandler = unsafe extern "C" fn(fmt: *const c_char, arg: *const c_char);

pub type InitFn = unsafe extern "C" fn(notice: MessageHandler, error: MessageHandler) -> ContextPtr;
pub type FinishFn = unsafe extern "C" fn(handle: ContextPtr);
pub type VersionFn = unsafe extern "C" fn() -> *const c_char;

pub const INIT_SYMBOL: &str = "initGEOS_r";
pub const FINISH_SYMBOL: &str = "finishGEOS_r";
pub const VERSION_SYMBOL: &str = "GEOSversion";

/// Zeroed array of geometry pointers, filled by callers before handing it to
/// `GEOSGeom_createPolygon_r` / `GEOSGeom_createCollection_r`.
pub fn null_geom_array(len: usize) -> Vec<GeomPtr> {
    vec![ptr::null_mut(); len]
}

/// Address of a symbol as handed out by the dynamic loader.
pub type RawSymbol = *mut c_void;
