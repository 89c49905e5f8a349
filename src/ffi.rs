//! C FFI: read unit files and timelines from a C/C++ synthesis runtime.
//!
//! Functions are `#[no_mangle] extern "C"` so the runtime can call them
//! through a plain header, linking `libvoxbuild.a`.
//!
//! ## Memory contract
//!
//! | Function                          | Caller frees with            |
//! |-----------------------------------|------------------------------|
//! | [`voxbuild_units_open`]           | [`voxbuild_units_free`]      |
//! | [`voxbuild_timeline_open`]        | [`voxbuild_timeline_free`]   |
//! | [`voxbuild_timeline_datagram_at`] | [`voxbuild_datagram_free`] for the datagram, [`voxbuild_free_error`] for the returned error |

use std::ffi::{c_char, CStr, CString};
use std::path::Path;

use tracing::error;

use crate::timeline_reader::TimelineReader;
use crate::unitfile::UnitFileReader;

// ─────────────────────────────────────────────────────────────────────────────

/// Opaque handle to a loaded unit file.
pub struct VoxUnitsHandle {
    units: UnitFileReader,
}

/// Opaque handle to an open timeline.
pub struct VoxTimelineHandle {
    timeline: TimelineReader,
}

/// One unit as seen from C.  `duration == -1` marks a sentinel.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VoxUnit {
    pub start: i64,
    pub duration: i32,
}

/// One datagram as seen from C.  `payload` is owned by Rust until passed to
/// [`voxbuild_datagram_free`].
#[repr(C)]
#[derive(Debug)]
pub struct VoxDatagram {
    pub duration: u64,
    pub payload: *mut u8,
    pub payload_len: usize,
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Heap-allocate an owned C string.  Returns null on interior nul bytes.
fn to_c_str(s: &str) -> *const c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => std::ptr::null(),
    }
}

// ─── Unit files ──────────────────────────────────────────────────────────────

/// Open a unit file.
///
/// @return  Opaque handle, or `NULL` on failure (details are logged).
///          Free with [`voxbuild_units_free`].
#[no_mangle]
pub unsafe extern "C" fn voxbuild_units_open(path: *const c_char) -> *mut VoxUnitsHandle {
    let Some(path) = (unsafe { cstr_to_string(path) }) else {
        error!("voxbuild_units_open: null path");
        return std::ptr::null_mut();
    };
    match UnitFileReader::open(Path::new(&path)) {
        Ok(units) => Box::into_raw(Box::new(VoxUnitsHandle { units })),
        Err(e) => {
            error!(path = %path, error = %e, "cannot open unit file");
            std::ptr::null_mut()
        }
    }
}

/// Number of units, or -1 for a null handle.
#[no_mangle]
pub unsafe extern "C" fn voxbuild_units_count(units: *const VoxUnitsHandle) -> i64 {
    if units.is_null() {
        return -1;
    }
    i64::from(unsafe { &*units }.units.num_units())
}

/// Copy unit `index` into `out`.
///
/// @return  0 on success, -1 for a null argument or an index out of range.
#[no_mangle]
pub unsafe extern "C" fn voxbuild_units_get(
    units: *const VoxUnitsHandle,
    index: u32,
    out: *mut VoxUnit,
) -> i32 {
    if units.is_null() || out.is_null() {
        return -1;
    }
    match unsafe { &*units }.units.unit(index) {
        Some(u) => {
            unsafe {
                *out = VoxUnit {
                    start: u.start as i64,
                    duration: u.duration,
                }
            };
            0
        }
        None => -1,
    }
}

#[no_mangle]
pub unsafe extern "C" fn voxbuild_units_free(units: *mut VoxUnitsHandle) {
    if !units.is_null() {
        drop(unsafe { Box::from_raw(units) });
    }
}

// ─── Timelines ───────────────────────────────────────────────────────────────

/// Open a finished timeline.
///
/// @return  Opaque handle, or `NULL` on failure (details are logged).
///          Free with [`voxbuild_timeline_free`].
#[no_mangle]
pub unsafe extern "C" fn voxbuild_timeline_open(path: *const c_char) -> *mut VoxTimelineHandle {
    let Some(path) = (unsafe { cstr_to_string(path) }) else {
        error!("voxbuild_timeline_open: null path");
        return std::ptr::null_mut();
    };
    match TimelineReader::open(Path::new(&path)) {
        Ok(timeline) => Box::into_raw(Box::new(VoxTimelineHandle { timeline })),
        Err(e) => {
            error!(path = %path, error = %e, "cannot open timeline");
            std::ptr::null_mut()
        }
    }
}

/// Timeline sample rate, or 0 for a null handle.
#[no_mangle]
pub unsafe extern "C" fn voxbuild_timeline_sample_rate(timeline: *const VoxTimelineHandle) -> u32 {
    if timeline.is_null() {
        return 0;
    }
    unsafe { &*timeline }.timeline.sample_rate()
}

/// Total timeline duration in samples, or 0 for a null handle.
#[no_mangle]
pub unsafe extern "C" fn voxbuild_timeline_total_duration(timeline: *const VoxTimelineHandle) -> u64 {
    if timeline.is_null() {
        return 0;
    }
    unsafe { &*timeline }.timeline.total_duration()
}

/// Fetch the datagram covering `time` (timeline samples).
///
/// @return  `NULL` on success, with `out` filled in; on failure a
///          heap-allocated UTF-8 error message that the caller must release
///          with [`voxbuild_free_error`], and `out` is left untouched.
#[no_mangle]
pub unsafe extern "C" fn voxbuild_timeline_datagram_at(
    timeline: *const VoxTimelineHandle,
    time: u64,
    out: *mut VoxDatagram,
) -> *const c_char {
    if timeline.is_null() || out.is_null() {
        return to_c_str("null timeline handle or output pointer");
    }
    match unsafe { &*timeline }.timeline.datagram_at(time) {
        Ok(d) => {
            let duration = d.duration();
            let payload = d.into_payload().into_boxed_slice();
            let payload_len = payload.len();
            unsafe {
                *out = VoxDatagram {
                    duration,
                    payload: Box::into_raw(payload) as *mut u8,
                    payload_len,
                }
            };
            std::ptr::null()
        }
        Err(e) => to_c_str(&e.to_string()),
    }
}

/// Release the payload of a datagram filled by
/// [`voxbuild_timeline_datagram_at`].
#[no_mangle]
pub unsafe extern "C" fn voxbuild_datagram_free(datagram: *mut VoxDatagram) {
    if datagram.is_null() {
        return;
    }
    let d = unsafe { &mut *datagram };
    if !d.payload.is_null() {
        let slice = std::ptr::slice_from_raw_parts_mut(d.payload, d.payload_len);
        drop(unsafe { Box::from_raw(slice) });
        d.payload = std::ptr::null_mut();
        d.payload_len = 0;
    }
}

#[no_mangle]
pub unsafe extern "C" fn voxbuild_timeline_free(timeline: *mut VoxTimelineHandle) {
    if !timeline.is_null() {
        drop(unsafe { Box::from_raw(timeline) });
    }
}

/// Free an error string returned by [`voxbuild_timeline_datagram_at`].
#[no_mangle]
pub unsafe extern "C" fn voxbuild_free_error(s: *const c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s as *mut c_char) });
    }
}
