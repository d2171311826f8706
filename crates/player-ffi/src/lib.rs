// FFI bridge for airwave
// Handle-based C ABI over streaming sessions.

use airwave_core::{AudioError, Result, StreamCallback, StreamEvent};
use airwave_shoutcast::{RadioInfo, Session, SessionConfig};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::{Arc, Once};
use std::time::Duration;

static SESSION_REGISTRY: Lazy<Mutex<HashMap<i64, Arc<Session>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
static NEXT_SESSION_ID: Lazy<Mutex<i64>> = Lazy::new(|| Mutex::new(1));
static INIT_LOGGER: Once = Once::new();

pub const AIRWAVE_OK: i32 = 0;
pub const AIRWAVE_ERROR: i32 = -1;
pub const AIRWAVE_ERROR_NETWORK: i32 = -2;
pub const AIRWAVE_ERROR_SYNC: i32 = -3;
pub const AIRWAVE_ERROR_FORMAT: i32 = -4;
pub const AIRWAVE_ERROR_ALLOCATION: i32 = -5;
pub const AIRWAVE_ERROR_STATE: i32 = -6;
pub const AIRWAVE_END_OF_STREAM: i32 = -7;

/// Event callback: `event` is a `StreamEvent` code, `text` is the metadata
/// of `Meta` events and null otherwise. `text` is only valid during the call.
pub type AirwaveEventFn =
    extern "C" fn(user_data: *mut c_void, event: i32, text: *const c_char);

fn init_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder()
            .is_test(false)
            .filter_level(log::LevelFilter::Info)
            .try_init();
    });
}

fn register_session(session: Session) -> i64 {
    let mut next = NEXT_SESSION_ID.lock();
    let id = *next;
    *next += 1;
    drop(next);

    SESSION_REGISTRY.lock().insert(id, Arc::new(session));
    id
}

/// Run `f` on a session without holding the registry lock
fn with_session<R>(id: i64, f: impl FnOnce(&Session) -> Result<R>) -> Result<R> {
    let session = SESSION_REGISTRY
        .lock()
        .get(&id)
        .cloned()
        .ok_or_else(|| AudioError::InvalidState("Invalid session ID".into()))?;
    f(&session)
}

fn error_code(err: &AudioError) -> i32 {
    match err {
        AudioError::NetworkError(_) | AudioError::IoError(_) => AIRWAVE_ERROR_NETWORK,
        AudioError::SyncTimeout(_) => AIRWAVE_ERROR_SYNC,
        AudioError::UnsupportedFormat(_) => AIRWAVE_ERROR_FORMAT,
        AudioError::AllocationFailure(_) => AIRWAVE_ERROR_ALLOCATION,
        AudioError::InvalidState(_) => AIRWAVE_ERROR_STATE,
        AudioError::EndOfStream => AIRWAVE_END_OF_STREAM,
        _ => AIRWAVE_ERROR,
    }
}

fn to_code(result: Result<()>) -> i32 {
    match result {
        Ok(()) => AIRWAVE_OK,
        Err(err) => {
            log::error!("FFI error: {}", err);
            error_code(&err)
        }
    }
}

fn to_count(result: Result<u64>) -> i64 {
    match result {
        Ok(value) => value as i64,
        Err(AudioError::EndOfStream) => AIRWAVE_END_OF_STREAM as i64,
        Err(err) => {
            log::error!("FFI error: {}", err);
            error_code(&err) as i64
        }
    }
}

/// Borrow a C string, rejecting null and invalid UTF-8
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn borrow_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

/// Hand a string to C; it must be released with `airwave_free_string`
fn into_c_string(text: Option<String>) -> *mut c_char {
    match text.map(CString::new) {
        Some(Ok(text)) => text.into_raw(),
        Some(Err(err)) => {
            log::warn!("String with interior NUL not returned: {}", err);
            std::ptr::null_mut()
        }
        None => std::ptr::null_mut(),
    }
}

fn info_string(id: i64, field: impl FnOnce(&RadioInfo) -> Option<String>) -> *mut c_char {
    match with_session(id, |s| Ok(field(s.radio_info()))) {
        Ok(text) => into_c_string(text),
        Err(err) => {
            log::error!("Failed to get stream info: {}", err);
            std::ptr::null_mut()
        }
    }
}

fn info_int(id: i64, field: impl FnOnce(&Session) -> i64) -> i64 {
    match with_session(id, |s| Ok(field(s))) {
        Ok(value) => value,
        Err(err) => {
            log::error!("Failed to get stream info: {}", err);
            AIRWAVE_ERROR as i64
        }
    }
}

/// Forwards session events to a C function pointer
struct CEventCallback {
    func: AirwaveEventFn,
    /// Opaque caller pointer, kept as an address so the bridge is Send
    user_data: usize,
}

impl StreamCallback for CEventCallback {
    fn on_event(&self, event: StreamEvent) {
        let code = event.code();
        let user_data = self.user_data as *mut c_void;
        match event {
            StreamEvent::Meta(text) => match CString::new(text) {
                Ok(text) => (self.func)(user_data, code, text.as_ptr()),
                Err(_) => (self.func)(user_data, code, std::ptr::null()),
            },
            _ => (self.func)(user_data, code, std::ptr::null()),
        }
    }
}

// -------------------------------
// C ABI
// -------------------------------

/// Open a stream; returns a session handle, or a negative error code
///
/// `cache_seconds` of 0 selects the default. A non-zero `use_thread` runs
/// the network fill loop on a background thread.
///
/// # Safety
/// `url` must be null or point to a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn airwave_open(
    url: *const c_char,
    cache_seconds: u32,
    use_thread: i32,
) -> i64 {
    init_logging();

    let url = match borrow_str(url) {
        Some(url) => url,
        None => return AIRWAVE_ERROR as i64,
    };

    let mut config = SessionConfig::new().with_thread(use_thread != 0);
    if cache_seconds > 0 {
        config = config.with_cache_seconds(cache_seconds);
    }

    match Session::open(url, config) {
        Ok(session) => register_session(session),
        Err(err) => {
            log::error!("Failed to open {}: {}", url, err);
            error_code(&err) as i64
        }
    }
}

/// Decode up to `len` interleaved samples into `out`
///
/// Returns the number of samples written, 0 while buffering or paused, or a
/// negative code (`AIRWAVE_END_OF_STREAM` once the stream has ended).
///
/// # Safety
/// `out` must be valid for writes of `len` floats.
#[no_mangle]
pub unsafe extern "C" fn airwave_read(id: i64, out: *mut f32, len: usize) -> i64 {
    if out.is_null() {
        return AIRWAVE_ERROR as i64;
    }
    let out = std::slice::from_raw_parts_mut(out, len);
    to_count(with_session(id, |s| s.read(out).map(|n| n as u64)))
}

/// Run one fill cycle; for sessions opened without a fill thread
#[no_mangle]
pub extern "C" fn airwave_fill(id: i64, timeout_ms: u32) -> i32 {
    to_code(with_session(id, |s| {
        s.fill(Duration::from_millis(timeout_ms as u64))
    }))
}

#[no_mangle]
pub extern "C" fn airwave_play(id: i64) -> i32 {
    to_code(with_session(id, |s| s.play()))
}

#[no_mangle]
pub extern "C" fn airwave_pause(id: i64) -> i32 {
    to_code(with_session(id, |s| s.pause()))
}

/// Skip time-shifted audio; returns the milliseconds actually skipped
#[no_mangle]
pub extern "C" fn airwave_skip(id: i64, ms: u64) -> i64 {
    to_count(with_session(id, |s| Ok(s.skip(ms))))
}

/// Time-shifted audio buffered, in milliseconds
#[no_mangle]
pub extern "C" fn airwave_get_pause(id: i64) -> i64 {
    to_count(with_session(id, |s| Ok(s.pause_duration())))
}

/// Drop the time-shifted audio and return to live
#[no_mangle]
pub extern "C" fn airwave_reset(id: i64) -> i32 {
    to_code(with_session(id, |s| {
        s.reset_pause();
        Ok(())
    }))
}

#[no_mangle]
pub extern "C" fn airwave_get_status(id: i64) -> i32 {
    match with_session(id, |s| Ok(s.status())) {
        Ok(status) => status.code(),
        Err(err) => {
            log::error!("Failed to get status: {}", err);
            AIRWAVE_ERROR
        }
    }
}

/// Cache fill level in percent
#[no_mangle]
pub extern "C" fn airwave_get_filling(id: i64) -> i32 {
    match with_session(id, |s| Ok(s.fill_percent())) {
        Ok(percent) => percent as i32,
        Err(err) => {
            log::error!("Failed to get fill level: {}", err);
            AIRWAVE_ERROR
        }
    }
}

/// Current metadata text, or null; free with `airwave_free_string`
#[no_mangle]
pub extern "C" fn airwave_get_metadata(id: i64) -> *mut c_char {
    match with_session(id, |s| Ok(s.metadata())) {
        Ok(text) => into_c_string(text),
        Err(err) => {
            log::error!("Failed to get metadata: {}", err);
            std::ptr::null_mut()
        }
    }
}

/// Current stream title, or null; free with `airwave_free_string`
#[no_mangle]
pub extern "C" fn airwave_get_title(id: i64) -> *mut c_char {
    match with_session(id, |s| Ok(s.title())) {
        Ok(text) => into_c_string(text),
        Err(err) => {
            log::error!("Failed to get title: {}", err);
            std::ptr::null_mut()
        }
    }
}

/// # Safety
/// `text` must be null or a string returned by this library.
#[no_mangle]
pub unsafe extern "C" fn airwave_free_string(text: *mut c_char) {
    if !text.is_null() {
        drop(CString::from_raw(text));
    }
}

#[no_mangle]
pub extern "C" fn airwave_get_info_name(id: i64) -> *mut c_char {
    info_string(id, |info| info.name.clone())
}

#[no_mangle]
pub extern "C" fn airwave_get_info_genre(id: i64) -> *mut c_char {
    info_string(id, |info| info.genre.clone())
}

#[no_mangle]
pub extern "C" fn airwave_get_info_description(id: i64) -> *mut c_char {
    info_string(id, |info| info.description.clone())
}

#[no_mangle]
pub extern "C" fn airwave_get_info_url(id: i64) -> *mut c_char {
    info_string(id, |info| info.url.clone())
}

#[no_mangle]
pub extern "C" fn airwave_get_info_content_type(id: i64) -> *mut c_char {
    info_string(id, |info| Some(info.content_type.clone()))
}

/// Advertised bitrate in kb/s
#[no_mangle]
pub extern "C" fn airwave_get_info_bitrate(id: i64) -> i64 {
    info_int(id, |s| s.radio_info().bitrate as i64)
}

#[no_mangle]
pub extern "C" fn airwave_get_info_metaint(id: i64) -> i64 {
    info_int(id, |s| s.radio_info().metaint as i64)
}

/// 1 for public, 0 for unlisted, 2 when the server marks the stream private
#[no_mangle]
pub extern "C" fn airwave_get_info_public(id: i64) -> i64 {
    info_int(id, |s| {
        let info = s.radio_info();
        if info.is_private {
            2
        } else {
            info.is_public as i64
        }
    })
}

#[no_mangle]
pub extern "C" fn airwave_get_sample_rate(id: i64) -> i64 {
    info_int(id, |s| s.sample_rate() as i64)
}

#[no_mangle]
pub extern "C" fn airwave_get_channels(id: i64) -> i64 {
    info_int(id, |s| s.channels() as i64)
}

/// Install or clear (null `func`) the event callback
///
/// The callback runs on the fill thread or the reading thread with no
/// session lock held. Events raised by calls made from inside it are
/// dropped.
#[no_mangle]
pub extern "C" fn airwave_set_event_callback(
    id: i64,
    func: Option<AirwaveEventFn>,
    user_data: *mut c_void,
) -> i32 {
    let callback = func.map(|func| {
        Arc::new(CEventCallback {
            func,
            user_data: user_data as usize,
        }) as Arc<dyn StreamCallback>
    });
    to_code(with_session(id, |s| {
        s.set_event_callback(callback);
        Ok(())
    }))
}

/// Release a session; the handle is invalid afterwards
#[no_mangle]
pub extern "C" fn airwave_close(id: i64) -> i32 {
    let session = SESSION_REGISTRY.lock().remove(&id);
    match session {
        Some(session) => {
            // A read still running on another thread keeps the session alive
            // until it returns
            drop(session);
            AIRWAVE_OK
        }
        None => AIRWAVE_ERROR,
    }
}
