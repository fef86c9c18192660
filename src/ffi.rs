//! C ABI bindings for the session service.
//!
//! Thin wrappers over [`crate::service::SessionService`]. The service is
//! handed out as an opaque pointer; every call returns a [`PairingResult`]
//! whose JSON payload is owned by the caller and must be released with
//! [`pairing_string_free`].

use crate::db::SqliteSessionStore;
use crate::error::StatusCode;
use crate::service::{ServiceResponse, SessionService};
use serde::Serialize;
use std::ffi::{c_char, CStr, CString};
use std::ptr;
use std::sync::Arc;

// ============================================================================
// C FFI Types
// ============================================================================

/// Result of a boundary call (C-compatible).
/// `payload` is null unless `status` is 0 and the call produces a payload.
#[repr(C)]
pub struct PairingResult {
    pub status: i32,
    pub payload: *mut c_char,
}

impl PairingResult {
    fn from_response<T: Serialize>(response: ServiceResponse<T>) -> Self {
        let payload = response
            .payload_json()
            .and_then(|json| CString::new(json).ok())
            .map_or(ptr::null_mut(), CString::into_raw);

        PairingResult {
            status: response.status.code(),
            payload,
        }
    }

    fn invalid_argument() -> Self {
        PairingResult {
            status: StatusCode::InternalError.code(),
            payload: ptr::null_mut(),
        }
    }
}

/// Log callback invoked with a NUL-terminated message.
/// The string is only valid for the duration of the call.
pub type PairingLogCallback = extern "C" fn(message: *const c_char);

unsafe fn read_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

unsafe fn service_ref<'a>(service: *const SessionService) -> Option<&'a SessionService> {
    unsafe { service.as_ref() }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Create a memory-only service. Free it with [`pairing_service_free`].
#[no_mangle]
pub extern "C" fn pairing_service_new() -> *mut SessionService {
    Box::into_raw(Box::new(SessionService::new()))
}

/// Create a service persisted to the SQLite file at `db_path`.
/// Returns NULL if the path is invalid or the database cannot be opened.
///
/// # Safety
/// `db_path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn pairing_service_open(db_path: *const c_char) -> *mut SessionService {
    let Some(path) = (unsafe { read_str(db_path) }) else {
        return ptr::null_mut();
    };

    let service = SqliteSessionStore::open(path)
        .and_then(|store| SessionService::with_store(Arc::new(store)));

    match service {
        Ok(service) => Box::into_raw(Box::new(service)),
        Err(e) => {
            log::error!("Failed to open session database {}: {}", path, e);
            ptr::null_mut()
        }
    }
}

/// Free a service created by [`pairing_service_new`] or [`pairing_service_open`].
///
/// # Safety
/// `service` must be null or a pointer obtained from this library that has
/// not been freed yet.
#[no_mangle]
pub unsafe extern "C" fn pairing_service_free(service: *mut SessionService) {
    if !service.is_null() {
        unsafe { drop(Box::from_raw(service)) };
    }
}

/// Free a payload string returned in a [`PairingResult`].
///
/// # Safety
/// `s` must be null or a payload pointer from this library, freed once.
#[no_mangle]
pub unsafe extern "C" fn pairing_string_free(s: *mut c_char) {
    if !s.is_null() {
        unsafe {
            let _ = CString::from_raw(s);
        }
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Generate an identity key pair. Payload: `{"publicKey", "privateKey"}`.
///
/// # Safety
/// `service` must be a live pointer from [`pairing_service_new`].
#[no_mangle]
pub unsafe extern "C" fn pairing_generate_key_pair(service: *const SessionService) -> PairingResult {
    match unsafe { service_ref(service) } {
        Some(service) => PairingResult::from_response(service.generate_key_pair()),
        None => PairingResult::invalid_argument(),
    }
}

/// Create a session. `session_id` may be null to have one generated.
/// Payload: session descriptor.
///
/// # Safety
/// `service` must be a live service pointer; string arguments must be null
/// or valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn pairing_create_session(
    service: *const SessionService,
    session_id: *const c_char,
    owner_key: *const c_char,
) -> PairingResult {
    let (Some(service), Some(owner_key)) = (unsafe { service_ref(service) }, unsafe {
        read_str(owner_key)
    }) else {
        return PairingResult::invalid_argument();
    };

    let session_id = if session_id.is_null() {
        None
    } else {
        match unsafe { read_str(session_id) } {
            Some(id) => Some(id),
            None => return PairingResult::invalid_argument(),
        }
    };

    PairingResult::from_response(service.create_session(session_id, owner_key))
}

/// Join a session. Payload: session descriptor.
///
/// # Safety
/// See [`pairing_create_session`].
#[no_mangle]
pub unsafe extern "C" fn pairing_join_session(
    service: *const SessionService,
    session_id: *const c_char,
    participant_key: *const c_char,
) -> PairingResult {
    match unsafe {
        (
            service_ref(service),
            read_str(session_id),
            read_str(participant_key),
        )
    } {
        (Some(service), Some(id), Some(key)) => {
            PairingResult::from_response(service.join_session(id, key))
        }
        _ => PairingResult::invalid_argument(),
    }
}

/// List participants in join order. Payload: JSON array of keys.
///
/// # Safety
/// See [`pairing_create_session`].
#[no_mangle]
pub unsafe extern "C" fn pairing_list_participants(
    service: *const SessionService,
    session_id: *const c_char,
) -> PairingResult {
    match unsafe { (service_ref(service), read_str(session_id)) } {
        (Some(service), Some(id)) => PairingResult::from_response(service.list_participants(id)),
        _ => PairingResult::invalid_argument(),
    }
}

/// Acknowledge the session membership. Payload: `{"isReady": bool}`.
///
/// # Safety
/// See [`pairing_create_session`].
#[no_mangle]
pub unsafe extern "C" fn pairing_acknowledge(
    service: *const SessionService,
    session_id: *const c_char,
    participant_key: *const c_char,
    stored_participant_count: i32,
) -> PairingResult {
    match unsafe {
        (
            service_ref(service),
            read_str(session_id),
            read_str(participant_key),
        )
    } {
        (Some(service), Some(id), Some(key)) => PairingResult::from_response(
            service.acknowledge(id, key, stored_participant_count),
        ),
        _ => PairingResult::invalid_argument(),
    }
}

/// Leave a session. Payload: session descriptor after the departure.
///
/// # Safety
/// See [`pairing_create_session`].
#[no_mangle]
pub unsafe extern "C" fn pairing_leave_session(
    service: *const SessionService,
    session_id: *const c_char,
    participant_key: *const c_char,
) -> PairingResult {
    match unsafe {
        (
            service_ref(service),
            read_str(session_id),
            read_str(participant_key),
        )
    } {
        (Some(service), Some(id), Some(key)) => {
            PairingResult::from_response(service.leave_session(id, key))
        }
        _ => PairingResult::invalid_argument(),
    }
}

/// Close a session. No payload.
///
/// # Safety
/// See [`pairing_create_session`].
#[no_mangle]
pub unsafe extern "C" fn pairing_close_session(
    service: *const SessionService,
    session_id: *const c_char,
) -> PairingResult {
    match unsafe { (service_ref(service), read_str(session_id)) } {
        (Some(service), Some(id)) => {
            let response = service.close_session(id);
            PairingResult {
                status: response.status.code(),
                payload: ptr::null_mut(),
            }
        }
        _ => PairingResult::invalid_argument(),
    }
}

/// Register the log callback. Returns the status code; a NULL `callback`
/// is rejected with `InternalError`.
///
/// # Safety
/// `service` must be a live service pointer. `callback` must stay callable
/// for as long as it is registered and may be invoked from any thread that
/// calls into the service.
#[no_mangle]
pub unsafe extern "C" fn pairing_register_log_callback(
    service: *const SessionService,
    callback: Option<PairingLogCallback>,
) -> i32 {
    let Some(service) = (unsafe { service_ref(service) }) else {
        return StatusCode::InternalError.code();
    };
    let Some(callback) = callback else {
        return StatusCode::InternalError.code();
    };

    let response = service.register_log_callback(move |message: &str| {
        if let Ok(message) = CString::new(message) {
            callback(message.as_ptr());
        }
    });
    response.status.code()
}
