//! # Animal Dex Core
//!
//! Local badge collection storage and the discovery pipeline behind the
//! Animal Dex mobile app. The app photographs an animal, a remote service
//! identifies it, and a commemorative badge image is generated and kept on
//! the device, one badge per species.
//!
//! ## Layout
//!
//! - [`blob_store`] - binary files under the collection root
//! - [`metadata_index`] - the JSON document listing every badge
//! - [`badge_store`] - the record store composing the two (save, delete,
//!   clear, integrity check, repair, statistics)
//! - [`badge_service`] - the discovery pipeline and derived views
//! - [`collaborators`] - interfaces of the remote identification and
//!   badge-generation services
//! - [`settings_store`] - LMDB-backed session and app settings
//!
//! ## Quick Start
//!
//! ```no_run
//! use animal_dex_core::badge_store::BadgeStore;
//!
//! let store = BadgeStore::open_at("/data/app/files/badges")?;
//! if !store.check_if_animal_exists("Lion") {
//!     let badge = store.save_badge("Lion", "King of the jungle", &[0x89, 0x50], None, None)?;
//!     println!("saved {}", badge.id);
//! }
//! # Ok::<(), animal_dex_core::error::StoreError>(())
//! ```
//!
//! ## FFI Functions
//!
//! The record store is exposed through C-compatible functions returning a
//! JSON [`AppResponse`](app_response::AppResponse) envelope:
//!
//! - [`create_badge_store`] - open a collection root
//! - [`save_badge`] - store a new badge from a JSON payload
//! - [`get_all_badges`], [`get_badge_by_id`], [`get_badge_by_animal_name`]
//! - [`check_if_animal_exists`]
//! - [`delete_badge`], [`clear_all_badges`]
//! - [`test_integrity`], [`repair_store`], [`get_storage_stats`]
//! - [`close_badge_store`] - release the handle
//! - [`free_response`] - release a returned string

pub mod app_response;
pub mod badge_model;
pub mod badge_service;
pub mod badge_store;
pub mod blob_store;
pub mod collaborators;
pub mod config;
pub mod encoding;
pub mod error;
pub mod metadata_index;
pub mod retry;
pub mod settings_store;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use log::{info, warn};

use crate::app_response::AppResponse;
use crate::badge_model::SaveBadgeRequest;
use crate::badge_store::{BadgeStore, NewBadge};
use crate::encoding::decode_base64;

/// Opens the badge collection rooted at `root`, creating the directory if
/// needed.
///
/// # Returns
///
/// A pointer to the [`BadgeStore`], or null on failure. Release it with
/// [`close_badge_store`].
///
/// # Safety
///
/// `root` must be a valid null-terminated UTF-8 string.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_badge_store(root: *const c_char) -> *mut BadgeStore {
    if root.is_null() {
        warn!("Null root pointer passed to create_badge_store");
        return std::ptr::null_mut();
    }

    let root_str = match unsafe { CStr::from_ptr(root).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in root parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    match BadgeStore::open_at(root_str) {
        Ok(store) => {
            info!("Badge store ready at {root_str}");
            Box::into_raw(Box::new(store))
        }
        Err(e) => {
            warn!("Failed to open badge store at {root_str}: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Stores a new badge.
///
/// The store does not check for an existing badge with the same animal
/// name; call [`check_if_animal_exists`] first.
///
/// # Parameters
///
/// * `state` - Pointer to the badge store
/// * `json_ptr` - Null-terminated C string holding a
///   [`SaveBadgeRequest`](badge_model::SaveBadgeRequest)
///
/// # Returns
///
/// `Ok` with the saved record as JSON. `EncodingError` when `imageBase64` is
/// empty or not valid base64, `SerializationError` when the payload is not
/// valid JSON. The returned string must be freed with [`free_response`].
///
/// # Safety
///
/// Both pointers must be valid; `json_ptr` must be null-terminated UTF-8.
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use animal_dex_core::{create_badge_store, save_badge};
///
/// let root = CString::new("/data/app/files/badges").unwrap();
/// let store = create_badge_store(root.as_ptr());
///
/// let json = CString::new(r#"{"animalName":"Lion","description":"King","imageBase64":"iVBORw0KGgo="}"#).unwrap();
/// let result = save_badge(store, json.as_ptr());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn save_badge(state: *mut BadgeStore, json_ptr: *const c_char) -> *const c_char {
    let store = match store_ref(state, "save_badge") {
        Ok(store) => store,
        Err(error_ptr) => return error_ptr,
    };
    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(error_ptr) => return error_ptr,
    };

    let request: SaveBadgeRequest = match serde_json::from_str(&json_str) {
        Ok(request) => request,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid JSON: {e}"));
            return response_to_c_string(&error);
        }
    };
    if request.animal_name.trim().is_empty() {
        let error = AppResponse::BadRequest("animalName must not be empty".to_string());
        return response_to_c_string(&error);
    }

    let image = match decode_base64(&request.image_base64) {
        Ok(image) => image,
        Err(e) => return response_to_c_string(&AppResponse::from(e)),
    };
    let photo = request.photo_source();

    let saved = store.save_new_badge(NewBadge {
        animal_name: &request.animal_name,
        description: &request.description,
        image: &image,
        original_photo: photo.as_ref(),
        additional_data: request.additional_data.clone(),
        appearance: request.appearance.clone(),
    });

    match saved {
        Ok(badge) => response_to_c_string(&AppResponse::json(&badge)),
        Err(e) => {
            warn!("save_badge failed for {}: {e}", request.animal_name);
            response_to_c_string(&AppResponse::from(e))
        }
    }
}

/// Every badge in the collection as a JSON array.
///
/// An unreadable index yields an empty array, not an error.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_all_badges(state: *mut BadgeStore) -> *const c_char {
    let store = match store_ref(state, "get_all_badges") {
        Ok(store) => store,
        Err(error_ptr) => return error_ptr,
    };
    response_to_c_string(&AppResponse::json(&store.get_all_badges()))
}

/// Looks a badge up by id.
///
/// # Returns
///
/// `Ok` with the record as JSON, or `NotFound`. The returned string must be
/// freed with [`free_response`].
///
/// # Safety
///
/// `state` must come from [`create_badge_store`]; `id` must be a valid
/// null-terminated UTF-8 string.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_badge_by_id(state: *mut BadgeStore, id: *const c_char) -> *const c_char {
    let store = match store_ref(state, "get_badge_by_id") {
        Ok(store) => store,
        Err(error_ptr) => return error_ptr,
    };
    let id_str = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(error_ptr) => return error_ptr,
    };

    match store.get_badge_by_id(&id_str) {
        Some(badge) => response_to_c_string(&AppResponse::json(&badge)),
        None => response_to_c_string(&AppResponse::NotFound(format!(
            "No badge found with id: {id_str}"
        ))),
    }
}

/// Case-insensitive lookup by animal name.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_badge_by_animal_name(
    state: *mut BadgeStore,
    name: *const c_char,
) -> *const c_char {
    let store = match store_ref(state, "get_badge_by_animal_name") {
        Ok(store) => store,
        Err(error_ptr) => return error_ptr,
    };
    let name_str = match c_ptr_to_string(name, "name") {
        Ok(name) => name,
        Err(error_ptr) => return error_ptr,
    };

    match store.get_badge_by_animal_name(&name_str) {
        Some(badge) => response_to_c_string(&AppResponse::json(&badge)),
        None => response_to_c_string(&AppResponse::NotFound(format!(
            "No badge found for animal: {name_str}"
        ))),
    }
}

/// `Ok("true")` or `Ok("false")`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn check_if_animal_exists(
    state: *mut BadgeStore,
    name: *const c_char,
) -> *const c_char {
    let store = match store_ref(state, "check_if_animal_exists") {
        Ok(store) => store,
        Err(error_ptr) => return error_ptr,
    };
    let name_str = match c_ptr_to_string(name, "name") {
        Ok(name) => name,
        Err(error_ptr) => return error_ptr,
    };

    let exists = store.check_if_animal_exists(&name_str);
    response_to_c_string(&AppResponse::Ok(exists.to_string()))
}

/// Deletes a badge together with its image and original photo.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn delete_badge(state: *mut BadgeStore, id: *const c_char) -> *const c_char {
    let store = match store_ref(state, "delete_badge") {
        Ok(store) => store,
        Err(error_ptr) => return error_ptr,
    };
    let id_str = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(error_ptr) => return error_ptr,
    };

    if store.delete_badge(&id_str) {
        response_to_c_string(&AppResponse::success("Badge deleted successfully"))
    } else {
        response_to_c_string(&AppResponse::NotFound(format!(
            "No badge deleted for id: {id_str}"
        )))
    }
}

/// Removes every file under the collection root.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn clear_all_badges(state: *mut BadgeStore) -> *const c_char {
    let store = match store_ref(state, "clear_all_badges") {
        Ok(store) => store,
        Err(error_ptr) => return error_ptr,
    };

    if store.clear_all_badges() {
        response_to_c_string(&AppResponse::success("All badges cleared successfully"))
    } else {
        response_to_c_string(&AppResponse::StorageError(
            "Badge store could not be fully cleared".to_string(),
        ))
    }
}

/// Writes, reads back and deletes a small check file under the collection root.
///
/// # Returns
///
/// `Ok("true")` when the round trip matched, `StorageError` otherwise.
///
/// # Safety
///
/// `state` must come from [`create_badge_store`] and not have been closed.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn test_integrity(state: *mut BadgeStore) -> *const c_char {
    let store = match store_ref(state, "test_integrity") {
        Ok(store) => store,
        Err(error_ptr) => return error_ptr,
    };

    if store.test_integrity() {
        response_to_c_string(&AppResponse::success("true"))
    } else {
        response_to_c_string(&AppResponse::StorageError(
            "Write/read round trip failed".to_string(),
        ))
    }
}

/// Runs the repair sweep; the payload is the JSON repair report.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn repair_store(state: *mut BadgeStore) -> *const c_char {
    let store = match store_ref(state, "repair_store") {
        Ok(store) => store,
        Err(error_ptr) => return error_ptr,
    };
    response_to_c_string(&AppResponse::json(&store.repair()))
}

/// Badge count and total blob size.
///
/// # Returns
///
/// `Ok` with `{"totalBadges", "totalSize", "lastSync"}` as JSON. Missing
/// blobs count as 0 bytes.
///
/// # Safety
///
/// `state` must come from [`create_badge_store`] and not have been closed.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_storage_stats(state: *mut BadgeStore) -> *const c_char {
    let store = match store_ref(state, "get_storage_stats") {
        Ok(store) => store,
        Err(error_ptr) => return error_ptr,
    };
    response_to_c_string(&AppResponse::json(&store.get_storage_stats()))
}

/// Releases a handle returned by [`create_badge_store`].
///
/// The pointer must not be used afterwards. Useful before a hot restart of
/// the host app.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_badge_store(state: *mut BadgeStore) -> *const c_char {
    if state.is_null() {
        let error = AppResponse::BadRequest("Null state pointer passed to close_badge_store".to_string());
        return response_to_c_string(&error);
    }

    drop(unsafe { Box::from_raw(state) });
    info!("Badge store handle released");
    response_to_c_string(&AppResponse::success("Badge store closed successfully"))
}

/// Frees a string returned by any function in this library.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_response(ptr: *const c_char) {
    if ptr.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(ptr as *mut c_char) });
}

fn store_ref<'a>(state: *mut BadgeStore, caller: &str) -> Result<&'a BadgeStore, *const c_char> {
    match unsafe { state.as_ref() } {
        Some(store) => Ok(store),
        None => {
            let error = AppResponse::BadRequest(format!("Null state pointer passed to {caller}"));
            Err(response_to_c_string(&error))
        }
    }
}

/// Serializes the response to JSON and hands it out as a C string.
///
/// Returns null if serialization or C string creation fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to a Rust String.
///
/// On a null pointer or invalid UTF-8 the error side carries a ready-made
/// `BadRequest` response.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
