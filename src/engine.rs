//! Runtime binding to the Vosk speech engine so the binary runs without it.
//!
//! The engine is a capability, not a link-time dependency: the shared
//! library is probed once per process with `libloading` and the result is
//! cached as `Available` or `Unavailable`. Absence disables voice features
//! and nothing else — no call on this module panics because the library is
//! missing.

use libloading::Library;
use std::env;
use std::ffi::{c_char, c_float, c_int, CStr, CString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info};

/// Silences the engine's native logging (it writes to stderr by default).
const ENGINE_LOG_LEVEL_QUIET: c_int = -1;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("speech engine library is not present on this system")]
    NotPresent,
    #[error("recognition model path is not a directory: {}", .0.display())]
    ModelPathInvalid(PathBuf),
    #[error("speech engine failed to load the model at {}", .0.display())]
    ModelLoad(PathBuf),
    #[error("speech engine failed to construct a recognizer")]
    RecognizerInit,
}

// Opaque engine-side handle types; only ever used behind raw pointers.
#[repr(C)]
struct VoskModel {
    _private: [u8; 0],
}
#[repr(C)]
struct VoskRecognizer {
    _private: [u8; 0],
}

type SetLogLevelFn = unsafe extern "C" fn(c_int);
type ModelNewFn = unsafe extern "C" fn(*const c_char) -> *mut VoskModel;
type ModelFreeFn = unsafe extern "C" fn(*mut VoskModel);
type RecognizerNewFn = unsafe extern "C" fn(*mut VoskModel, c_float) -> *mut VoskRecognizer;
type AcceptWaveformFn = unsafe extern "C" fn(*mut VoskRecognizer, *const c_char, c_int) -> c_int;
type ResultFn = unsafe extern "C" fn(*mut VoskRecognizer) -> *const c_char;
type RecognizerFreeFn = unsafe extern "C" fn(*mut VoskRecognizer);

/// Symbol table resolved from the engine library. Lives for the whole
/// process once probing succeeds.
pub struct EngineLibrary {
    set_log_level: SetLogLevelFn,
    model_new: ModelNewFn,
    model_free: ModelFreeFn,
    recognizer_new: RecognizerNewFn,
    accept_waveform: AcceptWaveformFn,
    result: ResultFn,
    partial_result: ResultFn,
    final_result: ResultFn,
    recognizer_free: RecognizerFreeFn,
    _library: Library,
}

impl fmt::Debug for EngineLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineLibrary").finish_non_exhaustive()
    }
}

/// Outcome of the one-time engine probe.
#[derive(Debug)]
pub enum EngineCapability {
    Available(EngineLibrary),
    Unavailable { reason: String },
}

impl EngineCapability {
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, EngineCapability::Available(_))
    }
}

static BINDING: OnceLock<EngineCapability> = OnceLock::new();

/// Resolves the engine capability, probing the shared library on first use
/// and caching the outcome for the process lifetime.
#[must_use = "callers must branch on engine availability"]
pub fn binding() -> &'static EngineCapability {
    #[cfg(test)]
    if let Some(forced) = test_support::forced() {
        return forced;
    }
    BINDING.get_or_init(probe)
}

fn engine_library_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(path) = env::var("VOXLAUNCH_ENGINE_LIB") {
        if !path.is_empty() {
            candidates.push(PathBuf::from(path));
        }
    }
    candidates.push(PathBuf::from(format!(
        "{}vosk{}",
        env::consts::DLL_PREFIX,
        env::consts::DLL_SUFFIX
    )));
    candidates
}

fn probe() -> EngineCapability {
    let mut failures = Vec::new();
    for candidate in engine_library_candidates() {
        // SAFETY: loading the engine library runs its constructors; Vosk has
        // no load-time side effects beyond symbol registration.
        match unsafe { Library::new(&candidate) } {
            Ok(library) => match EngineLibrary::from_library(library) {
                Ok(engine) => {
                    // SAFETY: the symbol was resolved from this library and
                    // takes a plain integer.
                    unsafe { (engine.set_log_level)(ENGINE_LOG_LEVEL_QUIET) };
                    info!(library = %candidate.display(), "speech engine resolved");
                    return EngineCapability::Available(engine);
                }
                Err(err) => failures.push(format!("{}: {err}", candidate.display())),
            },
            Err(err) => failures.push(format!("{}: {err}", candidate.display())),
        }
    }
    let reason = failures.join("; ");
    info!(%reason, "speech engine unavailable; voice features disabled");
    EngineCapability::Unavailable { reason }
}

macro_rules! resolve_symbol {
    ($library:expr, $name:literal, $ty:ty) => {{
        // SAFETY: the symbol name matches the engine's C API and the
        // function type mirrors its documented signature.
        let symbol = unsafe { $library.get::<$ty>(concat!($name, "\0").as_bytes())? };
        *symbol
    }};
}

impl EngineLibrary {
    fn from_library(library: Library) -> Result<Self, libloading::Error> {
        Ok(Self {
            set_log_level: resolve_symbol!(library, "vosk_set_log_level", SetLogLevelFn),
            model_new: resolve_symbol!(library, "vosk_model_new", ModelNewFn),
            model_free: resolve_symbol!(library, "vosk_model_free", ModelFreeFn),
            recognizer_new: resolve_symbol!(library, "vosk_recognizer_new", RecognizerNewFn),
            accept_waveform: resolve_symbol!(
                library,
                "vosk_recognizer_accept_waveform",
                AcceptWaveformFn
            ),
            result: resolve_symbol!(library, "vosk_recognizer_result", ResultFn),
            partial_result: resolve_symbol!(library, "vosk_recognizer_partial_result", ResultFn),
            final_result: resolve_symbol!(library, "vosk_recognizer_final_result", ResultFn),
            recognizer_free: resolve_symbol!(library, "vosk_recognizer_free", RecognizerFreeFn),
            _library: library,
        })
    }

    /// Loads the model and constructs a streaming recognizer for it.
    ///
    /// # Errors
    ///
    /// Returns `ModelLoad` when the engine rejects the model directory and
    /// `RecognizerInit` when recognizer construction fails.
    pub fn create_recognizer(
        &'static self,
        model_path: &Path,
        sample_rate: f32,
    ) -> Result<Recognizer, EngineError> {
        let path_arg = CString::new(model_path.to_string_lossy().into_owned())
            .map_err(|_| EngineError::ModelPathInvalid(model_path.to_path_buf()))?;
        // SAFETY: path_arg outlives the call and the engine copies the string.
        let model = unsafe { (self.model_new)(path_arg.as_ptr()) };
        if model.is_null() {
            return Err(EngineError::ModelLoad(model_path.to_path_buf()));
        }
        // SAFETY: model is non-null; the recognizer holds its own reference.
        let recognizer = unsafe { (self.recognizer_new)(model, sample_rate) };
        if recognizer.is_null() {
            // SAFETY: model came from model_new and was not handed anywhere.
            unsafe { (self.model_free)(model) };
            return Err(EngineError::RecognizerInit);
        }
        debug!(model = %model_path.display(), %sample_rate, "recognizer created");
        Ok(Recognizer {
            library: self,
            model,
            recognizer,
        })
    }
}

/// One streaming recognizer handle.
///
/// All methods are synchronous and must not be invoked concurrently; the
/// pipeline wraps the handle in a `Mutex` before sharing it with the
/// capture callback. The model and recognizer are released on drop.
pub struct Recognizer {
    library: &'static EngineLibrary,
    model: *mut VoskModel,
    recognizer: *mut VoskRecognizer,
}

// SAFETY: the raw handles are only ever driven from one thread at a time
// (enforced by the pipeline's Mutex); the engine does not require affinity
// to the creating thread.
unsafe impl Send for Recognizer {}

impl fmt::Debug for Recognizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recognizer").finish_non_exhaustive()
    }
}

impl Recognizer {
    /// Feeds one PCM frame; returns true when the engine finalized an
    /// utterance on this frame.
    pub fn accept_frame(&mut self, pcm: &[i16]) -> bool {
        if pcm.is_empty() {
            return false;
        }
        let byte_len = c_int::try_from(pcm.len().saturating_mul(2)).unwrap_or(c_int::MAX);
        // SAFETY: pointer/length describe the i16 buffer reinterpreted as
        // bytes, the layout the engine expects for 16-bit little-endian PCM.
        let status = unsafe {
            (self.library.accept_waveform)(self.recognizer, pcm.as_ptr().cast(), byte_len)
        };
        // A negative status is an engine-side failure; the frame is simply
        // not part of any utterance.
        status > 0
    }

    /// Committed-utterance payload after `accept_frame` returned true.
    pub fn poll_result(&mut self) -> String {
        // SAFETY: the handle is valid and exclusively borrowed.
        let raw = unsafe { (self.library.result)(self.recognizer) };
        copy_payload(raw)
    }

    /// Running-hypothesis payload while an utterance is still open.
    pub fn poll_partial(&mut self) -> String {
        // SAFETY: the handle is valid and exclusively borrowed.
        let raw = unsafe { (self.library.partial_result)(self.recognizer) };
        copy_payload(raw)
    }

    /// Final payload covering any buffered audio; used once at shutdown.
    pub fn flush(&mut self) -> String {
        // SAFETY: the handle is valid and exclusively borrowed.
        let raw = unsafe { (self.library.final_result)(self.recognizer) };
        copy_payload(raw)
    }
}

impl Drop for Recognizer {
    fn drop(&mut self) {
        // SAFETY: both handles were created by this library and are dropped
        // exactly once, recognizer before the model it references.
        unsafe {
            (self.library.recognizer_free)(self.recognizer);
            (self.library.model_free)(self.model);
        }
    }
}

/// Copies an engine-owned payload string; the engine keeps ownership of the
/// buffer, which is only valid until the next call on the same handle.
fn copy_payload(raw: *const c_char) -> String {
    if raw.is_null() {
        return String::new();
    }
    // SAFETY: the engine returns a NUL-terminated string.
    unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned()
}
