//! `RemoteModuleBaz` remote: exposes `./action` through the fedrun wasm container ABI.

use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

static INITIALIZED: AtomicBool = AtomicBool::new(false);
static SCRATCH: Mutex<Vec<u8>> = Mutex::new(Vec::new());

const EXPOSES: &[&str] = &["./action"];

fn do_remote_baz_action() -> &'static str {
    "Remote baz says hello"
}

fn pack(s: &'static str) -> i64 {
    ((s.as_ptr() as i64) << 32) | s.len() as i64
}

#[export_name = "RemoteModuleBaz.alloc"]
pub extern "C" fn alloc(len: i32) -> i32 {
    // One request buffer, reused across `get` calls.
    let mut scratch = SCRATCH.lock().unwrap_or_else(|e| e.into_inner());
    scratch.resize(len.max(0) as usize, 0);
    scratch.as_mut_ptr() as i32
}

#[export_name = "RemoteModuleBaz.init"]
pub extern "C" fn init() -> i32 {
    if INITIALIZED.swap(true, Ordering::SeqCst) { 1 } else { 0 }
}

#[export_name = "RemoteModuleBaz.get"]
pub extern "C" fn get(ptr: i32, len: i32) -> i32 {
    let request = unsafe { std::slice::from_raw_parts(ptr as *const u8, len as usize) };
    EXPOSES
        .iter()
        .position(|path| path.as_bytes() == request)
        .map(|i| i as i32)
        .unwrap_or(-1)
}

#[export_name = "RemoteModuleBaz.call"]
pub extern "C" fn call(handle: i32) -> i64 {
    match handle {
        0 => pack(do_remote_baz_action()),
        _ => -1,
    }
}
