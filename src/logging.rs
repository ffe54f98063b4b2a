//! Simple file-based logging for the compliance engine.
//!
//! Avoids eprintln so embedding a loader/checker inside another process
//! never interferes with that process's own stdio. Similar to SLF4J: a
//! minimal facade that writes to a log file, used for the definition-error
//! "log a WARNING/INFO and keep loading" policy.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

/// Global log file handle
static LOG_FILE: OnceLock<Mutex<Option<File>>> = OnceLock::new();

/// Initialize logging to a file
pub fn init_file_logging(path: impl Into<PathBuf>) {
    let path = path.into();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .ok();

    let _ = LOG_FILE.set(Mutex::new(file));
}

/// Initialize logging with default path
pub fn init_default_logging() {
    let path = std::env::temp_dir().join("licentia-debug.log");
    init_file_logging(path);
}

/// Log a message to the file. A no-op until logging has been initialized,
/// so loading a knowledge base in a library context never panics on a
/// missing log file.
pub fn log(level: &str, component: &str, message: &str) {
    if let Some(mutex) = LOG_FILE.get() {
        if let Ok(mut guard) = mutex.lock() {
            if let Some(ref mut file) = *guard {
                let timestamp = unix_timestamp();
                let _ = writeln!(file, "[{}] [{}] [{}] {}", timestamp, level, component, message);
                let _ = file.flush();
            }
        }
    }
}

/// Timestamp without a chrono dependency; seconds.millis since the epoch.
fn unix_timestamp() -> String {
    use std::time::SystemTime;
    match SystemTime::now().duration_since(SystemTime::UNIX_EPOCH) {
        Ok(d) => format!("{}.{:03}", d.as_secs(), d.subsec_millis()),
        Err(_) => "0.000".to_string(),
    }
}

/// Log a definition-error warning: used by the knowledge loader when a
/// license/rule/obligation entry is malformed and gets dropped rather than
/// aborting the whole load.
#[macro_export]
macro_rules! definition_warn {
    ($component:expr, $($arg:tt)*) => {
        $crate::logging::log("WARNING", $component, &format!($($arg)*))
    };
}
