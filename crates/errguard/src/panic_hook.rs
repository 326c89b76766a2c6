//! Process panic hook
//!
//! Records the location and backtrace of each panic in a thread-local slot
//! so the boundary that catches it can attach them to the fault. The hook
//! chains with the previously installed one, so default stderr output is
//! preserved.

use std::any::Any;
use std::cell::RefCell;
use std::sync::Once;

/// Details captured by the hook for the most recent panic on this thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicDetails {
    pub message: String,
    pub location: Option<String>,
    pub backtrace: String,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicDetails>> = const { RefCell::new(None) };
}

static INSTALL: Once = Once::new();

/// Installs the hook once per process; later calls do nothing
pub fn install_panic_hook() {
    INSTALL.call_once(|| {
        let previous_hook = std::panic::take_hook();

        std::panic::set_hook(Box::new(move |panic_info| {
            let location = panic_info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
            let details = PanicDetails {
                message: panic_message(panic_info.payload()),
                location,
                backtrace: std::backtrace::Backtrace::force_capture().to_string(),
            };

            tracing::error!(
                location = details.location.as_deref().unwrap_or("unknown"),
                "Panic: {}",
                details.message
            );
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(details));

            previous_hook(panic_info);
        }));
    });
}

/// Takes the details of the last panic on the current thread
pub fn take_last_panic() -> Option<PanicDetails> {
    LAST_PANIC.with(|slot| slot.borrow_mut().take())
}

/// Extracts the message of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_message() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u32);
        assert_eq!(panic_message(payload.as_ref()), "Unknown panic");
    }

    #[test]
    fn test_hook_records_panic_on_this_thread() {
        install_panic_hook();
        install_panic_hook();

        let result = std::panic::catch_unwind(|| panic!("hook test {}", 42));
        assert!(result.is_err());

        let details = take_last_panic().unwrap();
        assert_eq!(details.message, "hook test 42");
        assert!(details.location.unwrap().contains("panic_hook.rs"));
        assert!(take_last_panic().is_none());
    }
}
