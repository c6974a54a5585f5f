//! System-wide key-down source feeding the sequence detector.
//!
//! On macOS this is a CGEventTap on a dedicated thread with its own
//! CFRunLoop. The tap callback must stay fast: it runs the pure
//! detector and hands activations to the service over a channel,
//! nothing else. OS auto-repeat events are filtered here so the
//! detector only ever sees genuine key-down transitions.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::{Activation, SequenceDetector};

pub struct HotkeyListener {
    detector: Arc<Mutex<SequenceDetector>>,
    activation_tx: mpsc::Sender<Activation>,
    #[cfg(target_os = "macos")]
    thread_handle: Mutex<Option<macos::TapThreadHandle>>,
}

impl HotkeyListener {
    pub fn new(
        detector: Arc<Mutex<SequenceDetector>>,
        activation_tx: mpsc::Sender<Activation>,
    ) -> Self {
        Self {
            detector,
            activation_tx,
            #[cfg(target_os = "macos")]
            thread_handle: Mutex::new(None),
        }
    }

    #[cfg(target_os = "macos")]
    pub fn start(&self) -> Result<(), String> {
        macos::start(
            Arc::clone(&self.detector),
            self.activation_tx.clone(),
            &self.thread_handle,
        )
    }

    #[cfg(target_os = "macos")]
    pub fn stop(&self) {
        macos::stop(&self.thread_handle);
    }

    #[cfg(not(target_os = "macos"))]
    pub fn start(&self) -> Result<(), String> {
        let _ = (&self.detector, &self.activation_tx);
        Err("Global key capture requires macOS (CGEventTap)".to_string())
    }

    #[cfg(not(target_os = "macos"))]
    pub fn stop(&self) {}

    /// Whether the process holds the Accessibility permission the event
    /// tap needs. Always false off macOS.
    pub fn has_accessibility_permission() -> bool {
        #[cfg(target_os = "macos")]
        {
            macos::has_accessibility_permission()
        }
        #[cfg(not(target_os = "macos"))]
        {
            false
        }
    }
}

#[cfg(target_os = "macos")]
mod macos {
    use std::sync::{mpsc as std_mpsc, Arc, Mutex};
    use std::thread::{self, JoinHandle};
    use std::time::Instant;

    use core_foundation::base::Boolean;
    use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop};
    use core_graphics::event::{
        CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType,
        EventField,
    };
    use tokio::sync::mpsc;
    use tracing::{debug, warn};

    use crate::hotkey::{Activation, SequenceDetector};

    #[link(name = "ApplicationServices", kind = "framework")]
    unsafe extern "C" {
        fn AXIsProcessTrusted() -> Boolean;
    }

    pub(super) struct TapThreadHandle {
        run_loop: CFRunLoop,
        join_handle: JoinHandle<()>,
    }

    pub(super) fn has_accessibility_permission() -> bool {
        // SAFETY: AXIsProcessTrusted takes no parameters and returns the
        // process trust status.
        unsafe { AXIsProcessTrusted() != 0 }
    }

    pub(super) fn start(
        detector: Arc<Mutex<SequenceDetector>>,
        activation_tx: mpsc::Sender<Activation>,
        thread_handle: &Mutex<Option<TapThreadHandle>>,
    ) -> Result<(), String> {
        if !has_accessibility_permission() {
            return Err(
                "Accessibility permission is required to monitor the hotkey sequence".to_string(),
            );
        }

        {
            let handle = thread_handle.lock().map_err(|_| lock_error())?;
            if handle.is_some() {
                return Ok(());
            }
        }

        let (startup_tx, startup_rx) = std_mpsc::channel::<Result<CFRunLoop, String>>();
        let join_handle = thread::Builder::new()
            .name("rephraser-event-tap".to_string())
            .spawn(move || run_event_tap_thread(detector, activation_tx, startup_tx))
            .map_err(|error| format!("Failed to spawn event tap thread: {error}"))?;

        match startup_rx.recv() {
            Ok(Ok(run_loop)) => {
                let mut handle = thread_handle.lock().map_err(|_| lock_error())?;
                *handle = Some(TapThreadHandle {
                    run_loop,
                    join_handle,
                });
                debug!("hotkey event tap started");
                Ok(())
            }
            Ok(Err(error)) => {
                let _ = join_handle.join();
                Err(error)
            }
            Err(error) => {
                let _ = join_handle.join();
                Err(format!(
                    "Event tap startup channel closed unexpectedly: {error}"
                ))
            }
        }
    }

    pub(super) fn stop(thread_handle: &Mutex<Option<TapThreadHandle>>) {
        let handle = match thread_handle.lock() {
            Ok(mut handle) => handle.take(),
            Err(_) => None,
        };

        if let Some(TapThreadHandle {
            run_loop,
            join_handle,
        }) = handle
        {
            run_loop.stop();
            let _ = join_handle.join();
            debug!("hotkey event tap stopped");
        }
    }

    fn run_event_tap_thread(
        detector: Arc<Mutex<SequenceDetector>>,
        activation_tx: mpsc::Sender<Activation>,
        startup_tx: std_mpsc::Sender<Result<CFRunLoop, String>>,
    ) {
        let run_loop = CFRunLoop::get_current();

        let tap = match CGEventTap::new(
            CGEventTapLocation::Session,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::ListenOnly,
            vec![CGEventType::KeyDown],
            move |_proxy, event_type, event| {
                match event_type {
                    CGEventType::KeyDown => {
                        let autorepeat = event
                            .get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT)
                            != 0;
                        if autorepeat {
                            return None;
                        }

                        let Ok(key_code) = u16::try_from(
                            event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE),
                        ) else {
                            return None;
                        };
                        let flags = event.get_flags().bits();

                        let activated = detector
                            .lock()
                            .map(|mut detector| {
                                detector.on_key_down(key_code, flags, Instant::now())
                            })
                            .unwrap_or(None);

                        if activated.is_some() {
                            // try_send keeps the tap callback non-blocking;
                            // a full channel means a run is already queued.
                            if activation_tx.try_send(Activation).is_err() {
                                debug!("activation channel full, trigger dropped");
                            }
                        }
                    }
                    CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                        warn!(
                            ?event_type,
                            "event tap was disabled by the system; the hotkey may stop firing"
                        );
                    }
                    _ => {}
                }
                None
            },
        ) {
            Ok(tap) => tap,
            Err(_) => {
                let _ = startup_tx.send(Err(
                    "Failed to create CGEventTap - check Accessibility permissions".to_string(),
                ));
                return;
            }
        };

        let source = match tap.mach_port.create_runloop_source(0) {
            Ok(source) => source,
            Err(_) => {
                let _ = startup_tx.send(Err(
                    "Failed to create event tap runloop source".to_string()
                ));
                return;
            }
        };

        // SAFETY: `kCFRunLoopCommonModes` is a valid CoreFoundation runloop mode.
        unsafe {
            run_loop.add_source(&source, kCFRunLoopCommonModes);
        }
        tap.enable();

        if startup_tx.send(Ok(run_loop.clone())).is_err() {
            return;
        }

        CFRunLoop::run_current();

        // SAFETY: same mode as add_source above.
        unsafe {
            run_loop.remove_source(&source, kCFRunLoopCommonModes);
        }
    }

    fn lock_error() -> String {
        "Hotkey listener state lock was poisoned".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::HotkeyConfig;

    #[test]
    fn listener_construction_does_not_start_a_tap() {
        let detector = Arc::new(Mutex::new(SequenceDetector::new(HotkeyConfig::default())));
        let (tx, _rx) = mpsc::channel(4);
        let listener = HotkeyListener::new(detector, tx);
        listener.stop();
    }
}
