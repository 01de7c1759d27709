use std::sync::{Mutex, RwLock};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::applights::AppLightsState;
use crate::keys::{LockKey, LockStates};



/// What the keyboard hook (or anything else) can post to the key-events consumer
# [ derive (Debug, Eq, PartialEq, Copy, Clone) ]
pub enum KeyEvent {
    LockKeyToggled (LockKey),
    Quit,
}



/// Reads the current OS lock-key toggle states
pub trait LockKeySource : Send + Sync {
    fn lock_states (&self) -> LockStates;
}

/// Lock states set from outside .. for headless runs and tests
# [ derive (Debug, Default) ]
pub struct ManualLockKeys {
    states : RwLock <LockStates>,
}

impl ManualLockKeys {
    pub fn new () -> ManualLockKeys { ManualLockKeys::default() }

    pub fn set (&self, lk:LockKey, on:bool) {
        let mut s = self.states.write() .unwrap_or_else (|e| e.into_inner());
        *s = s.with (lk, on);
    }
    pub fn toggle (&self, lk:LockKey) -> bool {
        let mut s = self.states.write() .unwrap_or_else (|e| e.into_inner());
        let on = !s.is_on(lk);
        *s = s.with (lk, on);
        on
    }
}

impl LockKeySource for ManualLockKeys {
    fn lock_states (&self) -> LockStates {
        *self.states.read() .unwrap_or_else (|e| e.into_inner())
    }
}

/// The real OS toggle states, via GetKeyState
# [ cfg (windows) ]
# [ derive (Debug, Default) ]
pub struct OsLockKeys;

# [ cfg (windows) ]
impl LockKeySource for OsLockKeys {
    fn lock_states (&self) -> LockStates { crate::win_apis::get_lock_key_states() }
}




# [ derive (Debug) ]
struct Running {
    tx     : Sender <KeyEvent>,
    handle : JoinHandle <()>,
}

/// Single consumer of the key-events queue .. each lock-key event gets a fresh lock-state read and a re-render
# [ derive (Debug, Default) ]
pub struct KeyEventsProcessor {
    running : Mutex <Option <Running>>,
}

impl KeyEventsProcessor {

    pub fn new () -> KeyEventsProcessor { KeyEventsProcessor::default() }

    /// Spawns the consumer thread and returns the sender producers should post into.
    /// If already started, just hands out another sender to the running queue.
    pub fn start (&self, app:&AppLightsState) -> Sender<KeyEvent> {
        let mut running = self.running.lock() .unwrap_or_else (|e| e.into_inner());
        if let Some(r) = running.as_ref() {
            return r.tx.clone()
        }
        let (tx, rx) = mpsc::channel::<KeyEvent>();
        let app = app.clone();
        let handle = thread::spawn (move || Self::consume (app, rx));
        *running = Some ( Running { tx: tx.clone(), handle } );
        info! ("key-events processor started");
        tx
    }

    fn consume (app:AppLightsState, rx:Receiver<KeyEvent>) {
        // ends on Quit, or once every sender is gone
        for ev in rx {
            match ev {
                KeyEvent::LockKeyToggled (lk) => {
                    debug! ("lock-key event: {:?}", lk);
                    app.handle_lock_key_event (lk);
                }
                KeyEvent::Quit => break,
            }
        }
        debug! ("key-events consumer exiting");
    }

    pub fn is_running (&self) -> bool {
        self.running.lock() .unwrap_or_else (|e| e.into_inner()) .is_some()
    }

    /// Posts an event to the running consumer .. false if not running
    pub fn post (&self, ev:KeyEvent) -> bool {
        self.running.lock() .unwrap_or_else (|e| e.into_inner()) .as_ref()
            .is_some_and (|r| r.tx.send(ev).is_ok())
    }

    /// Posts Quit and joins the consumer .. false if it wasnt running
    pub fn stop (&self) -> bool {
        let Some(r) = self.running.lock() .unwrap_or_else (|e| e.into_inner()) .take() else { return false };
        let _ = r.tx.send (KeyEvent::Quit);
        if r.handle.join().is_err() {
            warn! ("key-events consumer thread panicked");
        }
        info! ("key-events processor stopped");
        true
    }
}
