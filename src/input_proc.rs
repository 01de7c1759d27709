//! Low-level keyboard hook that watches for lock-key toggles.
//!
//! The hook callback has a tight OS time budget, so it does nothing but post a [`KeyEvent`] into the key-events queue.
//! Reading lock states and re-rendering happens on the queue's consumer thread.

#![ allow (non_upper_case_globals) ]

use std::ffi::c_void;
use std::ops::Deref;
use std::os::raw::c_int;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicIsize, AtomicU32, Ordering};
use std::sync::mpsc::Sender;
use std::thread::spawn;

use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use windows::Win32::Foundation::{GetLastError, HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, GetMessageW, HHOOK, KBDLLHOOKSTRUCT, MSG, PostThreadMessageW, SetWindowsHookExW, UnhookWindowsHookEx,
    WH_KEYBOARD_LL, WM_KEYUP, WM_SYSKEYUP, WM_USER
};

use crate::key_events::KeyEvent;
use crate::keys::LockKey;
use crate::win_apis;



const KILL_MSG : u32 = WM_USER + 1;

// the hook callback gets no user pointer, so the queue sender it posts into has to be reachable process-wide
static hook_events_tx : Lazy <Mutex <Option <Sender <KeyEvent>>>> = Lazy::new (|| Mutex::new (None));



# [ derive (Debug, Default) ]
pub struct _InputProcessor {
    kbd_hook     : AtomicIsize,
    iproc_thread : AtomicU32,
}

# [ derive (Debug, Clone, Default) ]
pub struct InputProcessor ( Arc <_InputProcessor> );

impl Deref for InputProcessor {
    type Target = _InputProcessor;
    fn deref (&self) -> &_InputProcessor { &self.0 }
}

impl InputProcessor {

    pub fn new () -> InputProcessor { InputProcessor::default() }

    fn store_iproc_thread (&self) {
        self.iproc_thread.store (win_apis::get_cur_thread_id(), Ordering::SeqCst);
    }
    fn kill_iproc_thread (&self) {
        let thread_id = self.iproc_thread.swap (0, Ordering::SeqCst);
        if thread_id != 0 { unsafe {
            let _ = PostThreadMessageW ( thread_id, KILL_MSG, WPARAM::default(), LPARAM::default() );
        } }
    }

    fn set_kbd_hook (&self) -> bool { unsafe {
        match SetWindowsHookExW (WH_KEYBOARD_LL, Some(kbd_hook_cb), HINSTANCE::default(), 0) {
            Ok(hh) => { self.kbd_hook.store (hh.0 as isize, Ordering::SeqCst); true }
            Err(e) => { warn! ("failed to set keyboard hook : {:?}", e); false }
        }
    } }

    pub fn unset_kbd_hook (&self) -> bool {
        let hh = self.kbd_hook.swap (0, Ordering::SeqCst);
        if hh == 0 {
            debug! ("unhooking attempt .. no prior hook found");
            return false
        }
        if unsafe { UnhookWindowsHookEx ( HHOOK (hh as *mut c_void) ) .is_ok() } {
            debug! ("unhooking attempt .. succeeded");
            return true
        }
        // we'll log the error, and also write to windows debug-out (which can be checked via dbgview at runtime)
        let err = format! ("APPLIGHTS : unhooking attempt failed .. error code : {:?} !!", unsafe { GetLastError().0 } );
        warn! ("{}", &err);
        win_apis::write_win_dbg_string (&err);
        false
    }


    /// Installs the hook on its own thread (w a message pump, as LL hooks need one) posting lock-key events into `tx`
    pub fn begin_input_processing (&self, tx:Sender<KeyEvent>) {

        *hook_events_tx.lock() .unwrap_or_else (|e| e.into_inner()) = Some(tx);

        let iproc = self.clone();
        spawn ( move || unsafe {

            if !iproc.set_kbd_hook() { return }

            // we'll store this thread's id so stop can post it the kill msg
            iproc.store_iproc_thread();
            info! ("lock-keys hook installed");

            // win32 sends hook events to a thread with a 'message loop', but we dont create any windows,
            //  so we wont get any actual messages, so we can just leave a forever waiting GetMessage instead of setting up a msg-loop
            let mut msg: MSG = MSG::default();
            while GetMessageW (&mut msg, HWND::default(), 0, 0) .as_bool() {
                if msg.message == KILL_MSG {
                    debug! ("received kill-msg in input-processing thread .. terminating thread ..");
                    break
                }
            }
            iproc.unset_kbd_hook();
        } );
    }

    /// Tears down the hook thread and stops posting events
    pub fn end_input_processing (&self) {
        self.kill_iproc_thread();
        *hook_events_tx.lock() .unwrap_or_else (|e| e.into_inner()) = None;
    }
}




/// Keyboard lower-level-hook processor
pub unsafe extern "system" fn kbd_hook_cb (code:c_int, w_param:WPARAM, l_param:LPARAM) -> LRESULT {

    let return_call = || CallNextHookEx (HHOOK::default(), code, w_param, l_param);

    if code < 0 { return return_call() }

    let kbs = *(l_param.0 as *const KBDLLHOOKSTRUCT);
    let wm = w_param.0 as u32;

    // the OS toggle has flipped by key-up, so thats when a re-read is meaningful
    if wm == WM_KEYUP || wm == WM_SYSKEYUP {
        if let Some(lk) = LockKey::from_vk_code (kbs.vkCode) {
            if let Ok(tx) = hook_events_tx.try_lock() {
                tx.iter() .for_each (|tx| { let _ = tx.send (KeyEvent::LockKeyToggled(lk)); });
            }
        }
    }
    // we never block anything, just observe
    return_call()
}
