//! Hidden top-level window that lets a console-less (gui subsystem) process hear about logoff/shutdown and close requests.
//!
//! Only top-level windows get the WM_QUERYENDSESSION / WM_ENDSESSION broadcasts (message-only windows dont), so this is
//! a regular window that is just never shown. The session-end action runs right inside WM_ENDSESSION, as the process
//! can be torn down any time after that returns.

#![ allow (non_upper_case_globals) ]

use std::ffi::c_void;
use std::sync::Mutex;
use std::sync::atomic::{AtomicIsize, Ordering};

use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW, PostMessageW, PostQuitMessage,
    RegisterClassW, TranslateMessage, HMENU, MSG, WINDOW_EX_STYLE, WINDOW_STYLE, WM_CLOSE, WM_DESTROY, WM_ENDSESSION,
    WM_QUERYENDSESSION, WNDCLASSW,
};



pub type SessionEndAction = Box < dyn FnOnce() + Send + 'static >;

static quit_hwnd : AtomicIsize = AtomicIsize::new (0);

// the window proc gets no user pointer from us, so the action has to be reachable process-wide
static session_end_action : Lazy <Mutex <Option <SessionEndAction>>> = Lazy::new (|| Mutex::new (None));


/// What to run (once) when the session ends .. typically the full app shutdown
pub fn set_session_end_action (action:SessionEndAction) {
    *session_end_action.lock() .unwrap_or_else (|e| e.into_inner()) = Some(action);
}

/// Runs and uses up the session-end action .. false if there was none left
pub fn run_session_end_action () -> bool {
    let action = session_end_action.lock() .unwrap_or_else (|e| e.into_inner()) .take();
    match action {
        Some(f) => { f(); true }
        None => false,
    }
}

/// Asks a running pump to close its window and return .. false if no pump is running
pub fn request_quit () -> bool {
    let h = quit_hwnd.load (Ordering::SeqCst);
    if h == 0 { return false }
    unsafe { PostMessageW ( HWND (h as *mut c_void), WM_CLOSE, WPARAM::default(), LPARAM::default() ) .is_ok() }
}


/// Creates the hidden window and pumps messages until it gets closed.
/// Returns false right away if the window couldnt be created (the caller then needs some other way to wait).
pub fn run_quit_pump () -> bool { unsafe {

    let hinstance = match GetModuleHandleW (PCWSTR::null()) {
        Ok(h) => HINSTANCE (h.0),
        Err(e) => { warn! ("no module handle for the quit window : {:?}", e); return false }
    };
    let class_name = w!("AppLightsQuitWnd");
    let wc = WNDCLASSW {
        lpfnWndProc   : Some (quit_wnd_proc),
        hInstance     : hinstance,
        lpszClassName : class_name,
        ..Default::default()
    };
    // a repeat registration (e.g. a second pump in the same process) fails harmlessly, create below is the real check
    if RegisterClassW (&wc) == 0 { debug! ("quit window class not registered (may already exist)") }

    let hwnd = match CreateWindowExW (
        WINDOW_EX_STYLE::default(), class_name, w!("AppLights"), WINDOW_STYLE::default(),
        0, 0, 0, 0, HWND::default(), HMENU::default(), hinstance, None,
    ) {
        Ok(h) => h,
        Err(e) => { warn! ("could not create the quit window : {:?}", e); return false }
    };
    quit_hwnd.store (hwnd.0 as isize, Ordering::SeqCst);
    info! ("session-end listener window up");

    let mut msg = MSG::default();
    while GetMessageW (&mut msg, HWND::default(), 0, 0) .0 > 0 {
        let _ = TranslateMessage (&msg);
        DispatchMessageW (&msg);
    }
    quit_hwnd.store (0, Ordering::SeqCst);
    debug! ("quit pump exiting");
    true
} }


unsafe extern "system" fn quit_wnd_proc (hwnd:HWND, msg:u32, w_param:WPARAM, l_param:LPARAM) -> LRESULT {
    match msg {
        WM_QUERYENDSESSION => LRESULT (1),
        WM_ENDSESSION => {
            if w_param.0 != 0 {
                info! ("session is ending .. shutting down");
                run_session_end_action();
            }
            LRESULT (0)
        }
        WM_CLOSE   => { let _ = DestroyWindow (hwnd); LRESULT (0) }
        WM_DESTROY => { PostQuitMessage (0); LRESULT (0) }
        _ => DefWindowProcW (hwnd, msg, w_param, l_param),
    }
}
