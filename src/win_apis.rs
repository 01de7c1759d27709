#![ allow (non_upper_case_globals, non_snake_case) ]

use std::ffi::c_void;

use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{BOOL, CloseHandle, HWND, LPARAM};
use windows::Win32::System::Diagnostics::Debug::OutputDebugStringW;
use windows::Win32::System::Threading::{
    GetCurrentThreadId, OpenProcess, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION, QueryFullProcessImageNameW
};
use windows::Win32::UI::Input::KeyboardAndMouse::GetKeyState;
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetAncestor, GetWindowTextLengthW, GetWindowThreadProcessId, IsIconic, IsWindowVisible, GA_ROOTOWNER
};

use crate::keys::{LockKey, LockStates};
use crate::procs::exe_name_from_path;


pub type Hwnd = isize;

fn hwnd (h:Hwnd) -> HWND { HWND (h as *mut c_void) }



pub fn check_window_visible (h:Hwnd) -> bool { unsafe {
    IsWindowVisible (hwnd(h)) .as_bool()
} }

pub fn check_window_minimized (h:Hwnd) -> bool { unsafe {
    IsIconic (hwnd(h)) .as_bool()
} }

pub fn check_window_has_owner (h:Hwnd) -> bool { unsafe {
    GetAncestor (hwnd(h), GA_ROOTOWNER).0 as Hwnd != h
} }

pub fn check_window_has_title (h:Hwnd) -> bool { unsafe {
    GetWindowTextLengthW (hwnd(h)) > 0
} }

/// The windows that count as a 'visible app' : visible, not minimized, top-level w no owner, and w a non-empty title
pub fn check_window_qualifies (h:Hwnd) -> bool {
    check_window_visible (h)  &&  !check_window_minimized (h)  &&  !check_window_has_owner (h)  &&  check_window_has_title (h)
}



pub fn get_hwnd_exe_path (h:Hwnd) -> Option<String> { unsafe {
    let mut pid : u32 = 0;
    let _ = GetWindowThreadProcessId (hwnd(h), Some(&mut pid));
    if pid == 0 { return None }
    get_pid_exe_path (pid)
} }

fn get_pid_exe_path (pid:u32) -> Option<String> { unsafe {
    const MAX_LEN : usize = 1024;
    let handle = OpenProcess (PROCESS_QUERY_LIMITED_INFORMATION, BOOL::from(false), pid) .ok()?;
    let mut buf = [0u16; MAX_LEN];
    let mut len = MAX_LEN as u32;
    let res = QueryFullProcessImageNameW (handle, PROCESS_NAME_WIN32, PWSTR::from_raw(buf.as_mut_ptr()), &mut len);
    let _ = CloseHandle (handle);
    res.ok()?;
    Some ( String::from_utf16_lossy (&buf [.. (len as usize).min(MAX_LEN)]) )
} }



/// Image names (e.g. "notepad.exe") of every process owning at least one qualifying top-level window.
/// Any enumeration failure just yields whatever was collected so far (usually nothing).
pub fn get_visible_app_names () -> Vec<String> { unsafe {
    let mut hwnds : Vec<Hwnd> = Vec::new();
    let _ = EnumWindows ( Some(enum_windows_cb), LPARAM (&mut hwnds as *mut Vec<Hwnd> as isize) );
    hwnds .into_iter()
        .filter (|h| check_window_qualifies(*h))
        .filter_map (get_hwnd_exe_path)
        .filter_map (|p| exe_name_from_path(&p))
        .collect()
} }

unsafe extern "system" fn enum_windows_cb (h:HWND, acc:LPARAM) -> BOOL {
    // the lparam is the accumulator vec handed in by get_visible_app_names, which outlives the (blocking) EnumWindows call
    let hwnds = &mut *(acc.0 as *mut Vec<Hwnd>);
    hwnds.push (h.0 as Hwnd);
    BOOL (true as i32)
}



pub fn get_lock_key_state (lk:LockKey) -> bool { unsafe {
    GetKeyState (lk.vk_code() as i32) & 0x0001 != 0
    // ^^ low bit is the toggle state (the high bit would be the pressed state)
} }

pub fn get_lock_key_states () -> LockStates {
    LockKey::ALL .into_iter() .fold (LockStates::default(), |ls, lk| ls.with (lk, get_lock_key_state(lk)))
}



pub fn get_cur_thread_id () -> u32 { unsafe {
    GetCurrentThreadId()
} }

pub fn write_win_dbg_string (msg:&str) { unsafe {
    let msg_wide : Vec<u16> = msg.encode_utf16().chain(std::iter::once(0)).collect();
    OutputDebugStringW (PCWSTR(msg_wide.as_ptr()));
} }
