#![ allow (non_camel_case_types) ]

use std::collections::HashMap;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, EnumIter, EnumString, IntoStaticStr};



/// Physical keys addressable via the Logitech LED SDK.
/// The discriminant of each variant is the SDK's KeyName value (scan-code based), which is what gets sent to the device,
/// while the variant name doubles as the symbolic name used in persisted profiles
# [ derive (Debug, Eq, PartialEq, Hash, Copy, Clone, IntoStaticStr, EnumString, EnumIter, Serialize, Deserialize) ]
# [ strum (ascii_case_insensitive) ]
# [ repr (u32) ]
pub enum LogiKey {
    ESC              = 0x01,
    F1               = 0x3b,
    F2               = 0x3c,
    F3               = 0x3d,
    F4               = 0x3e,
    F5               = 0x3f,
    F6               = 0x40,
    F7               = 0x41,
    F8               = 0x42,
    F9               = 0x43,
    F10              = 0x44,
    F11              = 0x57,
    F12              = 0x58,
    PRINT_SCREEN     = 0x137,
    SCROLL_LOCK      = 0x46,
    PAUSE_BREAK      = 0x145,

    TILDE            = 0x29,
    ONE              = 0x02,
    TWO              = 0x03,
    THREE            = 0x04,
    FOUR             = 0x05,
    FIVE             = 0x06,
    SIX              = 0x07,
    SEVEN            = 0x08,
    EIGHT            = 0x09,
    NINE             = 0x0a,
    ZERO             = 0x0b,
    MINUS            = 0x0c,
    EQUALS           = 0x0d,
    BACKSPACE        = 0x0e,
    INSERT           = 0x152,
    HOME             = 0x147,
    PAGE_UP          = 0x149,
    NUM_LOCK         = 0x45,
    NUM_SLASH        = 0x135,
    NUM_ASTERISK     = 0x37,
    NUM_MINUS        = 0x4a,

    TAB              = 0x0f,
    Q                = 0x10,
    W                = 0x11,
    E                = 0x12,
    R                = 0x13,
    T                = 0x14,
    Y                = 0x15,
    U                = 0x16,
    I                = 0x17,
    O                = 0x18,
    P                = 0x19,
    OPEN_BRACKET     = 0x1a,
    CLOSE_BRACKET    = 0x1b,
    BACKSLASH        = 0x2b,
    KEYBOARD_DELETE  = 0x153,
    END              = 0x14f,
    PAGE_DOWN        = 0x151,
    NUM_SEVEN        = 0x47,
    NUM_EIGHT        = 0x48,
    NUM_NINE         = 0x49,
    NUM_PLUS         = 0x4e,

    CAPS_LOCK        = 0x3a,
    A                = 0x1e,
    S                = 0x1f,
    D                = 0x20,
    F                = 0x21,
    G                = 0x22,
    H                = 0x23,
    J                = 0x24,
    K                = 0x25,
    L                = 0x26,
    SEMICOLON        = 0x27,
    APOSTROPHE       = 0x28,
    ENTER            = 0x1c,
    NUM_FOUR         = 0x4b,
    NUM_FIVE         = 0x4c,
    NUM_SIX          = 0x4d,

    LEFT_SHIFT       = 0x2a,
    Z                = 0x2c,
    X                = 0x2d,
    C                = 0x2e,
    V                = 0x2f,
    B                = 0x30,
    N                = 0x31,
    M                = 0x32,
    COMMA            = 0x33,
    PERIOD           = 0x34,
    FORWARD_SLASH    = 0x35,
    RIGHT_SHIFT      = 0x36,
    ARROW_UP         = 0x148,
    NUM_ONE          = 0x4f,
    NUM_TWO          = 0x50,
    NUM_THREE        = 0x51,
    NUM_ENTER        = 0x11c,

    LEFT_CONTROL     = 0x1d,
    LEFT_WINDOWS     = 0x15b,
    LEFT_ALT         = 0x38,
    SPACE            = 0x39,
    RIGHT_ALT        = 0x138,
    RIGHT_WINDOWS    = 0x15c,
    APPLICATION_SELECT = 0x15d,
    RIGHT_CONTROL    = 0x11d,
    ARROW_LEFT       = 0x14b,
    ARROW_DOWN       = 0x150,
    ARROW_RIGHT      = 0x14d,
    NUM_ZERO         = 0x52,
    NUM_PERIOD       = 0x53,
}


static KEYS_BY_ID : Lazy <HashMap <u32, LogiKey>> = Lazy::new ( || {
    LogiKey::iter() .map (|k| (k.id(), k)) .collect()
} );


impl LogiKey {

    /// the vendor key id (SDK KeyName value)
    pub fn id (&self) -> u32 { *self as u32 }

    pub fn from_id (id:u32) -> Option<LogiKey> {
        KEYS_BY_ID.get(&id).copied()
    }

    /// symbolic name, as stored in profiles (e.g. "NUM_LOCK")
    pub fn name (&self) -> &'static str { (*self).into() }

    pub fn from_name (name:&str) -> Option<LogiKey> {
        LogiKey::from_str (name.trim()) .ok()
    }

    /// all keys, in the keyboard row order used for UI listing
    pub fn all () -> Vec<LogiKey> {
        LogiKey::iter().collect()
    }

    /// human readable label for UI display (e.g. "Num Lock")
    pub fn display_name (&self) -> String {
        match self {
            LogiKey::ESC                => "Esc".to_string(),
            LogiKey::TILDE              => "~".to_string(),
            LogiKey::KEYBOARD_DELETE    => "Delete".to_string(),
            LogiKey::APPLICATION_SELECT => "Menu".to_string(),
            k if k.name().len() == 1    => k.name().to_string(),
            k => k.name() .split('_') .map (|w| {
                let mut cs = w.chars();
                cs.next() .map (|c| c.to_string() + &cs.as_str().to_lowercase()) .unwrap_or_default()
            } ) .collect::<Vec<_>>() .join(" "),
        }
    }

    pub fn lock_key (&self) -> Option<LockKey> {
        LockKey::ALL .into_iter() .find (|lk| lk.key() == *self)
    }
}



/// The three keys w an OS maintained toggle state
# [ derive (Debug, Eq, PartialEq, Hash, Copy, Clone, AsRefStr, Serialize, Deserialize) ]
pub enum LockKey { Num, Caps, Scroll }

impl LockKey {

    pub const ALL : [LockKey; 3] = [LockKey::Num, LockKey::Caps, LockKey::Scroll];

    pub fn key (&self) -> LogiKey {
        match self {
            LockKey::Num    => LogiKey::NUM_LOCK,
            LockKey::Caps   => LogiKey::CAPS_LOCK,
            LockKey::Scroll => LogiKey::SCROLL_LOCK,
        }
    }

    /// win32 virtual-key code (VK_NUMLOCK, VK_CAPITAL, VK_SCROLL)
    pub fn vk_code (&self) -> u32 {
        match self {
            LockKey::Num    => 0x90,
            LockKey::Caps   => 0x14,
            LockKey::Scroll => 0x91,
        }
    }

    pub fn from_vk_code (vk:u32) -> Option<LockKey> {
        Self::ALL .into_iter() .find (|lk| lk.vk_code() == vk)
    }
}



/// OS toggle states of the lock keys at some instant
# [ derive (Debug, Default, Eq, PartialEq, Hash, Copy, Clone, Serialize, Deserialize) ]
pub struct LockStates {
    pub num    : bool,
    pub caps   : bool,
    pub scroll : bool,
}

impl LockStates {
    pub fn is_on (&self, lk:LockKey) -> bool {
        match lk {
            LockKey::Num    => self.num,
            LockKey::Caps   => self.caps,
            LockKey::Scroll => self.scroll,
        }
    }
    pub fn with (mut self, lk:LockKey, on:bool) -> Self {
        match lk {
            LockKey::Num    => self.num    = on,
            LockKey::Caps   => self.caps   = on,
            LockKey::Scroll => self.scroll = on,
        }
        self
    }
}




#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_and_names_map_both_ways () {
        for k in LogiKey::all() {
            assert_eq! (LogiKey::from_id (k.id()), Some(k));
            assert_eq! (LogiKey::from_name (k.name()), Some(k));
        }
        let ids = LogiKey::all() .iter() .map (|k| k.id()) .collect::<HashSet<_>>();
        assert_eq! (ids.len(), LogiKey::all().len());
    }

    #[test]
    fn name_lookup_ignores_case_and_whitespace () {
        assert_eq! (LogiKey::from_name ("num_lock"), Some(LogiKey::NUM_LOCK));
        assert_eq! (LogiKey::from_name (" Caps_Lock "), Some(LogiKey::CAPS_LOCK));
        assert_eq! (LogiKey::from_name ("NOT_A_KEY"), None);
        assert_eq! (LogiKey::from_id (0xFFFF), None);
    }

    #[test]
    fn display_names () {
        assert_eq! (LogiKey::NUM_LOCK.display_name(), "Num Lock");
        assert_eq! (LogiKey::Q.display_name(), "Q");
        assert_eq! (LogiKey::F11.display_name(), "F11");
        assert_eq! (LogiKey::ESC.display_name(), "Esc");
    }

    #[test]
    fn lock_keys_round_trip_vk_codes () {
        for lk in LockKey::ALL {
            assert_eq! (LockKey::from_vk_code (lk.vk_code()), Some(lk));
            assert_eq! (lk.key().lock_key(), Some(lk));
        }
        assert_eq! (LogiKey::A.lock_key(), None);
        assert_eq! (LockKey::from_vk_code (0x41), None);
    }

    #[test]
    fn lock_states_lookup () {
        let ls = LockStates::default() .with (LockKey::Caps, true);
        assert! (ls.is_on (LockKey::Caps));
        assert! (!ls.is_on (LockKey::Num));
        assert! (!ls.is_on (LockKey::Scroll));
    }
}
