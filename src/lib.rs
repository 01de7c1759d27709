//! AppLights : per-application keyboard lighting profiles for Logitech per-key RGB keyboards.
//!
//! A background monitor watches which apps have visible windows, picks the single profile that should be 'in use',
//! and renders that profile's colors (plus lock-key state) onto the keyboard.

pub mod keys;
pub mod procs;
pub mod history;
pub mod profiles;
pub mod engine;
pub mod renderer;
pub mod lighting;
pub mod persistence;
pub mod notices;
pub mod key_events;
pub mod monitor;
pub mod config;
pub mod applights;
pub mod services;

# [ cfg (windows) ]
pub mod win_apis;
# [ cfg (windows) ]
pub mod input_proc;
# [ cfg (windows) ]
pub mod logi_sdk;
# [ cfg (windows) ]
pub mod quit_window;
