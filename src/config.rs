#![ allow (non_snake_case, non_upper_case_globals) ]

use std::{fs, time};
use std::ops::{Deref, Not};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::SystemTime;

use toml_edit::DocumentMut;

use tracing::{debug, warn};
use tracing::metadata::LevelFilter;
use tracing_appender::non_blocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{Layer, Registry, reload};
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::reload::Handle;
use tracing_subscriber::prelude::*;




# [ derive (Debug, Clone) ]
/// Debouncer for config write-backs .. runs the latest queued action once its deadline has passed w/o being pushed out again
pub struct DeferredExecutor {
    deadline : Arc <Mutex <SystemTime>>,
}

/// What a DeferredExecutor runs
pub type Action = Arc < dyn Fn() + Send + Sync + 'static >;




# [ derive (Debug) ]
pub struct _Config {
    pub toml      : RwLock <Option <DocumentMut>>,
    pub default   : DocumentMut,
    pub conf_path : Option <PathBuf>,
    pub loglevel  : RwLock <Option <Handle <LevelFilter, Registry>>>,
    write_back_dfr_ex : DeferredExecutor,
}


/// Settings doc for the app .. explicitly constructed once in main and handed to whoever needs it
# [ derive (Debug, Clone) ]
pub struct Config ( Arc <_Config> );

impl Deref for Config {
    type Target = _Config;
    fn deref (&self) -> &_Config { &self.0 }
}





// location helpers ..
/// Returns the directory of the currently running executable
fn get_app_dir () -> Option<PathBuf> {
    std::env::current_exe().ok() .and_then (|p| p.parent() .map (|p| p.to_path_buf()))
}

/// Checks whether a path is writeable by the current user by attempting to open/create a file in write mode
fn is_writeable (path: &Path) -> bool {
    fs::OpenOptions::new().write(true).create(true).truncate(false).open(path).is_ok()
    // ^^ acts like 'touch' .. a missing file gets created empty
}

/// Config file location : next to the exe if we can write there, else under the user's local data dir
fn locate_config_file () -> Option<PathBuf> {
    let app_dir_loc = get_app_dir() .map (|p| p.join (Config::CONF_FILE_NAME));
    if app_dir_loc.as_ref() .is_some_and (|p| is_writeable(p)) {
        return app_dir_loc
    }
    let data_dir = dirs::data_local_dir() .map (|p| p.join (Config::APP_DATA_DIR_NAME))?;
    if !data_dir.exists() {
        let _ = fs::create_dir_all (&data_dir);
    }
    let data_dir_loc = data_dir.join (Config::CONF_FILE_NAME);
    is_writeable (&data_dir_loc) .then_some (data_dir_loc)
}

fn lock_deadline (m:&Mutex<SystemTime>) -> MutexGuard<'_, SystemTime> {
    m.lock() .unwrap_or_else (|e| e.into_inner())
}




impl Config {

    pub const CONF_FILE_NAME    : &'static str = "applights.conf.toml";
    pub const APP_DATA_DIR_NAME : &'static str = "AppLights";

    pub const APPLIGHTS_VERSION : &'static str = env!("CARGO_PKG_VERSION");

    pub const MIN_POLL_INTERVAL_MS : u32 = 100;

    const DEFAULT_CONF_STR : &'static str = include_str!("../applights.conf.toml");
    // ^^ our applights.conf.toml is at root of project, the include_str macro will load the contents at compile time


    /// Config at the standard location (exe dir or local data dir) .. w no writeable location, runs off the defaults
    pub fn new () -> Config {
        Config::build (locate_config_file())
    }

    /// Config backed by a specific file
    pub fn with_file (conf_path: impl Into<PathBuf>) -> Config {
        Config::build (Some (conf_path.into()))
    }

    fn build (conf_path: Option<PathBuf>) -> Config {
        let conf = Config ( Arc::new ( _Config {
            toml    : RwLock::new (None),
            default : DocumentMut::from_str (Self::DEFAULT_CONF_STR) .unwrap_or_default(),
            conf_path,
            loglevel : RwLock::new (None),
            write_back_dfr_ex : DeferredExecutor::new(),
        } ) );
        conf.load();
        conf
    }


    pub fn get_config_file (&self) -> Option<PathBuf> {
        self.conf_path.clone()
    }
    /// logs and the profiles file live alongside the config file
    pub fn get_config_dir (&self) -> Option<PathBuf> {
        self.conf_path.as_ref() .and_then (|p| p.parent()) .map (|p| p.to_path_buf())
    }
    pub fn get_log_loc (&self) -> Option<PathBuf> {
        self.get_config_dir()
    }
    pub fn get_profiles_file (&self) -> PathBuf {
        let name = self.get_profiles_file_name();
        match self.get_config_dir() {
            Some(dir) => dir.join(name),
            None      => PathBuf::from(name),
        }
    }


    pub fn trigger_config_file_reset (&self) {
        self.toml.write() .unwrap_or_else (|e| e.into_inner()) .replace (self.default.clone());
        self.write_back_toml();
    }

    pub fn load (&self) {
        if let Some(conf_path) = self.conf_path.as_ref() {
            if let Ok(cfg_str) = fs::read_to_string(conf_path) {
                if !cfg_str.trim().is_empty() {
                    if let Ok(toml) = DocumentMut::from_str(&cfg_str) {
                        // successfully read and parsed a non-empty toml, we'll use that
                        self.toml.write() .unwrap_or_else (|e| e.into_inner()) .replace(toml);
                        return
        }   }   }  }
        // there's no writeable location, or the file was empty, or we failed to read or parse it .. load default and write back
        self.trigger_config_file_reset();
    }


    pub fn reload_log_level (&self) {
        // a switch from disabled to enabled needs the subscriber set up now, but main holds the guard from the initial setup
        // so any guard from here is just leaked to keep that appender alive
        if let Some(guard) = self.setup_log_subscriber() { std::mem::forget (guard) }
        let log_level = self.get_log_level();
        warn! ("Setting log-level to {:?}", log_level.into_level());
        if let Some(h) = self.loglevel.read() .unwrap_or_else (|e| e.into_inner()) .as_ref() {
            let _ = h.modify (|f| *f = log_level);
        }
    }

    /// Sets up the global rolling-file log subscriber .. returns the flush guard, which main should hold on to.
    /// None if logging is disabled, already set up, or there's no place to write logs to.
    pub fn setup_log_subscriber (&self) -> Option <WorkerGuard> {

        if self.check_flag__logging_enabled().not() || self.loglevel.read() .unwrap_or_else (|e| e.into_inner()) .is_some() {
            return None
        }
        let log_loc = self.get_log_loc()?;

        let log_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("applights_log")
            .filename_suffix("log")
            .max_log_files(7)
            .build(log_loc)
            .ok()?;

        let (nb_log_appender, guard) = non_blocking (log_appender);

        let (level_filter, filter_handle) = reload::Layer::new(self.get_log_level());

        let timer = LocalTime::new ( ::time::format_description::parse (
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
        ).ok()? );

        let subscriber = tracing_subscriber::fmt::Layer::new()
            .with_writer(nb_log_appender)
            .with_timer(timer)
            .with_ansi(false)
            .with_filter(level_filter);

        tracing_subscriber::registry().with(subscriber).try_init().ok()?;

        *self.loglevel.write() .unwrap_or_else (|e| e.into_inner()) = Some(filter_handle);

        Some(guard)
    }


    fn toml_string (&self) -> String {
        self.toml.read() .unwrap_or_else (|e| e.into_inner()) .as_ref() .map (|d| d.to_string()) .unwrap_or_default()
    }
    fn write_back_toml (&self) {
        let Some(conf_path) = self.conf_path.as_ref() else { return };
        if let Err(e) = fs::write (conf_path, self.toml_string()) {
            warn! ("failed writing config file {:?} : {}", conf_path, e);
        }
    }
    fn write_back_toml_if_changed (&self) {
        let Some(conf_path) = self.conf_path.as_ref() else { return };
        let toml_str = self.toml_string();
        let old_toml_str = fs::read_to_string (conf_path) .unwrap_or_default();
        if toml_str != old_toml_str {
            debug! ("writing back updated config to {:?}", conf_path);
            let _ = fs::write (conf_path, toml_str);
        }
    }
    pub fn deferred_write_back_toml (&self) {
        let conf = self.clone();
        let action = Arc::new (move || conf.write_back_toml_if_changed());
        self.write_back_dfr_ex .setup_deferred_action (action, time::Duration::from_millis(300));
    }



    // lookups fall back to the embedded default doc, and if even that lacks the key, to the given fallback
    fn check_flag (&self, flag_name:&str, fallback:bool) -> bool {
        self.toml.read() .unwrap_or_else (|e| e.into_inner()) .as_ref()
            .and_then (|t| t.get(flag_name))
            .and_then (|t| t.as_bool())
            .or_else  (|| self.default.get(flag_name) .and_then (|t| t.as_bool()))
            .unwrap_or (fallback)
    }
    /// Updates a flag in the live doc, w the file write-back deferred (so a burst of toggles causes one write)
    pub fn set_flag (&self, flag_name:&str, flag_val:bool) {
        if let Some(toml) = self.toml.write() .unwrap_or_else (|e| e.into_inner()) .as_mut() {
            toml [flag_name] = toml_edit::value (flag_val);
        }
        self.deferred_write_back_toml();
    }

    fn get_number (&self, key:&str, fallback:u32) -> u32 {
        let from = |d:&DocumentMut| d.get(key) .and_then (|t| t.as_integer()) .and_then (|n| u32::try_from(n).ok());
        self.toml.read() .unwrap_or_else (|e| e.into_inner()) .as_ref()
            .and_then (from)
            .or_else  (|| from (&self.default))
            .unwrap_or (fallback)
    }

    fn get_string (&self, key:&str, fallback:&str) -> String {
        let from = |d:&DocumentMut| d.get(key) .and_then (|t| t.as_str()) .map (|s| s.to_string());
        self.toml.read() .unwrap_or_else (|e| e.into_inner()) .as_ref()
            .and_then (from)
            .or_else  (|| from (&self.default))
            .unwrap_or_else (|| fallback.to_string())
    }



    // all the config flags we can check
    pub fn check_flag__logging_enabled        (&self) -> bool { self.check_flag ( "logging_enabled",        true ) }
    pub fn check_flag__lock_keys_hook_enabled (&self) -> bool { self.check_flag ( "lock_keys_hook_enabled", true ) }
    pub fn check_flag__lighting_enabled       (&self) -> bool { self.check_flag ( "lighting_enabled",       true ) }

    // and the few that can be flipped from code
    pub fn set_flag__lock_keys_hook_enabled (&self, enabled:bool) { self.set_flag ("lock_keys_hook_enabled", enabled) }
    pub fn set_flag__lighting_enabled       (&self, enabled:bool) { self.set_flag ("lighting_enabled",       enabled) }


    pub fn get_log_level (&self) -> LevelFilter {
        if !self.check_flag__logging_enabled() {
            return LevelFilter::OFF;
        }
        match self.get_string ("logging_level", "INFO") .trim() .to_uppercase() .as_str() {
            "TRACE" => LevelFilter::TRACE,
            "DEBUG" => LevelFilter::DEBUG,
            "WARN"  => LevelFilter::WARN,
            "ERROR" => LevelFilter::ERROR,
            "OFF"   => LevelFilter::OFF,
            _       => LevelFilter::INFO,
        }
    }

    pub fn get_poll_interval (&self) -> time::Duration {
        let ms = self.get_number ("poll_interval_ms", 1000);
        time::Duration::from_millis ( ms.max (Self::MIN_POLL_INTERVAL_MS) as u64 )
        // ^^ anything tighter just burns cpu on window enumeration
    }

    pub fn get_shutdown_timeout (&self) -> time::Duration {
        time::Duration::from_millis ( self.get_number ("shutdown_timeout_ms", 2000) as u64 )
    }

    pub fn get_profiles_file_name (&self) -> String {
        let name = self.get_string ("profiles_file_name", "applights.profiles.toml");
        if name.trim().is_empty() { "applights.profiles.toml".to_string() } else { name.trim().to_string() }
    }

}




impl Default for DeferredExecutor {
    fn default () -> Self { Self::new() }
}
impl DeferredExecutor {

    pub fn new () -> Self {
        Self { deadline: Arc::new (Mutex::new (SystemTime::UNIX_EPOCH)) }
    }
    pub fn reset (&self) -> Self {
        *lock_deadline (&self.deadline) = SystemTime::UNIX_EPOCH;
        self.clone()
    }
    pub fn set_deferral_dur (&self, dur:time::Duration) -> Self {
        if let Some(t) = SystemTime::now().checked_add(dur) {
            *lock_deadline (&self.deadline) = t
        }
        self.clone()
    }
    pub fn is_reset (&self) -> bool {
        *lock_deadline (&self.deadline) == SystemTime::UNIX_EPOCH
    }
    pub fn is_due (&self) -> bool {
        !self.is_reset() && *lock_deadline (&self.deadline) < SystemTime::now()
    }

    fn check_defered_action (&self, action:Action) {
        // not due means a later setup pushed the deadline out (and owns the run), or someone already ran and reset it
        if self.is_due() {
            let mut deadline = lock_deadline (&self.deadline);
            action();
            *deadline = SystemTime::UNIX_EPOCH;
        }
    }

    /// Queues `action` to run after `delay`. Another setup before then pushes the deadline out and replaces the action,
    /// and a reset in between cancels it
    pub fn setup_deferred_action (&self, action:Action, delay:time::Duration) {
        let dfr_ex = self.clone();
        dfr_ex.set_deferral_dur(delay);
        std::thread::spawn ( move || {
            std::thread::sleep (delay);
            dfr_ex.check_defered_action(action);
        } );
    }

}
