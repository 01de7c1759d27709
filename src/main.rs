// Prevents additional console window on Windows in release, DO NOT REMOVE!!
#![cfg_attr (
    all ( not(debug_assertions), target_os = "windows" ),
    windows_subsystem = "windows"
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::info;

use applights::applights::AppLightsState;
use applights::config::Config;
use applights::notices::Notifier;
use applights::persistence::TomlProfilesFile;
use applights::services::Services;



# [ cfg (windows) ]
fn build_app (conf:&Config) -> AppLightsState {
    use applights::key_events::OsLockKeys;
    use applights::logi_sdk::LogiLedDevice;
    use applights::procs::OsProcessSource;
    AppLightsState::new (
        Arc::new (TomlProfilesFile::new (conf.get_profiles_file())),
        Arc::new (OsProcessSource),
        Arc::new (OsLockKeys),
        Arc::new (LogiLedDevice::new()),
        Notifier::new(),
    )
}

# [ cfg (not (windows)) ]
fn build_app (conf:&Config) -> AppLightsState {
    // no vendor sdk or window enumeration off windows .. runs the engine against inert sources
    use applights::key_events::ManualLockKeys;
    use applights::lighting::HeadlessDevice;
    use applights::procs::ManualProcessSource;
    AppLightsState::new (
        Arc::new (TomlProfilesFile::new (conf.get_profiles_file())),
        Arc::new (ManualProcessSource::new()),
        Arc::new (ManualLockKeys::new()),
        Arc::new (HeadlessDevice::new()),
        Notifier::new(),
    )
}


# [ cfg (windows) ]
static QUIT_REQUESTED : AtomicBool = AtomicBool::new (false);

/// Blocks until logoff/shutdown, a console ctrl event, or a close request. In the first two cases the full shutdown
/// has already run by the time this returns, since the os may end the process as soon as the handler is done.
# [ cfg (windows) ]
fn wait_for_quit (svc:&Arc<Services>) {
    use applights::quit_window;
    use windows::Win32::Foundation::BOOL;
    use windows::Win32::System::Console::SetConsoleCtrlHandler;

    let s = svc.clone();
    quit_window::set_session_end_action (Box::new (move || { s.shutdown(); }));

    unsafe extern "system" fn ctrl_handler (_ctrl_type:u32) -> BOOL {
        QUIT_REQUESTED.store (true, Ordering::SeqCst);
        quit_window::run_session_end_action();
        quit_window::request_quit();
        BOOL::from (true)
    }
    // only console (debug) builds get ctrl events .. release builds hear about session end via the quit window
    if let Err(e) = unsafe { SetConsoleCtrlHandler (Some(ctrl_handler), BOOL::from(true)) } {
        tracing::debug! ("no console ctrl handler : {:?}", e);
    }

    if !quit_window::run_quit_pump() {
        while !QUIT_REQUESTED.load (Ordering::SeqCst) {
            thread::sleep (Duration::from_millis(200));
        }
    }
}

/// Blocks until SIGINT/SIGTERM .. a SIGHUP re-reads the config file in the meantime
# [ cfg (unix) ]
fn wait_for_quit (svc:&Arc<Services>) {
    use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};

    let quit   = Arc::new (AtomicBool::new (false));
    let reload = Arc::new (AtomicBool::new (false));
    let regs = [ (SIGINT, &quit), (SIGTERM, &quit), (SIGHUP, &reload) ];
    for (sig, flag) in regs {
        if let Err(e) = signal_hook::flag::register (sig, Arc::clone(flag)) {
            tracing::warn! ("could not register handler for signal {} : {:?}", sig, e);
        }
    }
    while !quit.load (Ordering::SeqCst) {
        if reload.swap (false, Ordering::SeqCst) {
            info! ("got SIGHUP .. reloading config");
            svc.reload_config();
        }
        thread::sleep (Duration::from_millis(200));
    }
}



fn main() {

    let conf = Config::new();

    // we want the non-blocking log-appender guard to be here in main, to ensure any pending logs get flushed upon crash etc
    let _guard = conf.setup_log_subscriber();

    info! ("Starting AppLights v{} ...", Config::APPLIGHTS_VERSION);

    let app = build_app (&conf);
    let n = app.load_profiles();
    info! ("loaded {} profiles from {:?}", n, conf.get_profiles_file());

    if conf.check_flag__lighting_enabled() {
        app.init_lighting();
    } else {
        info! ("lighting disabled in config .. running without touching the keyboard");
    }
    // first frame goes out even when nothing resolves, so the keyboard starts on the defaults
    if !app.check_now() { app.render_current() }

    let svc = Arc::new (Services::start (&app, &conf));

    wait_for_quit (&svc);
    info! ("quit requested .. shutting down");
    svc.shutdown();

    info! ("AppLights exited");
}
