use std::sync::{Arc, Mutex};
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::applights::AppLightsState;



# [ atomic_enum::atomic_enum ]
# [ derive (PartialEq) ]
pub enum MonitorStatus { Stopped, Running, Stopping }
// ^^ the atomic_enum crate will generate an AtomicMonitorStatus for us


/// Flips the status to Stopped when the loop thread exits, panics included
struct StoppedOnExit (Arc <AtomicMonitorStatus>);

impl Drop for StoppedOnExit {
    fn drop (&mut self) { self.0 .store (MonitorStatus::Stopped, Ordering::SeqCst) }
}


struct MonitorCtl {
    stop_tx : Sender <()>,
    done_rx : Receiver <()>,
    handle  : JoinHandle <()>,
}

/// The periodic background poll : snapshot, resolve, and render/notify only on change.
/// At most one loop runs at a time.
pub struct Monitor {
    status : Arc <AtomicMonitorStatus>,
    ctl    : Mutex <Option <MonitorCtl>>,
}

impl Default for Monitor {
    fn default () -> Self { Monitor::new() }
}

impl Monitor {

    pub fn new () -> Monitor {
        Monitor {
            status : Arc::new (AtomicMonitorStatus::new (MonitorStatus::Stopped)),
            ctl    : Mutex::new (None),
        }
    }

    pub fn status (&self) -> MonitorStatus { self.status.load (Ordering::SeqCst) }

    pub fn is_running (&self) -> bool { self.status() == MonitorStatus::Running }

    /// Starts the loop .. refuses (returns false) if one is already running or still stopping
    pub fn start (&self, app:&AppLightsState, interval:Duration) -> bool {
        let mut ctl = self.ctl.lock() .unwrap_or_else (|e| e.into_inner());
        if self.status.compare_exchange (
            MonitorStatus::Stopped, MonitorStatus::Running, Ordering::SeqCst, Ordering::SeqCst
        ).is_err() {
            warn! ("monitor already active ({:?}), not starting another", self.status());
            return false
        }
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let app = app.clone();
        let status = StoppedOnExit (self.status.clone());
        let handle = thread::spawn ( move || {
            // marks the monitor Stopped when this thread exits
            let _status = status;
            Self::run (app, stop_rx, interval);
            let _ = done_tx.send(());
        } );
        *ctl = Some ( MonitorCtl { stop_tx, done_rx, handle } );
        info! ("monitor started, polling every {:?}", interval);
        true
    }

    fn run (app:AppLightsState, stop_rx:Receiver<()>, interval:Duration) {
        loop {
            app.check_now();
            // sleeping on the stop channel lets a stop wake us right away instead of after the interval
            match stop_rx.recv_timeout (interval) {
                Err (RecvTimeoutError::Timeout) => continue,
                _ => break,
            }
        }
        debug! ("monitor loop exiting");
    }

    /// Signals the loop to end and waits up to `timeout` for it .. true if it finished in time (or wasnt running).
    /// On a timeout the status stays Stopping until the old thread actually exits
    pub fn stop (&self, timeout:Duration) -> bool {
        let Some(ctl) = self.ctl.lock() .unwrap_or_else (|e| e.into_inner()) .take() else {
            // nothing to signal, but an earlier timed-out stop may still have its thread winding down
            return self.status() == MonitorStatus::Stopped
        };
        self.status.store (MonitorStatus::Stopping, Ordering::SeqCst);
        drop (ctl.stop_tx);     // closing the channel is the stop signal

        // a disconnect means the thread is gone too (it panicked before signalling done)
        let finished = !matches! (ctl.done_rx.recv_timeout (timeout), Err (RecvTimeoutError::Timeout));
        if finished {
            if ctl.handle.join().is_err() { warn! ("monitor thread panicked") }
            self.status.store (MonitorStatus::Stopped, Ordering::SeqCst);
            info! ("monitor stopped");
        } else {
            // a cycle is stuck (e.g. in a slow device write) .. the thread is left to finish on its own, and status
            // stays at Stopping (refusing new starts) until it does
            warn! ("monitor did not stop within {:?}", timeout);
        }
        finished
    }
}




#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_events::ManualLockKeys;
    use crate::lighting::HeadlessDevice;
    use crate::notices::Notifier;
    use crate::persistence::TomlProfilesFile;
    use crate::procs::{ManualProcessSource, ProcSnapshot, ProcessSource};
    use crate::profiles::Rgb;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn app_in (dir:&tempfile::TempDir, procs:Arc<dyn ProcessSource>) -> AppLightsState {
        let persist = Arc::new (TomlProfilesFile::new (dir.path().join("profiles.toml")));
        AppLightsState::new (persist, procs, Arc::new (ManualLockKeys::new()), Arc::new (HeadlessDevice::new()), Notifier::new())
    }

    fn wait_for (cond: impl Fn() -> bool) -> bool {
        let t = Instant::now();
        while t.elapsed() < Duration::from_secs(3) {
            if cond() { return true }
            thread::sleep (Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn only_one_loop_at_a_time () {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in (&dir, Arc::new (ManualProcessSource::new()));
        let mon = Monitor::new();
        assert_eq! (mon.status(), MonitorStatus::Stopped);
        assert! (mon.start (&app, Duration::from_millis(100)));
        assert! (!mon.start (&app, Duration::from_millis(100)));
        assert! (mon.is_running());
        assert! (mon.stop (Duration::from_secs(2)));
        assert_eq! (mon.status(), MonitorStatus::Stopped);
        // and can be started again after
        assert! (mon.start (&app, Duration::from_millis(100)));
        assert! (mon.stop (Duration::from_secs(2)));
    }

    #[test]
    fn stop_wakes_the_loop_right_away () {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in (&dir, Arc::new (ManualProcessSource::new()));
        let mon = Monitor::new();
        mon.start (&app, Duration::from_secs(60));
        let t = Instant::now();
        assert! (mon.stop (Duration::from_secs(5)));
        assert! (t.elapsed() < Duration::from_secs(1));
        assert! (mon.stop (Duration::from_secs(1)));    // stopping a stopped monitor is fine
    }

    #[test]
    fn loop_picks_up_app_starts_and_exits () {
        let dir = tempfile::tempdir().unwrap();
        let procs = Arc::new (ManualProcessSource::new());
        let app = app_in (&dir, procs.clone());
        app.add_profile ("code.exe", Rgb::GREEN, true);
        let mon = Monitor::new();
        mon.start (&app, Duration::from_millis(100));

        procs.set_running (["code.exe"]);
        assert! (wait_for (|| app.get_in_use_profile_name().as_deref() == Some("code.exe")));
        procs.set_running (Vec::<String>::new());
        assert! (wait_for (|| app.get_in_use_profile_name().is_none()));

        assert! (mon.stop (Duration::from_secs(2)));
    }

    /// a snapshot that takes a while, counting how many are in flight at once
    # [ derive (Default) ]
    struct SlowSource {
        in_flight     : AtomicUsize,
        max_in_flight : AtomicUsize,
        calls         : AtomicUsize,
    }
    impl ProcessSource for SlowSource {
        fn snapshot (&self) -> ProcSnapshot {
            let n = self.in_flight.fetch_add (1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max (n, Ordering::SeqCst);
            self.calls.fetch_add (1, Ordering::SeqCst);
            thread::sleep (Duration::from_millis(600));
            self.in_flight.fetch_sub (1, Ordering::SeqCst);
            ProcSnapshot::new()
        }
    }

    #[test]
    fn timed_out_stop_blocks_restart_until_old_loop_exits () {
        let dir = tempfile::tempdir().unwrap();
        let procs = Arc::new (SlowSource::default());
        let app = app_in (&dir, procs.clone());
        let mon = Monitor::new();
        assert! (mon.start (&app, Duration::from_millis(10)));
        assert! (wait_for (|| procs.calls.load (Ordering::SeqCst) > 0));

        assert! (!mon.stop (Duration::from_millis(10)));
        assert_eq! (mon.status(), MonitorStatus::Stopping);
        assert! (!mon.start (&app, Duration::from_millis(10)));
        assert! (!mon.stop (Duration::from_millis(10)));

        // once the stuck cycle finishes, the old thread marks itself stopped and a restart is allowed
        assert! (wait_for (|| mon.status() == MonitorStatus::Stopped));
        assert! (mon.start (&app, Duration::from_millis(10)));
        assert! (mon.stop (Duration::from_secs(3)));
        assert_eq! (procs.max_in_flight.load (Ordering::SeqCst), 1);
    }
}
