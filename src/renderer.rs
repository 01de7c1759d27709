//! Turns the resolved profile (or its absence) plus the OS lock-key states into device writes.
//!
//! Planning is pure and lock-free (it works off a copied profile), applying is a straight walk over the planned ops.
//! Write order matters: later writes to a key win, which is how lock keys keep precedence over highlight/action keys.

use tracing::trace;

use crate::keys::{LockKey, LockStates, LogiKey};
use crate::lighting::LightingDevice;
use crate::profiles::{AppProfile, GlobalColors, Rgb};



/// One device write
# [ derive (Debug, Eq, PartialEq, Copy, Clone) ]
pub enum LightOp {
    SetAll (Rgb),
    SetKey (LogiKey, Rgb),
}


/// lock keys follow OS toggle state w no profile in use, or when the in-use profile has them enabled
pub fn lock_keys_active (resolved:Option<&AppProfile>) -> bool {
    resolved .map_or (true, |p| p.lock_keys_enabled)
}

fn lock_key_ops (base:Rgb, locks:LockStates, globals:&GlobalColors, active:bool) -> impl Iterator<Item=LightOp> + '_ {
    LockKey::ALL .into_iter() .map (move |lk| {
        let color = if active && locks.is_on(lk) { globals.lock_color(lk) } else { base };
        LightOp::SetKey (lk.key(), color)
    } )
}


/// The full frame for the given state, in write order
pub fn plan (resolved:Option<&AppProfile>, locks:LockStates, globals:&GlobalColors, action_active:bool) -> Vec<LightOp> {

    let base = resolved .map_or (globals.default_color, |p| p.app_color);
    let locks_active = lock_keys_active (resolved);

    let mut ops = vec! [ LightOp::SetAll (base) ];
    ops.extend (lock_key_ops (base, locks, globals, locks_active));

    let Some(p) = resolved else { return ops };

    // highlight keys, then lock keys reasserted on top
    if !p.highlight_keys.is_empty() {
        ops.extend (p.highlight_keys .iter() .map (|k| LightOp::SetKey (*k, p.highlight_color)));
        if locks_active { ops.extend (lock_key_ops (base, locks, globals, true)) }
    }

    // action keys only while the action overlay is toggled on .. same reassert ordering
    if action_active && !p.action_keys.is_empty() {
        ops.extend (p.action_keys .iter() .map (|k| LightOp::SetKey (*k, p.action_color)));
        if locks_active { ops.extend (lock_key_ops (base, locks, globals, true)) }
    }
    ops
}


pub fn apply (device:&dyn LightingDevice, ops:&[LightOp]) {
    trace! ("applying {} light ops", ops.len());
    ops .iter() .for_each (|op| match *op {
        LightOp::SetAll (c)    => device.set_all_keys (c),
        LightOp::SetKey (k, c) => device.set_key (k, c),
    } );
}


/// effective per-key result of a plan .. what the keyboard would end up showing for `key`
pub fn final_color (ops:&[LightOp], key:LogiKey) -> Option<Rgb> {
    ops .iter() .rev() .find_map (|op| match *op {
        LightOp::SetKey (k, c) if k == key => Some(c),
        LightOp::SetAll (c) => Some(c),
        _ => None,
    } )
}
