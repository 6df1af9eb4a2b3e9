//! OSC (Operating System Command) dispatch: window title and icon name.

use tracing::warn;

use crate::vt::Vt;

/// `raw` is the accumulated OSC body, terminator already stripped. Splits on the
/// first `;` into command and argument.
pub fn dispatch_osc(vt: &mut Vt, raw: &str) {
    let (command, arg) = match raw.split_once(';') {
        Some((c, a)) => (c, a),
        None => (raw, ""),
    };

    match command {
        "0" => {
            vt.icon_name = arg.to_string();
            vt.window_title = arg.to_string();
        }
        "1" => vt.icon_name = arg.to_string(),
        "2" => vt.window_title = arg.to_string(),
        other => warn!(event = "vt.osc_unknown", command = other, "ignoring unrecognised OSC command"),
    }
}
