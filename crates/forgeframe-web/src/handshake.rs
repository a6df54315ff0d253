//! `window.name` read/write, spec.md §4.4. The codec itself
//! (`forgeframe_protocol::handshake::build`/`parse`) is pure and lives in
//! `forgeframe-protocol`; this module is only the `web_sys::Window` I/O.

use forgeframe_protocol::handshake::{self, HandshakePayload};
use forgeframe_protocol::ForgeFrameError;
use tracing::debug;
use web_sys::Window;

/// Whether `window.name` currently carries a handshake payload at all.
pub fn is_tagged(window: &Window) -> bool {
    handshake::is_handshake_name(&window.name())
}

/// Read and decode the payload left in `window.name`, if any.
pub fn read(window: &Window) -> Option<HandshakePayload> {
    handshake::parse(&window.name())
}

/// Encode `payload` and write it into `window.name`. Must happen before the
/// window is navigated, so the host page can read it synchronously on load
/// rather than waiting on the first `postMessage`.
pub fn write(window: &Window, payload: &HandshakePayload) -> Result<(), ForgeFrameError> {
    let encoded = handshake::build(payload)?;
    window.set_name(&encoded);
    debug!(tag = %payload.tag, uid = %payload.uid, "wrote handshake payload to window.name");
    Ok(())
}

/// Clears any handshake payload left in `window.name`, once it has been
/// consumed, so a later synchronous read of the same window doesn't see
/// stale data.
pub fn clear(window: &Window) {
    if is_tagged(window) {
        window.set_name("");
    }
}
