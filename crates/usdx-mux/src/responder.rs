//! Local command responder and routing for the host CAT side.
//!
//! CAT clients batch commands into one string (`"RX;ID;"`) and expect
//! some replies faster than the radio round trip allows: hamlib probes
//! the rig identity with a deadline in the hundreds of microseconds.
//! The responder splits the incoming string, answers `ID` queries
//! immediately from [`RADIO_ID_REPLY`], and forwards everything else
//! (delimiter-free) to the outbound command queue.
//!
//! Splitting rule: split on `;`; route every non-empty piece, plus the
//! first piece even when empty -- clients send a leading `;` to flush
//! any partial frame the radio may be holding, and that empty command
//! must reach the wire as a bare terminator.

use tokio::sync::mpsc;
use tracing::debug;

use usdx_core::error::{Error, Result};
use usdx_core::frame::RADIO_ID_REPLY;

/// Where one piece of a host command string goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Answer locally with the canned identity reply; never forwarded.
    LocalIdentity,
    /// Forward to the radio, delimiter-free.
    Forward(Vec<u8>),
}

/// Split a host command string and decide where each piece goes.
///
/// An empty input routes nothing.
///
/// # Example
///
/// ```
/// use usdx_mux::responder::{route_commands, Route};
///
/// let routes = route_commands("RX;ID;");
/// assert_eq!(
///     routes,
///     vec![Route::Forward(b"RX".to_vec()), Route::LocalIdentity]
/// );
/// ```
pub fn route_commands(text: &str) -> Vec<Route> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut routes = Vec::new();
    for (i, piece) in text.split(';').enumerate() {
        if piece.is_empty() && i != 0 {
            continue;
        }
        if piece.as_bytes().starts_with(b"ID") {
            routes.push(Route::LocalIdentity);
        } else {
            routes.push(Route::Forward(piece.as_bytes().to_vec()));
        }
    }
    routes
}

/// Cloneable producer handle for the host CAT side.
///
/// Applies [`route_commands`] to each pushed string: locally-answered
/// queries go straight onto the inbound reply queue as if the radio had
/// answered, everything else onto the outbound command queue. Both
/// sends apply backpressure when the queue is full.
#[derive(Clone)]
pub struct CommandSink {
    commands: mpsc::Sender<Vec<u8>>,
    replies: mpsc::Sender<Vec<u8>>,
}

impl CommandSink {
    pub(crate) fn new(commands: mpsc::Sender<Vec<u8>>, replies: mpsc::Sender<Vec<u8>>) -> Self {
        Self { commands, replies }
    }

    /// Route one semicolon-separated command string from the host.
    ///
    /// Returns [`Error::NotConnected`] if the engine has stopped.
    pub async fn push(&self, text: &str) -> Result<()> {
        for route in route_commands(text) {
            match route {
                Route::LocalIdentity => {
                    debug!("answering ID query locally");
                    self.replies
                        .send(RADIO_ID_REPLY.to_vec())
                        .await
                        .map_err(|_| Error::NotConnected)?;
                }
                Route::Forward(cmd) => {
                    self.commands
                        .send(cmd)
                        .await
                        .map_err(|_| Error::NotConnected)?;
                }
            }
        }
        Ok(())
    }
}
