//! CAT pseudo-terminal bridge.
//!
//! CAT clients want to open an ordinary serial device. [`CatBridge`]
//! allocates two pseudo-terminal pairs and wires their masters together
//! with a byte-copy bridge:
//!
//! ```text
//! client <-> client slave | client master <-copy-> loop master | loop slave <-> engine
//! ```
//!
//! The client opens the slave of the first pair (its path is logged at
//! startup); the engine's CAT side reads commands from and writes
//! replies to the slave of the second pair. Both slaves are configured
//! raw -- no echo, no line editing -- and with `HUPCL` cleared so the
//! line survives clients that open and close the port repeatedly.
//!
//! All endpoints are non-blocking file descriptors driven through
//! [`AsyncFd`], wrapped in [`AsyncTty`].

use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::pty::openpty;
use nix::sys::termios::{self, ControlFlags, SetArg};
use nix::unistd;
use tokio::io::unix::AsyncFd;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use usdx_core::error::{Error, Result};

/// Read-buffer size for the copy and CAT forwarding loops.
pub const TTY_BUF: usize = 64;

/// A non-blocking pseudo-terminal endpoint usable from async tasks.
///
/// Cloneable: the copy bridge reads an endpoint from one task while
/// another task writes it, which [`AsyncFd`]'s `&self` guards permit.
#[derive(Clone)]
pub struct AsyncTty {
    fd: Arc<AsyncFd<OwnedFd>>,
}

impl AsyncTty {
    fn new(fd: OwnedFd) -> Result<Self> {
        set_nonblocking(&fd)?;
        Ok(Self {
            fd: Arc::new(AsyncFd::new(fd).map_err(Error::Io)?),
        })
    }

    /// Read available bytes, waiting until at least one arrives.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let mut guard = self.fd.readable().await.map_err(Error::Io)?;
            match guard.try_io(|inner| {
                unistd::read(inner.get_ref().as_raw_fd(), buf).map_err(std::io::Error::from)
            }) {
                Ok(result) => return result.map_err(Error::Io),
                Err(_would_block) => continue,
            }
        }
    }

    /// Write all of `data`.
    pub async fn write_all(&self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            let mut guard = self.fd.writable().await.map_err(Error::Io)?;
            match guard.try_io(|inner| {
                unistd::write(inner.get_ref(), &data[written..]).map_err(std::io::Error::from)
            }) {
                Ok(result) => written += result.map_err(Error::Io)?,
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }
}

fn set_nonblocking(fd: &OwnedFd) -> Result<()> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK))
        .map_err(|e| Error::Pty(format!("failed to set O_NONBLOCK: {e}")))?;
    Ok(())
}

/// Put a pty slave into raw mode with `HUPCL` cleared.
fn make_raw(fd: &OwnedFd) -> Result<()> {
    let mut attrs = termios::tcgetattr(fd.as_fd())
        .map_err(|e| Error::Pty(format!("tcgetattr failed: {e}")))?;
    termios::cfmakeraw(&mut attrs);
    attrs.control_flags.remove(ControlFlags::HUPCL);
    termios::tcsetattr(fd.as_fd(), SetArg::TCSANOW, &attrs)
        .map_err(|e| Error::Pty(format!("tcsetattr failed: {e}")))?;
    Ok(())
}

/// Two pseudo-terminal pairs bridged master-to-master.
pub struct CatBridge {
    client_path: PathBuf,
    client_master: AsyncTty,
    loop_master: AsyncTty,
    engine_tty: AsyncTty,
    /// Held open so the client master never sees EOF while no client
    /// is attached.
    _client_slave: OwnedFd,
}

impl CatBridge {
    /// Allocate both pty pairs and configure the slaves raw.
    pub fn open() -> Result<Self> {
        let client = openpty(None, None)
            .map_err(|e| Error::Pty(format!("openpty (client pair) failed: {e}")))?;
        let looped = openpty(None, None)
            .map_err(|e| Error::Pty(format!("openpty (loop pair) failed: {e}")))?;

        let client_path = unistd::ttyname(client.slave.as_fd())
            .map_err(|e| Error::Pty(format!("ttyname failed: {e}")))?;

        make_raw(&client.slave)?;
        make_raw(&looped.slave)?;

        debug!(path = %client_path.display(), "CAT pty pairs allocated");

        Ok(Self {
            client_path,
            client_master: AsyncTty::new(client.master)?,
            loop_master: AsyncTty::new(looped.master)?,
            engine_tty: AsyncTty::new(looped.slave)?,
            _client_slave: client.slave,
        })
    }

    /// Path of the slave device the CAT client should open.
    pub fn client_path(&self) -> &Path {
        &self.client_path
    }

    /// The engine-side endpoint: commands are read from it, replies
    /// written to it.
    pub fn engine_tty(&self) -> AsyncTty {
        self.engine_tty.clone()
    }

    /// Spawn the two one-directional master-to-master copy tasks.
    pub fn spawn_copy(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(copy_bytes(
                self.client_master.clone(),
                self.loop_master.clone(),
                cancel.clone(),
            )),
            tokio::spawn(copy_bytes(
                self.loop_master.clone(),
                self.client_master.clone(),
                cancel.clone(),
            )),
        ]
    }
}

/// One direction of the byte bridge.
async fn copy_bytes(src: AsyncTty, dst: AsyncTty, cancel: CancellationToken) {
    let mut buf = [0u8; TTY_BUF];
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("pty copy task cancelled");
                break;
            }

            result = src.read(&mut buf) => match result {
                Ok(0) => continue,
                Ok(n) => {
                    if let Err(e) = dst.write_all(&buf[..n]).await {
                        warn!(error = %e, "pty bridge write failed");
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "pty bridge read failed");
                    break;
                }
            }
        }
    }
}
