//! Unix socket connection loop
//!
//! Accepts connections until the shutdown future resolves, spawning one task
//! per connection through the session manager, then drains in-flight sessions.
//! The caller tears the generator down afterwards.

use crate::generator::Generator;
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::net::UnixListener;
use tracing::{debug, info, warn};
use vigil_common::session::SessionManager;

/// Bind `path`, replacing a stale socket file left by a previous run
pub fn bind_socket(path: &Path) -> io::Result<UnixListener> {
    remove_socket(path)?;
    let listener = UnixListener::bind(path)?;
    info!(socket = %path.display(), "Listening");
    Ok(listener)
}

/// Remove the socket file; a missing file is fine
pub fn remove_socket(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(socket = %path.display(), "Removed socket file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Serve connections until `shutdown` completes, then wait for every session
pub async fn accept_loop<F>(
    listener: UnixListener,
    generator: &Generator,
    sessions: &Arc<SessionManager>,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Stopped accepting connections");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let task = generator.create_task(stream, Arc::clone(sessions));
                    sessions.spawn(task.run());
                }
                Err(e) => warn!("Unable to accept connection: {}", e),
            },
        }
    }

    drop(listener);
    sessions.drain().await;
}
