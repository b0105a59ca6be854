//! Per-connection task
//!
//! A [`Task`] is built by a generator for one accepted connection. It holds
//! shares of the generator's cache and backend handles (never ownership), reads
//! newline-delimited requests, answers each with one certitude per item, and
//! stops reading once the session manager signals shutdown.

use crate::hostlookup::HostLookupTask;
use crate::sofa::SofaTask;
use crate::useragent::UserAgentTask;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, warn, Instrument};
use vigil_common::context::ERROR_CERTITUDE;
use vigil_common::protocol::{FilterRequest, FilterResponse};
use vigil_common::session::SessionManager;
use vigil_common::{FilterContext, ResultCache};

/// Backend-specific part of a task
pub enum Evaluator {
    HostLookup(HostLookupTask),
    Sofa(SofaTask),
    UserAgent(UserAgentTask),
    /// Built by a generator whose configuration never loaded; answers every
    /// item with the error certitude.
    Unloaded,
}

/// Connection-independent state of a task
pub struct TaskWorker {
    ctx: FilterContext,
    cache: Arc<ResultCache>,
    manager: Arc<SessionManager>,
    evaluator: Evaluator,
}

impl TaskWorker {
    /// Evaluate one request
    pub async fn handle(&self, request: FilterRequest) -> FilterResponse {
        let certitudes = match &self.evaluator {
            Evaluator::HostLookup(task) => task.evaluate(&self.ctx, &self.cache, &request),
            Evaluator::UserAgent(task) => task.evaluate(&self.ctx, &self.cache, &request).await,
            Evaluator::Sofa(task) => task.evaluate(&self.ctx, &self.cache, &request).await,
            Evaluator::Unloaded => {
                error!("Task created by a generator without a loaded backend");
                vec![ERROR_CERTITUDE; request.data.len()]
            }
        };

        FilterResponse::Certitudes {
            evt_id: request.evt_id,
            certitudes,
        }
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    async fn serve<C>(self, connection: C)
    where
        C: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let token = self.manager.shutdown_token();
        let (reader, mut writer) = tokio::io::split(connection);
        let mut lines = BufReader::new(reader).lines();

        loop {
            let line = tokio::select! {
                _ = token.cancelled() => {
                    debug!("Shutdown requested, closing session");
                    break;
                }
                line = lines.next_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Unable to read from session: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<FilterRequest>(&line) {
                Ok(request) => self.handle(request).await,
                Err(e) => {
                    warn!("Invalid request: {}", e);
                    FilterResponse::Error {
                        error: format!("invalid request: {}", e),
                    }
                }
            };

            if let Err(e) = writer.write_all(response.to_line().as_bytes()).await {
                warn!("Unable to write to session: {}", e);
                break;
            }
        }

        if let Err(e) = writer.shutdown().await {
            debug!("Session shutdown: {}", e);
        }
    }
}

/// One unit of work per accepted connection
pub struct Task<C> {
    connection: C,
    worker: TaskWorker,
}

impl<C> Task<C> {
    pub(crate) fn new(
        connection: C,
        manager: Arc<SessionManager>,
        ctx: FilterContext,
        cache: Arc<ResultCache>,
        evaluator: Evaluator,
    ) -> Self {
        Self {
            connection,
            worker: TaskWorker {
                ctx,
                cache,
                manager,
                evaluator,
            },
        }
    }

    pub fn worker(&self) -> &TaskWorker {
        &self.worker
    }
}

impl<C> Task<C>
where
    C: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Serve the connection until EOF, a transport error, or shutdown
    pub async fn run(self) {
        let Task { connection, worker } = self;
        let span = worker.ctx.span().clone();
        worker.serve(connection).instrument(span).await
    }
}
