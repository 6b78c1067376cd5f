use futures_util::{Sink, SinkExt};
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage};
use thiserror::Error;
use tracing::{debug, error};

use crate::core::{RealtimeError, RealtimeResult, WsFrame};

/// Owns the sink half of one socket and serialises every write to it.
///
/// A writer lives exactly as long as the socket it was built for; reconnects spawn a new one.
pub struct FrameWriter<W>
where
    W: Sink<WsFrame, Error = RealtimeError> + Send + Unpin + 'static,
{
    writer: W,
    label: String,
    closed: bool,
}

impl<W> FrameWriter<W>
where
    W: Sink<WsFrame, Error = RealtimeError> + Send + Unpin + 'static,
{
    pub fn new(writer: W, label: impl Into<String>) -> Self {
        Self {
            writer,
            label: label.into(),
            closed: false,
        }
    }

    fn ensure_open(&self) -> RealtimeResult<()> {
        if self.closed {
            return Err(RealtimeError::InvalidState("writer closed".to_string()));
        }
        Ok(())
    }
}

impl<W> Actor for FrameWriter<W>
where
    W: Sink<WsFrame, Error = RealtimeError> + Send + Unpin + 'static,
{
    type Args = Self;
    type Error = RealtimeError;

    fn name() -> &'static str {
        "FrameWriter"
    }

    async fn on_start(args: Self::Args, _ctx: ActorRef<Self>) -> Result<Self, Self::Error> {
        Ok(args)
    }

    fn on_panic(
        &mut self,
        _actor_ref: kameo::actor::WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<
        Output = Result<std::ops::ControlFlow<kameo::prelude::ActorStopReason>, Self::Error>,
    > + Send {
        let label = self.label.clone();
        async move {
            error!(connection = %label, error = ?err, "FrameWriter panicked");
            Ok(std::ops::ControlFlow::Break(
                kameo::prelude::ActorStopReason::Panicked(err),
            ))
        }
    }
}

/// Write and flush a single frame.
#[derive(Debug)]
pub struct WriterWrite {
    pub frame: WsFrame,
}

impl<W> KameoMessage<WriterWrite> for FrameWriter<W>
where
    W: Sink<WsFrame, Error = RealtimeError> + Send + Unpin + 'static,
{
    type Reply = RealtimeResult<()>;

    async fn handle(
        &mut self,
        msg: WriterWrite,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.ensure_open()?;
        self.writer.send(msg.frame).await
    }
}

/// Write frames in order, flushing each one. Stops at the first failure.
#[derive(Debug)]
pub struct WriterWriteBatch {
    pub frames: Vec<WsFrame>,
}

/// A batch write that failed part way. The first `written` frames reached the sink.
#[derive(Debug, Error)]
#[error("batch write failed after {written} frame(s): {source}")]
pub struct BatchWriteError {
    pub written: usize,
    #[source]
    pub source: RealtimeError,
}

impl<W> KameoMessage<WriterWriteBatch> for FrameWriter<W>
where
    W: Sink<WsFrame, Error = RealtimeError> + Send + Unpin + 'static,
{
    type Reply = Result<(), BatchWriteError>;

    async fn handle(
        &mut self,
        msg: WriterWriteBatch,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.ensure_open()
            .map_err(|source| BatchWriteError { written: 0, source })?;
        let count = msg.frames.len();
        for (written, frame) in msg.frames.into_iter().enumerate() {
            self.writer
                .send(frame)
                .await
                .map_err(|source| BatchWriteError { written, source })?;
        }
        debug!(connection = %self.label, frames = count, "flushed outbound batch");
        Ok(())
    }
}

/// Write a close frame (when given) and close the sink. Later writes fail.
#[derive(Debug)]
pub struct WriterClose {
    pub frame: Option<WsFrame>,
}

impl<W> KameoMessage<WriterClose> for FrameWriter<W>
where
    W: Sink<WsFrame, Error = RealtimeError> + Send + Unpin + 'static,
{
    type Reply = RealtimeResult<()>;

    async fn handle(
        &mut self,
        msg: WriterClose,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(frame) = msg.frame {
            self.writer.send(frame).await?;
        }
        self.writer.close().await
    }
}
