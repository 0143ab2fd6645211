// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Native RPC Connections
//!
//! Serves a stream that negotiated `twinport-rpc/1`. Every frame is a
//! [`NativeRequest`]; each is dispatched on its own task so a slow call does
//! not hold up the ones behind it, and replies are written back through a
//! single writer task as they complete.
//!
//! A frame that cannot be read (oversized, truncated) ends the connection.
//! A frame that reads but does not decode gets an `InvalidArgument` reply.
//!
//! # Architecture
//!
//! - **Layer:** Presentation Layer
//! - **Purpose:** Length-delimited native framing in front of the dispatcher

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use prost::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::application::dispatcher::Dispatcher;
use crate::domain::context::ConnectionContext;
use crate::domain::error::RpcError;
use crate::infrastructure::native_codec::{frame_codec, NativeRequest, NativeResponse};

const REPLY_QUEUE_DEPTH: usize = 64;

pub async fn serve<S>(
    stream: S,
    context: Arc<ConnectionContext>,
    dispatcher: Arc<Dispatcher>,
    max_frame_length: usize,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut sink, mut frames) = Framed::new(stream, frame_codec(max_frame_length)).split();
    let (replies, mut outbox) = mpsc::channel::<NativeResponse>(REPLY_QUEUE_DEPTH);

    let writer = tokio::spawn(async move {
        while let Some(reply) = outbox.recv().await {
            if let Err(e) = sink.send(Bytes::from(reply.encode_to_vec())).await {
                debug!(error = %e, "Native connection closed while replying");
                break;
            }
        }
    });

    let in_flight = TaskTracker::new();
    let cancellation = context.cancellation().clone();
    loop {
        let frame = tokio::select! {
            _ = cancellation.cancelled() => break,
            frame = frames.next() => frame,
        };
        let frame = match frame {
            None => break,
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                warn!(error = %e, "Unreadable native frame, closing connection");
                break;
            }
        };

        let request = match NativeRequest::decode(frame.freeze()) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Undecodable native request");
                let reply = NativeResponse::failure(
                    String::new(),
                    &RpcError::invalid_argument(format!("malformed request frame: {e}")),
                );
                if replies.send(reply).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let replies = replies.clone();
        let dispatcher = Arc::clone(&dispatcher);
        let context = Arc::clone(&context);
        in_flight.spawn(async move {
            let deadline = (request.timeout_ms > 0)
                .then(|| Instant::now() + Duration::from_millis(request.timeout_ms));
            let envelope = request.into_envelope();
            let correlation_id = envelope.correlation_id.to_string();
            let reply = match dispatcher.dispatch(envelope, &context, deadline).await {
                Ok(response) => NativeResponse::success(response),
                Err(err) => NativeResponse::failure(correlation_id, &err),
            };
            let _ = replies.send(reply).await;
        });
    }

    in_flight.close();
    in_flight.wait().await;
    drop(replies);
    let _ = writer.await;
    debug!(connection_id = %context.id(), "Native connection finished");
}
