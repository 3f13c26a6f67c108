//! # Activity Stream
//!
//! One subscriber's push session. Opening a stream:
//!
//! 1. replaces whatever listener set the client id had in the [`Registry`];
//! 2. reads the torrent list, the taxonomy, the transfer summary and the
//!    history of the requested resolution, attaching to each service in the
//!    same step as the read;
//! 3. writes the four `*_FULL_UPDATE` events;
//! 4. spawns a forwarder that turns service events into wire events until the
//!    client goes away or the session is replaced.
//!
//! Because reads and attaches happen under the services' state locks, every
//! diff the subscriber receives applies to a snapshot it has already seen.

use bytes::Bytes;
use futures_util::stream::{self, Stream};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::{Detacher, Registry, Subscription};
use crate::error::PushError;
use crate::history::HistoryResolution;
use crate::ingestors::{ServiceEvent, TaxonomyService, TorrentService, TransferService};
use crate::push::event_types::ServerEventType;
use crate::push::server_event::{EventSink, ServerEvent};
use crate::utils::now_millis;

/// Client id used when a subscriber doesn't send one.
pub const DEFAULT_CLIENT_ID: &str = "default";

/// The services a stream reads from.
#[derive(Clone)]
pub struct StreamServices {
    /// Torrent list.
    pub torrents: Arc<TorrentService>,
    /// Status / tag / tracker counts.
    pub taxonomy: Arc<TaxonomyService>,
    /// Transfer summary and history.
    pub transfer: Arc<TransferService>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FetchErrorPayload<'a> {
    error_count: u32,
    message: &'a str,
}

/// # Activity Stream
///
/// The receiving end of an open session. Chunks are whole events; the stream
/// ends when the session is replaced or the services shut down.
pub struct ActivityStream {
    subscription: Subscription,
    body: mpsc::UnboundedReceiver<Bytes>,
    forwarder: JoinHandle<()>,
}

impl ActivityStream {
    /// The registry entry backing this stream.
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Next chunk, `None` once the session has ended.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        self.body.recv().await
    }

    /// Chunks as a stream, for use as an HTTP response body. Dropping the
    /// stream ends the session.
    pub fn into_body_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        // The forwarder watches the receiver, not the handle.
        drop(self.forwarder);
        stream::unfold(self.body, |mut body| async move {
            let chunk = body.recv().await?;
            Some((Ok(chunk), body))
        })
    }
}

/// # Open Activity Stream
///
/// Starts (or restarts) the session of `client_id`, streaming history for
/// `resolution`. Must be called from within a Tokio runtime.
///
/// # Errors
/// `PushError::Serialize` if a full update can't be encoded. The session is
/// not registered in that case.
pub fn open_activity_stream(
    services: &StreamServices,
    registry: &Arc<Registry>,
    client_id: &str,
    resolution: HistoryResolution,
) -> Result<ActivityStream, PushError> {
    let (body_tx, body_rx) = mpsc::unbounded_channel::<Bytes>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<Arc<ServiceEvent>>();
    let probe = body_tx.clone();
    let mut writer = ServerEvent::new(body_tx);
    let label = format!("stream:{client_id}");

    let subscription = registry.resubscribe(client_id, |_token| {
        let now = now_millis();
        let (list, torrents_id) = services.torrents.subscribe_with(&label, event_tx.clone());
        let (taxonomy, taxonomy_id) = services.taxonomy.subscribe_with(&label, event_tx.clone());
        let (summary, history, transfer_id) = services.transfer.subscribe_with(&label, event_tx.clone(), resolution, now);

        let detachers: Vec<Detacher> = vec![
            detacher(&services.torrents, torrents_id, |s, id| s.dispatcher().remove_listener(id)),
            detacher(&services.taxonomy, taxonomy_id, |s, id| s.dispatcher().remove_listener(id)),
            detacher(&services.transfer, transfer_id, |s, id| s.dispatcher().remove_listener(id)),
        ];

        let written = writer
            .send(list.id, ServerEventType::TorrentListFullUpdate, &list.torrents)
            .and_then(|_| writer.send(taxonomy.id, ServerEventType::TaxonomyFullUpdate, &taxonomy.taxonomy))
            .and_then(|_| {
                writer.send(
                    summary.id,
                    ServerEventType::TransferSummaryFullUpdate,
                    &summary.transfer_summary,
                )
            })
            .and_then(|_| writer.send(now, ServerEventType::TransferHistoryFullUpdate, &history));

        match written {
            // A closed body only means the client left early; the forwarder
            // notices and releases the session.
            Ok(()) | Err(PushError::Closed) => Ok(detachers),
            Err(error) => {
                for detach in detachers {
                    detach();
                }
                Err(error)
            }
        }
    })?;
    drop(event_tx);

    tracing::info!(
        client_id,
        generation = subscription.generation,
        resolution = %resolution,
        "activity stream opened"
    );

    let forwarder = tokio::spawn(forward(
        writer,
        event_rx,
        probe,
        services.transfer.clone(),
        Arc::clone(registry),
        subscription.clone(),
        resolution,
    ));

    Ok(ActivityStream {
        subscription,
        body: body_rx,
        forwarder,
    })
}

fn detacher<S, F>(service: &Arc<S>, id: u64, remove: F) -> Detacher
where
    S: Send + Sync + 'static,
    F: FnOnce(&S, u64) -> bool + Send + 'static,
{
    let service = Arc::clone(service);
    Box::new(move || {
        remove(&service, id);
    })
}

async fn forward<S: EventSink>(
    mut writer: ServerEvent<S>,
    mut events: mpsc::UnboundedReceiver<Arc<ServiceEvent>>,
    probe: mpsc::UnboundedSender<Bytes>,
    transfer: Arc<TransferService>,
    registry: Arc<Registry>,
    subscription: Subscription,
    resolution: HistoryResolution,
) {
    let token = subscription.token.clone();
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = probe.closed() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                match write_event(&mut writer, &event, resolution, &transfer) {
                    Ok(()) => {}
                    Err(PushError::Closed) => break,
                    Err(error) => tracing::warn!(%error, "event dropped"),
                }
            }
        }
    }

    registry.release(&subscription.session, subscription.generation);
    tracing::info!(
        client_id = %subscription.session,
        generation = subscription.generation,
        "activity stream closed"
    );
}

/// Writes the wire form of `event`, if it has one for this subscriber.
fn write_event<S: EventSink>(
    writer: &mut ServerEvent<S>,
    event: &ServiceEvent,
    resolution: HistoryResolution,
    transfer: &TransferService,
) -> Result<(), PushError> {
    match event {
        ServiceEvent::TorrentListDiffChange { id, diff } => writer.send(*id, ServerEventType::TorrentListDiffChange, diff),
        ServiceEvent::TaxonomyDiffChange { id, diff } => writer.send(*id, ServerEventType::TaxonomyDiffChange, diff),
        ServiceEvent::TransferSummaryDiffChange { id, diff } => {
            writer.send(*id, ServerEventType::TransferSummaryDiffChange, diff)
        }
        ServiceEvent::TorrentListFetchError { error_count, message } => writer.send(
            now_millis(),
            ServerEventType::TorrentListFetchError,
            &FetchErrorPayload {
                error_count: *error_count,
                message,
            },
        ),
        ServiceEvent::TransferSummaryFetchError { error_count, message } => writer.send(
            now_millis(),
            ServerEventType::TransferSummaryFetchError,
            &FetchErrorPayload {
                error_count: *error_count,
                message,
            },
        ),
        ServiceEvent::HistorySnapshotUpdated(updated) if *updated == resolution => {
            let now = now_millis();
            let history = transfer.get_history_for(resolution, now).unwrap_or_default();
            writer.send(now, ServerEventType::TransferHistoryFullUpdate, &history)
        }
        ServiceEvent::HistorySnapshotUpdated(_)
        | ServiceEvent::TorrentListFetchSuccess
        | ServiceEvent::TransferSummaryFetchSuccess => Ok(()),
    }
}
