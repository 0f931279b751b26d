//! Network subsystem.
//!
//! Socket setup lives outside this crate. Here the subsystem accepts identity
//! announcements and relays each announced identity to the supervisor as a
//! peers update.

use super::identity::ANNOUNCE;
use crate::messaging::{Envelope, Payload, Peers, PublicIdentity, SUPERVISOR_QUEUE};
use crate::process::{reject, ProcessContext, RunSummary, RunningProcess};
use crate::types::Result;
use futures::future::BoxFuture;

/// Registry name of this implementation.
pub const IMPLEMENTATION: &str = "udp_net_4";

pub fn entry(mut process: RunningProcess) -> BoxFuture<'static, Result<RunSummary>> {
    Box::pin(async move {
        process.register_handler(ANNOUNCE, on_announce)?;
        process.run().await
    })
}

fn on_announce(ctx: &ProcessContext, envelope: &Envelope) -> Result<()> {
    let Payload::NetMessage(message) = envelope.payload() else {
        return Err(reject(envelope, "expected a net message"));
    };
    let identity: PublicIdentity = serde_json::from_slice(&message.obj)
        .map_err(|e| reject(envelope, &e.to_string()))?;
    tracing::info!(
        "peer_announced: category={}, uuid={}, address={}",
        ctx.category(),
        identity.uuid,
        identity.address
    );
    ctx.send_to(
        SUPERVISOR_QUEUE,
        Envelope::new(Payload::Peers(Peers {
            peers: vec![identity],
        })),
    )
}
