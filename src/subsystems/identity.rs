//! Identity subsystem.
//!
//! On start it announces this node's public identity to the network
//! subsystem, then runs the standard loop. Group and peer updates land in the
//! cached protocol state.

use crate::config::IdentityConfig;
use crate::messaging::{Envelope, NetMessage, PublicIdentity};
use crate::process::{ProcessContext, RunSummary, RunningProcess};
use crate::types::{Error, Result};
use futures::future::BoxFuture;

/// Registry name of this implementation.
pub const IMPLEMENTATION: &str = "id_proc";

/// Queue the announcement is sent to.
pub const NETWORK_QUEUE: &str = "network";

/// Handler name the announcement is addressed to.
pub const ANNOUNCE: &str = "announce";

pub fn entry(process: RunningProcess) -> BoxFuture<'static, Result<RunSummary>> {
    Box::pin(run(process))
}

async fn run(process: RunningProcess) -> Result<RunSummary> {
    match announce_identity(process.context()) {
        Ok(()) => {}
        Err(Error::NotFound(what)) => {
            tracing::warn!("identity_announce_skipped: missing={}", what);
        }
        Err(e) => return Err(e),
    }
    process.run().await
}

/// Public half of this node's identity, from its config document if present.
pub fn public_identity(ctx: &ProcessContext) -> PublicIdentity {
    match ctx.config::<IdentityConfig>(ctx.category().as_str()) {
        Ok(config) => PublicIdentity {
            uuid: config.uuid.clone(),
            address: config.address.clone(),
            public_key: Vec::new(),
        },
        Err(_) => PublicIdentity {
            uuid: ctx.category().to_string(),
            address: String::new(),
            public_key: Vec::new(),
        },
    }
}

/// Send the announcement to the network queue.
pub fn announce_identity(ctx: &ProcessContext) -> Result<()> {
    let identity = public_identity(ctx);
    let mut message = NetMessage::new(NETWORK_QUEUE, ANNOUNCE, serde_json::to_vec(&identity)?);
    message.from_whom = Some(identity.uuid.clone());
    message.return_to = Some(ctx.category().to_string());
    ctx.send_to(NETWORK_QUEUE, Envelope::net_message(message))?;
    tracing::info!(
        "identity_announced: uuid={}, address={}",
        identity.uuid,
        identity.address
    );
    Ok(())
}
