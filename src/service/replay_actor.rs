use crate::error::AutoreplyError;
use crate::service::replay_guard::ReplayGuard;

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tracing::{debug, info, warn};

/// Messages handled by the replay guard actor.
#[derive(Debug)]
pub enum ReplayGuardMessage {
    /// Record a code; replies `false` when it was already seen within the window.
    Register(String, RpcReplyPort<bool>),
}

/// Handle for interacting with the replay guard actor.
///
/// The actor owns the [`ReplayGuard`], so concurrent callbacks are
/// serialized through its mailbox instead of a shared lock.
#[derive(Clone)]
pub struct ReplayGuardHandle {
    actor: ActorRef<ReplayGuardMessage>,
}

impl ReplayGuardHandle {
    pub async fn register(&self, code: impl AsRef<str>) -> Result<bool, AutoreplyError> {
        ractor::call!(
            self.actor,
            ReplayGuardMessage::Register,
            code.as_ref().to_string()
        )
        .map_err(|e| AutoreplyError::Actor(format!("ReplayGuard Register RPC failed: {e}")))
    }
}

struct ReplayGuardActor;

#[ractor::async_trait]
impl Actor for ReplayGuardActor {
    type Msg = ReplayGuardMessage;
    type State = ReplayGuard;
    type Arguments = ReplayGuard;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        guard: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!("ReplayGuardActor started");
        Ok(guard)
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        guard: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ReplayGuardMessage::Register(code, rp) => {
                let fresh = guard.register(&code);
                if fresh {
                    debug!(tracked = guard.len(), "authorization code recorded");
                } else {
                    warn!("authorization code replay rejected");
                }
                let _ = rp.send(fresh);
            }
        }
        Ok(())
    }
}

/// Spawn an (unnamed) replay guard actor and return a handle.
pub async fn spawn(guard: ReplayGuard) -> Result<ReplayGuardHandle, AutoreplyError> {
    let (actor, _jh) = Actor::spawn(None, ReplayGuardActor, guard)
        .await
        .map_err(|e| AutoreplyError::Actor(format!("failed to spawn ReplayGuardActor: {e}")))?;
    Ok(ReplayGuardHandle { actor })
}
