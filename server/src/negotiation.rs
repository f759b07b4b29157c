//! Challenges and invitations between players.
//!
//! A request is keyed by its target: each player has at most one inbound
//! request per table, and each player has at most one outbound request. Every
//! request carries a timeout, and whichever of accept, decline and timeout
//! comes first wins: popping the request cancels its timer, and a timer that
//! still fires finds no matching request and does nothing.

use crate::context::Context;
use crate::error::GameError;
use crate::host::Collaborators;
use crate::timers::{RequestKind, Scheduled, TimerHandle};
use log::debug;
use shared::{GameMode, PlayerId};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub id: u64,
    pub initiator: PlayerId,
    pub target: PlayerId,
    /// Both sides had eligible teammates when the request was sent
    pub team_invite: bool,
    timeout: TimerHandle,
}

#[derive(Debug)]
pub struct RequestTable {
    mode: GameMode,
    kind: RequestKind,
    requests: HashMap<PlayerId, PendingRequest>,
    next_id: u64,
}

impl RequestTable {
    pub fn new(mode: GameMode, kind: RequestKind) -> Self {
        Self {
            mode,
            kind,
            requests: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn get(&self, target: PlayerId) -> Option<&PendingRequest> {
        self.requests.get(&target)
    }

    pub fn has_inbound(&self, target: PlayerId) -> bool {
        self.requests.contains_key(&target)
    }

    pub fn has_outbound(&self, initiator: PlayerId) -> bool {
        self.requests.values().any(|r| r.initiator == initiator)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Rejects a new request when either side already has one in flight.
    pub fn check_free<H: Collaborators>(
        &self,
        ctx: &Context<H>,
        initiator: PlayerId,
        target: PlayerId,
    ) -> Result<(), GameError> {
        if self.has_inbound(target) {
            return Err(GameError::TargetHasPendingRequest(ctx.name(target)));
        }
        if self.has_outbound(initiator) {
            return Err(GameError::RequestOutstanding);
        }
        Ok(())
    }

    /// Stores a request and arms its timeout.
    pub fn insert<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        initiator: PlayerId,
        target: PlayerId,
        team_invite: bool,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let timeout = ctx.timers.schedule(
            ctx.config.request_timeout,
            Scheduled::RequestExpired {
                mode: self.mode,
                kind: self.kind,
                target,
                request_id: id,
            },
        );

        debug!(
            "{} {:?} request {}: {} -> {}",
            self.mode, self.kind, id, initiator, target
        );
        self.requests.insert(
            target,
            PendingRequest {
                id,
                initiator,
                target,
                team_invite,
                timeout,
            },
        );
        id
    }

    /// Removes the inbound request of `target` and cancels its timeout.
    pub fn pop<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        target: PlayerId,
    ) -> Option<PendingRequest> {
        let request = self.requests.remove(&target)?;
        ctx.timers.cancel(request.timeout);
        Some(request)
    }

    /// Pops the inbound request of `target` and checks that both sides can
    /// still start a run. The request is consumed even when the check fails.
    pub fn pop_and_validate<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        target: PlayerId,
    ) -> Result<PendingRequest, GameError> {
        let request = self.pop(ctx, target).ok_or(GameError::NoPendingRequest)?;

        if ctx.in_run(target) {
            return Err(GameError::AlreadyInRun);
        }
        if !ctx.is_available(request.initiator) {
            return Err(GameError::OtherPlayerUnavailable);
        }
        Ok(request)
    }

    /// Takes the request out on timeout, but only if it is still the one the
    /// timer was armed for.
    pub fn expire(&mut self, target: PlayerId, request_id: u64) -> Option<PendingRequest> {
        match self.requests.get(&target) {
            Some(request) if request.id == request_id => self.requests.remove(&target),
            _ => None,
        }
    }

    /// Drops every request `player` sent or received.
    pub fn remove_involving<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        player: PlayerId,
    ) -> Vec<PendingRequest> {
        let targets: Vec<PlayerId> = self
            .requests
            .values()
            .filter(|r| r.initiator == player || r.target == player)
            .map(|r| r.target)
            .collect();

        targets
            .into_iter()
            .filter_map(|target| self.pop(ctx, target))
            .collect()
    }
}

/// Operations of modes where one player challenges or invites another.
pub trait ChallengeProtocol {
    fn request<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        initiator: PlayerId,
        target: PlayerId,
    ) -> Result<(), GameError>;

    fn accept<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        target: PlayerId,
    ) -> Result<(), GameError>;

    fn decline<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        target: PlayerId,
    ) -> Result<(), GameError>;

    /// Timer callback for a request that may already be gone.
    fn expire<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        kind: RequestKind,
        target: PlayerId,
        request_id: u64,
    );
}

/// Checks shared by every new request, before any table is consulted.
pub fn validate_new_request<H: Collaborators>(
    ctx: &Context<H>,
    initiator: PlayerId,
    target: PlayerId,
) -> Result<(), GameError> {
    if initiator == target {
        return Err(GameError::SelfTarget);
    }
    if ctx.in_run(initiator) {
        return Err(GameError::AlreadyInRun);
    }
    if !ctx.host.is_online(target) {
        return Err(GameError::UnknownPlayer(ctx.name(target)));
    }
    if ctx.in_run(target) {
        return Err(GameError::TargetInRun(ctx.name(target)));
    }
    Ok(())
}

/// Teammates for a two-versus-two between `initiator` and `target`, if both
/// picked one and all four players are distinct, online and free.
pub fn team_pair<H: Collaborators>(
    ctx: &Context<H>,
    initiator: PlayerId,
    target: PlayerId,
) -> Option<(PlayerId, PlayerId)> {
    let initiator_mate = *ctx.teammates.get(&initiator)?;
    let target_mate = *ctx.teammates.get(&target)?;

    let players = [initiator, target, initiator_mate, target_mate];
    for (i, a) in players.iter().enumerate() {
        if players[i + 1..].contains(a) {
            return None;
        }
    }

    if !ctx.is_available(initiator_mate) || !ctx.is_available(target_mate) {
        return None;
    }
    Some((initiator_mate, target_mate))
}
