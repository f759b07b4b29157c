use crate::context::Context;
use crate::error::GameError;
use crate::host::Collaborators;
use crate::lifecycle::{announce_and_finish, start_run, RunLifecycle};
use crate::model::RunVariant;
use crate::negotiation::{validate_new_request, ChallengeProtocol, PendingRequest, RequestTable};
use crate::timers::RequestKind;
use shared::{GameMode, PlayerId};
use std::collections::HashMap;

/// Two players who agreed to play together. Only the leader can start the
/// coop or challenge another coop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoopGroup {
    pub leader: PlayerId,
    pub partner: PlayerId,
}

impl CoopGroup {
    pub fn contains(&self, player: PlayerId) -> bool {
        self.leader == player || self.partner == player
    }

    pub fn members(&self) -> [PlayerId; 2] {
        [self.leader, self.partner]
    }
}

/// Two players sharing one set of worlds.
///
/// An accepted invite forms a [`CoopGroup`]. The leader then either starts
/// a cooperative run or challenges another group's leader to a team battle.
/// Team battles between coops run as battle-mode runs.
#[derive(Debug)]
pub struct CoopMode {
    invites: RequestTable,
    duels: RequestTable,
    groups: HashMap<PlayerId, CoopGroup>,
}

impl Default for CoopMode {
    fn default() -> Self {
        Self::new()
    }
}

impl CoopMode {
    pub fn new() -> Self {
        Self {
            invites: RequestTable::new(GameMode::Coop, RequestKind::Invite),
            duels: RequestTable::new(GameMode::Coop, RequestKind::Duel),
            groups: HashMap::new(),
        }
    }

    pub fn group_of(&self, player: PlayerId) -> Option<CoopGroup> {
        self.groups.values().find(|g| g.contains(player)).copied()
    }

    pub fn invites(&self) -> &RequestTable {
        &self.invites
    }

    pub fn duels(&self) -> &RequestTable {
        &self.duels
    }

    /// Challenges the coop led by `target` to a team battle.
    pub fn duel<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        initiator: PlayerId,
        target: PlayerId,
    ) -> Result<(), GameError> {
        if initiator == target {
            return Err(GameError::SelfTarget);
        }
        let own = self
            .groups
            .get(&initiator)
            .copied()
            .ok_or(GameError::NotCoopLeader)?;
        let other = self
            .groups
            .get(&target)
            .copied()
            .ok_or_else(|| GameError::TargetNotCoopLeader(ctx.name(target)))?;

        if own.members().iter().any(|p| ctx.in_run(*p)) {
            return Err(GameError::AlreadyInRun);
        }
        if other.members().iter().any(|p| ctx.in_run(*p)) {
            return Err(GameError::TargetInRun(ctx.name(target)));
        }
        self.duels.check_free(ctx, initiator, target)?;

        self.duels.insert(ctx, initiator, target, true);

        let initiator_name = ctx.name(initiator);
        let target_name = ctx.name(target);
        ctx.notify_all(
            &own.members(),
            &format!("Your coop challenged {}'s coop to a battle.", target_name),
        );
        ctx.notify(
            other.partner,
            &format!("{}'s coop challenged your coop to a battle.", initiator_name),
        );
        ctx.notify(
            target,
            &format!(
                "{}'s coop challenged your coop to a battle! Type 'coop accept' or 'coop decline'.",
                initiator_name
            ),
        );
        Ok(())
    }

    fn accept_invite<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        target: PlayerId,
    ) -> Result<(), GameError> {
        let request = self.invites.pop_and_validate(ctx, target)?;
        let leader = request.initiator;

        for player in [leader, target] {
            if self.group_of(player).is_some() {
                return Err(GameError::AlreadyInCoop(ctx.name(player)));
            }
        }

        self.groups.insert(
            leader,
            CoopGroup {
                leader,
                partner: target,
            },
        );

        let leader_name = ctx.name(leader);
        let partner_name = ctx.name(target);
        ctx.notify(
            leader,
            &format!(
                "{} joined your coop! Type 'coop start' to begin or 'coop duel <leader>' to challenge another coop.",
                partner_name
            ),
        );
        ctx.notify(
            target,
            &format!("You joined {}'s coop. Waiting for the leader to start.", leader_name),
        );
        Ok(())
    }

    fn accept_duel<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        target: PlayerId,
    ) -> Result<(), GameError> {
        let request = self.duels.pop_and_validate(ctx, target)?;

        let challenger = self
            .groups
            .get(&request.initiator)
            .copied()
            .ok_or(GameError::OtherPlayerUnavailable)?;
        let accepter = self
            .groups
            .get(&target)
            .copied()
            .ok_or(GameError::NotCoopLeader)?;
        if !ctx.is_available(challenger.partner) || !ctx.is_available(accepter.partner) {
            return Err(GameError::OtherPlayerUnavailable);
        }

        self.groups.remove(&challenger.leader);
        self.groups.remove(&accepter.leader);

        start_run(
            ctx,
            GameMode::Battle,
            RunVariant::TeamDuel,
            vec![
                challenger.leader,
                challenger.partner,
                accepter.leader,
                accepter.partner,
            ],
        )?;
        Ok(())
    }

    fn dissolve<H: Collaborators>(&mut self, ctx: &mut Context<H>, leader: PlayerId, leaver: PlayerId) {
        let Some(group) = self.groups.remove(&leader) else {
            return;
        };
        let other = if group.leader == leaver {
            group.partner
        } else {
            group.leader
        };
        let text = format!("{} left, your coop was disbanded.", ctx.name(leaver));
        ctx.notify(other, &text);
    }

    /// Disbands `player`'s coop and drops their pending invites and duels.
    pub fn on_quit<H: Collaborators>(&mut self, ctx: &mut Context<H>, player: PlayerId) {
        if let Some(group) = self.group_of(player) {
            self.dissolve(ctx, group.leader, player);
        }

        let mut dropped: Vec<PendingRequest> = self.invites.remove_involving(ctx, player);
        dropped.extend(self.duels.remove_involving(ctx, player));
        for request in dropped {
            let other = if request.initiator == player {
                request.target
            } else {
                request.initiator
            };
            let text = format!("{} left, the coop request was cancelled.", ctx.name(player));
            ctx.notify(other, &text);
        }
    }
}

impl RunLifecycle for CoopMode {
    fn mode(&self) -> GameMode {
        GameMode::Coop
    }

    /// Starts a cooperative run for the coop led by `initiator`.
    fn start<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        initiator: PlayerId,
    ) -> Result<(), GameError> {
        let group = self
            .groups
            .get(&initiator)
            .copied()
            .ok_or(GameError::NotCoopLeader)?;
        if ctx.in_run(initiator) {
            return Err(GameError::AlreadyInRun);
        }
        if !ctx.is_available(group.partner) {
            return Err(GameError::OtherPlayerUnavailable);
        }

        self.groups.remove(&initiator);
        start_run(
            ctx,
            GameMode::Coop,
            RunVariant::Coop,
            vec![group.leader, group.partner],
        )?;
        Ok(())
    }

    /// Either member finishing wins the run for both.
    fn stop<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        winner: PlayerId,
    ) -> Result<(), GameError> {
        let run = ctx
            .registry
            .get_active_run(winner)
            .ok_or(GameError::NotInRun)?;
        let id = run.id;
        let everyone = run.participants();
        announce_and_finish(ctx, id, &everyone, &[])
    }
}

impl ChallengeProtocol for CoopMode {
    fn request<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        initiator: PlayerId,
        target: PlayerId,
    ) -> Result<(), GameError> {
        validate_new_request(ctx, initiator, target)?;
        for player in [initiator, target] {
            if self.group_of(player).is_some() {
                return Err(GameError::AlreadyInCoop(ctx.name(player)));
            }
        }
        self.invites.check_free(ctx, initiator, target)?;

        self.invites.insert(ctx, initiator, target, false);

        let initiator_name = ctx.name(initiator);
        let target_name = ctx.name(target);
        ctx.notify(initiator, &format!("Coop request sent to {}.", target_name));
        ctx.notify(
            target,
            &format!(
                "{} invited you to a coop! Type 'coop accept' or 'coop decline'.",
                initiator_name
            ),
        );
        Ok(())
    }

    /// Accepts a pending duel first, then a pending invite.
    fn accept<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        target: PlayerId,
    ) -> Result<(), GameError> {
        if self.duels.has_inbound(target) {
            self.accept_duel(ctx, target)
        } else {
            self.accept_invite(ctx, target)
        }
    }

    fn decline<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        target: PlayerId,
    ) -> Result<(), GameError> {
        let target_name = ctx.name(target);

        if let Some(request) = self.duels.pop(ctx, target) {
            let initiator_name = ctx.name(request.initiator);
            ctx.notify(
                target,
                &format!("You declined the coop battle from {}.", initiator_name),
            );
            if let Some(group) = self.groups.get(&request.initiator).copied() {
                ctx.notify_all(
                    &group.members(),
                    &format!("{} declined your coop battle.", target_name),
                );
            }
            if let Some(group) = self.groups.get(&target).copied() {
                ctx.notify(
                    group.partner,
                    &format!(
                        "{} declined the coop battle from {}.",
                        target_name, initiator_name
                    ),
                );
            }
            return Ok(());
        }

        let request = self
            .invites
            .pop(ctx, target)
            .ok_or(GameError::NoPendingRequest)?;
        let initiator_name = ctx.name(request.initiator);
        ctx.notify(
            target,
            &format!("You declined the coop request from {}.", initiator_name),
        );
        ctx.notify(
            request.initiator,
            &format!("{} declined your coop request.", target_name),
        );
        Ok(())
    }

    fn expire<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        kind: RequestKind,
        target: PlayerId,
        request_id: u64,
    ) {
        let table = match kind {
            RequestKind::Invite => &mut self.invites,
            RequestKind::Duel => &mut self.duels,
        };
        let Some(request) = table.expire(target, request_id) else {
            return;
        };

        let what = match kind {
            RequestKind::Invite => "coop request",
            RequestKind::Duel => "coop battle",
        };
        let initiator_name = ctx.name(request.initiator);
        let target_name = ctx.name(target);
        ctx.notify(
            request.initiator,
            &format!("Your {} to {} expired.", what, target_name),
        );
        ctx.notify(
            target,
            &format!("The {} from {} expired.", what, initiator_name),
        );

        if kind == RequestKind::Duel {
            let partners: Vec<PlayerId> = [request.initiator, target]
                .iter()
                .filter_map(|leader| self.groups.get(leader))
                .map(|group| group.partner)
                .collect();
            ctx.notify_all(
                &partners,
                &format!(
                    "The coop battle between {} and {} expired.",
                    initiator_name, target_name
                ),
            );
        }
    }
}
