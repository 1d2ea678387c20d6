//! Day-1 recruitment: the traitors may offer one faithful a place among them.

use crate::error::{GameError, InvitationFault};
use crate::events::GameEvent;
use crate::game::{Game, PendingInvitation};
use log::info;
use shared::{Faction, Phase, PlayerId};

impl Game {
    pub fn invite(
        &mut self,
        actor: PlayerId,
        target: PlayerId,
    ) -> Result<Vec<GameEvent>, GameError> {
        self.ensure_not_over()?;
        let fault = if self.state.phase != Phase::Invitation {
            Some(InvitationFault::WrongPhase)
        } else if !self.is_traitor(actor) {
            Some(InvitationFault::NotTraitor)
        } else if self.state.pending_invitation.is_some() {
            Some(InvitationFault::AlreadyPending)
        } else if !self.state.faithful_ids.contains(&target) || !self.roster.is_alive(target) {
            Some(InvitationFault::InvalidTarget)
        } else {
            None
        };
        if let Some(fault) = fault {
            return Err(GameError::IllegalInvitation(fault));
        }

        self.state.pending_invitation = Some(PendingInvitation {
            target,
            accepted: None,
        });
        info!(
            "{} invited {} to join the traitors",
            self.roster.display_name(actor),
            self.roster.display_name(target)
        );
        Ok(vec![GameEvent::InvitationOffered { target }])
    }

    /// Answers the pending invitation. Either answer ends the invitation
    /// phase and starts the first night.
    pub fn respond_invitation(
        &mut self,
        actor: PlayerId,
        accept: bool,
    ) -> Result<Vec<GameEvent>, GameError> {
        self.ensure_not_over()?;
        let invited = matches!(
            &self.state.pending_invitation,
            Some(pending) if pending.target == actor
        );
        if self.state.phase != Phase::Invitation || !invited {
            return Err(GameError::NotInvited);
        }

        if accept {
            self.roster.set_faction(actor, Faction::Traitor);
            self.state.faithful_ids.remove(&actor);
            self.state.traitor_ids.insert(actor);
        }
        self.state.pending_invitation = None;
        self.state.last_invitation_outcome = Some(accept);
        info!(
            "{} {} the invitation",
            self.roster.display_name(actor),
            if accept { "accepted" } else { "rejected" }
        );

        let mut events = vec![GameEvent::InvitationResolved {
            target: actor,
            accepted: accept,
        }];
        self.enter_night(&mut events);
        Ok(events)
    }
}
