//! Night resolution: the traitors' conclave picks a victim.

use crate::error::GameError;
use crate::events::GameEvent;
use crate::game::Game;
use log::info;
use shared::{Phase, PlayerId};

impl Game {
    /// Eliminates `victim` on behalf of the traitors and opens the roundtable.
    ///
    /// Checked in order: night phase, living traitor actor, not the first
    /// night, conclave window open, living non-traitor victim.
    pub fn kill(
        &mut self,
        actor: PlayerId,
        victim: PlayerId,
    ) -> Result<Vec<GameEvent>, GameError> {
        self.ensure_not_over()?;
        if self.state.phase != Phase::Night {
            return Err(GameError::NotNightPhase);
        }
        if !self.is_traitor(actor) || !self.roster.is_alive(actor) {
            return Err(GameError::NotTraitor);
        }
        if self.state.day <= 1 {
            return Err(GameError::FirstNightProtected);
        }
        if !self.config.conclave.is_open(self.clock.as_ref()) {
            let window = self.config.conclave.to_string();
            return Err(GameError::OutsideConclaveWindow(window));
        }
        if !self.roster.is_alive(victim) || self.is_traitor(victim) {
            return Err(GameError::InvalidVictim);
        }

        info!(
            "Night {}: the traitors eliminate {}",
            self.state.day,
            self.roster.display_name(victim)
        );
        self.state.last_night_victim = Some(victim);
        let mut events = vec![GameEvent::NightVictim { victim }];
        events.extend(self.eliminate(victim));

        if self.state.phase != Phase::GameOver {
            self.state.phase = Phase::Roundtable;
            events.push(GameEvent::PhaseChanged {
                phase: Phase::Roundtable,
            });
        }
        Ok(events)
    }
}
