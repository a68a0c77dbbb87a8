//! Player and team lookup used by the identity argument types.

use std::{cell::RefCell, rc::Rc};

use command_contract::{Player, Team};

/// Host service listing the identities commands can target.
pub trait Roster {
    /// Currently connected players.
    fn players(&self) -> Vec<Player>;

    /// Known teams.
    fn teams(&self) -> Vec<Team>;
}

#[derive(Debug, Clone, Copy, Default)]
/// Empty roster for hosts without player identities.
pub struct NoopRoster;

impl Roster for NoopRoster {
    fn players(&self) -> Vec<Player> {
        Vec::new()
    }

    fn teams(&self) -> Vec<Team> {
        Vec::new()
    }
}

#[derive(Debug, Default)]
struct MemoryRosterState {
    players: Vec<Player>,
    teams: Vec<Team>,
}

#[derive(Debug, Clone, Default)]
/// In-memory roster shared by clones.
pub struct MemoryRoster {
    inner: Rc<RefCell<MemoryRosterState>>,
}

impl MemoryRoster {
    /// Adds or replaces a player by id.
    pub fn add_player(&self, player: Player) {
        let mut state = self.inner.borrow_mut();
        state.players.retain(|existing| existing.id != player.id);
        state.players.push(player);
    }

    /// Removes a player by id.
    pub fn remove_player(&self, id: u64) {
        self.inner.borrow_mut().players.retain(|player| player.id != id);
    }

    /// Adds or replaces a team by name.
    pub fn add_team(&self, team: Team) {
        let mut state = self.inner.borrow_mut();
        state.teams.retain(|existing| existing.name != team.name);
        state.teams.push(team);
    }
}

impl Roster for MemoryRoster {
    fn players(&self) -> Vec<Player> {
        self.inner.borrow().players.clone()
    }

    fn teams(&self) -> Vec<Team> {
        self.inner.borrow().teams.clone()
    }
}
