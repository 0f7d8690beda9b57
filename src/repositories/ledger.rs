use crate::models::{ActivityEntry, Bet, LeagueMember, LeagueSettings, Wager};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Working set of one store transaction: a bet, its league, every wager on
/// it and every member of the league.
///
/// Mutable accessors mark records dirty; the store writes back only dirty
/// records together with the collected activity entries.
#[derive(Debug, Clone)]
pub struct BetLedger {
    league: LeagueSettings,
    bet: Bet,
    wagers: Vec<Wager>,
    members: BTreeMap<Uuid, LeagueMember>,
    bet_dirty: bool,
    dirty_wagers: BTreeSet<Uuid>,
    dirty_members: BTreeSet<Uuid>,
    activity: Vec<ActivityEntry>,
}

/// Records a committed ledger writes back
#[derive(Debug, Clone, Default)]
pub struct LedgerChanges {
    pub bet: Option<Bet>,
    pub wagers: Vec<Wager>,
    pub members: Vec<LeagueMember>,
    pub activity: Vec<ActivityEntry>,
}

impl LedgerChanges {
    pub fn is_empty(&self) -> bool {
        self.bet.is_none()
            && self.wagers.is_empty()
            && self.members.is_empty()
            && self.activity.is_empty()
    }
}

impl BetLedger {
    pub fn new(
        league: LeagueSettings,
        bet: Bet,
        wagers: Vec<Wager>,
        members: impl IntoIterator<Item = LeagueMember>,
    ) -> Self {
        Self {
            league,
            bet,
            wagers,
            members: members.into_iter().map(|m| (m.user_id, m)).collect(),
            bet_dirty: false,
            dirty_wagers: BTreeSet::new(),
            dirty_members: BTreeSet::new(),
            activity: Vec::new(),
        }
    }

    pub fn league(&self) -> &LeagueSettings {
        &self.league
    }

    pub fn bet(&self) -> &Bet {
        &self.bet
    }

    pub fn bet_mut(&mut self) -> &mut Bet {
        self.bet_dirty = true;
        &mut self.bet
    }

    pub fn wagers(&self) -> &[Wager] {
        &self.wagers
    }

    pub fn wager_of(&self, user_id: Uuid) -> Option<&Wager> {
        self.wagers.iter().find(|w| w.user_id == user_id)
    }

    pub fn wager_mut(&mut self, wager_id: Uuid) -> Option<&mut Wager> {
        let wager = self.wagers.iter_mut().find(|w| w.id == wager_id)?;
        self.dirty_wagers.insert(wager_id);
        Some(wager)
    }

    pub fn add_wager(&mut self, wager: Wager) {
        self.dirty_wagers.insert(wager.id);
        self.wagers.push(wager);
    }

    pub fn pending_wagers(&self) -> impl Iterator<Item = &Wager> {
        self.wagers.iter().filter(|w| w.is_pending())
    }

    pub fn member(&self, user_id: Uuid) -> Option<&LeagueMember> {
        self.members.get(&user_id)
    }

    pub fn member_mut(&mut self, user_id: Uuid) -> Option<&mut LeagueMember> {
        let member = self.members.get_mut(&user_id)?;
        self.dirty_members.insert(user_id);
        Some(member)
    }

    /// Distinct users holding a wager on the bet
    pub fn wager_holders(&self) -> BTreeSet<Uuid> {
        self.wagers.iter().map(|w| w.user_id).collect()
    }

    pub fn record(&mut self, entry: ActivityEntry) {
        self.activity.push(entry);
    }

    pub fn activity(&self) -> &[ActivityEntry] {
        &self.activity
    }

    /// Number of records (bet, wagers, members) the commit would write
    pub fn write_count(&self) -> usize {
        usize::from(self.bet_dirty) + self.dirty_wagers.len() + self.dirty_members.len()
    }

    pub fn into_changes(self) -> LedgerChanges {
        let BetLedger {
            bet,
            wagers,
            mut members,
            bet_dirty,
            dirty_wagers,
            dirty_members,
            activity,
            ..
        } = self;

        LedgerChanges {
            bet: bet_dirty.then_some(bet),
            wagers: wagers
                .into_iter()
                .filter(|w| dirty_wagers.contains(&w.id))
                .collect(),
            members: dirty_members
                .iter()
                .filter_map(|id| members.remove(id))
                .collect(),
            activity,
        }
    }
}
