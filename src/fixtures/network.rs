//! In-memory referral network
//!
//! A [`ReferralDirectory`] backed by a directed petgraph, with interior
//! mutability so tests can grow the network or change ranks while an
//! engine holds a shared reference to it.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
};
use rustc_hash::FxHashMap;

use crate::{
    directory::{Club, Rank, ReferralDirectory, UserId, UserProfile, UserStatus},
    fixtures::FixtureError,
};

#[derive(Debug, Clone)]
struct Member {
    id: UserId,
    joined_at: DateTime<Utc>,
    rank: Option<Rank>,
    club: Option<Club>,
    status: UserStatus,
}

#[derive(Debug, Default)]
struct NetworkInner {
    graph: DiGraph<Member, ()>,
    index: FxHashMap<UserId, NodeIndex>,
}

/// A mutable in-memory referral network.
#[derive(Debug, Default)]
pub struct InMemoryNetwork {
    inner: RwLock<NetworkInner>,
}

impl InMemoryNetwork {
    /// Create an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user, optionally linking them under their recruiter.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::DuplicateUser`] if the id already exists,
    /// or [`FixtureError::UnknownUser`] if the recruiter does not.
    pub fn add_user(
        &self,
        id: UserId,
        joined_at: DateTime<Utc>,
        referred_by: Option<UserId>,
    ) -> Result<(), FixtureError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if inner.index.contains_key(&id) {
            return Err(FixtureError::DuplicateUser(id));
        }

        let parent = referred_by
            .map(|parent| {
                inner
                    .index
                    .get(&parent)
                    .copied()
                    .ok_or(FixtureError::UnknownUser(parent))
            })
            .transpose()?;

        let node = inner.graph.add_node(Member {
            id,
            joined_at,
            rank: None,
            club: None,
            status: UserStatus::Active,
        });

        inner.index.insert(id, node);

        if let Some(parent) = parent {
            inner.graph.add_edge(parent, node, ());
        }

        Ok(())
    }

    /// Add a referral edge between two existing users.
    ///
    /// No cycle check on purpose: tests use this to build the malformed
    /// graphs the traversal must survive.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::UnknownUser`] if either end does not exist.
    pub fn link(&self, parent: UserId, child: UserId) -> Result<(), FixtureError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        let from = *inner
            .index
            .get(&parent)
            .ok_or(FixtureError::UnknownUser(parent))?;
        let to = *inner
            .index
            .get(&child)
            .ok_or(FixtureError::UnknownUser(child))?;

        inner.graph.add_edge(from, to, ());

        Ok(())
    }

    /// Assign a rank to a user.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::UnknownUser`] if the user does not exist.
    pub fn set_rank(&self, id: UserId, rank: Option<Rank>) -> Result<(), FixtureError> {
        self.update(id, |member| member.rank = rank)
    }

    /// Assign a club to a user.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::UnknownUser`] if the user does not exist.
    pub fn set_club(&self, id: UserId, club: Option<Club>) -> Result<(), FixtureError> {
        self.update(id, |member| member.club = club)
    }

    /// Mark a user's account as blocked.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::UnknownUser`] if the user does not exist.
    pub fn block(&self, id: UserId) -> Result<(), FixtureError> {
        self.update(id, |member| member.status = UserStatus::Blocked)
    }

    fn update(
        &self,
        id: UserId,
        apply: impl FnOnce(&mut Member),
    ) -> Result<(), FixtureError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        let node = *inner.index.get(&id).ok_or(FixtureError::UnknownUser(id))?;

        inner
            .graph
            .node_weight_mut(node)
            .map(apply)
            .ok_or(FixtureError::UnknownUser(id))
    }
}

impl ReferralDirectory for InMemoryNetwork {
    fn direct_children(&self, user: UserId) -> Vec<UserId> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);

        let Some(node) = inner.index.get(&user) else {
            return Vec::new();
        };

        let mut children: Vec<UserId> = inner
            .graph
            .neighbors_directed(*node, Direction::Outgoing)
            .filter_map(|child| inner.graph.node_weight(child))
            .map(|member| member.id)
            .collect();

        children.sort_unstable();
        children
    }

    fn profile(&self, user: UserId) -> Option<UserProfile> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);

        let node = *inner.index.get(&user)?;
        let member = inner.graph.node_weight(node)?;

        let referred_by = inner
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .find_map(|parent| inner.graph.node_weight(parent))
            .map(|parent| parent.id);

        Some(UserProfile {
            joined_at: member.joined_at,
            rank: member.rank,
            club: member.club,
            referred_by,
            status: member.status,
        })
    }
}
