//! Transaction round coordination contract
//!
//! The scheduler does not manage database connections itself. It talks to a
//! `TransactionManager` that tracks whether an ambient transaction round is
//! open and which label owns it. `InMemoryRounds` is a self-contained
//! implementation with owner checks and commit-or-idle listeners.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::debug;
use crate::error::{SchedulerError, SchedulerResult};

/// Ambient transaction rounds as seen by the scheduler
pub trait TransactionManager {
    fn has_open_round(&self) -> bool;

    /// Label currently owning the open round, if any
    fn round_owner(&self) -> Option<String>;

    /// Begin a round owned by `owner`
    fn open_round(&mut self, owner: &str) -> SchedulerResult<()>;

    /// Commit and end the round; `owner` must own it
    fn close_round(&mut self, owner: &str) -> SchedulerResult<()>;

    /// Roll back and end the round; `owner` must own it
    fn rollback_round(&mut self, owner: &str) -> SchedulerResult<()>;

    /// Hand ownership of the open round to `owner`
    fn set_round_owner(&mut self, owner: &str) -> SchedulerResult<()>;

    /// Set the open round aside without ending it, leaving no round open.
    /// Returns the owner of the suspended round.
    fn suspend_round(&mut self) -> SchedulerResult<String>;

    /// Reinstate the most recently suspended round; no round may be open
    fn resume_round(&mut self) -> SchedulerResult<()>;
}

type Listener = Box<dyn FnOnce()>;

struct SuspendedRound {
    owner: String,
    listeners: Vec<Listener>,
}

#[derive(Default)]
struct RoundState {
    owner: Option<String>,
    commits: u64,
    rollbacks: u64,
    listeners: Vec<Listener>,
    suspended: Vec<SuspendedRound>,
}

/// In-process round tracker
///
/// Cloning yields another handle to the same state, so a caller can keep one
/// handle for inspection while the scheduler owns another.
#[derive(Clone, Default)]
pub struct InMemoryRounds {
    state: Rc<RefCell<RoundState>>,
}

impl InMemoryRounds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rounds committed so far
    pub fn commits(&self) -> u64 {
        self.state.borrow().commits
    }

    /// Number of rounds rolled back so far
    pub fn rollbacks(&self) -> u64 {
        self.state.borrow().rollbacks
    }

    /// Run `callback` once no round is open: now if idle, otherwise right
    /// after the current round commits. Dropped if the round rolls back.
    pub fn on_commit_or_idle<F>(&self, callback: F)
    where
        F: FnOnce() + 'static,
    {
        let idle = self.state.borrow().owner.is_none();
        if idle {
            callback();
        } else {
            self.state.borrow_mut().listeners.push(Box::new(callback));
        }
    }

    fn check_owner(&self, owner: &str, operation: &str) -> SchedulerResult<()> {
        let state = self.state.borrow();
        match state.owner.as_deref() {
            None => Err(SchedulerError::NoOpenRound {
                operation: operation.to_string(),
            }),
            Some(current) if current != owner => Err(SchedulerError::RoundOwnership {
                expected: current.to_string(),
                actual: owner.to_string(),
            }),
            Some(_) => Ok(()),
        }
    }
}

impl TransactionManager for InMemoryRounds {
    fn has_open_round(&self) -> bool {
        self.state.borrow().owner.is_some()
    }

    fn round_owner(&self) -> Option<String> {
        self.state.borrow().owner.clone()
    }

    fn open_round(&mut self, owner: &str) -> SchedulerResult<()> {
        let mut state = self.state.borrow_mut();
        if let Some(current) = state.owner.as_ref() {
            return Err(SchedulerError::RoundAlreadyOpen {
                owner: current.clone(),
            });
        }
        debug!(owner, "opening transaction round");
        state.owner = Some(owner.to_string());
        Ok(())
    }

    fn close_round(&mut self, owner: &str) -> SchedulerResult<()> {
        self.check_owner(owner, "close_round")?;

        let listeners = {
            let mut state = self.state.borrow_mut();
            state.owner = None;
            state.commits += 1;
            std::mem::take(&mut state.listeners)
        };
        debug!(owner, listeners = listeners.len(), "committed transaction round");

        // Listeners may reenter this tracker, so no borrow is held here
        for listener in listeners {
            listener();
        }
        Ok(())
    }

    fn rollback_round(&mut self, owner: &str) -> SchedulerResult<()> {
        self.check_owner(owner, "rollback_round")?;

        let mut state = self.state.borrow_mut();
        state.owner = None;
        state.rollbacks += 1;
        state.listeners.clear();
        debug!(owner, "rolled back transaction round");
        Ok(())
    }

    fn set_round_owner(&mut self, owner: &str) -> SchedulerResult<()> {
        let mut state = self.state.borrow_mut();
        if state.owner.is_none() {
            return Err(SchedulerError::NoOpenRound {
                operation: "set_round_owner".to_string(),
            });
        }
        state.owner = Some(owner.to_string());
        Ok(())
    }

    fn suspend_round(&mut self) -> SchedulerResult<String> {
        let mut state = self.state.borrow_mut();
        let Some(owner) = state.owner.take() else {
            return Err(SchedulerError::NoOpenRound {
                operation: "suspend_round".to_string(),
            });
        };
        let listeners = std::mem::take(&mut state.listeners);
        state.suspended.push(SuspendedRound {
            owner: owner.clone(),
            listeners,
        });
        debug!(owner = %owner, "suspended transaction round");
        Ok(owner)
    }

    fn resume_round(&mut self) -> SchedulerResult<()> {
        let mut state = self.state.borrow_mut();
        if let Some(current) = state.owner.as_ref() {
            return Err(SchedulerError::RoundAlreadyOpen {
                owner: current.clone(),
            });
        }
        let Some(round) = state.suspended.pop() else {
            return Err(SchedulerError::NoOpenRound {
                operation: "resume_round".to_string(),
            });
        };
        debug!(owner = %round.owner, "resumed transaction round");
        state.owner = Some(round.owner);
        state.listeners = round.listeners;
        Ok(())
    }
}

impl fmt::Debug for InMemoryRounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("InMemoryRounds")
            .field("owner", &state.owner)
            .field("commits", &state.commits)
            .field("rollbacks", &state.rollbacks)
            .field("listeners", &state.listeners.len())
            .field("suspended", &state.suspended.len())
            .finish()
    }
}
