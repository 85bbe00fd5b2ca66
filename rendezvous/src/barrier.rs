// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The group-wide termination barrier.
//!
//! Any member may signal termination, any number of times. Every member can wait
//! until some member signaled it. Signaling is best-effort from the caller's
//! point of view: the authoritative termination state lives in the membership
//! service, so a local failure to deliver the signal is logged and not returned.

use crate::session::SessionStatus;
use crate::{GroupSession, MembershipService, RendezvousErr};

impl<S: MembershipService> GroupSession<S> {
    /// Signal the group that the computation is done
    pub async fn terminate(&self) {
        if self.guard.is_released() {
            log::error!(
                "Could not terminate group {}, the session was released",
                self.descriptor
            );
            return;
        }
        match self
            .guard
            .service()
            .signal_termination(self.guard.handle())
            .await
        {
            Ok(()) => {
                log::debug!("Signaled termination of group {}", self.descriptor);
                self.advance_status(SessionStatus::TerminationSignaled);
            }
            Err(err) => {
                log::error!("Could not terminate group {}: {err}", self.descriptor);
            }
        }
    }

    /// Wait until some member of the group signaled termination. There is no
    /// timeout, wrap the call if a bounded wait is needed.
    ///
    /// Returns [Err(RendezvousErr)] if the session was released or the membership
    /// service stopped serving it, rather than waiting forever
    pub async fn wait_until_terminated(&self) -> Result<(), RendezvousErr> {
        if self.guard.is_released() {
            return Err(RendezvousErr::ServiceUnavailable(format!(
                "the session for group {} was released",
                self.descriptor
            )));
        }
        self.guard
            .service()
            .wait_until_terminated(self.guard.handle())
            .await?;
        log::debug!("Group {} terminated", self.descriptor);
        self.advance_status(SessionStatus::Terminated);
        Ok(())
    }
}
