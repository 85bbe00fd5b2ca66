// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Scoped ownership of a membership handle.
//!
//! A [ReleaseGuard] is created the moment a membership service hands out a handle,
//! and releases that handle exactly once: either when [ReleaseGuard::release] is
//! called explicitly or when the guard is dropped (normal scope exit, an error
//! path during the join, or unwinding). The explicit release and the drop may
//! race, the loser is a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::MembershipService;

/// Owns a membership handle and releases it exactly once
pub struct ReleaseGuard<S: MembershipService> {
    service: Arc<S>,
    handle: S::Handle,
    released: AtomicBool,
}

impl<S: MembershipService> ReleaseGuard<S> {
    /// Take ownership of `handle`, which was created by `service`
    pub fn new(service: Arc<S>, handle: S::Handle) -> Self {
        Self {
            service,
            handle,
            released: AtomicBool::new(false),
        }
    }

    /// The service which created the guarded handle
    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// The guarded handle
    pub fn handle(&self) -> &S::Handle {
        &self.handle
    }

    /// Whether the handle has been released already
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Release the handle. A failure to release is logged and swallowed.
    ///
    /// Returns [true] if this call released the handle, [false] if it had been
    /// released before
    pub fn release(&self) -> bool {
        if self
            .released
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        if let Err(err) = self.service.release_handle(&self.handle) {
            log::error!("Error releasing membership handle: {err}");
        }
        true
    }
}

impl<S: MembershipService> Drop for ReleaseGuard<S> {
    fn drop(&mut self) {
        if self.release() {
            log::debug!("Membership handle released on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::{GroupDescriptor, MemberIdentity, RendezvousErr};

    /// Counts releases, optionally failing every one of them
    #[derive(Default)]
    struct CountingService {
        releases: AtomicUsize,
        fail_release: bool,
    }

    #[async_trait::async_trait]
    impl MembershipService for CountingService {
        type Handle = MemberIdentity;

        async fn create_handle(
            &self,
            _descriptor: &GroupDescriptor,
            tag: &str,
        ) -> Result<Self::Handle, RendezvousErr> {
            Ok(MemberIdentity::new(0, tag))
        }

        async fn wait_until_group_closed(&self, _: &Self::Handle) -> Result<(), RendezvousErr> {
            Ok(())
        }

        async fn list_members(
            &self,
            handle: &Self::Handle,
        ) -> Result<Vec<MemberIdentity>, RendezvousErr> {
            Ok(vec![handle.clone()])
        }

        fn local_identity(&self, handle: &Self::Handle) -> MemberIdentity {
            handle.clone()
        }

        async fn signal_termination(&self, _: &Self::Handle) -> Result<(), RendezvousErr> {
            Ok(())
        }

        async fn wait_until_terminated(&self, _: &Self::Handle) -> Result<(), RendezvousErr> {
            Ok(())
        }

        fn release_handle(&self, _: &Self::Handle) -> Result<(), RendezvousErr> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            if self.fail_release {
                Err(RendezvousErr::ReleaseFailure("socket already gone".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_release_is_idempotent() {
        let service = Arc::new(CountingService::default());
        let guard = ReleaseGuard::new(service.clone(), MemberIdentity::new(1, "a"));

        assert!(!guard.is_released());
        assert!(guard.release());
        assert!(guard.is_released());
        assert!(!guard.release());

        // the drop after an explicit release is a no-op
        drop(guard);
        assert_eq!(1, service.releases.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_releases() {
        let service = Arc::new(CountingService::default());
        {
            let _guard = ReleaseGuard::new(service.clone(), MemberIdentity::new(1, "a"));
        }
        assert_eq!(1, service.releases.load(Ordering::SeqCst));
    }

    #[test]
    fn test_release_failure_is_swallowed() {
        let service = Arc::new(CountingService {
            fail_release: true,
            ..Default::default()
        });
        let guard = ReleaseGuard::new(service.clone(), MemberIdentity::new(1, "a"));
        assert!(guard.release());
        drop(guard);
        assert_eq!(1, service.releases.load(Ordering::SeqCst));
    }

    #[test]
    fn test_concurrent_release_happens_once() {
        let service = Arc::new(CountingService::default());
        let guard = Arc::new(ReleaseGuard::new(service.clone(), MemberIdentity::new(1, "a")));

        let threads = (0..8)
            .map(|_| {
                let guard = guard.clone();
                std::thread::spawn(move || guard.release())
            })
            .collect::<Vec<_>>();
        let winners = threads
            .into_iter()
            .map(|t| t.join().expect("Release thread panicked"))
            .filter(|released| *released)
            .count();

        assert_eq!(1, winners);
        drop(guard);
        assert_eq!(1, service.releases.load(Ordering::SeqCst));
    }
}
