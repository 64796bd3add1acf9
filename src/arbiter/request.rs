//! Resource request handling.
//!
//! # Responsibilities
//! - Walk the requested slots in ascending order
//! - Deny slots with an unexpired lease (status 0)
//! - Grant everything else (status 1), arming a fresh lease
//! - Tell a still-connected previous owner it was evicted (status 2)
//!   before the new owner hears about the grant
//! - Keep the acquisition-time map in step with ownership

use super::resources::ClaimOutcome;
use super::{Arbiter, Disposition, ServerEvent};
use crate::net::connection::ConnectionId;
use crate::observability::metrics;
use crate::protocol::{ResourceRequest, Response};

impl Arbiter {
    /// Handle a resource request from an authorized session.
    pub fn handle_resource_request(&self, id: ConnectionId, request: &ResourceRequest) -> Disposition {
        if self.rejects_requests() {
            tracing::debug!(connection_id = %id, "Resource request dropped: reject mode active");
            return Disposition::Continue;
        }

        let Some(Some(username)) = self.sessions.username(id) else {
            return Disposition::Continue;
        };
        if request.username != username {
            tracing::warn!(
                connection_id = %id,
                session_user = %username,
                claimed_user = %request.username,
                "Resource request for another user dropped"
            );
            return Disposition::Continue;
        }

        self.sessions.record_hold_hint(id, request.time_ms);
        let lease = self.z_time();

        for index in request.mask.slots() {
            // Replies go out under the slot lock so a concurrent free-all
            // cannot slip between the grant and its notice.
            let on_outcome = |outcome: &ClaimOutcome| match outcome {
                ClaimOutcome::Denied => {
                    tracing::debug!(connection_id = %id, username = %username, resource = index + 1, "Resource denied");
                    self.reply(id, Response::denied(username.as_str(), index));
                }
                ClaimOutcome::Granted { evicted } => {
                    if let Some(previous) = evicted {
                        tracing::info!(
                            username = %previous,
                            resource = index + 1,
                            new_owner = %username,
                            "Lapsed lease reassigned"
                        );
                        if self
                            .sessions
                            .send_to_user(previous, Response::evicted(previous.as_str(), index))
                        {
                            metrics::record_resource_response(crate::protocol::Status::Evicted);
                        }
                    }
                    tracing::info!(
                        connection_id = %id,
                        username = %username,
                        resource = index + 1,
                        lease_ms = lease.as_millis() as u64,
                        hold_hint_ms = request.time_ms,
                        "Resource granted"
                    );
                    self.reply(id, Response::granted(username.as_str(), index));
                }
            };
            let outcome = self.resources.claim_with(index, &username, lease, on_outcome);

            if matches!(outcome, ClaimOutcome::Granted { .. }) {
                self.resources.record_acquisition(&username);
                self.events.emit(ServerEvent::ResourcesChanged);
            }
        }

        self.resources.sweep_acquisitions();
        Disposition::Continue
    }

    fn reply(&self, id: ConnectionId, response: Response) {
        let status = response.status;
        if self.sessions.send_to(id, response) {
            metrics::record_resource_response(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::{Admitted, Outbound, Settings};
    use crate::protocol::RequestMask;
    use std::net::SocketAddr;
    use std::time::Duration;

    const Z_TIME: Duration = Duration::from_millis(5000);

    fn arbiter() -> Arbiter {
        Arbiter::new(Settings {
            client_limit: 10,
            permitted_users: vec!["alice".into(), "bob".into()],
            z_time: Z_TIME,
        })
    }

    fn login(arbiter: &Arbiter, last: u8, username: &str) -> Admitted {
        let conn = arbiter
            .admit(SocketAddr::from(([10, 0, 0, last], 5000)))
            .unwrap();
        assert_eq!(arbiter.handle_auth(conn.id, username), Disposition::Continue);
        conn
    }

    fn request(username: &str, mask: u32) -> ResourceRequest {
        ResourceRequest {
            username: username.into(),
            time_ms: 1000,
            mask: RequestMask::new(mask),
        }
    }

    fn drain(conn: &mut Admitted) -> Vec<Response> {
        let mut out = Vec::new();
        while let Ok(Outbound::Message(response)) = conn.outbox.try_recv() {
            out.push(response);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn grant_then_deny() {
        let arbiter = arbiter();
        let mut alice = login(&arbiter, 1, "alice");

        arbiter.handle_resource_request(alice.id, &request("alice", 0b0001));
        arbiter.handle_resource_request(alice.id, &request("alice", 0b0001));

        assert_eq!(
            drain(&mut alice),
            vec![Response::granted("alice", 0), Response::denied("alice", 0)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn multi_slot_request_is_answered_per_slot() {
        let arbiter = arbiter();
        let mut alice = login(&arbiter, 1, "alice");
        let mut bob = login(&arbiter, 2, "bob");

        arbiter.handle_resource_request(bob.id, &request("bob", 0b0100));
        arbiter.handle_resource_request(alice.id, &request("alice", 0b0111));

        assert_eq!(drain(&mut bob), vec![Response::granted("bob", 2)]);
        assert_eq!(
            drain(&mut alice),
            vec![
                Response::granted("alice", 0),
                Response::granted("alice", 1),
                Response::denied("alice", 2),
            ]
        );
        assert_eq!(
            arbiter.resource_owners(),
            [Some("alice".into()), Some("alice".into()), Some("bob".into()), None]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn lapsed_lease_evicts_previous_owner_first() {
        let arbiter = arbiter();
        let mut alice = login(&arbiter, 1, "alice");
        let mut bob = login(&arbiter, 2, "bob");

        arbiter.handle_resource_request(alice.id, &request("alice", 0b1000));
        drain(&mut alice);

        tokio::time::advance(Z_TIME).await;
        arbiter.handle_resource_request(bob.id, &request("bob", 0b1000));

        assert_eq!(drain(&mut alice), vec![Response::evicted("alice", 3)]);
        assert_eq!(drain(&mut bob), vec![Response::granted("bob", 3)]);
        assert!(!arbiter.resource_times().contains_key("alice"));
        assert!(arbiter.resource_times().contains_key("bob"));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_owner_keeps_slot_until_lease_ends() {
        let arbiter = arbiter();
        let alice = login(&arbiter, 1, "alice");
        arbiter.handle_resource_request(alice.id, &request("alice", 0b0001));
        arbiter.disconnect(alice.id);

        let mut bob = login(&arbiter, 2, "bob");
        arbiter.handle_resource_request(bob.id, &request("bob", 0b0001));
        assert_eq!(drain(&mut bob), vec![Response::denied("bob", 0)]);
        assert_eq!(arbiter.resource_owners()[0].as_deref(), Some("alice"));

        tokio::time::advance(Z_TIME).await;
        arbiter.handle_resource_request(bob.id, &request("bob", 0b0001));
        assert_eq!(drain(&mut bob), vec![Response::granted("bob", 0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn each_grant_notifies_resources_changed() {
        let arbiter = arbiter();
        let alice = login(&arbiter, 1, "alice");
        let mut events = arbiter.subscribe();

        arbiter.handle_resource_request(alice.id, &request("alice", 0b0011));
        arbiter.handle_resource_request(alice.id, &request("alice", 0b0011));

        assert_eq!(events.try_recv().unwrap(), ServerEvent::ResourcesChanged);
        assert_eq!(events.try_recv().unwrap(), ServerEvent::ResourcesChanged);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reject_mode_drops_silently() {
        let arbiter = arbiter();
        let mut alice = login(&arbiter, 1, "alice");
        arbiter.set_reject_requests(true);

        assert_eq!(
            arbiter.handle_resource_request(alice.id, &request("alice", 0b0001)),
            Disposition::Continue
        );
        assert!(drain(&mut alice).is_empty());
        assert_eq!(arbiter.resource_owners(), [None, None, None, None]);
    }

    #[tokio::test(start_paused = true)]
    async fn request_in_someone_elses_name_is_dropped() {
        let arbiter = arbiter();
        let mut alice = login(&arbiter, 1, "alice");

        arbiter.handle_resource_request(alice.id, &request("bob", 0b0001));
        assert!(drain(&mut alice).is_empty());
        assert_eq!(arbiter.resource_owners()[0], None);
    }

    #[tokio::test(start_paused = true)]
    async fn lease_uses_current_z_time() {
        let arbiter = arbiter();
        let alice = login(&arbiter, 1, "alice");
        let mut bob = login(&arbiter, 2, "bob");
        arbiter.set_z_time(100);

        arbiter.handle_resource_request(alice.id, &request("alice", 0b0001));
        tokio::time::advance(Duration::from_millis(100)).await;
        arbiter.handle_resource_request(bob.id, &request("bob", 0b0001));

        assert_eq!(drain(&mut bob), vec![Response::granted("bob", 0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn free_all_evicts_owners_once_and_notifies_once() {
        let arbiter = arbiter();
        let mut alice = login(&arbiter, 1, "alice");
        arbiter.handle_resource_request(alice.id, &request("alice", 0b0101));
        drain(&mut alice);
        let mut events = arbiter.subscribe();

        arbiter.free_all();
        assert_eq!(
            drain(&mut alice),
            vec![Response::evicted("alice", 0), Response::evicted("alice", 2)]
        );
        assert_eq!(events.try_recv().unwrap(), ServerEvent::ResourcesChanged);
        assert!(events.try_recv().is_err());
        assert!(arbiter.resource_times().is_empty());

        arbiter.free_all();
        assert!(drain(&mut alice).is_empty());
        assert_eq!(events.try_recv().unwrap(), ServerEvent::ResourcesChanged);
        assert!(events.try_recv().is_err());
    }

    const RACE_ROUNDS: usize = 2_000;

    #[test]
    fn grant_racing_free_all_leaves_consistent_last_word() {
        for _ in 0..RACE_ROUNDS {
            let arbiter = arbiter();
            let mut bob = login(&arbiter, 2, "bob");

            std::thread::scope(|scope| {
                scope.spawn(|| arbiter.handle_resource_request(bob.id, &request("bob", 0b0001)));
                scope.spawn(|| arbiter.free_all());
            });

            let replies = drain(&mut bob);
            let grants = replies
                .iter()
                .filter(|r| r.status == crate::protocol::Status::Granted)
                .count();
            assert_eq!(grants, 1);

            let last = replies.last().map(|r| r.status);
            match arbiter.resource_owners()[0].as_deref() {
                Some("bob") => assert_eq!(last, Some(crate::protocol::Status::Granted)),
                None => assert_eq!(last, Some(crate::protocol::Status::Evicted)),
                other => panic!("unexpected owner {other:?}"),
            }
        }
    }

    #[test]
    fn two_claimants_for_one_free_slot() {
        for _ in 0..RACE_ROUNDS {
            let arbiter = arbiter();
            let mut alice = login(&arbiter, 1, "alice");
            let mut bob = login(&arbiter, 2, "bob");

            std::thread::scope(|scope| {
                scope.spawn(|| arbiter.handle_resource_request(alice.id, &request("alice", 0b0001)));
                scope.spawn(|| arbiter.handle_resource_request(bob.id, &request("bob", 0b0001)));
            });

            let alice_replies = drain(&mut alice);
            let bob_replies = drain(&mut bob);
            assert_eq!(alice_replies.len(), 1);
            assert_eq!(bob_replies.len(), 1);

            let (winner, loser) = match arbiter.resource_owners()[0].as_deref() {
                Some("alice") => (&alice_replies[0], &bob_replies[0]),
                Some("bob") => (&bob_replies[0], &alice_replies[0]),
                other => panic!("unexpected owner {other:?}"),
            };
            assert_eq!(winner.status, crate::protocol::Status::Granted);
            assert_eq!(loser.status, crate::protocol::Status::Denied);
        }
    }
}
