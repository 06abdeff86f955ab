//! End-to-end lobby flows over the in-process broker.
//!
//! Each test runs several real coordinators against one [`MemoryHub`],
//! so everything the clients know, they learned from channel traffic.
//! Most tests disable heartbeats and inject connection loss through the
//! hub's fault hooks; the liveness section runs with millisecond-scale
//! beats to drive the timeout path end to end.

use std::time::Duration;

use courtlink_liveness::LivenessConfig;
use courtlink_lobby::{
    Lobby, LobbyConfig, LobbyError, LobbyHandle, LobbyUpdate, ReconnectConfig,
};
use courtlink_protocol::{CaseKind, CaseRef, LobbyCode, Phase, RoleId};
use courtlink_state::StateError;
use courtlink_transport::MemoryHub;
use tokio::sync::mpsc;

type Updates = mpsc::UnboundedReceiver<LobbyUpdate>;

fn test_config() -> LobbyConfig {
    LobbyConfig {
        liveness: LivenessConfig {
            heartbeat_interval: Duration::ZERO,
            staleness_multiple: 3,
            start_jitter_ms: 0,
        },
        reconnect: ReconnectConfig {
            max_attempts: 3,
            retry_delay: Duration::from_millis(10),
            failure_countdown: Duration::from_secs(10),
        },
    }
}

/// Heartbeats every 25 ms, staleness timeout 50 ms.
fn beating_config() -> LobbyConfig {
    LobbyConfig {
        liveness: LivenessConfig {
            heartbeat_interval: Duration::from_millis(25),
            staleness_multiple: 2,
            start_jitter_ms: 0,
        },
        reconnect: ReconnectConfig {
            max_attempts: 3,
            retry_delay: Duration::from_millis(10),
            failure_countdown: Duration::from_secs(10),
        },
    }
}

async fn join(
    hub: &MemoryHub,
    name: &str,
    is_leader: bool,
) -> (LobbyHandle, Updates) {
    Lobby::connect(
        hub.clone(),
        LobbyCode::new("AB12CD"),
        name,
        is_leader,
        test_config(),
    )
    .await
    .expect("connect failed")
}

/// Drains updates until one matches, failing the test on a stall.
async fn wait_for(
    rx: &mut Updates,
    mut pred: impl FnMut(&LobbyUpdate) -> bool,
) -> LobbyUpdate {
    loop {
        let update = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for update")
            .expect("update stream closed");
        if pred(&update) {
            return update;
        }
    }
}

fn sample_case() -> CaseRef {
    CaseRef {
        kind: CaseKind::Criminal,
        index: 0,
        title: "State v. Finch".into(),
    }
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_two_clients_converge_on_roster() {
    let hub = MemoryHub::new();
    let (leader, mut leader_rx) = join(&hub, "Alice", true).await;
    let (bob, mut bob_rx) = join(&hub, "Bob", false).await;

    // The leader sees Bob's join; Bob learns about the leader from the
    // announce-back, despite having joined after her announcement.
    wait_for(&mut leader_rx, |u| {
        matches!(u, LobbyUpdate::ParticipantJoined(p) if p.name == "Bob")
    })
    .await;
    wait_for(&mut bob_rx, |u| {
        matches!(u, LobbyUpdate::ParticipantJoined(p) if p.name == "Alice" && p.is_leader)
    })
    .await;

    let leader_view = leader.snapshot().await.unwrap();
    let bob_view = bob.snapshot().await.unwrap();
    assert_eq!(leader_view.participants.len(), 2);
    assert_eq!(bob_view.participants.len(), 2);
}

#[tokio::test]
async fn test_explicit_leave_frees_seat_everywhere() {
    let hub = MemoryHub::new();
    let (leader, mut leader_rx) = join(&hub, "Alice", true).await;
    let (bob, mut bob_rx) = join(&hub, "Bob", false).await;
    wait_for(&mut bob_rx, |u| {
        matches!(u, LobbyUpdate::ParticipantJoined(_))
    })
    .await;

    bob.claim_role(RoleId::Defense).await.unwrap();
    wait_for(&mut leader_rx, |u| {
        matches!(u, LobbyUpdate::RoleAssigned { role: RoleId::Defense, .. })
    })
    .await;

    bob.disconnect().await.unwrap();

    let left = wait_for(&mut leader_rx, |u| {
        matches!(u, LobbyUpdate::ParticipantLeft { .. })
    })
    .await;
    match left {
        LobbyUpdate::ParticipantLeft {
            participant,
            freed_role,
        } => {
            assert_eq!(participant.name, "Bob");
            assert_eq!(freed_role, Some(RoleId::Defense));
        }
        other => panic!("unexpected update: {other:?}"),
    }

    let view = leader.snapshot().await.unwrap();
    assert_eq!(view.participants.len(), 1);
    assert!(!view.roles.contains_key(&RoleId::Defense));
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_role_claims_are_exclusive() {
    let hub = MemoryHub::new();
    let (leader, mut leader_rx) = join(&hub, "Alice", true).await;
    let (bob, _bob_rx) = join(&hub, "Bob", false).await;

    bob.claim_role(RoleId::Judge).await.unwrap();
    wait_for(&mut leader_rx, |u| {
        matches!(u, LobbyUpdate::RoleAssigned { role: RoleId::Judge, .. })
    })
    .await;

    // The seat is taken; the claim fails locally and is not broadcast.
    let result = leader.claim_role(RoleId::Judge).await;
    assert!(matches!(
        result,
        Err(LobbyError::State(StateError::RoleHeld { .. }))
    ));

    // A different seat is fine.
    leader.claim_role(RoleId::Prosecutor).await.unwrap();

    let view = bob.snapshot().await.unwrap();
    let bob_id = view.local_id.clone();
    assert_eq!(view.roles.get(&RoleId::Judge), Some(&bob_id));
}

#[tokio::test]
async fn test_switching_roles_frees_the_old_seat() {
    let hub = MemoryHub::new();
    let (leader, mut leader_rx) = join(&hub, "Alice", true).await;
    let (bob, _bob_rx) = join(&hub, "Bob", false).await;

    bob.claim_role(RoleId::Witness).await.unwrap();
    bob.claim_role(RoleId::Jury).await.unwrap();
    wait_for(&mut leader_rx, |u| {
        matches!(u, LobbyUpdate::RoleAssigned { role: RoleId::Jury, .. })
    })
    .await;

    // The vacated seat is claimable again.
    leader.claim_role(RoleId::Witness).await.unwrap();

    let view = leader.snapshot().await.unwrap();
    assert!(view.roles.contains_key(&RoleId::Witness));
    assert!(view.roles.contains_key(&RoleId::Jury));
}

// ---------------------------------------------------------------------------
// Case selection and trial start
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_non_leader_cannot_select_case_or_start() {
    let hub = MemoryHub::new();
    let (_leader, _leader_rx) = join(&hub, "Alice", true).await;
    let (bob, _bob_rx) = join(&hub, "Bob", false).await;

    assert!(matches!(
        bob.select_case(sample_case()).await,
        Err(LobbyError::State(StateError::Forbidden))
    ));
    assert!(matches!(
        bob.start_trial().await,
        Err(LobbyError::State(StateError::Forbidden))
    ));
}

#[tokio::test]
async fn test_trial_start_reaches_every_client() {
    let hub = MemoryHub::new();
    let (leader, mut leader_rx) = join(&hub, "Alice", true).await;
    let (bob, mut bob_rx) = join(&hub, "Bob", false).await;
    wait_for(&mut leader_rx, |u| {
        matches!(u, LobbyUpdate::ParticipantJoined(_))
    })
    .await;

    // Starting without a case is rejected before anything is broadcast.
    assert!(matches!(
        leader.start_trial().await,
        Err(LobbyError::State(StateError::NoCaseSelected))
    ));

    leader.select_case(sample_case()).await.unwrap();
    wait_for(&mut bob_rx, |u| {
        matches!(u, LobbyUpdate::CaseChanged(c) if c.title == "State v. Finch")
    })
    .await;

    leader.start_trial().await.unwrap();

    wait_for(&mut leader_rx, |u| {
        matches!(u, LobbyUpdate::PhaseChanged(Phase::Active))
    })
    .await;
    wait_for(&mut bob_rx, |u| {
        matches!(u, LobbyUpdate::PhaseChanged(Phase::Active))
    })
    .await;

    assert_eq!(leader.snapshot().await.unwrap().phase, Phase::Active);
    assert_eq!(bob.snapshot().await.unwrap().phase, Phase::Active);
}

#[tokio::test]
async fn test_late_joiner_converges_from_leader_sync() {
    let hub = MemoryHub::new();
    let (leader, mut leader_rx) = join(&hub, "Alice", true).await;
    leader.select_case(sample_case()).await.unwrap();
    leader.start_trial().await.unwrap();
    wait_for(&mut leader_rx, |u| {
        matches!(u, LobbyUpdate::PhaseChanged(Phase::Active))
    })
    .await;

    // Carol never saw case-selected or trial-start.
    let (carol, mut carol_rx) = join(&hub, "Carol", false).await;

    wait_for(&mut carol_rx, |u| matches!(u, LobbyUpdate::Synced(_))).await;

    let view = carol.snapshot().await.unwrap();
    assert_eq!(view.phase, Phase::Active);
    assert_eq!(view.case.unwrap().title, "State v. Finch");
}

#[tokio::test]
async fn test_failed_trial_start_leaves_session_retryable() {
    let hub = MemoryHub::new();
    // A slow retry keeps the leader disconnected while the start
    // attempt below runs.
    let mut config = test_config();
    config.reconnect.retry_delay = Duration::from_millis(200);
    let (leader, mut leader_rx) = Lobby::connect(
        hub.clone(),
        LobbyCode::new("AB12CD"),
        "Alice",
        true,
        config,
    )
    .await
    .unwrap();
    let (_bob, mut bob_rx) = join(&hub, "Bob", false).await;

    leader.select_case(sample_case()).await.unwrap();
    wait_for(&mut leader_rx, |u| matches!(u, LobbyUpdate::CaseChanged(_)))
        .await;

    let leader_id = leader.snapshot().await.unwrap().local_id;
    hub.drop_client(&leader_id);

    assert!(leader.start_trial().await.is_err());

    // The failed broadcast must not advance the phase or drop the case.
    let view = leader.snapshot().await.unwrap();
    assert_eq!(view.phase, Phase::Lobby);
    assert_eq!(view.case.unwrap().title, "State v. Finch");

    wait_for(&mut leader_rx, |u| {
        matches!(u, LobbyUpdate::Reconnected { .. })
    })
    .await;

    // The retry goes through end to end.
    leader.start_trial().await.unwrap();
    wait_for(&mut leader_rx, |u| {
        matches!(u, LobbyUpdate::PhaseChanged(Phase::Active))
    })
    .await;
    wait_for(&mut bob_rx, |u| {
        matches!(u, LobbyUpdate::PhaseChanged(Phase::Active))
    })
    .await;
}

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_silent_participant_times_out_and_frees_seat() {
    let hub = MemoryHub::new();
    let (alice, mut alice_rx) = Lobby::connect(
        hub.clone(),
        LobbyCode::new("AB12CD"),
        "Alice",
        true,
        beating_config(),
    )
    .await
    .unwrap();
    let (bob, mut bob_rx) = Lobby::connect(
        hub.clone(),
        LobbyCode::new("AB12CD"),
        "Bob",
        false,
        beating_config(),
    )
    .await
    .unwrap();

    bob.claim_role(RoleId::Prosecutor).await.unwrap();
    wait_for(&mut alice_rx, |u| {
        matches!(u, LobbyUpdate::RoleAssigned { role: RoleId::Prosecutor, .. })
    })
    .await;
    let bob_id = bob.snapshot().await.unwrap().local_id;

    // Bob's connection dies and every retry fails: he just goes silent.
    hub.fail_next(3);
    hub.drop_client(&bob_id);
    wait_for(&mut bob_rx, |u| {
        matches!(u, LobbyUpdate::ReconnectFailed { .. })
    })
    .await;

    let timed_out = wait_for(&mut alice_rx, |u| {
        matches!(u, LobbyUpdate::ParticipantTimedOut { .. })
    })
    .await;
    match timed_out {
        LobbyUpdate::ParticipantTimedOut {
            participant,
            freed_role,
        } => {
            assert_eq!(participant.id, bob_id);
            assert_eq!(freed_role, Some(RoleId::Prosecutor));
        }
        other => panic!("unexpected update: {other:?}"),
    }

    let view = alice.snapshot().await.unwrap();
    assert_eq!(view.participants.len(), 1);
    assert!(!view.roles.contains_key(&RoleId::Prosecutor));
}

// ---------------------------------------------------------------------------
// Reconnection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_reconnect_rejoins_with_fresh_identity_and_no_role() {
    let hub = MemoryHub::new();
    let (_leader, mut leader_rx) = join(&hub, "Alice", true).await;
    let (bob, mut bob_rx) = join(&hub, "Bob", false).await;

    bob.claim_role(RoleId::Defense).await.unwrap();
    let old_id = bob.snapshot().await.unwrap().local_id;

    hub.drop_client(&old_id);

    wait_for(&mut bob_rx, |u| {
        matches!(u, LobbyUpdate::Reconnecting { attempt: 1, max_attempts: 3 })
    })
    .await;
    let reconnected = wait_for(&mut bob_rx, |u| {
        matches!(u, LobbyUpdate::Reconnected { .. })
    })
    .await;
    let new_id = match reconnected {
        LobbyUpdate::Reconnected { new_id } => new_id,
        other => panic!("unexpected update: {other:?}"),
    };
    assert_ne!(new_id, old_id, "a reconnect is a new participant");

    // The old seat is not restored; Bob must claim again.
    let view = bob.snapshot().await.unwrap();
    assert_eq!(view.local_id, new_id);
    assert_ne!(view.roles.get(&RoleId::Defense), Some(&new_id));

    // The leader sees the rejoin as a brand-new participant.
    wait_for(&mut leader_rx, |u| {
        matches!(u, LobbyUpdate::ParticipantJoined(p) if p.id == new_id)
    })
    .await;
}

#[tokio::test]
async fn test_reconnect_gives_up_after_attempt_budget() {
    let hub = MemoryHub::new();
    let (bob, mut bob_rx) = join(&hub, "Bob", false).await;
    let bob_id = bob.snapshot().await.unwrap().local_id;

    // Every retry fails.
    hub.fail_next(3);
    hub.drop_client(&bob_id);

    for attempt in 1..=3u32 {
        wait_for(&mut bob_rx, |u| {
            matches!(u, LobbyUpdate::Reconnecting { attempt: a, .. } if *a == attempt)
        })
        .await;
    }
    wait_for(&mut bob_rx, |u| {
        matches!(u, LobbyUpdate::ReconnectFailed { .. })
    })
    .await;

    // The coordinator is gone; the handle reports it.
    assert!(matches!(
        bob.claim_role(RoleId::Jury).await,
        Err(LobbyError::NotConnected)
    ));
}

#[tokio::test]
async fn test_reconnect_succeeds_within_budget() {
    let hub = MemoryHub::new();
    let (bob, mut bob_rx) = join(&hub, "Bob", false).await;
    let bob_id = bob.snapshot().await.unwrap().local_id;

    // Two failures, then the third attempt lands.
    hub.fail_next(2);
    hub.drop_client(&bob_id);

    wait_for(&mut bob_rx, |u| {
        matches!(u, LobbyUpdate::Reconnecting { attempt: 3, .. })
    })
    .await;
    wait_for(&mut bob_rx, |u| {
        matches!(u, LobbyUpdate::Reconnected { .. })
    })
    .await;

    // The lobby is usable again.
    bob.claim_role(RoleId::Spectator).await.unwrap();
    let view = bob.snapshot().await.unwrap();
    assert_eq!(view.roles.get(&RoleId::Spectator), Some(&view.local_id));
}
