use std::sync::Barrier;
use std::thread;

use super::*;
use pretty_assertions::assert_eq;

#[test]
fn concurrent_decisions_have_a_single_winner() {
    let log = memory_log();
    let store = Arc::new(store_with(log.clone()));
    let pack = proposal(1, &[ActionVerb::Send], single_signer());
    let session = under_review(&store, &pack);

    let contenders = 8;
    let barrier = Arc::new(Barrier::new(contenders));
    let handles: Vec<_> = (0..contenders)
        .map(|index| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let decision = if index % 2 == 0 {
                    Decision::Approve
                } else {
                    Decision::Reject { reason: None }
                };
                store.decide(session.id, decision, &reviewer(&format!("reviewer-{index}")))
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread"))
        .collect();
    let winners = results.iter().filter(|result| result.is_ok()).count();
    let losers = results
        .iter()
        .filter(|result| matches!(result, Err(ApprovalError::AlreadyDecided { .. })))
        .count();
    assert_eq!((winners, losers), (1, contenders - 1));

    let decisions = kinds(&log)
        .into_iter()
        .filter(|kind| *kind == "decision_recorded")
        .count();
    assert_eq!(decisions, 1);
    assert!(store.get(session.id).expect("session").state.is_terminal());
}

#[test]
fn concurrent_routes_of_one_proposal_create_one_session() {
    let log = memory_log();
    let store = Arc::new(store_with(log.clone()));
    let pack = Arc::new(proposal(1, &[ActionVerb::Draft], single_signer()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let pack = Arc::clone(&pack);
            thread::spawn(move || store.route(&pack, None).is_ok())
        })
        .collect();
    let routed = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread"))
        .filter(|ok| *ok)
        .count();
    assert_eq!(routed, 1);
    assert_eq!(store.list().len(), 1);
    assert_eq!(kinds(&log), vec!["session_routed"]);
}

#[test]
fn racing_signers_publish_events_in_signature_order() {
    let log = memory_log();
    let store = Arc::new(store_with(log.clone()));
    let pack = proposal(
        1,
        &[ActionVerb::Payment],
        RequiredApprovals {
            signer_count: 3,
            biometric: true,
        },
    );
    let session = under_review(&store, &pack);
    let mut events = store.subscribe();

    let barrier = Arc::new(Barrier::new(3));
    let handles: Vec<_> = ["ana", "bo", "cy"]
        .into_iter()
        .map(|signer| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.decide(session.id, Decision::Approve, &verified(signer))
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread").expect("signature");
    }

    let seen: Vec<(usize, SessionState)> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|event| (event.signatures, event.state))
        .collect();
    assert_eq!(
        seen,
        vec![
            (1, SessionState::UnderReview),
            (2, SessionState::UnderReview),
            (3, SessionState::Approved),
        ]
    );
}
