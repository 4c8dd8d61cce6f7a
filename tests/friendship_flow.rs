//! End-to-end relationship engine scenarios: OTP signup through friendship
//! and conversation creation, including the fan-out side.

use std::time::{SystemTime, UNIX_EPOCH};

use chatterd::server::presence::Presence;
use chatterd::server::state::WsEvent;
use chatterd::storage::{ordered_pair, RequestStatus, Storage, StorageError, UserPatch};
use tokio::sync::mpsc;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Run the full OTP signup for a user and give them a username.
fn signup(storage: &Storage, email: &str, username: &str) -> i64 {
    let now = now_secs();
    let id = storage
        .upsert_user_otp(email, Some(username), "000000", now + 300, now)
        .unwrap();
    let user = storage
        .take_verified_otp(email, "000000", now)
        .unwrap()
        .expect("otp should verify");
    assert!(user.is_verified);
    storage
        .update_user(
            id,
            &UserPatch {
                username: Some(username.to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    id
}

#[test]
fn request_accept_creates_symmetric_friendship_and_one_conversation() {
    let storage = Storage::open_in_memory().unwrap();
    let alice = signup(&storage, "alice@example.com", "alice");
    let bob = signup(&storage, "bob@example.com", "bob");
    let now = now_secs();

    // Alice finds Bob by username and sends a request
    let receiver = storage
        .find_user_by_username("bob")
        .unwrap()
        .expect("bob resolvable by username");
    let request_id = storage
        .insert_friend_request(alice, receiver.user_id, now)
        .unwrap();

    // Bob sees it among his incoming requests, with Alice's profile
    let incoming = storage.list_incoming_requests(bob).unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].request_id, request_id);
    assert_eq!(incoming[0].sender.username.as_deref(), Some("alice"));

    // Bob accepts
    let request = storage.get_friend_request(request_id).unwrap().unwrap();
    assert_eq!(request.receiver_id, bob);
    storage.accept_friend_request(&request, now).unwrap();

    // Friendship is symmetric and the pair has exactly one conversation
    assert!(storage.are_friends(alice, bob).unwrap());
    assert_eq!(
        storage.list_friends(alice).unwrap()[0].user_id,
        bob
    );
    assert_eq!(storage.list_friends(bob).unwrap()[0].user_id, alice);
    assert_eq!(storage.conversation_count(alice, bob).unwrap(), 1);
    let conv = storage.find_conversation(alice, bob).unwrap().unwrap();
    assert_eq!((conv.user1_id, conv.user2_id), ordered_pair(alice, bob));

    // The request row is terminal and still blocks the pair
    let request = storage.get_friend_request(request_id).unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Accepted);
    assert!(matches!(
        storage.insert_friend_request(bob, alice, now).unwrap_err(),
        StorageError::Conflict(_)
    ));
    assert!(!incoming.is_empty());
}

#[test]
fn duplicate_requests_conflict_in_both_directions() {
    let storage = Storage::open_in_memory().unwrap();
    let alice = signup(&storage, "alice@example.com", "alice");
    let bob = signup(&storage, "bob@example.com", "bob");
    let now = now_secs();

    storage.insert_friend_request(alice, bob, now).unwrap();
    assert!(matches!(
        storage.insert_friend_request(alice, bob, now).unwrap_err(),
        StorageError::Conflict(_)
    ));
    assert!(matches!(
        storage.insert_friend_request(bob, alice, now).unwrap_err(),
        StorageError::Conflict(_)
    ));
}

#[test]
fn unknown_username_is_not_found() {
    let storage = Storage::open_in_memory().unwrap();
    signup(&storage, "alice@example.com", "alice");

    assert!(storage.find_user_by_username("bob").unwrap().is_none());
}

#[tokio::test]
async fn fan_out_reaches_only_connected_receiver() {
    let storage = Storage::open_in_memory().unwrap();
    let alice = signup(&storage, "alice@example.com", "alice");
    let bob = signup(&storage, "bob@example.com", "bob");
    let now = now_secs();

    let presence = Presence::new();
    let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
    presence.register(bob, bob_tx);

    // Alice sends a request; only connected Bob gets the push
    let request_id = storage.insert_friend_request(alice, bob, now).unwrap();
    let sender = storage.get_user(alice).unwrap().unwrap().profile();
    presence.notify(
        bob,
        WsEvent::IncomingFriendRequest {
            request_id,
            sender,
        },
    );
    presence.notify(
        alice,
        WsEvent::FriendRequestAccepted {
            request_id,
            by: storage.get_user(bob).unwrap().unwrap().profile(),
        },
    );

    match bob_rx.try_recv().unwrap() {
        WsEvent::IncomingFriendRequest {
            request_id: id,
            sender,
        } => {
            assert_eq!(id, request_id);
            assert_eq!(sender.user_id, alice);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    // Nothing else queued for Bob; Alice was offline, her event was dropped
    assert!(bob_rx.try_recv().is_err());
}
