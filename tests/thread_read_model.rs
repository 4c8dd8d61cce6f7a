//! Thread aggregation scenarios: latest-message selection, unread counts,
//! ordering, and ownership rules, across several users.

use std::time::{SystemTime, UNIX_EPOCH};

use chatterd::storage::{MessageType, Storage, StorageError};

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn seed_user(storage: &Storage, email: &str) -> i64 {
    let now = now_secs();
    let id = storage
        .upsert_user_otp(email, None, "000000", now + 300, now)
        .unwrap();
    storage.take_verified_otp(email, "000000", now).unwrap();
    id
}

#[test]
fn threads_collapse_to_one_entry_per_counterparty() {
    let storage = Storage::open_in_memory().unwrap();
    let u = seed_user(&storage, "u@example.com");
    let c1 = seed_user(&storage, "c1@example.com");
    let c2 = seed_user(&storage, "c2@example.com");
    let c3 = seed_user(&storage, "c3@example.com");
    let now = now_secs();

    // Interleaved traffic across three counterparties
    for i in 0..4u64 {
        storage
            .insert_message(u, c1, &format!("to c1 #{i}"), MessageType::Text, now + i)
            .unwrap();
        storage
            .insert_message(c2, u, &format!("from c2 #{i}"), MessageType::Text, now + i)
            .unwrap();
    }
    let last_c3 = storage
        .insert_message(c3, u, "newest", MessageType::Text, now + 100)
        .unwrap();

    let threads = storage.list_threads(u).unwrap();
    assert_eq!(threads.len(), 3);

    // Newest thread first, and every entry is the pair's max message id
    assert_eq!(threads[0].latest.message_id, last_c3);
    for thread in &threads {
        let other = if thread.latest.sender_id == u {
            thread.latest.receiver_id
        } else {
            thread.latest.sender_id
        };
        let max_id = storage
            .list_pair_messages(u, other)
            .unwrap()
            .iter()
            .map(|m| m.message_id)
            .max()
            .unwrap();
        assert_eq!(thread.latest.message_id, max_id);
    }

    // Unread counts only count traffic toward u
    let by_counterparty: Vec<(i64, u32)> = threads
        .iter()
        .map(|t| {
            let other = if t.latest.sender_id == u {
                t.latest.receiver_id
            } else {
                t.latest.sender_id
            };
            (other, t.unread_count)
        })
        .collect();
    assert!(by_counterparty.contains(&(c1, 0)));
    assert!(by_counterparty.contains(&(c2, 4)));
    assert!(by_counterparty.contains(&(c3, 1)));
}

#[test]
fn mark_seen_decrements_unread_by_exactly_one() {
    let storage = Storage::open_in_memory().unwrap();
    let u = seed_user(&storage, "u@example.com");
    let c = seed_user(&storage, "c@example.com");
    let now = now_secs();

    let first = storage
        .insert_message(c, u, "one", MessageType::Text, now)
        .unwrap();
    storage
        .insert_message(c, u, "two", MessageType::Text, now + 1)
        .unwrap();
    assert_eq!(storage.unread_count(u, c).unwrap(), 2);

    // Correct direction: sender=c, receiver=u
    assert!(storage.mark_seen(first, c, u).unwrap());
    assert_eq!(storage.unread_count(u, c).unwrap(), 1);

    // Swapped direction is a silent no-op, not an error
    assert!(!storage.mark_seen(first, u, c).unwrap());
    assert_eq!(storage.unread_count(u, c).unwrap(), 1);

    let threads = storage.list_threads(u).unwrap();
    assert_eq!(threads[0].unread_count, 1);
}

#[test]
fn history_is_ascending_and_complete() {
    let storage = Storage::open_in_memory().unwrap();
    let u = seed_user(&storage, "u@example.com");
    let c = seed_user(&storage, "c@example.com");
    let now = now_secs();

    let first = storage
        .insert_message(u, c, "hi", MessageType::Text, now)
        .unwrap();
    storage
        .insert_message(c, u, "hello", MessageType::Text, now + 1)
        .unwrap();
    storage
        .insert_message(u, c, "how are you", MessageType::Image, now + 2)
        .unwrap();

    let history = storage.list_pair_messages(u, c).unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.windows(2).all(|w| w[0].sent_at <= w[1].sent_at
        && w[0].message_id < w[1].message_id));
    assert_eq!(history[0].message_id, first);
    assert_eq!(history[0].body, "hi");
    assert!(!history[0].is_read);
    assert_eq!(history[2].message_type, MessageType::Image);

    // Both sides see the identical thread
    let mirrored = storage.list_pair_messages(c, u).unwrap();
    assert_eq!(mirrored.len(), 3);
    assert_eq!(mirrored[0].message_id, history[0].message_id);
}

#[test]
fn messaging_does_not_require_friendship() {
    let storage = Storage::open_in_memory().unwrap();
    let u = seed_user(&storage, "u@example.com");
    let c = seed_user(&storage, "c@example.com");
    let now = now_secs();

    assert!(!storage.are_friends(u, c).unwrap());
    let id = storage
        .insert_message(u, c, "hi stranger", MessageType::Text, now)
        .unwrap();
    assert!(storage.get_message(id).unwrap().is_some());
}

#[test]
fn empty_body_is_invalid() {
    let storage = Storage::open_in_memory().unwrap();
    let u = seed_user(&storage, "u@example.com");
    let c = seed_user(&storage, "c@example.com");

    assert!(matches!(
        storage
            .insert_message(u, c, "", MessageType::Text, now_secs())
            .unwrap_err(),
        StorageError::InvalidArgument(_)
    ));
}

#[test]
fn delete_is_sender_only_and_existence_is_hidden() {
    let storage = Storage::open_in_memory().unwrap();
    let u = seed_user(&storage, "u@example.com");
    let c = seed_user(&storage, "c@example.com");
    let now = now_secs();

    let id = storage
        .insert_message(u, c, "secret", MessageType::Text, now)
        .unwrap();

    // The receiver's attempt and a probe for a nonexistent id look the same
    assert!(!storage.delete_message(id, c).unwrap());
    assert!(!storage.delete_message(id + 1000, c).unwrap());

    assert!(storage.delete_message(id, u).unwrap());
    assert!(storage.list_pair_messages(u, c).unwrap().is_empty());

    // Deleted threads disappear from the thread list
    assert!(storage.list_threads(u).unwrap().is_empty());
}
