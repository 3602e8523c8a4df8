use crate::chat::client::{ChatClient, ChatMessage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

/// History producer: walk the channel strictly backward from `cursor_id`
/// (exclusive), pushing whole pages into the handoff channel so the
/// consumer sees each page's newest-to-oldest order intact.
///
/// Terminates by dropping `tx` (queue close) in every case: empty page is
/// normal completion, a fetch error latches the shared failure flag first.
/// Rate-limit waits happen inside the client; this loop simply blocks
/// through them. Errors never cross the thread boundary.
pub fn run_fetcher(
    client: &dyn ChatClient,
    channel_id: u64,
    mut cursor_id: u64,
    page_limit: u8,
    tx: Sender<Vec<ChatMessage>>,
    failed: &AtomicBool,
) {
    loop {
        if failed.load(Ordering::SeqCst) {
            // The writer already gave up; stop paginating.
            return;
        }

        let page = match client.messages_before(channel_id, cursor_id, page_limit) {
            Ok(page) => page,
            Err(err) => {
                eprintln!("history fetch failed, stopping: {err:#}");
                failed.store(true, Ordering::SeqCst);
                return;
            }
        };

        if page.is_empty() {
            println!("history exhausted, done fetching");
            return;
        }

        // Oldest message of the page is the next exclusive bound.
        let next_cursor = page.last().map(|m| m.id).unwrap_or(cursor_id);
        if tx.send(page).is_err() {
            // Consumer hung up; its own error path set the flag.
            return;
        }
        cursor_id = next_cursor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::testing::MemoryChannel;
    use std::sync::mpsc;

    #[test]
    fn pages_arrive_in_order_and_queue_closes() {
        let client = MemoryChannel::with_ids(7, &[50, 40, 30, 20, 10]);
        let (tx, rx) = mpsc::channel();
        let failed = AtomicBool::new(false);

        run_fetcher(&client, 7, u64::MAX, 2, tx, &failed);

        let batches: Vec<Vec<u64>> = rx
            .iter()
            .map(|batch| batch.iter().map(|m| m.id).collect())
            .collect();
        assert_eq!(batches, vec![vec![50, 40], vec![30, 20], vec![10]]);
        assert!(!failed.load(Ordering::SeqCst));
    }

    #[test]
    fn resume_cursor_excludes_the_anchor() {
        let client = MemoryChannel::with_ids(7, &[50, 40, 30]);
        let (tx, rx) = mpsc::channel();
        let failed = AtomicBool::new(false);

        run_fetcher(&client, 7, 40, 100, tx, &failed);

        let ids: Vec<u64> = rx.iter().flatten().map(|m| m.id).collect();
        assert_eq!(ids, vec![30]);
    }

    #[test]
    fn fetch_error_latches_flag_and_closes_queue() {
        let client = MemoryChannel::with_ids(7, &[50]);
        client.fail_fetches();
        let (tx, rx) = mpsc::channel();
        let failed = AtomicBool::new(false);

        run_fetcher(&client, 7, u64::MAX, 100, tx, &failed);

        assert!(failed.load(Ordering::SeqCst));
        assert!(rx.iter().next().is_none());
    }
}
