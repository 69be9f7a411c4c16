// src/services.rs
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::handlers::Dispatcher;
use crate::telegram::{TelegramClient, Update};

/// Pause after a failed `getUpdates` before asking again.
const RETRY_DELAY: Duration = Duration::from_secs(3);

/// Offset to request next so Telegram drops everything we've seen.
pub fn next_offset(current: i64, updates: &[Update]) -> i64 {
    updates
        .iter()
        .map(|u| u.update_id + 1)
        .fold(current, i64::max)
}

/// Pull updates forever, handing each to its own task.
pub async fn run_long_polling(client: Arc<TelegramClient>, dispatcher: Arc<Dispatcher>) {
    info!("Long polling for updates");
    let mut offset = 0;

    loop {
        let updates = match client.get_updates(offset).await {
            Ok(updates) => updates,
            Err(err) => {
                warn!(error = %err, "getUpdates failed, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            }
        };

        offset = next_offset(offset, &updates);
        if !updates.is_empty() {
            debug!(count = updates.len(), offset, "Received updates");
        }

        for update in updates {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher.handle_update(update).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(update_id: i64) -> Update {
        Update {
            update_id,
            message: None,
            callback_query: None,
            inline_query: None,
        }
    }

    #[test]
    fn test_next_offset() {
        assert_eq!(next_offset(0, &[]), 0);
        assert_eq!(next_offset(5, &[]), 5);
        assert_eq!(next_offset(0, &[update(10), update(12), update(11)]), 13);
        // Never goes backwards
        assert_eq!(next_offset(20, &[update(3)]), 20);
    }
}
