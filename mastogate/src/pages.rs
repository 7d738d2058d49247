//! Background pagination over upstream collections.
//!
//! Mastodon pages most collections with a `max_id` cursor. The driver
//! here walks the pages on a spawned task and hands each one over a
//! bounded channel, so a consumer can start work on page one while
//! page two is still in flight. Closing the channel signals the end
//! of the collection.

use crate::error::Result;
use crate::upstream::{Status, UpstreamClient};
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

/// Pages buffered between the fetch task and the consumer.
const PAGE_CHANNEL_DEPTH: usize = 4;

/// Stream an account's statuses, newest first, one page per channel
/// message.
///
/// The fetch task stops at the first empty page or upstream error; an
/// error is delivered in-band as the final message. Dropping the
/// receiver aborts the walk at the next send.
pub fn stream_account_statuses<U>(
    upstream: Arc<U>,
    instance_url: Url,
    access_token: String,
    account_id: String,
    page_size: u32,
) -> mpsc::Receiver<Result<Vec<Status>>>
where
    U: UpstreamClient + ?Sized + 'static,
{
    let (tx, rx) = mpsc::channel(PAGE_CHANNEL_DEPTH);

    tokio::spawn(async move {
        let mut max_id: Option<String> = None;

        loop {
            let page = upstream
                .fetch_account_statuses(
                    &instance_url,
                    &access_token,
                    &account_id,
                    page_size,
                    max_id.as_deref(),
                )
                .await;

            match page {
                Ok(statuses) if statuses.is_empty() => break,
                Ok(statuses) => {
                    max_id = statuses.last().map(|s| s.id.clone());
                    if tx.send(Ok(statuses)).await.is_err() {
                        // Consumer went away.
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
    });

    rx
}
