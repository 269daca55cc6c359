//! Tests against a live IB Gateway (paper account recommended).
//!
//! Ignored by default; run with:
//!
//! ```bash
//! cargo test -p acct-fetch-ibapi --test live_gateway -- --ignored
//! ```
//!
//! Configured through IB_HOST (default 127.0.0.1), IB_PORT (default 4002)
//! and IB_CLIENT (default 100).

use std::time::Duration;

use acct_fetch_ibapi::{IBClient, IBEvent};
use tokio::sync::mpsc::UnboundedReceiver;

fn ib_host() -> String {
    std::env::var("IB_HOST").unwrap_or_else(|_| "127.0.0.1".into())
}

fn ib_port() -> u16 {
    std::env::var("IB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(4002)
}

fn ib_client_id() -> i32 {
    std::env::var("IB_CLIENT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(100)
}

/// Collect events until `done` returns true or the deadline passes.
async fn collect_until<F>(rx: &mut UnboundedReceiver<IBEvent>, secs: u64, mut done: F) -> Vec<IBEvent>
where
    F: FnMut(&IBEvent) -> bool,
{
    let mut events = Vec::new();
    let deadline = tokio::time::sleep(Duration::from_secs(secs));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    let finished = done(&event);
                    events.push(event);
                    if finished {
                        break;
                    }
                }
                None => break,
            },
            _ = &mut deadline => break,
        }
    }
    events
}

#[tokio::test]
#[ignore]
async fn test_connect_and_disconnect() {
    let (mut client, mut rx) = IBClient::connect(&ib_host(), ib_port(), ib_client_id(), None)
        .await
        .expect("Failed to connect to IB");

    let events = collect_until(&mut rx, 5, |e| matches!(e, IBEvent::NextValidId { .. })).await;
    assert!(
        events.iter().any(|e| matches!(e, IBEvent::NextValidId { .. })),
        "Should have received NextValidId"
    );

    client.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn test_connect_wrong_port() {
    let result = IBClient::connect(&ib_host(), 19999, ib_client_id(), None).await;
    assert!(result.is_err(), "Connection to wrong port should fail");
}

#[tokio::test]
#[ignore]
async fn test_request_account_summary() {
    let (mut client, mut rx) = IBClient::connect(&ib_host(), ib_port(), ib_client_id(), None)
        .await
        .expect("Failed to connect to IB");

    let req_id = client.next_req_id();
    client
        .req_account_summary(req_id, "All", "NetLiquidation,BuyingPower")
        .await
        .expect("req_account_summary failed");

    let events = collect_until(&mut rx, 10, |e| {
        matches!(e, IBEvent::AccountSummaryEnd { req_id: id } if *id == req_id)
    })
    .await;

    let rows: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            IBEvent::AccountSummary { tag, value, currency, .. } => Some((tag, value, currency)),
            _ => None,
        })
        .collect();
    for (tag, value, currency) in &rows {
        println!("{tag}: {value} {currency}");
    }
    assert!(!rows.is_empty(), "Should have received account summary rows");

    let _ = client.cancel_account_summary(req_id).await;
    client.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn test_request_positions() {
    let (mut client, mut rx) = IBClient::connect(&ib_host(), ib_port(), ib_client_id(), None)
        .await
        .expect("Failed to connect to IB");

    client.req_positions().await.expect("req_positions failed");

    let events = collect_until(&mut rx, 10, |e| matches!(e, IBEvent::PositionEnd)).await;
    assert!(
        events.iter().any(|e| matches!(e, IBEvent::PositionEnd)),
        "Should have received PositionEnd"
    );

    // May be zero on an empty account.
    let count = events.iter().filter(|e| matches!(e, IBEvent::Position { .. })).count();
    println!("Received {count} positions");

    let _ = client.cancel_positions().await;
    client.disconnect().await;
}
