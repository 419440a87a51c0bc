mod common;

use std::sync::Arc;

use common::{hash_for_nonce, MockNode, MockSigner, SIGNER};
use flashrace::rpc::ChainClient;
use flashrace::{Lane, SendError, TransactionSubmitter};

fn submitter(node: &Arc<MockNode>) -> TransactionSubmitter {
    let chain: Arc<dyn ChainClient> = node.clone();
    TransactionSubmitter::new(chain, Arc::new(MockSigner))
}

#[tokio::test]
async fn test_sends_use_consecutive_nonces() {
    let node = MockNode::with_nonce(5);
    let submitter = submitter(&node);

    let first = submitter.submit(Lane::Flashblocks).await.unwrap();
    let second = submitter.submit(Lane::Normal).await.unwrap();

    assert_eq!(first.transaction_id, hash_for_nonce(5));
    assert_eq!(second.transaction_id, hash_for_nonce(6));
    assert_eq!(first.from_address, SIGNER);
    assert_eq!(submitter.next_nonce().await, Some(7));

    // Only the first send asks the node
    assert_eq!(node.snapshot(|s| s.nonce_reads), 1);
    assert_eq!(node.snapshot(|s| s.accepted_nonces.clone()), vec![5, 6]);
}

#[tokio::test]
async fn test_concurrent_lanes_never_share_a_nonce() {
    let node = MockNode::with_nonce(0);
    let submitter = Arc::new(submitter(&node));

    let mut handles = Vec::new();
    for i in 0..10 {
        let submitter = submitter.clone();
        let lane = if i % 2 == 0 { Lane::Flashblocks } else { Lane::Normal };
        handles.push(tokio::spawn(async move { submitter.submit(lane).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let accepted = node.snapshot(|s| s.accepted_nonces.clone());
    assert_eq!(accepted, (0..10).collect::<Vec<_>>());
    assert_eq!(node.snapshot(|s| s.send_attempts), 10);
}

#[tokio::test]
async fn test_nonce_too_low_resyncs_once_and_retries() {
    let node = MockNode::with_nonce(5);
    let submitter = submitter(&node);
    submitter.submit(Lane::Flashblocks).await.unwrap();

    // Another sender used the account behind our back
    node.update(|s| s.chain_nonce = 9);

    let handle = submitter.submit(Lane::Normal).await.unwrap();

    assert_eq!(handle.transaction_id, hash_for_nonce(9));
    assert_eq!(node.snapshot(|s| s.nonce_reads), 2);
    assert_eq!(node.snapshot(|s| s.send_attempts), 3);
    assert_eq!(submitter.next_nonce().await, Some(10));
}

#[tokio::test]
async fn test_second_nonce_rejection_fails_the_cycle() {
    let node = MockNode::with_nonce(3);
    node.script_send_errors(["nonce too low", "nonce too low: next nonce 4, tx nonce 3"]);
    let submitter = submitter(&node);

    let err = submitter.submit(Lane::Flashblocks).await.unwrap_err();

    assert!(err.is_nonce_desync(), "unexpected error: {err:?}");
    assert!(!err.is_insufficient_funds());
    // Exactly one resync, no third attempt
    assert_eq!(node.snapshot(|s| s.send_attempts), 2);
    assert_eq!(node.snapshot(|s| s.nonce_reads), 2);
    // Local nonce dropped so the next cycle reads it fresh
    assert_eq!(submitter.next_nonce().await, None);

    let handle = submitter.submit(Lane::Flashblocks).await.unwrap();
    assert_eq!(handle.transaction_id, hash_for_nonce(3));
    assert_eq!(node.snapshot(|s| s.nonce_reads), 3);
}

#[tokio::test]
async fn test_insufficient_funds_is_not_retried() {
    let node = MockNode::with_nonce(5);
    node.script_send_errors(["insufficient funds for gas * price + value"]);
    let submitter = submitter(&node);

    let err = submitter.submit(Lane::Normal).await.unwrap_err();

    assert!(err.is_insufficient_funds(), "unexpected error: {err:?}");
    assert_eq!(node.snapshot(|s| s.send_attempts), 1);
    assert_eq!(node.snapshot(|s| s.nonce_reads), 1);
    assert_eq!(submitter.next_nonce().await, Some(5));
}

#[tokio::test]
async fn test_other_rejections_surface_unchanged() {
    let node = MockNode::with_nonce(0);
    node.script_send_errors(["transaction underpriced"]);
    let submitter = submitter(&node);

    let err = submitter.submit(Lane::Flashblocks).await.unwrap_err();

    assert!(matches!(err, SendError::Rpc(_)), "unexpected error: {err:?}");
    assert_eq!(node.snapshot(|s| s.send_attempts), 1);

    // The nonce was never consumed, so the next send reuses it
    let handle = submitter.submit(Lane::Flashblocks).await.unwrap();
    assert_eq!(handle.transaction_id, hash_for_nonce(0));
}

#[tokio::test]
async fn test_reset_nonce_forces_a_fresh_read() {
    let node = MockNode::with_nonce(1);
    let submitter = submitter(&node);
    submitter.submit(Lane::Normal).await.unwrap();

    submitter.reset_nonce().await;
    assert_eq!(submitter.next_nonce().await, None);

    submitter.submit(Lane::Normal).await.unwrap();
    assert_eq!(node.snapshot(|s| s.nonce_reads), 2);
    assert_eq!(node.snapshot(|s| s.accepted_nonces.clone()), vec![1, 2]);
}

#[tokio::test]
async fn test_failed_resync_read_drops_the_rejected_nonce() {
    let node = MockNode::with_nonce(5);
    let submitter = submitter(&node);
    submitter.submit(Lane::Flashblocks).await.unwrap();

    // Nonce 6 is rejected and the node then fails to report a fresh one
    node.update(|s| {
        s.chain_nonce = 9;
        s.fail_nonce_reads = true;
    });

    let err = submitter.submit(Lane::Normal).await.unwrap_err();
    assert!(matches!(err, SendError::Rpc(_)), "unexpected error: {err:?}");
    assert_eq!(submitter.next_nonce().await, None);

    node.update(|s| s.fail_nonce_reads = false);
    let handle = submitter.submit(Lane::Normal).await.unwrap();
    assert_eq!(handle.transaction_id, hash_for_nonce(9));
    assert_eq!(node.snapshot(|s| s.accepted_nonces.clone()), vec![5, 9]);
}

#[tokio::test]
async fn test_chain_id_is_read_once() {
    let node = MockNode::with_nonce(0);
    let submitter = submitter(&node);

    // MockSigner asserts every request carries the node's chain id
    for _ in 0..3 {
        submitter.submit(Lane::Flashblocks).await.unwrap();
    }
    assert_eq!(node.snapshot(|s| s.accepted_nonces.clone()), vec![0, 1, 2]);
    assert_eq!(node.snapshot(|s| s.chain_id_reads), 1);
}
