mod common;

use common::logging;
use common::wallet_node::WalletNode;
use common::wallet_node::TEST_FEE;
use hd_wallet_core::models::account::account_event::DomainEvent;
use hd_wallet_core::models::account::pending_debit::BroadcastStatus;
use hd_wallet_core::models::primitives::outer_entity::OuterEntity;
use hd_wallet_core::models::primitives::satoshi::Satoshi;
use hd_wallet_core::ErrorCode;

/// test: alice pays bob, both wallets on the same node.
///
/// scenario:
/// 1. alice's first receive address is funded with 100 000 sat.
/// 2. alice pays 30 000 sat to bob's first receive address.
/// 3. a block is mined.
/// 4. bob sees the payment confirmed, alice sees her change confirmed.
#[tokio::test(flavor = "multi_thread")]
pub async fn alice_pays_bob() -> anyhow::Result<()> {
    logging::tracing_logger();

    let node = WalletNode::start_default_node().await?;
    let alice = node.funded_account(0, Satoshi::new(100_000)).await?;
    assert_eq!(alice.confirmed_balance(), Satoshi::new(100_000));

    let bob = node.account(1).await?;
    let (bob, bob_address, _) = node.service.get_address_for_account(&bob, None).await?;
    let mut alice_events = alice.subscribe();

    let alice = node
        .service
        .pay(
            &alice,
            Satoshi::new(30_000),
            &[OuterEntity::other_user("bob", bob_address.clone())],
        )
        .await?;
    tracing::info!("alice paid bob!");
    assert_eq!(alice.balance(), Satoshi::new(70_000 - TEST_FEE.to_sat()));

    // the pay pipeline issued a fresh pair for change, then broadcast
    let mut seen = vec![];
    loop {
        let event = alice_events.recv().await?.event;
        let done = matches!(event, DomainEvent::Debited { .. });
        seen.push(event);
        if done {
            break;
        }
    }
    assert_eq!(seen.len(), 3);
    assert!(matches!(seen[0], DomainEvent::WatchingAddressUpdated(_)));
    assert!(matches!(seen[1], DomainEvent::WatchingAddressUpdated(_)));
    assert!(matches!(
        seen[2],
        DomainEvent::Debited { amount, .. } if amount == Satoshi::new(30_000)
    ));

    node.chain.mine().await;

    let bob = node
        .wait_until(&bob, |b| b.confirmed_balance() == Satoshi::new(30_000))
        .await?;
    assert!(bob.pending_debits().is_empty());

    let alice = node
        .wait_until(&alice, |a| {
            a.pending_debits().is_empty()
                && a.confirmed_balance() == Satoshi::new(70_000 - TEST_FEE.to_sat())
        })
        .await?;
    assert_eq!(alice.balance(), alice.confirmed_balance());

    Ok(())
}

/// test: one payment to several users pays each of them the amount.
#[tokio::test(flavor = "multi_thread")]
pub async fn alice_pays_two_users_at_once() -> anyhow::Result<()> {
    logging::tracing_logger();

    let node = WalletNode::start_default_node().await?;
    let alice = node.funded_account(0, Satoshi::new(10_000)).await?;

    let mut destinations = vec![];
    let mut payees = vec![];
    for (index, name) in [(1, "bob"), (2, "carol")] {
        let payee = node.account(index).await?;
        let (payee, address, _) = node.service.get_address_for_account(&payee, None).await?;
        destinations.push(OuterEntity::other_user(name, address));
        payees.push(payee);
    }

    let alice = node
        .service
        .pay(&alice, Satoshi::new(1_000), &destinations)
        .await?;
    assert_eq!(alice.pending_debits()[0].amount, Satoshi::new(2_000));

    node.wait_until(&alice, |a| {
        a.pending_debits()
            .iter()
            .all(|d| d.status != BroadcastStatus::InFlight)
    })
    .await?;
    node.chain.mine().await;

    for payee in &payees {
        node.wait_until(payee, |p| p.confirmed_balance() == Satoshi::new(1_000))
            .await?;
    }
    Ok(())
}

/// test: payments to anything but a wallet user are refused outright.
#[tokio::test(flavor = "multi_thread")]
pub async fn external_address_is_not_payable() -> anyhow::Result<()> {
    logging::tracing_logger();

    let node = WalletNode::start_default_node().await?;
    let alice = node.funded_account(0, Satoshi::new(10_000)).await?;
    let outsider = alice.watching_addresses()[0].clone();

    let err = node
        .service
        .pay(
            &alice,
            Satoshi::new(1_000),
            &[OuterEntity::ExternalAddress(outsider)],
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedDestination);
    assert_eq!(err.code().to_string(), "UNSUPPORTED_DESTINATION");

    let alice = node.service.refresh(&alice).await;
    assert!(alice.pending_debits().is_empty());
    assert!(node.chain.submitted_transactions().await.is_empty());
    Ok(())
}
