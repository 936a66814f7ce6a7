//! Handler scenario tests over the in-memory store

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::{BalanceCache, InMemoryBalanceCache};
use crate::domain::{Account, MovementType, TransferStatus};
use crate::error::{ErrorKind, LedgerError};
use crate::handlers::{CreateMovementCommand, MovementWriteMode, TransferCommand};
use crate::ledger::Ledger;
use crate::store::{InMemoryLedgerStore, LedgerStore};

async fn funded_account(ledger: &Ledger, balance: &str) -> Account {
    let account = ledger.accounts.open_account(Uuid::new_v4(), None).await.unwrap();
    ledger
        .movements
        .create(CreateMovementCommand::new(account.id, balance, "credit").with_description("seed"))
        .await
        .unwrap();
    ledger.accounts.get_account(account.id).await.unwrap()
}

// =========================================================================
// Movements
// =========================================================================

#[tokio::test]
async fn test_credit_then_rejected_debit() {
    for mode in [MovementWriteMode::Atomic, MovementWriteMode::Sequential] {
        let store = InMemoryLedgerStore::new();
        let ledger = Ledger::new(
            Arc::new(store.clone()),
            Arc::new(InMemoryBalanceCache::default()),
            mode,
        );
        assert_eq!(ledger.movements.mode(), mode);
        let account = funded_account(&ledger, "100.00").await;

        let movement = ledger
            .movements
            .create(CreateMovementCommand::new(account.id, "10.00", "credit").with_description("dep"))
            .await
            .unwrap();
        assert_eq!(movement.movement_type, MovementType::Credit);
        assert_eq!(movement.amount, dec!(10.00));
        assert_eq!(movement.description, "dep");
        assert_eq!(
            ledger.accounts.get_account(account.id).await.unwrap().balance,
            dec!(110.00)
        );

        let err = ledger
            .movements
            .create(CreateMovementCommand::new(account.id, "200.00", "debit").with_description("wd"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(
            ledger.accounts.get_account(account.id).await.unwrap().balance,
            dec!(110.00)
        );
        assert_eq!(store.movement_count().unwrap(), 2);
    }
}

#[tokio::test]
async fn test_movement_validation_happens_first() {
    let ledger = Ledger::in_memory();

    // Unknown account, but the bad type is reported
    let err = ledger
        .movements
        .create(CreateMovementCommand::new(Uuid::new_v4(), "10.00", "refund"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    for amount in ["0", "-5", "1.001", "ten"] {
        let err = ledger
            .movements
            .create(CreateMovementCommand::new(Uuid::new_v4(), amount, "credit"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest, "amount {amount}");
    }

    let err = ledger
        .movements
        .create(CreateMovementCommand::new(Uuid::new_v4(), "10.00", "credit"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_movement_lookup_and_listing() {
    let ledger = Ledger::in_memory();
    let account = funded_account(&ledger, "50.00").await;

    let debit = ledger
        .movements
        .create(CreateMovementCommand::new(account.id, "5.00", "debit"))
        .await
        .unwrap();
    assert_eq!(ledger.movements.get_by_id(debit.id).await.unwrap(), debit);

    let page = ledger
        .movements
        .list_by_account(account.id, None, None)
        .await
        .unwrap();
    assert_eq!(page.total_items, 2);
    assert_eq!(page.current_page, 1);
    assert_eq!(page.per_page, 10);
    assert_eq!(page.data[0].id, debit.id);

    let err = ledger.movements.get_by_id(9_999).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = ledger
        .movements
        .list_by_account(Uuid::new_v4(), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_pagination_clamps_page_and_limit() {
    let ledger = Ledger::in_memory();
    let account = funded_account(&ledger, "500.00").await;
    for _ in 0..4 {
        ledger
            .movements
            .create(CreateMovementCommand::new(account.id, "1.00", "debit"))
            .await
            .unwrap();
    }

    let page = ledger
        .movements
        .list_by_account(account.id, Some(0), Some(200))
        .await
        .unwrap();
    assert_eq!(page.current_page, 1);
    assert_eq!(page.per_page, 100);
    assert_eq!(page.total_items, 5);
    assert_eq!(page.total_pages, 1);

    let page = ledger
        .movements
        .list_by_account(account.id, Some(2), Some(2))
        .await
        .unwrap();
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.total_pages, 3);
}

// =========================================================================
// Transfers
// =========================================================================

#[tokio::test]
async fn test_transfer_moves_funds() {
    let store = InMemoryLedgerStore::new();
    let ledger = Ledger::with_store(store.clone());
    let a = funded_account(&ledger, "100.00").await;
    let b = funded_account(&ledger, "50.00").await;
    let movements_before = store.movement_count().unwrap();

    let transfer = ledger
        .transfers
        .execute(TransferCommand::new(a.id, b.id, "25.00").with_description("Dinner"))
        .await
        .unwrap();

    assert_eq!(transfer.status, TransferStatus::Completed);
    assert!(transfer.completed_at.is_some());
    assert_eq!(transfer.amount, dec!(25.00));
    assert_eq!(ledger.accounts.get_account(a.id).await.unwrap().balance, dec!(75.00));
    assert_eq!(ledger.accounts.get_account(b.id).await.unwrap().balance, dec!(75.00));
    assert_eq!(store.movement_count().unwrap(), movements_before + 2);

    let debit = &ledger.movements.list_by_account(a.id, None, None).await.unwrap().data[0];
    assert_eq!(debit.movement_type, MovementType::Debit);
    assert_eq!(debit.amount, dec!(25.00));
    assert_eq!(debit.description, format!("Dinner (Transfer #{})", transfer.id));

    let credit = &ledger.movements.list_by_account(b.id, None, None).await.unwrap().data[0];
    assert_eq!(credit.movement_type, MovementType::Credit);
    assert_eq!(credit.amount, dec!(25.00));

    // Both sides see the transfer
    for id in [a.id, b.id] {
        let page = ledger.transfers.list_by_account(id, None, None).await.unwrap();
        assert_eq!(page.total_items, 1);
        assert_eq!(page.data[0].id, transfer.id);
    }
    assert_eq!(ledger.transfers.get_by_id(transfer.id).await.unwrap(), transfer);
}

#[tokio::test]
async fn test_self_transfer_rejected() {
    let ledger = Ledger::in_memory();
    let a = funded_account(&ledger, "100.00").await;

    let err = ledger
        .transfers
        .execute(TransferCommand::new(a.id, a.id, "1.00"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let page = ledger.transfers.list_by_account(a.id, None, None).await.unwrap();
    assert_eq!(page.total_items, 0);
}

#[tokio::test]
async fn test_transfer_rejections_leave_no_record() {
    let ledger = Ledger::in_memory();
    let a = funded_account(&ledger, "10.00").await;
    let b = funded_account(&ledger, "10.00").await;

    let err = ledger
        .transfers
        .execute(TransferCommand::new(a.id, b.id, "10.01"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);

    let err = ledger
        .transfers
        .execute(TransferCommand::new(a.id, b.id, "0"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let err = ledger
        .transfers
        .execute(TransferCommand::new(a.id, Uuid::new_v4(), "1.00"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let page = ledger.transfers.list_by_account(a.id, None, None).await.unwrap();
    assert_eq!(page.total_items, 0);
    assert_eq!(ledger.accounts.get_account(a.id).await.unwrap().balance, dec!(10.00));
}

#[tokio::test]
async fn test_cross_currency_transfer_rejected() {
    let ledger = Ledger::in_memory();
    let a = funded_account(&ledger, "10.00").await;
    let usd = ledger
        .accounts
        .open_account(Uuid::new_v4(), Some("USD"))
        .await
        .unwrap();

    let err = ledger
        .transfers
        .execute(TransferCommand::new(a.id, usd.id, "1.00"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_transfers_do_not_deadlock() {
    let store = InMemoryLedgerStore::new();
    let ledger = Ledger::with_store(store.clone());
    let a = funded_account(&ledger, "1000.00").await;
    let b = funded_account(&ledger, "1000.00").await;

    let mut handles = Vec::new();
    for i in 0..40 {
        let ledger = ledger.clone();
        let (from, to) = if i % 2 == 0 { (a.id, b.id) } else { (b.id, a.id) };
        handles.push(tokio::spawn(async move {
            ledger
                .transfers
                .execute(TransferCommand::new(from, to, "7.00"))
                .await
        }));
    }

    let results = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        results
    })
    .await
    .expect("transfers deadlocked");

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(store.total_balance().unwrap(), dec!(2000.00));
    assert_eq!(ledger.accounts.get_account(a.id).await.unwrap().balance, dec!(1000.00));
}

// =========================================================================
// Balance reads and cache
// =========================================================================

#[tokio::test]
async fn test_balance_read_through_cache() {
    let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
    let cache = Arc::new(InMemoryBalanceCache::default());
    let ledger = Ledger::new(store, cache.clone(), MovementWriteMode::Atomic);
    let a = funded_account(&ledger, "40.00").await;
    let b = funded_account(&ledger, "0.50").await;

    // Refreshed after the seeding movement
    assert_eq!(cache.get(a.id).await.unwrap(), Some(dec!(40.00)));

    ledger
        .transfers
        .execute(TransferCommand::new(a.id, b.id, "15.25"))
        .await
        .unwrap();
    assert_eq!(cache.get(a.id).await.unwrap(), Some(dec!(24.75)));
    assert_eq!(cache.get(b.id).await.unwrap(), Some(dec!(15.75)));

    // Miss falls back to the store and repopulates
    cache.invalidate(a.id).await.unwrap();
    assert_eq!(ledger.accounts.get_balance(a.id).await.unwrap(), dec!(24.75));
    assert_eq!(cache.get(a.id).await.unwrap(), Some(dec!(24.75)));

    let err = ledger.accounts.get_balance(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_open_account_defaults() {
    let ledger = Ledger::in_memory();
    let owner = Uuid::new_v4();

    let account = ledger.accounts.open_account(owner, None).await.unwrap();
    assert_eq!(account.balance, Decimal::ZERO);
    assert_eq!(account.currency, "EUR");
    assert_eq!(ledger.accounts.get_balance(account.id).await.unwrap(), Decimal::ZERO);
    assert_eq!(
        ledger.accounts.get_account_by_owner(owner).await.unwrap().id,
        account.id
    );

    let err = ledger.accounts.open_account(owner, None).await.unwrap_err();
    assert!(matches!(err.root(), LedgerError::BadRequest(_)));
}
