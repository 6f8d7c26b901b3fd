use chrono::{TimeDelta, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use mini_wallet::config::{ReconcileConfig, WalletConfig};
use mini_wallet::store::{MemoryStore, StoreOp};
use mini_wallet::{
    NewTransaction, Reconciler, RepairAction, Transaction, TransactionId, TransferError,
    TransferInput, TxKind, TxStatus, User, ValidationError, Wallet, check_balance,
};

struct Ledger {
    store: Arc<MemoryStore>,
    wallet: Wallet,
    reconciler: Reconciler,
}

/// Users whose cached balances match a single opening top-up each
fn ledger(balances: &[(&str, Decimal)]) -> Ledger {
    let store = Arc::new(MemoryStore::new());
    for (id, balance) in balances {
        store.insert_user(User {
            id: (*id).into(),
            name: format!("user{}", id),
            balance: *balance,
        });
        store.insert_transaction(
            NewTransaction::top_up(&(*id).into(), *balance, "Top-up".into(), Utc::now())
                .into_transaction(format!("open-{}", id).into()),
        );
    }
    Ledger {
        wallet: Wallet::new(store.clone(), WalletConfig::default()),
        reconciler: Reconciler::new(store.clone(), ReconcileConfig::default()),
        store,
    }
}

fn transfer(from: &str, to: &str, amount: &str) -> TransferInput {
    TransferInput {
        sender_id: from.into(),
        recipient_id: Some(to.into()),
        amount: amount.into(),
        note: None,
    }
}

fn balance(store: &MemoryStore, id: &str) -> Decimal {
    store.user(&id.into()).unwrap().balance
}

fn assert_balance_invariant(store: &MemoryStore) {
    let transactions = store.transactions();
    for user in store.users() {
        let check = check_balance(&user, &transactions);
        assert!(
            check.is_consistent,
            "user {} stored {} derived {}",
            user.id, check.stored, check.derived
        );
    }
}

fn linked_credits(store: &MemoryStore, debit_id: &TransactionId) -> Vec<Transaction> {
    store
        .transactions()
        .into_iter()
        .filter(|tx| tx.kind == TxKind::Credit && tx.is_linked_to(debit_id))
        .collect()
}

/// Debit + fee written and sender charged, then the process died
fn seed_crashed_transfer(store: &MemoryStore, age: TimeDelta) -> TransactionId {
    let created = Utc::now() - age;
    let debit = NewTransaction::debit(&"1".into(), &"2".into(), dec!(500), "rent".into(), created)
        .into_transaction("crash-debit".into());
    store.insert_transaction(NewTransaction::fee(&debit, dec!(10), created).into_transaction("crash-fee".into()));
    store.insert_transaction(debit);
    let mut sender = store.user(&"1".into()).unwrap();
    sender.balance -= dec!(510);
    store.insert_user(sender);
    "crash-debit".into()
}

#[tokio::test]
async fn scenario_a_successful_transfer() {
    let l = ledger(&[("1", dec!(5000)), ("2", dec!(200))]);

    let receipt = l.wallet.transfer(&transfer("1", "2", "500")).await.unwrap();
    assert_eq!(receipt.fee, dec!(10));
    assert_eq!(receipt.total, dec!(510));
    assert_eq!(balance(&l.store, "1"), dec!(4490));
    assert_eq!(balance(&l.store, "2"), dec!(700));
    assert_eq!(l.store.transaction(&receipt.fee_id).unwrap().status, TxStatus::Success);
    assert_balance_invariant(&l.store);
}

#[tokio::test]
async fn scenario_b_insufficient_balance_rejected_before_any_write() {
    let l = ledger(&[("1", dec!(100)), ("2", dec!(0))]);

    let err = l.wallet.transfer(&transfer("1", "2", "500")).await.unwrap_err();
    assert!(err.is_user_correctable());
    assert!(err.to_string().contains("Insufficient balance"));
    assert_eq!(l.store.mutation_count(), 0);
}

#[tokio::test]
async fn validation_reports_every_violation() {
    let l = ledger(&[("1", dec!(100))]);
    let mut input = transfer("1", "1", "abc");
    input.note = Some("x".repeat(201));

    let err = l.wallet.transfer(&input).await.unwrap_err();
    let errors = match err {
        TransferError::Validation(errors) => errors,
        other => panic!("expected validation error, got {:?}", other),
    };
    assert!(errors.contains(|e| *e == ValidationError::AmountNotNumeric));
    assert!(errors.contains(|e| *e == ValidationError::SelfTransfer));
    assert!(errors.contains(|e| matches!(e, ValidationError::NoteTooLong { .. })));
}

#[tokio::test]
async fn scenario_c_recent_crash_rolls_forward() {
    let l = ledger(&[("1", dec!(5000)), ("2", dec!(0))]);
    let debit_id = seed_crashed_transfer(&l.store, TimeDelta::hours(1));

    let report = l.reconciler.run_once().await.unwrap().unwrap();
    assert_eq!(report.completed, vec![debit_id.clone()]);

    assert_eq!(l.store.transaction(&debit_id).unwrap().status, TxStatus::Success);
    assert_eq!(l.store.transaction(&"crash-fee".into()).unwrap().status, TxStatus::Success);
    let credits = linked_credits(&l.store, &debit_id);
    assert_eq!(credits.len(), 1);
    assert_eq!(credits[0].user_id.as_str(), "2");
    assert_eq!(balance(&l.store, "2"), dec!(500));
    assert_eq!(balance(&l.store, "1"), dec!(4490));
    assert_balance_invariant(&l.store);
}

#[tokio::test]
async fn scenario_d_stale_crash_is_refunded() {
    let l = ledger(&[("1", dec!(5000)), ("2", dec!(0))]);
    let debit_id = seed_crashed_transfer(&l.store, TimeDelta::hours(30));

    let report = l.reconciler.run_once().await.unwrap().unwrap();
    assert_eq!(report.refunded, vec![debit_id.clone()]);

    assert_eq!(l.store.transaction(&debit_id).unwrap().status, TxStatus::Failed);
    assert_eq!(l.store.transaction(&"crash-fee".into()).unwrap().status, TxStatus::Failed);
    let credits = linked_credits(&l.store, &debit_id);
    assert_eq!(credits.len(), 1);
    assert_eq!(credits[0].user_id.as_str(), "1");
    assert_eq!(credits[0].amount, dec!(510));
    assert_eq!(balance(&l.store, "1"), dec!(5000));
    assert_eq!(balance(&l.store, "2"), dec!(0));
    assert_balance_invariant(&l.store);
}

#[tokio::test]
async fn scenario_e_restored_debit_reappears_unchanged() {
    let l = ledger(&[("1", dec!(5000)), ("2", dec!(0))]);
    let receipt = l.wallet.transfer(&transfer("1", "2", "500")).await.unwrap();
    let before = l.wallet.check_balance(&"1".into()).await.unwrap().derived;
    let count = l.store.transactions().len();

    l.wallet.delete_transaction(&receipt.debit_id).await.unwrap();
    assert_eq!(
        l.wallet.check_balance(&"1".into()).await.unwrap().derived,
        before + dec!(500)
    );

    l.wallet.restore_transaction(&receipt.debit_id).await.unwrap();
    assert_eq!(l.wallet.check_balance(&"1".into()).await.unwrap().derived, before);
    assert_eq!(l.store.transactions().len(), count);
}

#[tokio::test]
async fn reconciliation_is_idempotent() {
    let l = ledger(&[("1", dec!(5000)), ("2", dec!(0)), ("3", dec!(0))]);
    seed_crashed_transfer(&l.store, TimeDelta::hours(2));
    l.wallet.transfer(&transfer("1", "3", "100")).await.unwrap();

    l.reconciler.reconcile().await.unwrap();
    let writes = l.store.mutation_count();
    assert_balance_invariant(&l.store);

    let second = l.reconciler.reconcile().await.unwrap();
    assert!(second.is_clean());
    assert_eq!(l.store.mutation_count(), writes);
}

#[tokio::test]
async fn interrupted_reconciliation_converges() {
    let l = ledger(&[("1", dec!(5000)), ("2", dec!(0))]);
    let debit_id = seed_crashed_transfer(&l.store, TimeDelta::hours(1));
    // Credit lands, recipient balance update does not
    l.store.fail_nth(StoreOp::UpdateUserBalance, 1);

    let first = l.reconciler.reconcile().await.unwrap();
    assert_eq!(first.skipped.len(), 1);
    assert!(first.completed.is_empty());
    // the re-sync step picks up the recipient's missing 500
    assert_eq!(first.resynced.len(), 1);
    assert_eq!(first.resynced[0].user_id.as_str(), "2");

    l.reconciler.reconcile().await.unwrap();
    assert_eq!(linked_credits(&l.store, &debit_id).len(), 1);
    assert_eq!(l.store.transaction(&debit_id).unwrap().status, TxStatus::Success);
    assert_eq!(balance(&l.store, "2"), dec!(500));
    assert_balance_invariant(&l.store);
}

#[tokio::test]
async fn compensated_transfer_keeps_ledger_consistent() {
    let l = ledger(&[("1", dec!(5000)), ("2", dec!(0))]);
    // debit, fee, then the recipient's credit fails
    l.store.fail_nth(StoreOp::CreateTransaction, 3);

    let err = l.wallet.transfer(&transfer("1", "2", "500")).await.unwrap_err();
    assert_eq!(err.code(), "TRANSFER_REFUNDED");
    let debit_id = err.debit_id().unwrap().clone();

    let refund = linked_credits(&l.store, &debit_id);
    assert_eq!(refund.len(), 1);
    assert_eq!(refund[0].amount, dec!(510));
    assert_eq!(balance(&l.store, "1"), dec!(5000));
    assert_balance_invariant(&l.store);

    let report = l.reconciler.reconcile().await.unwrap();
    assert!(report.is_clean());
}

#[tokio::test]
async fn compensation_failure_is_repaired_by_reconciliation() {
    let l = ledger(&[("1", dec!(5000)), ("2", dec!(0))]);
    // recipient credit fails, then the refund credit fails too
    l.store.fail_nth(StoreOp::CreateTransaction, 3);
    l.store.fail_nth(StoreOp::CreateTransaction, 4);

    let err = l.wallet.transfer(&transfer("1", "2", "500")).await.unwrap_err();
    assert_eq!(err.code(), "COMPENSATION_FAILED");
    assert!(err.to_string().contains("contact support"));
    let debit_id = err.debit_id().unwrap().clone();

    let report = l.reconciler.reconcile().await.unwrap();
    assert_eq!(report.completed, vec![debit_id.clone()]);

    let credits = linked_credits(&l.store, &debit_id);
    assert_eq!(credits.len(), 1);
    assert_eq!(credits[0].user_id.as_str(), "2");
    assert_eq!(balance(&l.store, "1"), dec!(4490));
    assert_eq!(balance(&l.store, "2"), dec!(500));
    assert_balance_invariant(&l.store);
}

#[tokio::test]
async fn unfinalized_transfer_is_marked_by_reconciliation() {
    let l = ledger(&[("1", dec!(5000)), ("2", dec!(0))]);
    l.store.fail_always(StoreOp::PatchTransaction);

    let receipt = l.wallet.transfer(&transfer("1", "2", "500")).await.unwrap();
    assert!(!receipt.finalized);
    l.store.clear_faults();

    let report = l.reconciler.reconcile().await.unwrap();
    assert_eq!(report.already_completed, vec![receipt.debit_id.clone()]);
    assert_eq!(l.store.transaction(&receipt.debit_id).unwrap().status, TxStatus::Success);
    assert_eq!(linked_credits(&l.store, &receipt.debit_id).len(), 1);
    assert_balance_invariant(&l.store);
}

#[tokio::test]
async fn startup_pass_runs_once_per_process() {
    let l = ledger(&[("1", dec!(5000)), ("2", dec!(0))]);

    assert!(l.reconciler.run_once().await.unwrap().is_some());
    seed_crashed_transfer(&l.store, TimeDelta::hours(1));
    assert!(l.reconciler.run_once().await.unwrap().is_none());
    assert_eq!(l.store.transaction(&"crash-debit".into()).unwrap().status, TxStatus::Pending);

    l.reconciler.reset();
    let report = l.reconciler.run_once().await.unwrap().unwrap();
    assert_eq!(report.completed.len(), 1);
}

#[tokio::test]
async fn refund_with_unmarked_debit_is_finished_by_next_pass() {
    let l = ledger(&[("1", dec!(5000)), ("2", dec!(0))]);
    let debit_id = seed_crashed_transfer(&l.store, TimeDelta::hours(30));
    // Refund and sender balance land, marking the fee failed does not
    l.store.fail_nth(StoreOp::PatchTransaction, 1);

    let first = l.reconciler.reconcile().await.unwrap();
    assert_eq!(first.skipped.len(), 1);
    assert!(first.resynced.is_empty());
    assert_eq!(l.store.transaction(&debit_id).unwrap().status, TxStatus::Pending);
    assert_eq!(balance(&l.store, "1"), dec!(5000));
    assert_balance_invariant(&l.store);

    let second = l.reconciler.reconcile().await.unwrap();
    assert_eq!(second.already_refunded, vec![debit_id.clone()]);
    assert!(second.refunded.is_empty());
    assert_eq!(l.store.transaction(&debit_id).unwrap().status, TxStatus::Failed);
    assert_eq!(l.store.transaction(&"crash-fee".into()).unwrap().status, TxStatus::Failed);

    let writes = l.store.mutation_count();
    assert!(l.reconciler.reconcile().await.unwrap().is_clean());
    assert_eq!(l.store.mutation_count(), writes);
    assert_eq!(linked_credits(&l.store, &debit_id).len(), 1);
    assert_eq!(balance(&l.store, "1"), dec!(5000));
    assert_balance_invariant(&l.store);
}

#[tokio::test]
async fn interrupted_stale_refund_converges() {
    let l = ledger(&[("1", dec!(5000)), ("2", dec!(0))]);
    let debit_id = seed_crashed_transfer(&l.store, TimeDelta::hours(30));
    // Refund credit lands, sender balance update does not
    l.store.fail_nth(StoreOp::UpdateUserBalance, 1);

    let first = l.reconciler.reconcile().await.unwrap();
    assert_eq!(first.skipped.len(), 1);
    assert_eq!(first.resynced.len(), 1);
    assert_eq!(first.resynced[0].user_id.as_str(), "1");
    assert_eq!(first.resynced[0].derived, dec!(5000));

    let second = l.reconciler.reconcile().await.unwrap();
    assert_eq!(second.already_refunded, vec![debit_id.clone()]);
    assert!(second.resynced.is_empty());

    let writes = l.store.mutation_count();
    assert!(l.reconciler.reconcile().await.unwrap().is_clean());
    assert_eq!(l.store.mutation_count(), writes);

    let refunds = linked_credits(&l.store, &debit_id);
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].amount, dec!(510));
    assert_eq!(balance(&l.store, "1"), dec!(5000));
    assert_eq!(l.store.transaction(&debit_id).unwrap().status, TxStatus::Failed);
    assert_balance_invariant(&l.store);
}

#[tokio::test]
async fn retry_of_refunded_transfer_does_nothing() {
    let l = ledger(&[("1", dec!(5000)), ("2", dec!(0))]);
    let debit_id = seed_crashed_transfer(&l.store, TimeDelta::hours(30));
    l.reconciler.reconcile().await.unwrap();
    let writes = l.store.mutation_count();

    let action = l.reconciler.retry_transfer(&debit_id).await.unwrap();
    assert_eq!(action, RepairAction::SkippedFailed);
    assert_eq!(l.store.mutation_count(), writes);
    assert_eq!(balance(&l.store, "2"), dec!(0));
    assert_eq!(linked_credits(&l.store, &debit_id).len(), 1);
}
