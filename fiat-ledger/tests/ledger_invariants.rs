//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Money conservation: transfers move value, never create or destroy it
//! - Journal integrity: balance replays from entries, sequences are gap-free
//! - Idempotency: a key replays its original result, duplicates apply nothing

use fiat_ledger::{AccountType, Config, EntryType, Error, Ledger};
use proptest::prelude::*;

/// Create test ledger with temp directory
fn create_test_ledger() -> (Ledger, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    (Ledger::open(config).unwrap(), temp_dir)
}

/// A randomly generated ledger operation over two accounts
#[derive(Debug, Clone)]
enum Op {
    DepositA(u64),
    DepositB(u64),
    TransferAToB(u64),
    TransferBToA(u64),
    WithdrawA(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..10_000).prop_map(Op::DepositA),
        (1u64..10_000).prop_map(Op::DepositB),
        (1u64..10_000).prop_map(Op::TransferAToB),
        (1u64..10_000).prop_map(Op::TransferBToA),
        (1u64..10_000).prop_map(Op::WithdrawA),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: external credits minus external debits equals held balances,
    /// no matter how transfers shuffle value between the accounts
    #[test]
    fn prop_money_conservation(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _dir) = create_test_ledger();

            let a = ledger
                .open_account("1111".into(), "Alice".into(), AccountType::Personal)
                .await
                .unwrap();
            let b = ledger
                .open_account("2222".into(), "Bob".into(), AccountType::Personal)
                .await
                .unwrap();

            let mut external_in: u64 = 0;
            let mut external_out: u64 = 0;

            for op in &ops {
                match op {
                    Op::DepositA(amount) => {
                        ledger.deposit(a.account_id, *amount).await.unwrap();
                        external_in += amount;
                    }
                    Op::DepositB(amount) => {
                        ledger.deposit(b.account_id, *amount).await.unwrap();
                        external_in += amount;
                    }
                    Op::TransferAToB(amount) => {
                        // Insufficient funds reject cleanly; nothing moves.
                        let _ = ledger
                            .transfer(
                                a.account_id,
                                b.branch_code.clone(),
                                b.account_number.clone(),
                                *amount,
                                None,
                            )
                            .await;
                    }
                    Op::TransferBToA(amount) => {
                        let _ = ledger
                            .transfer(
                                b.account_id,
                                a.branch_code.clone(),
                                a.account_number.clone(),
                                *amount,
                                None,
                            )
                            .await;
                    }
                    Op::WithdrawA(amount) => {
                        if ledger.withdraw(a.account_id, *amount).await.is_ok() {
                            external_out += amount;
                        }
                    }
                }
            }

            let final_a = ledger.get_account(&a.account_id).unwrap();
            let final_b = ledger.get_account(&b.account_id).unwrap();

            prop_assert_eq!(
                final_a.balance + final_b.balance,
                external_in - external_out
            );

            // Journals replay to the exact balances with gap-free sequences
            ledger.verify_account(&a.account_id).unwrap();
            ledger.verify_account(&b.account_id).unwrap();

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: every committed mutation appears in history exactly once,
    /// newest first, with strictly decreasing sequence numbers
    #[test]
    fn prop_history_is_complete_and_ordered(amounts in prop::collection::vec(1u64..5_000, 1..30)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _dir) = create_test_ledger();
            let account = ledger
                .open_account("1111".into(), "Alice".into(), AccountType::Personal)
                .await
                .unwrap();

            for amount in &amounts {
                ledger.deposit(account.account_id, *amount).await.unwrap();
            }

            let history = ledger
                .list_transactions(&account.account_id, amounts.len() + 10, None)
                .unwrap();
            prop_assert_eq!(history.len(), amounts.len());

            for (i, entry) in history.iter().enumerate() {
                prop_assert_eq!(entry.sequence_number, (amounts.len() - i) as u64);
            }

            // History amounts match the applied deposits, newest first
            let recorded: Vec<u64> = history.iter().rev().map(|e| e.amount).collect();
            prop_assert_eq!(recorded, amounts.clone());

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: replaying an idempotency key never moves money again
    #[test]
    fn prop_idempotent_replay_is_free(replays in 1usize..6) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _dir) = create_test_ledger();

            let a = ledger
                .open_account("1111".into(), "Alice".into(), AccountType::Personal)
                .await
                .unwrap();
            let b = ledger
                .open_account("2222".into(), "Bob".into(), AccountType::Personal)
                .await
                .unwrap();

            ledger.deposit(a.account_id, 10_000).await.unwrap();

            let first = ledger
                .transfer(
                    a.account_id,
                    b.branch_code.clone(),
                    b.account_number.clone(),
                    3_000,
                    Some("key-1".to_string()),
                )
                .await
                .unwrap();

            for _ in 0..replays {
                let replay = ledger
                    .transfer(
                        a.account_id,
                        b.branch_code.clone(),
                        b.account_number.clone(),
                        3_000,
                        Some("key-1".to_string()),
                    )
                    .await
                    .unwrap();
                prop_assert!(replay.replayed);
                prop_assert_eq!(replay.receipt, first.receipt);
            }

            prop_assert_eq!(ledger.get_account(&a.account_id).unwrap().balance, 7_000);
            prop_assert_eq!(ledger.get_account(&b.account_id).unwrap().balance, 3_000);

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[tokio::test]
    async fn test_transfer_writes_both_sides_atomically() {
        let (ledger, _dir) = create_test_ledger();

        let a = ledger
            .open_account("1111".into(), "Alice".into(), AccountType::Personal)
            .await
            .unwrap();
        let b = ledger
            .open_account("2222".into(), "Bob".into(), AccountType::Personal)
            .await
            .unwrap();

        ledger.deposit(a.account_id, 10_000).await.unwrap();

        let outcome = ledger
            .transfer(
                a.account_id,
                b.branch_code.clone(),
                b.account_number.clone(),
                3_000,
                Some("k1".to_string()),
            )
            .await
            .unwrap();

        assert!(!outcome.replayed);
        assert_eq!(outcome.receipt.balance, 7_000);
        assert_eq!(ledger.get_account(&a.account_id).unwrap().balance, 7_000);
        assert_eq!(ledger.get_account(&b.account_id).unwrap().balance, 3_000);

        // Sender journal: atm_in at sequence 1, transfer_out at sequence 2
        let a_history = ledger.list_transactions(&a.account_id, 10, None).unwrap();
        assert_eq!(a_history.len(), 2);
        assert_eq!(a_history[0].entry_type, EntryType::TransferOut);
        assert_eq!(a_history[0].sequence_number, 2);
        assert_eq!(a_history[0].balance, 7_000);
        assert_eq!(
            a_history[0].counterparty.as_ref().unwrap().account_number,
            b.account_number
        );
        assert_eq!(a_history[1].entry_type, EntryType::AtmIn);

        // Receiver journal: transfer_in at sequence 1
        let b_history = ledger.list_transactions(&b.account_id, 10, None).unwrap();
        assert_eq!(b_history.len(), 1);
        assert_eq!(b_history[0].entry_type, EntryType::TransferIn);
        assert_eq!(b_history[0].sequence_number, 1);
        assert_eq!(b_history[0].balance, 3_000);
        assert_eq!(
            b_history[0].counterparty.as_ref().unwrap().account_number,
            a.account_number
        );

        // Replay of "k1" returns the original receipt untouched
        let replay = ledger
            .transfer(
                a.account_id,
                b.branch_code.clone(),
                b.account_number.clone(),
                3_000,
                Some("k1".to_string()),
            )
            .await
            .unwrap();
        assert!(replay.replayed);
        assert_eq!(replay.receipt, outcome.receipt);
        assert_eq!(ledger.get_account(&a.account_id).unwrap().balance, 7_000);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_no_trace() {
        let (ledger, _dir) = create_test_ledger();

        let a = ledger
            .open_account("1111".into(), "Alice".into(), AccountType::Personal)
            .await
            .unwrap();
        let b = ledger
            .open_account("2222".into(), "Bob".into(), AccountType::Personal)
            .await
            .unwrap();

        ledger.deposit(a.account_id, 100).await.unwrap();

        let err = ledger
            .transfer(
                a.account_id,
                b.branch_code.clone(),
                b.account_number.clone(),
                500,
                Some("k-fail".to_string()),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientBalance { available: 100, requested: 500 }
        ));

        // No balances moved, no journal entries, and the key was not claimed:
        // a retry after funding succeeds
        assert_eq!(ledger.get_account(&a.account_id).unwrap().balance, 100);
        assert_eq!(ledger.get_account(&b.account_id).unwrap().balance, 0);
        assert_eq!(ledger.list_transactions(&b.account_id, 10, None).unwrap().len(), 0);

        ledger.deposit(a.account_id, 1_000).await.unwrap();
        let retry = ledger
            .transfer(
                a.account_id,
                b.branch_code.clone(),
                b.account_number.clone(),
                500,
                Some("k-fail".to_string()),
            )
            .await
            .unwrap();
        assert!(!retry.replayed);
        assert_eq!(ledger.get_account(&b.account_id).unwrap().balance, 500);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_virtual_account_routing_settles_to_parent() {
        let (ledger, _dir) = create_test_ledger();

        let corp = ledger
            .open_account("1234".into(), "Acme".into(), AccountType::Corporate)
            .await
            .unwrap();
        assert_eq!(corp.branch_code, "001");
        assert_eq!(corp.account_number, "0010000");

        let va = ledger
            .create_virtual_account(corp.account_id, "invoice-42".into())
            .await
            .unwrap();
        assert_eq!(va.account_number, "0010001");
        assert_eq!(va.branch_code, "001");

        let payer = ledger
            .open_account("1111".into(), "Alice".into(), AccountType::Personal)
            .await
            .unwrap();
        ledger.deposit(payer.account_id, 5_000).await.unwrap();

        ledger
            .transfer(
                payer.account_id,
                va.branch_code.clone(),
                va.account_number.clone(),
                2_000,
                None,
            )
            .await
            .unwrap();

        // The parent holds the funds; its journal records the routed number
        let parent = ledger.get_account(&corp.account_id).unwrap();
        assert_eq!(parent.balance, 2_000);

        let history = ledger.list_transactions(&corp.account_id, 10, None).unwrap();
        assert_eq!(history[0].virtual_account_number, Some(va.account_number.clone()));
        assert_eq!(history[0].virtual_account_label, Some("invoice-42".to_string()));

        // Deactivation stops new routing
        ledger
            .update_virtual_account(va.virtual_account_id, None, Some(false))
            .await
            .unwrap();
        let err = ledger
            .transfer(
                payer.account_id,
                va.branch_code.clone(),
                va.account_number.clone(),
                100,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_event_credit_double_delivery_applies_once() {
        let (ledger, _dir) = create_test_ledger();

        let corp = ledger
            .open_account("1234".into(), "Acme".into(), AccountType::Corporate)
            .await
            .unwrap();

        let first = ledger
            .apply_deposit_event(
                "bank-deposit",
                "msg-001",
                corp.account_id,
                7_500,
                "Incoming wire".to_string(),
                Some("wire-ref-1".to_string()),
            )
            .await
            .unwrap();
        assert!(first.is_some());

        // Redelivery of the same message: no-op, no journal entry
        let second = ledger
            .apply_deposit_event(
                "bank-deposit",
                "msg-001",
                corp.account_id,
                7_500,
                "Incoming wire".to_string(),
                Some("wire-ref-1".to_string()),
            )
            .await
            .unwrap();
        assert!(second.is_none());

        assert_eq!(ledger.get_account(&corp.account_id).unwrap().balance, 7_500);
        assert_eq!(
            ledger.list_transactions(&corp.account_id, 10, None).unwrap().len(),
            1
        );
        ledger.verify_account(&corp.account_id).unwrap();

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_virtual_allocator_exhaustion_has_no_partial_state() {
        let (ledger, _dir) = create_test_ledger();

        let corp = ledger
            .open_account("1234".into(), "Acme".into(), AccountType::Corporate)
            .await
            .unwrap();

        for i in 0..9_999u32 {
            ledger
                .create_virtual_account(corp.account_id, format!("slot-{i}"))
                .await
                .unwrap();
        }

        let err = ledger
            .create_virtual_account(corp.account_id, "one-too-many".into())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RangeExceeded(_)));

        // Exactly 9999 exist; the failed allocation left nothing behind
        let listed = ledger.list_virtual_accounts(&corp.account_id).unwrap();
        assert_eq!(listed.len(), 9_999);

        // A second corporate account still allocates its own namespace
        let other = ledger
            .open_account("5678".into(), "Globex".into(), AccountType::Corporate)
            .await
            .unwrap();
        let va = ledger
            .create_virtual_account(other.account_id, "fresh".into())
            .await
            .unwrap();
        assert_eq!(va.account_number, "0020001");

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_corporate_allocator_exhausts_at_999() {
        let (ledger, _dir) = create_test_ledger();

        for i in 0..999u32 {
            ledger
                .open_account("1234".into(), format!("Corp {i}"), AccountType::Corporate)
                .await
                .unwrap();
        }

        let err = ledger
            .open_account("1234".into(), "Corp 999".into(), AccountType::Corporate)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RangeExceeded(_)));

        // The failed allocation created nothing; the last issued number still routes
        assert!(ledger.lookup_routing("001", "9990000").is_ok());

        // Personal accounts use their own namespace and are unaffected
        let personal = ledger
            .open_account("1234".into(), "Alice".into(), AccountType::Personal)
            .await
            .unwrap();
        assert_eq!(personal.account_number, "0000001");

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_virtual_accounts_require_corporate_parent() {
        let (ledger, _dir) = create_test_ledger();

        let personal = ledger
            .open_account("1111".into(), "Alice".into(), AccountType::Personal)
            .await
            .unwrap();

        let err = ledger
            .create_virtual_account(personal.account_id, "nope".into())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_self_transfer_rejected() {
        let (ledger, _dir) = create_test_ledger();

        let a = ledger
            .open_account("1111".into(), "Alice".into(), AccountType::Personal)
            .await
            .unwrap();
        ledger.deposit(a.account_id, 1_000).await.unwrap();

        let err = ledger
            .transfer(
                a.account_id,
                a.branch_code.clone(),
                a.account_number.clone(),
                100,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(ledger.get_account(&a.account_id).unwrap().balance, 1_000);

        ledger.shutdown().await.unwrap();
    }
}
