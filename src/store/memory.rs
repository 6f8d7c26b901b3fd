//! In-memory Resource Store
//!
//! Behaves like the REST store (client-side filtering, store-assigned ids,
//! no transactions) and adds fault injection so tests can interrupt a
//! multi-step write sequence at any call.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ResourceStore, StoreError};
use crate::core_types::{TransactionId, UserId};
use crate::models::{NewTransaction, Transaction, TransactionPatch, User};

/// Store operation, used to target injected faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListUsers,
    GetUser,
    UpdateUserBalance,
    ListTransactions,
    GetTransaction,
    CreateTransaction,
    PatchTransaction,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    /// Fail once, after letting `skip` more calls succeed
    Once { skip: usize },
    /// Fail every call from now on
    Always,
}

#[derive(Default)]
struct State {
    users: Vec<User>,
    transactions: Vec<Transaction>,
    next_id: u64,
    faults: HashMap<StoreOp, Vec<Fault>>,
}

/// Resource store held in process memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    /// Successful create/patch calls
    mutations: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace a user without counting a mutation
    pub fn insert_user(&self, user: User) {
        let mut state = self.lock();
        match state.users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user,
            None => state.users.push(user),
        }
    }

    /// Seed a transaction with a fixed id without counting a mutation
    pub fn insert_transaction(&self, tx: Transaction) {
        let mut state = self.lock();
        match state.transactions.iter_mut().find(|t| t.id == tx.id) {
            Some(existing) => *existing = tx,
            None => state.transactions.push(tx),
        }
    }

    pub fn users(&self) -> Vec<User> {
        self.lock().users.clone()
    }

    pub fn user(&self, id: &UserId) -> Option<User> {
        self.lock().users.iter().find(|u| &u.id == id).cloned()
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.lock().transactions.clone()
    }

    pub fn transaction(&self, id: &TransactionId) -> Option<Transaction> {
        self.lock()
            .transactions
            .iter()
            .find(|t| &t.id == id)
            .cloned()
    }

    /// Number of successful writes since creation
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Make the `nth` upcoming call of `op` fail (1 = the next call)
    pub fn fail_nth(&self, op: StoreOp, nth: usize) {
        let skip = nth.saturating_sub(1);
        self.lock()
            .faults
            .entry(op)
            .or_default()
            .push(Fault::Once { skip });
    }

    /// Make every upcoming call of `op` fail
    pub fn fail_always(&self, op: StoreOp) {
        self.lock()
            .faults
            .entry(op)
            .or_default()
            .push(Fault::Always);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test thread must not wedge the other assertions
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_fault(state: &mut State, op: StoreOp) -> Result<(), StoreError> {
        let Some(faults) = state.faults.get_mut(&op) else {
            return Ok(());
        };

        // Every pending one-shot fault counts this call
        let mut fire = false;
        faults.retain_mut(|fault| match fault {
            Fault::Always => {
                fire = true;
                true
            }
            Fault::Once { skip: 0 } => {
                fire = true;
                false
            }
            Fault::Once { skip } => {
                *skip -= 1;
                true
            }
        });

        if fire {
            Err(StoreError::Unavailable(format!("injected fault on {}", op)))
        } else {
            Ok(())
        }
    }

    fn user_not_found(id: &UserId) -> StoreError {
        StoreError::NotFound {
            collection: "users",
            id: id.to_string(),
        }
    }

    fn tx_not_found(id: &TransactionId) -> StoreError {
        StoreError::NotFound {
            collection: "transactions",
            id: id.to_string(),
        }
    }

    fn record_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut state = self.lock();
        Self::check_fault(&mut state, StoreOp::ListUsers)?;
        Ok(state.users.clone())
    }

    async fn get_user(&self, id: &UserId) -> Result<User, StoreError> {
        let mut state = self.lock();
        Self::check_fault(&mut state, StoreOp::GetUser)?;
        state
            .users
            .iter()
            .find(|u| &u.id == id)
            .cloned()
            .ok_or_else(|| Self::user_not_found(id))
    }

    async fn update_user_balance(
        &self,
        id: &UserId,
        balance: Decimal,
    ) -> Result<User, StoreError> {
        let mut state = self.lock();
        Self::check_fault(&mut state, StoreOp::UpdateUserBalance)?;
        let user = state
            .users
            .iter_mut()
            .find(|u| &u.id == id)
            .ok_or_else(|| Self::user_not_found(id))?;
        user.balance = balance;
        let updated = user.clone();
        drop(state);
        self.record_mutation();
        Ok(updated)
    }

    async fn list_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        let mut state = self.lock();
        Self::check_fault(&mut state, StoreOp::ListTransactions)?;
        Ok(state.transactions.clone())
    }

    async fn get_transaction(&self, id: &TransactionId) -> Result<Transaction, StoreError> {
        let mut state = self.lock();
        Self::check_fault(&mut state, StoreOp::GetTransaction)?;
        state
            .transactions
            .iter()
            .find(|t| &t.id == id)
            .cloned()
            .ok_or_else(|| Self::tx_not_found(id))
    }

    async fn create_transaction(&self, tx: &NewTransaction) -> Result<Transaction, StoreError> {
        let mut state = self.lock();
        Self::check_fault(&mut state, StoreOp::CreateTransaction)?;
        state.next_id += 1;
        let id = TransactionId::new(format!("tx-{}", state.next_id));
        let created = tx.clone().into_transaction(id);
        state.transactions.push(created.clone());
        drop(state);
        self.record_mutation();
        Ok(created)
    }

    async fn patch_transaction(
        &self,
        id: &TransactionId,
        patch: &TransactionPatch,
    ) -> Result<Transaction, StoreError> {
        let mut state = self.lock();
        Self::check_fault(&mut state, StoreOp::PatchTransaction)?;
        let tx = state
            .transactions
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| Self::tx_not_found(id))?;
        patch.apply(tx);
        let updated = tx.clone();
        drop(state);
        self.record_mutation();
        Ok(updated)
    }
}
