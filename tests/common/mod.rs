//! Scripted store and path monitor shared by the integration tests.

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use paywall_sync::{
    PathMonitor, PeriodUnit, PurchaseResult, RawProduct, Result, Snapshot, StoreOracle,
    Storefront, SubscriptionPeriod, SubscriptionService, SyncConfig, SyncError, Transaction,
    Verification,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const WEEKLY: &str = "com.demo.pro.weekly";
pub const YEARLY: &str = "com.demo.pro.yearly";

pub fn raw_product(id: &str, unit: PeriodUnit, cents: i64) -> RawProduct {
    RawProduct {
        id: id.to_string(),
        display_name: id.rsplit('.').next().unwrap_or(id).to_string(),
        display_price: format!("${}", Decimal::new(cents, 2)),
        currency_code: "USD".to_string(),
        currency_symbol: None,
        price: Decimal::new(cents, 2),
        period: Some(SubscriptionPeriod::new(unit, 1)),
    }
}

pub fn catalog() -> Vec<RawProduct> {
    vec![
        raw_product(YEARLY, PeriodUnit::Year, 3999),
        raw_product(WEEKLY, PeriodUnit::Week, 499),
    ]
}

pub fn transaction(product_id: &str, id: &str, original_id: Option<&str>) -> Transaction {
    Transaction {
        id: id.to_string(),
        original_id: original_id.map(String::from),
        product_id: product_id.to_string(),
    }
}

/// In-memory store oracle with scripted answers and call counters.
pub struct FakeStore {
    products: Mutex<std::result::Result<Vec<RawProduct>, String>>,
    lookup_delay: Mutex<Duration>,
    entitlements: Mutex<Vec<Verification<Transaction>>>,
    entitlements_error: Mutex<Option<String>>,
    purchase_result: Mutex<std::result::Result<PurchaseResult, String>>,
    grant_on_purchase: AtomicBool,
    restore_error: Mutex<Option<String>>,
    lookup_panics: AtomicBool,
    purchase_panics: AtomicBool,

    pub lookup_calls: AtomicUsize,
    pub entitlement_calls: AtomicUsize,
    pub restore_calls: AtomicUsize,
    pub purchases: Mutex<Vec<(String, Uuid)>>,
    pub finished: Mutex<Vec<Transaction>>,

    transactions: (Sender<Verification<Transaction>>, Receiver<Verification<Transaction>>),
    storefronts: (Sender<Storefront>, Receiver<Storefront>),
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            products: Mutex::new(Ok(catalog())),
            lookup_delay: Mutex::new(Duration::ZERO),
            entitlements: Mutex::new(Vec::new()),
            entitlements_error: Mutex::new(None),
            purchase_result: Mutex::new(Err("purchase not scripted".into())),
            grant_on_purchase: AtomicBool::new(true),
            restore_error: Mutex::new(None),
            lookup_panics: AtomicBool::new(false),
            purchase_panics: AtomicBool::new(false),
            lookup_calls: AtomicUsize::new(0),
            entitlement_calls: AtomicUsize::new(0),
            restore_calls: AtomicUsize::new(0),
            purchases: Mutex::new(Vec::new()),
            finished: Mutex::new(Vec::new()),
            transactions: unbounded(),
            storefronts: unbounded(),
        })
    }

    pub fn set_products(&self, products: Vec<RawProduct>) {
        *self.products.lock() = Ok(products);
    }

    pub fn fail_products(&self, message: &str) {
        *self.products.lock() = Err(message.to_string());
    }

    pub fn set_lookup_delay(&self, delay: Duration) {
        *self.lookup_delay.lock() = delay;
    }

    pub fn grant(&self, entitlement: Verification<Transaction>) {
        self.entitlements.lock().push(entitlement);
    }

    pub fn fail_entitlements(&self, message: &str) {
        *self.entitlements_error.lock() = Some(message.to_string());
    }

    pub fn script_purchase(&self, result: std::result::Result<PurchaseResult, String>) {
        *self.purchase_result.lock() = result;
    }

    pub fn set_grant_on_purchase(&self, grant: bool) {
        self.grant_on_purchase.store(grant, Ordering::SeqCst);
    }

    pub fn fail_restore(&self, message: &str) {
        *self.restore_error.lock() = Some(message.to_string());
    }

    /// Make product lookups panic, as a crashing platform call would.
    pub fn set_lookup_panics(&self, panics: bool) {
        self.lookup_panics.store(panics, Ordering::SeqCst);
    }

    pub fn set_purchase_panics(&self, panics: bool) {
        self.purchase_panics.store(panics, Ordering::SeqCst);
    }

    pub fn push_transaction(&self, update: Verification<Transaction>) {
        self.transactions.0.send(update).unwrap();
    }

    pub fn push_storefront(&self, country_code: &str) {
        self.storefronts
            .0
            .send(Storefront {
                id: format!("sf-{}", country_code),
                country_code: country_code.to_string(),
            })
            .unwrap();
    }

    pub fn lookups(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    pub fn entitlement_checks(&self) -> usize {
        self.entitlement_calls.load(Ordering::SeqCst)
    }
}

impl StoreOracle for FakeStore {
    fn lookup_products(&self, ids: &[String]) -> Result<Vec<RawProduct>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.lookup_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        if self.lookup_panics.load(Ordering::SeqCst) {
            panic!("product lookup crashed");
        }
        match &*self.products.lock() {
            Ok(products) => Ok(products
                .iter()
                .filter(|p| ids.contains(&p.id))
                .cloned()
                .collect()),
            Err(message) => Err(SyncError::Oracle(message.clone())),
        }
    }

    fn current_entitlements(&self) -> Result<Vec<Verification<Transaction>>> {
        self.entitlement_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &*self.entitlements_error.lock() {
            return Err(SyncError::Oracle(message.clone()));
        }
        Ok(self.entitlements.lock().clone())
    }

    fn purchase(&self, product: &RawProduct, account_token: Uuid) -> Result<PurchaseResult> {
        self.purchases
            .lock()
            .push((product.id.clone(), account_token));
        if self.purchase_panics.load(Ordering::SeqCst) {
            panic!("purchase sheet crashed");
        }

        let result = self
            .purchase_result
            .lock()
            .clone()
            .map_err(SyncError::Oracle)?;

        if let PurchaseResult::Success(Verification::Verified { value }) = &result {
            if self.grant_on_purchase.load(Ordering::SeqCst) {
                self.grant(Verification::verified(value.clone()));
            }
        }
        Ok(result)
    }

    fn finish(&self, transaction: &Transaction) {
        self.finished.lock().push(transaction.clone());
    }

    fn restore_sync(&self) -> Result<()> {
        self.restore_calls.fetch_add(1, Ordering::SeqCst);
        match &*self.restore_error.lock() {
            Some(message) => Err(SyncError::Oracle(message.clone())),
            None => Ok(()),
        }
    }

    fn transaction_updates(&self) -> Receiver<Verification<Transaction>> {
        self.transactions.1.clone()
    }

    fn storefront_updates(&self) -> Receiver<Storefront> {
        self.storefronts.1.clone()
    }
}

/// Path monitor driven by the test.
pub struct FakePathMonitor {
    updates: (Sender<bool>, Receiver<bool>),
}

impl FakePathMonitor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            updates: unbounded(),
        })
    }

    pub fn send(&self, available: bool) {
        self.updates.0.send(available).unwrap();
    }
}

impl PathMonitor for FakePathMonitor {
    fn path_updates(&self) -> Receiver<bool> {
        self.updates.1.clone()
    }
}

pub fn test_config() -> SyncConfig {
    let mut config = SyncConfig::with_plans(WEEKLY, YEARLY);
    config.bundle_id = "com.demo.app".to_string();
    config.startup_delay = Duration::from_millis(10);
    config
}

/// Route service logs through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn test_service(store: &Arc<FakeStore>) -> SubscriptionService {
    init_tracing();
    SubscriptionService::builder(test_config(), store.clone())
        .build()
        .unwrap()
}

/// Poll until `predicate` holds for the current snapshot.
pub fn wait_for<F>(service: &SubscriptionService, predicate: F) -> Arc<Snapshot>
where
    F: Fn(&Snapshot) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        let snapshot = service.current_snapshot();
        if predicate(&snapshot) {
            return snapshot;
        }
        if Instant::now() > deadline {
            panic!("timed out waiting; last snapshot: {:?}", snapshot);
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Poll until `condition` holds.
pub fn wait_until<F: Fn() -> bool>(condition: F) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !condition() {
        if Instant::now() > deadline {
            panic!("timed out waiting for condition");
        }
        thread::sleep(Duration::from_millis(5));
    }
}
