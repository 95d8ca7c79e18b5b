use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::analytics::{
    CustomerDimension, DailySummary, DateDimension, FactOrderItem, ProductDimension, RecentOrder, TopProduct,
};
use crate::domain::catalog::{Product, ProductId};
use crate::domain::ledger::Account;
use crate::domain::order::{Order, OrderStatus};
use super::{
    AccountStore, DeadLetter, DeadLetterStore, DebitOutcome, OrderStore, OutboxMessage, OutboxStore, ProductCatalog,
    StoreError, Warehouse,
};

// ============================================================================
// In-memory stores
// ============================================================================
//
// Used by the unit tests and by `standalone` mode. Each store keeps its whole
// state behind one mutex and never awaits while holding it, so every trait
// method is atomic, which is the same guarantee the Postgres implementations
// get from transactions and row locks.
//
// ============================================================================

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Default)]
pub struct InMemoryCatalog {
    products: Mutex<BTreeMap<ProductId, Product>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, product: Product) {
        guard(&self.products).insert(product.id, product);
    }

    /// The product list `standalone` mode starts with
    pub fn with_demo_products() -> Self {
        let catalog = Self::new();
        let demo = [
            (1, "Wireless Mouse", "Peripherals", "Logitech", 2599),
            (2, "Mechanical Keyboard", "Peripherals", "Keychron", 8900),
            (3, "USB-C Hub", "Accessories", "Anker", 3450),
            (4, "27\" Monitor", "Displays", "Dell", 27999),
            (5, "Noise Cancelling Headphones", "Audio", "Sony", 34800),
            (6, "Laptop Stand", "Accessories", "Rain Design", 4999),
        ];
        for (id, name, category, brand, cents) in demo {
            catalog.seed(Product {
                id,
                name: name.to_string(),
                category: category.to_string(),
                brand: brand.to_string(),
                price: Decimal::new(cents, 2),
                active: true,
            });
        }
        catalog.seed(Product {
            id: 7,
            name: "Trackball (discontinued)".to_string(),
            category: "Peripherals".to_string(),
            brand: "Kensington".to_string(),
            price: Decimal::new(5900, 2),
            active: false,
        });
        catalog
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(guard(&self.products).get(&id).cloned())
    }
}

// ============================================================================
// Accounts
// ============================================================================

#[derive(Default)]
struct Book {
    accounts: BTreeMap<String, Account>,
    entries: HashMap<Uuid, LedgerEntry>,
}

struct LedgerEntry {
    email: String,
    amount: Decimal,
    balance_after: Decimal,
}

#[derive(Default)]
pub struct InMemoryAccountStore {
    book: Mutex<Book>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, account: Account) {
        guard(&self.book)
            .accounts
            .insert(account.customer_email.clone(), account);
    }

    pub fn with_demo_accounts() -> Self {
        let store = Self::new();
        for (email, name, balance) in [
            ("alice@example.com", "Alice Johnson", 500),
            ("bob@example.com", "Bob Smith", 100),
            ("carol@example.com", "Carol White", 2500),
        ] {
            store.seed(Account {
                customer_email: email.to_string(),
                customer_name: name.to_string(),
                balance: Decimal::new(balance, 0),
            });
        }
        store
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        Ok(guard(&self.book).accounts.values().cloned().collect())
    }

    async fn find_account(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(guard(&self.book).accounts.get(email).cloned())
    }

    async fn debit(&self, email: &str, amount: Decimal, reference_id: Uuid) -> Result<DebitOutcome, StoreError> {
        let mut book = guard(&self.book);

        if let Some(entry) = book.entries.get(&reference_id) {
            if entry.email != email || entry.amount != amount {
                return Ok(DebitOutcome::ReferenceConflict);
            }
            return Ok(DebitOutcome::Replayed {
                new_balance: entry.balance_after,
            });
        }

        let Some(account) = book.accounts.get_mut(email) else {
            return Ok(DebitOutcome::AccountMissing);
        };

        if account.balance < amount {
            return Ok(DebitOutcome::Insufficient {
                available: account.balance,
            });
        }

        account.balance -= amount;
        let new_balance = account.balance;
        book.entries.insert(
            reference_id,
            LedgerEntry {
                email: email.to_string(),
                amount,
                balance_after: new_balance,
            },
        );

        Ok(DebitOutcome::Applied { new_balance })
    }
}

// ============================================================================
// Orders + outbox
// ============================================================================

struct OutboxRow {
    message: OutboxMessage,
    published: bool,
    dead_lettered: bool,
    attempts: i32,
    claimed_until: Option<DateTime<Utc>>,
}

impl OutboxRow {
    fn new(message: OutboxMessage) -> Self {
        Self {
            message,
            published: false,
            dead_lettered: false,
            attempts: 0,
            claimed_until: None,
        }
    }

    fn claimable(&self, now: DateTime<Utc>) -> bool {
        !self.published && !self.dead_lettered && self.claimed_until.map_or(true, |until| until <= now)
    }
}

#[derive(Default)]
struct OrderTables {
    orders: HashMap<Uuid, Order>,
    outbox: Vec<OutboxRow>,
}

#[derive(Default)]
pub struct InMemoryOrderStore {
    tables: Mutex<OrderTables>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message directly, bypassing an order confirmation
    #[cfg(test)]
    pub fn enqueue(&self, message: OutboxMessage) {
        guard(&self.tables).outbox.push(OutboxRow::new(message));
    }

    /// (published, dead-lettered, attempts) for one outbox message
    #[cfg(test)]
    pub fn outbox_state(&self, id: Uuid) -> Option<(bool, bool, i32)> {
        guard(&self.tables)
            .outbox
            .iter()
            .find(|row| row.message.id == id)
            .map(|row| (row.published, row.dead_lettered, row.attempts))
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        guard(&self.tables).orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<(), StoreError> {
        let mut tables = guard(&self.tables);
        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::NotFound(format!("order {}", order_id)))?;
        order.status = status;
        Ok(())
    }

    async fn confirm_with_outbox(&self, order_id: Uuid, outbox: Option<OutboxMessage>) -> Result<(), StoreError> {
        let mut tables = guard(&self.tables);
        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::NotFound(format!("order {}", order_id)))?;
        order.status = OrderStatus::Confirmed;

        if let Some(message) = outbox {
            tables.outbox.push(OutboxRow::new(message));
        }
        Ok(())
    }

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(guard(&self.tables).orders.get(&order_id).cloned())
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = guard(&self.tables).orders.values().cloned().collect();
        orders.sort_by(|a, b| b.order_date.cmp(&a.order_date).then(b.id.cmp(&a.id)));
        Ok(orders)
    }
}

#[async_trait]
impl OutboxStore for InMemoryOrderStore {
    async fn fetch_pending(&self, limit: i64, lease: Duration) -> Result<Vec<OutboxMessage>, StoreError> {
        let now = Utc::now();
        let claimed_until = chrono::Duration::from_std(lease)
            .ok()
            .and_then(|lease| now.checked_add_signed(lease))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut tables = guard(&self.tables);
        let mut rows: Vec<&mut OutboxRow> = tables.outbox.iter_mut().filter(|row| row.claimable(now)).collect();
        rows.sort_by_key(|row| row.message.created_at);
        rows.truncate(limit.max(0) as usize);

        Ok(rows
            .into_iter()
            .map(|row| {
                row.claimed_until = Some(claimed_until);
                row.message.clone()
            })
            .collect())
    }

    async fn release(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        let mut tables = guard(&self.tables);
        for row in tables.outbox.iter_mut().filter(|row| ids.contains(&row.message.id)) {
            row.claimed_until = None;
        }
        Ok(())
    }

    async fn mark_published(&self, id: Uuid, attempts: i32) -> Result<(), StoreError> {
        let mut tables = guard(&self.tables);
        let row = tables
            .outbox
            .iter_mut()
            .find(|row| row.message.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("outbox message {}", id)))?;
        row.published = true;
        row.attempts = attempts;
        row.claimed_until = None;
        Ok(())
    }

    async fn mark_dead_lettered(&self, id: Uuid, attempts: i32) -> Result<(), StoreError> {
        let mut tables = guard(&self.tables);
        let row = tables
            .outbox
            .iter_mut()
            .find(|row| row.message.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("outbox message {}", id)))?;
        row.dead_lettered = true;
        row.attempts = attempts;
        row.claimed_until = None;
        Ok(())
    }
}

// ============================================================================
// Dead letters
// ============================================================================

#[derive(Default)]
pub struct InMemoryDeadLetterStore {
    letters: Mutex<Vec<DeadLetter>>,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn add(&self, letter: DeadLetter) -> Result<(), StoreError> {
        let mut letters = guard(&self.letters);
        match letters.iter_mut().find(|l| l.id == letter.id) {
            Some(existing) => {
                existing.error_message = letter.error_message;
                existing.failure_count += letter.failure_count;
                existing.last_failed_at = letter.last_failed_at;
            }
            None => letters.push(letter),
        }
        Ok(())
    }

    async fn list(&self, limit: i64) -> Result<Vec<DeadLetter>, StoreError> {
        let mut letters = guard(&self.letters).clone();
        letters.sort_by(|a, b| b.last_failed_at.cmp(&a.last_failed_at));
        letters.truncate(limit.max(0) as usize);
        Ok(letters)
    }
}

// ============================================================================
// Warehouse
// ============================================================================

#[derive(Default)]
struct StarSchema {
    next_key: i64,
    customers: HashMap<String, (i64, CustomerDimension)>,
    dates: BTreeMap<i32, DateDimension>,
    products: HashMap<ProductId, (i64, ProductDimension)>,
    facts: BTreeMap<(Uuid, ProductId), FactOrderItem>,
}

impl StarSchema {
    fn allocate_key(&mut self) -> i64 {
        self.next_key += 1;
        self.next_key
    }

    fn customer_by_key(&self, key: i64) -> Option<&CustomerDimension> {
        self.customers
            .values()
            .find(|(k, _)| *k == key)
            .map(|(_, customer)| customer)
    }

    fn product_by_key(&self, key: i64) -> Option<&ProductDimension> {
        self.products
            .values()
            .find(|(k, _)| *k == key)
            .map(|(_, product)| product)
    }
}

/// Row counts per table, for idempotence checks
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarehouseCounts {
    pub customers: usize,
    pub dates: usize,
    pub products: usize,
    pub facts: usize,
}

#[derive(Default)]
pub struct InMemoryWarehouse {
    schema: Mutex<StarSchema>,
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn counts(&self) -> WarehouseCounts {
        let schema = guard(&self.schema);
        WarehouseCounts {
            customers: schema.customers.len(),
            dates: schema.dates.len(),
            products: schema.products.len(),
            facts: schema.facts.len(),
        }
    }

    #[cfg(test)]
    pub fn customer_name(&self, email: &str) -> Option<String> {
        guard(&self.schema)
            .customers
            .get(email)
            .map(|(_, customer)| customer.name.clone())
    }
}

#[async_trait]
impl Warehouse for InMemoryWarehouse {
    async fn upsert_customer(&self, customer: &CustomerDimension) -> Result<i64, StoreError> {
        let mut schema = guard(&self.schema);
        if let Some((key, existing)) = schema.customers.get_mut(&customer.email) {
            existing.name = customer.name.clone();
            return Ok(*key);
        }
        let key = schema.allocate_key();
        schema
            .customers
            .insert(customer.email.clone(), (key, customer.clone()));
        Ok(key)
    }

    async fn upsert_date(&self, day: NaiveDate) -> Result<i32, StoreError> {
        let dimension = DateDimension::from_day(day);
        let key = dimension.date_key;
        guard(&self.schema).dates.entry(key).or_insert(dimension);
        Ok(key)
    }

    async fn upsert_product(&self, product: &ProductDimension) -> Result<i64, StoreError> {
        let mut schema = guard(&self.schema);
        if let Some((key, existing)) = schema.products.get_mut(&product.product_id) {
            *existing = product.clone();
            return Ok(*key);
        }
        let key = schema.allocate_key();
        schema
            .products
            .insert(product.product_id, (key, product.clone()));
        Ok(key)
    }

    async fn insert_fact(&self, fact: &FactOrderItem) -> Result<bool, StoreError> {
        let mut schema = guard(&self.schema);
        let id = (fact.order_id, fact.product_id);
        if schema.facts.contains_key(&id) {
            return Ok(false);
        }
        schema.facts.insert(id, fact.clone());
        Ok(true)
    }

    async fn daily_summary(&self) -> Result<Vec<DailySummary>, StoreError> {
        let schema = guard(&self.schema);

        let mut by_day: BTreeMap<i32, (HashSet<Uuid>, Decimal, i64)> = BTreeMap::new();
        for fact in schema.facts.values() {
            let day = by_day.entry(fact.date_key).or_default();
            day.0.insert(fact.order_id);
            day.1 += fact.line_total;
            day.2 += fact.quantity as i64;
        }

        let summaries = by_day
            .into_iter()
            .rev()
            .filter_map(|(key, (orders, revenue, items))| {
                let dimension = schema.dates.get(&key)?;
                let total_orders = orders.len() as i64;
                Some(DailySummary {
                    order_day: dimension.full_date,
                    total_orders,
                    total_revenue: revenue,
                    avg_order_value: (revenue / Decimal::from(total_orders.max(1))).round_dp(2),
                    total_items: items,
                })
            })
            .collect();
        Ok(summaries)
    }

    async fn top_products(&self, limit: i64) -> Result<Vec<TopProduct>, StoreError> {
        let schema = guard(&self.schema);

        let mut by_product: HashMap<i64, (HashSet<Uuid>, i64, Decimal, Decimal, i64)> = HashMap::new();
        for fact in schema.facts.values() {
            let entry = by_product.entry(fact.product_key).or_default();
            entry.0.insert(fact.order_id);
            entry.1 += fact.quantity as i64;
            entry.2 += fact.line_total;
            entry.3 += fact.unit_price;
            entry.4 += 1;
        }

        let mut products: Vec<TopProduct> = by_product
            .into_iter()
            .filter_map(|(key, (orders, units, revenue, price_sum, rows))| {
                let product = schema.product_by_key(key)?;
                Some(TopProduct {
                    product_name: product.name.clone(),
                    times_ordered: orders.len() as i64,
                    total_units_sold: units,
                    total_revenue: revenue,
                    avg_unit_price: (price_sum / Decimal::from(rows.max(1))).round_dp(2),
                })
            })
            .collect();
        products.sort_by(|a, b| b.total_revenue.cmp(&a.total_revenue));
        products.truncate(limit.max(0) as usize);
        Ok(products)
    }

    async fn recent_orders(&self, limit: i64) -> Result<Vec<RecentOrder>, StoreError> {
        let schema = guard(&self.schema);

        let mut by_order: HashMap<Uuid, RecentOrder> = HashMap::new();
        for fact in schema.facts.values() {
            let Some(customer) = schema.customer_by_key(fact.customer_key) else {
                continue;
            };
            let order = by_order.entry(fact.order_id).or_insert_with(|| RecentOrder {
                order_id: fact.order_id,
                customer_name: customer.name.clone(),
                customer_email: customer.email.clone(),
                order_date: fact.order_date,
                status: fact.status.to_string(),
                total_amount: Decimal::ZERO,
                item_count: 0,
            });
            order.total_amount += fact.line_total;
            order.item_count += 1;
        }

        let mut orders: Vec<RecentOrder> = by_order.into_values().collect();
        orders.sort_by(|a, b| b.order_date.cmp(&a.order_date));
        orders.truncate(limit.max(0) as usize);
        Ok(orders)
    }
}
