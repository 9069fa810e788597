use crate::error::{FulfillmentError, Result};
use crate::infrastructure::in_memory::{InMemoryDatabase, Journal, Tables};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub const CF_PAYMENTS: &str = "payments";
pub const CF_SUBSCRIPTIONS: &str = "subscriptions";
pub const CF_CHILDREN: &str = "children";
pub const CF_DELIVERY_INFOS: &str = "delivery_infos";
pub const CF_PLANS: &str = "plans";
pub const CF_CATEGORIES: &str = "categories";
pub const CF_INVENTORY: &str = "inventory";
pub const CF_TOY_BOXES: &str = "toy_boxes";

const COLUMN_FAMILIES: [&str; 8] = [
    CF_PAYMENTS,
    CF_SUBSCRIPTIONS,
    CF_CHILDREN,
    CF_DELIVERY_INFOS,
    CF_PLANS,
    CF_CATEGORIES,
    CF_INVENTORY,
    CF_TOY_BOXES,
];

/// Durable storage backed by RocksDB, one column family per table.
///
/// Rows are stored as JSON under their big-endian id. The store is loaded
/// into an [`InMemoryDatabase`] at startup and receives every commit as one
/// atomic `WriteBatch`.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Opens the store and wraps its contents in a write-through database.
    pub fn open_database<P: AsRef<Path>>(path: P) -> Result<InMemoryDatabase> {
        let store = Self::open(path)?;
        let tables = store.load()?;
        Ok(InMemoryDatabase::with_journal(tables, Arc::new(store)))
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            FulfillmentError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    /// Reads every table back.
    pub fn load(&self) -> Result<Tables> {
        Ok(Tables {
            payments: self.load_table(CF_PAYMENTS)?,
            subscriptions: self.load_table(CF_SUBSCRIPTIONS)?,
            children: self.load_table(CF_CHILDREN)?,
            delivery_infos: self.load_table(CF_DELIVERY_INFOS)?,
            plans: self.load_table(CF_PLANS)?,
            categories: self.load_table(CF_CATEGORIES)?,
            inventory: self.load_table(CF_INVENTORY)?,
            toy_boxes: self.load_table(CF_TOY_BOXES)?,
        })
    }

    fn load_table<V: DeserializeOwned>(&self, name: &str) -> Result<BTreeMap<i64, V>> {
        let cf = self.cf(name)?;
        let mut rows = BTreeMap::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let key: [u8; 8] = key.as_ref().try_into().map_err(|_| {
                FulfillmentError::InternalError(Box::new(std::io::Error::other(format!(
                    "malformed key in {name}"
                ))))
            })?;
            rows.insert(i64::from_be_bytes(key), serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    fn stage_table<V: Serialize + PartialEq>(
        &self,
        batch: &mut WriteBatch,
        name: &str,
        before: &BTreeMap<i64, V>,
        after: &BTreeMap<i64, V>,
    ) -> Result<()> {
        let cf = self.cf(name)?;
        for (id, row) in after {
            if before.get(id) != Some(row) {
                batch.put_cf(cf, id.to_be_bytes(), serde_json::to_vec(row)?);
            }
        }
        for id in before.keys().filter(|id| !after.contains_key(id)) {
            batch.delete_cf(cf, id.to_be_bytes());
        }
        Ok(())
    }
}

#[async_trait]
impl Journal for RocksDBStore {
    async fn persist(&self, before: &Tables, after: &Tables) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.stage_table(&mut batch, CF_PAYMENTS, &before.payments, &after.payments)?;
        self.stage_table(
            &mut batch,
            CF_SUBSCRIPTIONS,
            &before.subscriptions,
            &after.subscriptions,
        )?;
        self.stage_table(&mut batch, CF_CHILDREN, &before.children, &after.children)?;
        self.stage_table(
            &mut batch,
            CF_DELIVERY_INFOS,
            &before.delivery_infos,
            &after.delivery_infos,
        )?;
        self.stage_table(&mut batch, CF_PLANS, &before.plans, &after.plans)?;
        self.stage_table(
            &mut batch,
            CF_CATEGORIES,
            &before.categories,
            &after.categories,
        )?;
        self.stage_table(&mut batch, CF_INVENTORY, &before.inventory, &after.inventory)?;
        self.stage_table(&mut batch, CF_TOY_BOXES, &before.toy_boxes, &after.toy_boxes)?;

        tracing::debug!(writes = batch.len(), "persisting commit");
        self.db.write(batch)?;
        Ok(())
    }
}
