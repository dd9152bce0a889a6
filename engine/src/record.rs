//! Entity types stored in the local collections.
//!
//! Every entity shares an `{id, updatedAt}` base and is serialized with
//! camelCase field names (the local schema). Shapes are validated when JSON
//! crosses the storage boundary via [`Entity::from_value`].

use crate::{error::Result, Error, RecordId, Timestamp};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// The synchronized tables.
///
/// Declaration order is the drain priority: products before clients before
/// transactions, since transactions reference both by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Products,
    Clients,
    Transactions,
}

impl Table {
    /// All tables in priority order.
    pub const ALL: [Table; 3] = [Table::Products, Table::Clients, Table::Transactions];

    /// Table name, shared by the local base key and the remote table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Products => "products",
            Table::Clients => "clients",
            Table::Transactions => "transactions",
        }
    }

    /// Drain priority (lower drains first).
    pub fn priority(&self) -> u8 {
        match self {
            Table::Products => 0,
            Table::Clients => 1,
            Table::Transactions => 2,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "products" => Ok(Table::Products),
            "clients" => Ok(Table::Clients),
            "transactions" => Ok(Table::Transactions),
            other => Err(Error::UnknownTable(other.to_string())),
        }
    }
}

/// Whether a catalogue item is a physical product or a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    #[default]
    Product,
    Service,
}

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Draft,
    Finalised,
}

/// How a transaction was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Transfer,
}

/// Unit used when a product has none.
pub const DEFAULT_UNIT: &str = "pcs";

/// A catalogue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: RecordId,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<Timestamp>,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: ItemType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unit: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub price_per_unit: f64,
}

impl Product {
    pub fn new(id: impl Into<RecordId>, name: impl Into<String>, price_per_unit: f64) -> Self {
        Self {
            id: id.into(),
            updated_at: None,
            kind: ItemType::Product,
            name: name.into(),
            unit: DEFAULT_UNIT.to_string(),
            price_per_unit,
        }
    }
}

/// A customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: RecordId,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<Timestamp>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Client {
    pub fn new(id: impl Into<RecordId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            updated_at: None,
            name: name.into(),
            address: None,
            phone: None,
        }
    }
}

/// A line of a transaction. Products are referenced by id, not owned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionItem {
    #[serde(default, deserialize_with = "null_as_default")]
    pub product_id: RecordId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub quantity: f64,
    #[serde(default)]
    pub price_at_transaction: Option<f64>,
}

/// A sale to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: RecordId,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<Timestamp>,
    /// Referenced client; empty while the transaction is an unassigned draft.
    #[serde(default, deserialize_with = "null_as_default")]
    pub client_id: RecordId,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub date: Option<Timestamp>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<TransactionItem>,
    #[serde(default)]
    pub discount: Option<f64>,
    #[serde(default)]
    pub additional_fee: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_price: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: TransactionStatus,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub payment_method: PaymentMethod,
}

impl Transaction {
    pub fn new(id: impl Into<RecordId>, client_id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            updated_at: None,
            client_id: client_id.into(),
            date: None,
            items: Vec::new(),
            discount: None,
            additional_fee: None,
            total_price: 0.0,
            status: TransactionStatus::Draft,
            description: None,
            payment_method: PaymentMethod::Cash,
        }
    }
}

/// Behaviour shared by every stored entity type.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The table this type lives in.
    const TABLE: Table;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: RecordId);
    fn updated_at(&self) -> Option<Timestamp>;
    fn set_updated_at(&mut self, at: Timestamp);

    /// Fill type-specific defaults before a local write.
    fn normalize(&mut self, _now: Timestamp) {}

    /// Whether a local write of this record should be pushed to the remote.
    fn is_syncable(&self) -> bool {
        true
    }

    fn into_entity(self) -> Entity;
    fn from_entity(entity: Entity) -> Option<Self>;
}

impl Record for Product {
    const TABLE: Table = Table::Products;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn updated_at(&self) -> Option<Timestamp> {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: Timestamp) {
        self.updated_at = Some(at);
    }

    fn normalize(&mut self, _now: Timestamp) {
        let unit = self.unit.trim();
        self.unit = if unit.is_empty() {
            DEFAULT_UNIT.to_string()
        } else {
            unit.to_string()
        };
    }

    fn into_entity(self) -> Entity {
        Entity::Product(self)
    }

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Product(p) => Some(p),
            _ => None,
        }
    }
}

impl Record for Client {
    const TABLE: Table = Table::Clients;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn updated_at(&self) -> Option<Timestamp> {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: Timestamp) {
        self.updated_at = Some(at);
    }

    fn into_entity(self) -> Entity {
        Entity::Client(self)
    }

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Client(c) => Some(c),
            _ => None,
        }
    }
}

impl Record for Transaction {
    const TABLE: Table = Table::Transactions;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn updated_at(&self) -> Option<Timestamp> {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: Timestamp) {
        self.updated_at = Some(at);
    }

    fn normalize(&mut self, now: Timestamp) {
        if self.date.is_none() {
            self.date = Some(now);
        }
    }

    /// Drafts without a client stay local until one is assigned.
    fn is_syncable(&self) -> bool {
        !self.client_id.trim().is_empty()
    }

    fn into_entity(self) -> Entity {
        Entity::Transaction(self)
    }

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Transaction(t) => Some(t),
            _ => None,
        }
    }
}

/// Any stored entity, tagged by its table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Entity {
    Product(Product),
    Client(Client),
    Transaction(Transaction),
}

impl Entity {
    /// Decode a JSON object as an entity of `table`.
    pub fn from_value(table: Table, value: serde_json::Value) -> Result<Self> {
        let entity = match table {
            Table::Products => serde_json::from_value(value).map(Entity::Product),
            Table::Clients => serde_json::from_value(value).map(Entity::Client),
            Table::Transactions => serde_json::from_value(value).map(Entity::Transaction),
        };
        entity.map_err(|e| Error::InvalidRecord(format!("{table}: {e}")))
    }

    /// Encode as a JSON object in the local schema.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::encode(self.table().as_str(), e))
    }

    pub fn table(&self) -> Table {
        match self {
            Entity::Product(_) => Table::Products,
            Entity::Client(_) => Table::Clients,
            Entity::Transaction(_) => Table::Transactions,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Entity::Product(p) => p.id(),
            Entity::Client(c) => c.id(),
            Entity::Transaction(t) => t.id(),
        }
    }

    pub fn updated_at(&self) -> Option<Timestamp> {
        match self {
            Entity::Product(p) => p.updated_at(),
            Entity::Client(c) => c.updated_at(),
            Entity::Transaction(t) => t.updated_at(),
        }
    }

    pub fn is_syncable(&self) -> bool {
        match self {
            Entity::Product(p) => p.is_syncable(),
            Entity::Client(c) => c.is_syncable(),
            Entity::Transaction(t) => t.is_syncable(),
        }
    }
}

impl From<Product> for Entity {
    fn from(product: Product) -> Self {
        Entity::Product(product)
    }
}

impl From<Client> for Entity {
    fn from(client: Client) -> Self {
        Entity::Client(client)
    }
}

impl From<Transaction> for Entity {
    fn from(transaction: Transaction) -> Self {
        Entity::Transaction(transaction)
    }
}

/// Parse an instant the way stored and remote data may carry it:
/// RFC 3339, an offset-less date-time (read as UTC), or a bare date.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}"))),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
