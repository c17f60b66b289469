//! Document schemas and pure constructors.
//!
//! Every document kind shares the same conventions: an `_id` prefixed by
//! the kind, a `type` discriminator, ISO-8601 `created_at`/`updated_at`
//! timestamps, and an integer `version` starting at 1. Constructors here
//! perform no I/O — they validate the caller-supplied business fields,
//! generate a fresh identifier, and stamp defaults. Persistence is the
//! store's job.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// `type` discriminator for product documents.
pub const TYPE_PRODUCT: &str = "product";
/// `type` discriminator for customer documents.
pub const TYPE_CUSTOMER: &str = "customer";
/// `type` discriminator for order documents.
pub const TYPE_ORDER: &str = "order";
/// `type` discriminator for analytics event documents.
pub const TYPE_EVENT: &str = "analytics_event";

/// Known analytics event types. The set is open — consumers must accept
/// unknown values — but sample generation draws from these.
pub const KNOWN_EVENT_TYPES: &[&str] = &[
    "product_view",
    "add_to_cart",
    "remove_from_cart",
    "purchase",
    "search",
];

/// Current UTC time as an ISO-8601 string. Zero-padded and fixed-width so
/// lexicographic comparison orders timestamps correctly.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Generate a document identifier with the given kind prefix.
fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4())
}

/// Collapse runs of whitespace (including newlines and tabs) into single
/// spaces and trim the ends.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Basic email validation: exactly one `@`, and a `.` somewhere in the
/// domain part.
pub fn validate_email(email: &str) -> bool {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty() && !domain.is_empty() && domain.contains('.')
        }
        _ => false,
    }
}

// ============ Product ============

/// Product lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Inactive,
    Discontinued,
}

/// Price band derived from the unit price during enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceCategory {
    #[serde(rename = "budget")]
    Budget,
    #[serde(rename = "mid-range")]
    MidRange,
    #[serde(rename = "premium")]
    Premium,
}

impl PriceCategory {
    /// Band a price: `budget` below 50, `mid-range` below 200, `premium`
    /// otherwise.
    pub fn from_price(price: f64) -> Self {
        if price < 50.0 {
            PriceCategory::Budget
        } else if price < 200.0 {
            PriceCategory::MidRange
        } else {
            PriceCategory::Premium
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub description: String,
    pub status: ProductStatus,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_category: Option<PriceCategory>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_keywords: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    pub version: i64,
}

impl Product {
    /// Build a product document. Requires a non-empty name and category
    /// and a non-negative price.
    pub fn new(
        name: &str,
        category: &str,
        price: f64,
        description: &str,
        status: ProductStatus,
        metadata: Map<String, Value>,
    ) -> StoreResult<Self> {
        if name.trim().is_empty() {
            return Err(StoreError::Validation("product name is required".into()));
        }
        if category.trim().is_empty() {
            return Err(StoreError::Validation(
                "product category is required".into(),
            ));
        }
        if price < 0.0 || !price.is_finite() {
            return Err(StoreError::Validation(format!(
                "product price must be a non-negative number, got {}",
                price
            )));
        }

        let now = now_iso();
        Ok(Self {
            id: generate_id(TYPE_PRODUCT),
            kind: TYPE_PRODUCT.to_string(),
            name: clean_text(name),
            category: clean_text(category),
            price,
            description: clean_text(description),
            status,
            metadata,
            price_category: None,
            search_keywords: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
            version: 1,
        })
    }

    /// Derive `price_category` and `search_keywords` from the business
    /// fields. Keywords are lower-cased, deduplicated, and sorted for
    /// deterministic output.
    pub fn enrich(&mut self) {
        self.price_category = Some(PriceCategory::from_price(self.price));

        let mut keywords: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
        for text in [&self.name, &self.category, &self.description] {
            for word in text.to_lowercase().split_whitespace() {
                keywords.insert(word.to_string());
            }
        }
        self.search_keywords = keywords.into_iter().collect();
        self.updated_at = now_iso();
    }
}

// ============ Customer ============

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
    pub version: i64,
}

impl Customer {
    /// Build a customer document. Requires a non-empty name and a valid
    /// email address.
    pub fn new(
        name: &str,
        email: &str,
        phone: &str,
        address: Address,
        metadata: Map<String, Value>,
    ) -> StoreResult<Self> {
        if name.trim().is_empty() {
            return Err(StoreError::Validation("customer name is required".into()));
        }
        if !validate_email(email) {
            return Err(StoreError::Validation(format!(
                "invalid email address: {}",
                email
            )));
        }

        let now = now_iso();
        Ok(Self {
            id: generate_id(TYPE_CUSTOMER),
            kind: TYPE_CUSTOMER.to_string(),
            name: clean_text(name),
            email: email.to_string(),
            phone: phone.to_string(),
            address,
            metadata,
            created_at: now.clone(),
            updated_at: now,
            version: 1,
        })
    }
}

// ============ Order ============

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

/// A single order line: a product snapshot at purchase time. The product
/// name and unit price are copied so the line survives later product edits
/// or deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub total_price: f64,
}

impl LineItem {
    /// Build a line item. Quantity must be at least 1; the line total is
    /// computed here and nowhere else.
    pub fn new(
        product_id: &str,
        product_name: &str,
        quantity: u32,
        unit_price: f64,
    ) -> StoreResult<Self> {
        if quantity < 1 {
            return Err(StoreError::Validation(
                "line item quantity must be at least 1".into(),
            ));
        }
        Ok(Self {
            product_id: product_id.to_string(),
            product_name: product_name.to_string(),
            quantity,
            unit_price,
            total_price: unit_price * quantity as f64,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Reference to the ordering customer. Not ownership — the customer
    /// document may be deleted independently.
    pub customer_id: String,
    /// Line items, stored under the `products` key.
    pub products: Vec<LineItem>,
    /// Order total. Authoritative: consumers must trust this value and
    /// never recompute it from line items outside an explicit audit.
    pub total: f64,
    pub status: OrderStatus,
    #[serde(default)]
    pub shipping_address: Address,
    pub created_at: String,
    pub updated_at: String,
    pub version: i64,
}

impl Order {
    /// Build an order document. Requires a customer reference and at
    /// least one line item.
    pub fn new(
        customer_id: &str,
        products: Vec<LineItem>,
        total: f64,
        status: OrderStatus,
        shipping_address: Address,
    ) -> StoreResult<Self> {
        if customer_id.trim().is_empty() {
            return Err(StoreError::Validation(
                "order customer_id is required".into(),
            ));
        }
        if products.is_empty() {
            return Err(StoreError::Validation(
                "order requires at least one line item".into(),
            ));
        }

        let now = now_iso();
        Ok(Self {
            id: generate_id(TYPE_ORDER),
            kind: TYPE_ORDER.to_string(),
            customer_id: customer_id.to_string(),
            products,
            total,
            status,
            shipping_address,
            created_at: now.clone(),
            updated_at: now,
            version: 1,
        })
    }
}

// ============ Analytics event ============

/// Polymorphic reference carried by an analytics event. Modeled as a
/// tagged union so consumers must handle each referenced kind
/// exhaustively instead of guessing from a bare string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Product(String),
    Order(String),
    Customer(String),
}

impl EntityRef {
    pub fn kind(&self) -> &'static str {
        match self {
            EntityRef::Product(_) => TYPE_PRODUCT,
            EntityRef::Order(_) => TYPE_ORDER,
            EntityRef::Customer(_) => TYPE_CUSTOMER,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            EntityRef::Product(id) | EntityRef::Order(id) | EntityRef::Customer(id) => id,
        }
    }

    /// Reconstruct the tagged reference from stored `entity_type` /
    /// `entity_id` fields. Returns `None` for unknown entity types.
    pub fn from_parts(entity_type: &str, entity_id: &str) -> Option<Self> {
        match entity_type {
            TYPE_PRODUCT => Some(EntityRef::Product(entity_id.to_string())),
            TYPE_ORDER => Some(EntityRef::Order(entity_id.to_string())),
            TYPE_CUSTOMER => Some(EntityRef::Customer(entity_id.to_string())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub event_type: String,
    pub entity_id: String,
    pub entity_type: String,
    #[serde(default)]
    pub event_data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Event time. May differ from `created_at` for backfilled or
    /// simulated historical events.
    pub timestamp: String,
    pub created_at: String,
    pub version: i64,
}

impl AnalyticsEvent {
    /// Build an analytics event referencing `entity`.
    pub fn new(
        event_type: &str,
        entity: EntityRef,
        event_data: Map<String, Value>,
        user_id: Option<String>,
    ) -> StoreResult<Self> {
        if event_type.trim().is_empty() {
            return Err(StoreError::Validation("event_type is required".into()));
        }

        let now = now_iso();
        Ok(Self {
            id: generate_id("event"),
            kind: TYPE_EVENT.to_string(),
            event_type: event_type.to_string(),
            entity_id: entity.id().to_string(),
            entity_type: entity.kind().to_string(),
            event_data,
            user_id,
            timestamp: now.clone(),
            created_at: now,
            version: 1,
        })
    }

    /// The typed entity reference, if the stored `entity_type` is known.
    pub fn entity(&self) -> Option<EntityRef> {
        EntityRef::from_parts(&self.entity_type, &self.entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_product_requires_name_and_category() {
        assert!(Product::new("", "Electronics", 1.0, "", ProductStatus::Active, Map::new()).is_err());
        assert!(Product::new("Widget", "", 1.0, "", ProductStatus::Active, Map::new()).is_err());
        assert!(Product::new("Widget", "Tools", -1.0, "", ProductStatus::Active, Map::new()).is_err());
    }

    #[test]
    fn test_product_id_prefix_and_defaults() {
        let p = Product::new("Widget", "Tools", 9.5, "", ProductStatus::Active, Map::new()).unwrap();
        assert!(p.id.starts_with("product_"));
        assert_eq!(p.kind, "product");
        assert_eq!(p.version, 1);
        assert_eq!(p.created_at, p.updated_at);
    }

    #[test]
    fn test_unique_ids() {
        let a = Product::new("A", "X", 1.0, "", ProductStatus::Active, Map::new()).unwrap();
        let b = Product::new("A", "X", 1.0, "", ProductStatus::Active, Map::new()).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_enrichment_bands_and_keywords() {
        let mut p = Product::new(
            "Wireless Headphones",
            "Electronics",
            199.99,
            "Noise-canceling wireless headphones",
            ProductStatus::Active,
            Map::new(),
        )
        .unwrap();
        p.enrich();
        assert_eq!(p.price_category, Some(PriceCategory::MidRange));
        // lower-cased, deduplicated ("wireless" appears in name and description)
        assert_eq!(
            p.search_keywords
                .iter()
                .filter(|k| k.as_str() == "wireless")
                .count(),
            1
        );
        assert!(p.search_keywords.contains(&"electronics".to_string()));
        assert!(p.search_keywords.contains(&"noise-canceling".to_string()));
    }

    #[test]
    fn test_price_bands() {
        assert_eq!(PriceCategory::from_price(0.0), PriceCategory::Budget);
        assert_eq!(PriceCategory::from_price(49.99), PriceCategory::Budget);
        assert_eq!(PriceCategory::from_price(50.0), PriceCategory::MidRange);
        assert_eq!(PriceCategory::from_price(199.99), PriceCategory::MidRange);
        assert_eq!(PriceCategory::from_price(200.0), PriceCategory::Premium);
    }

    #[test]
    fn test_email_validation() {
        assert!(validate_email("alice@example.com"));
        assert!(!validate_email("alice"));
        assert!(!validate_email("alice@example"));
        assert!(!validate_email("alice@@example.com"));
        assert!(!validate_email("@example.com"));
    }

    #[test]
    fn test_customer_rejects_bad_email() {
        let err = Customer::new("Bob", "not-an-email", "", Address::default(), Map::new());
        assert!(matches!(err, Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_line_item_total() {
        let item = LineItem::new("product_1", "Widget", 3, 29.99).unwrap();
        assert!((item.total_price - 89.97).abs() < 1e-9);
        assert!(LineItem::new("product_1", "Widget", 0, 29.99).is_err());
    }

    #[test]
    fn test_order_requires_items() {
        let err = Order::new(
            "customer_1",
            vec![],
            0.0,
            OrderStatus::Pending,
            Address::default(),
        );
        assert!(matches!(err, Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_event_entity_roundtrip() {
        let event = AnalyticsEvent::new(
            "product_view",
            EntityRef::Product("product_42".into()),
            Map::new(),
            Some("customer_7".into()),
        )
        .unwrap();
        assert_eq!(event.entity_type, "product");
        assert_eq!(event.entity_id, "product_42");
        assert_eq!(event.entity(), Some(EntityRef::Product("product_42".into())));
    }

    #[test]
    fn test_serializes_with_couch_field_names() {
        let p = Product::new("Widget", "Tools", 9.5, "", ProductStatus::Active, Map::new()).unwrap();
        let value = serde_json::to_value(&p).unwrap();
        assert!(value.get("_id").is_some());
        assert_eq!(value.get("type"), Some(&json!("product")));
        // unenriched products don't carry derived fields
        assert!(value.get("price_category").is_none());
        assert!(value.get("search_keywords").is_none());
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Coffee \n Maker\t Deluxe "), "Coffee Maker Deluxe");
    }

    #[test]
    fn test_timestamps_order_lexicographically() {
        let a = now_iso();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = now_iso();
        assert!(a < b);
    }
}
