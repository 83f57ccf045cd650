//! Read-only reference data: the regulatory registry and the product catalog.

use serde::{Deserialize, Serialize};

/// Entry in the government pharmaceutical registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegulatoryRecord {
    pub registration_number: String,
    pub product_name: String,
    pub active_component: Option<String>,
    pub holder_name: Option<String>,
}

/// Retailer's canonical catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: String,
    pub name: String,
    pub barcode: String,
}
