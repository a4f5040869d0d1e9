//! The shared document holding all application state.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::{make_grid, Reservation, Tent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Brand {
    pub name: String,
    pub logo_url: String,
    pub logo_size: u32,
}

impl Default for Brand {
    fn default() -> Self {
        Self {
            name: "Coral Club".to_string(),
            logo_url: "/logo.png".to_string(),
            logo_size: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Background {
    pub public_path: String,
}

impl Default for Background {
    fn default() -> Self {
        Self {
            public_path: "/Mapa.png".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub count: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Self { count: 20 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MercadoPago {
    pub link: String,
    pub alias: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagoMovil {
    pub bank: String,
    pub rif: String,
    pub phone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Zelle {
    pub email: String,
    pub name: String,
}

/// Payment instructions shown to customers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Payments {
    pub currency: String,
    pub tent_price: f64,
    pub whatsapp: String,
    pub mp: MercadoPago,
    pub pago_movil: PagoMovil,
    pub zelle: Zelle,
}

impl Default for Payments {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            tent_price: 10.0,
            whatsapp: String::new(),
            mp: MercadoPago::default(),
            pago_movil: PagoMovil::default(),
            zelle: Zelle::default(),
        }
    }
}

/// An extra that can be added to a reservation cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub items: Vec<CatalogItem>,
}

/// What happened, for the audit trail kept in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogAction {
    Hold,
    Release,
    Confirm,
    Cancel,
    Expire,
    TentUpdate,
    TentSync,
    Regrid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub at: DateTime<Utc>,
    pub action: LogAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tent_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<String>,
}

impl LogEntry {
    pub fn new(action: LogAction, at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            at,
            action,
            tent_id: None,
            reservation_id: None,
        }
    }

    pub fn tent(mut self, tent_id: i64) -> Self {
        self.tent_id = Some(tent_id);
        self
    }

    pub fn reservation(mut self, reservation_id: impl Into<String>) -> Self {
        self.reservation_id = Some(reservation_id.into());
        self
    }
}

/// Typed view of the shared document. Unknown top-level keys are carried in `extra`.
///
/// Settings and the log are written freely by clients, so a malformed value
/// reads as its default. Tents and reservations must parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    #[serde(deserialize_with = "lenient")]
    pub rev: i64,
    #[serde(deserialize_with = "lenient")]
    pub brand: Brand,
    #[serde(deserialize_with = "lenient")]
    pub background: Background,
    #[serde(deserialize_with = "lenient")]
    pub layout: Layout,
    #[serde(deserialize_with = "lenient")]
    pub payments: Payments,
    #[serde(deserialize_with = "lenient")]
    pub categories: Vec<Category>,
    pub tents: Vec<Tent>,
    pub reservations: Vec<Reservation>,
    #[serde(deserialize_with = "lenient")]
    pub logs: Vec<LogEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    /// A fresh document with default settings and a grid of `tent_count` tents.
    pub fn seed(tent_count: usize) -> Self {
        Self {
            rev: 0,
            layout: Layout { count: tent_count },
            categories: vec![default_services()],
            tents: make_grid(tent_count),
            ..Self::default()
        }
    }

    /// Read a typed view out of a raw document. `null` reads as an empty document.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::Null => Ok(Self::default()),
            value => Self::deserialize(value),
        }
    }

    pub fn tent(&self, id: i64) -> Option<&Tent> {
        self.tents.iter().find(|t| t.id == id)
    }

    pub fn reservation(&self, id: &str) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

fn default_services() -> Category {
    let item = |id: &str, name: &str, price: f64| CatalogItem {
        id: id.to_string(),
        name: name.to_string(),
        price,
        img: Some(format!("/img/{}.png", id)),
    };

    Category {
        id: "servicios".to_string(),
        name: "Servicios".to_string(),
        items: vec![
            item("sombrilla", "Sombrilla (1 mesa + 2 sillas)", 10.0),
            item("toalla", "Toalla Extra", 2.0),
            item("hielera", "Hielera con Hielo", 5.0),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_seed_document() {
        let doc = Document::seed(12);
        assert_eq!(doc.tents.len(), 12);
        assert_eq!(doc.layout.count, 12);
        assert_eq!(doc.brand.name, "Coral Club");
        assert_eq!(doc.payments.currency, "USD");
        assert_eq!(doc.categories[0].items.len(), 3);
        assert!(doc.reservations.is_empty());

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["payments"]["tentPrice"], json!(10.0));
        assert_eq!(value["payments"]["pagoMovil"]["rif"], json!(""));
        assert_eq!(value["background"]["publicPath"], json!("/Mapa.png"));
        assert_eq!(value["tents"][0]["state"], json!("av"));
    }

    #[test]
    fn test_from_value_is_lenient() {
        let doc = Document::from_value(&Value::Null).unwrap();
        assert!(doc.tents.is_empty());

        let doc = Document::from_value(&json!({
            "brand": { "name": "Playa" },
            "tents": [{ "id": 1, "x": 0.2, "y": 0.3, "state": "oc" }],
            "theme": "dark"
        }))
        .unwrap();
        assert_eq!(doc.brand.name, "Playa");
        assert_eq!(doc.brand.logo_size, 42);
        assert_eq!(doc.tent(1).map(|t| t.x), Some(0.2));
        assert_eq!(doc.extra.get("theme"), Some(&json!("dark")));
    }

    #[test]
    fn test_malformed_settings_read_as_defaults() {
        let doc = Document::from_value(&json!({
            "rev": "seven",
            "brand": { "name": "Playa", "logoSize": null },
            "layout": null,
            "payments": { "tentPrice": "diez" },
            "categories": {},
            "logs": [{ "broken": true }],
            "tents": [{ "id": 4, "x": 0.5, "y": 0.5, "state": "pr" }]
        }))
        .unwrap();
        assert_eq!(doc.rev, 0);
        assert_eq!(doc.brand, Brand::default());
        assert_eq!(doc.layout.count, 20);
        assert_eq!(doc.payments.tent_price, 10.0);
        assert!(doc.categories.is_empty());
        assert!(doc.logs.is_empty());
        assert_eq!(doc.tents.len(), 1);
    }

    #[test]
    fn test_malformed_tents_are_rejected() {
        assert!(Document::from_value(&json!({ "tents": [{ "id": "one" }] })).is_err());
    }
}
