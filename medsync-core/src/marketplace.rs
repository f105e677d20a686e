//! Health marketplace: a fixed catalog, a per-user cart and a simulated checkout.
//!
//! Prices are held in minor units (kobo for NGN, cents for USD) so totals are exact.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub const PAGE_SIZE: usize = 12;

/// Largest quantity a single cart line may hold.
pub const MAX_QUANTITY: u32 = 99;

/// NGN→USD rate applied to items without a USD price.
const USD_PER_NGN_NUM: u64 = 24;
const USD_PER_NGN_DEN: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Medicine,
    Fruit,
    Vegetable,
    Food,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Ngn,
    Usd,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Ngn => "NGN",
            Currency::Usd => "USD",
        }
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NGN" => Ok(Currency::Ngn),
            "USD" => Ok(Currency::Usd),
            other => Err(format!("unsupported currency: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub currency: Currency,
    /// Kobo or cents.
    pub minor: u64,
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{:02}", self.currency.code(), self.minor / 100, self.minor % 100)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogItem {
    pub id: u32,
    pub name: &'static str,
    pub category: Category,
    pub country: &'static str,
    pub popularity: u8,
    /// Naira, whole units.
    pub price_ngn: u64,
    pub price_usd_cents: Option<u64>,
}

impl CatalogItem {
    pub fn unit_price(&self, currency: Currency) -> Money {
        let minor = match currency {
            Currency::Ngn => self.price_ngn * 100,
            Currency::Usd => self
                .price_usd_cents
                .unwrap_or(self.price_ngn * 100 * USD_PER_NGN_NUM / USD_PER_NGN_DEN),
        };
        Money { currency, minor }
    }
}

const fn item(
    id: u32,
    name: &'static str,
    category: Category,
    country: &'static str,
    popularity: u8,
    price_ngn: u64,
    price_usd_cents: u64,
) -> CatalogItem {
    CatalogItem {
        id,
        name,
        category,
        country,
        popularity,
        price_ngn,
        price_usd_cents: Some(price_usd_cents),
    }
}

use Category::{Food, Fruit, Medicine, Vegetable};

pub static CATALOG: [CatalogItem; 24] = [
    item(1, "Paracetamol 500mg", Medicine, "Nigeria", 95, 500, 120),
    item(2, "Vitamin C 1000mg", Medicine, "USA", 88, 1200, 280),
    item(3, "Ibuprofen 400mg", Medicine, "Nigeria", 90, 800, 190),
    item(4, "Multivitamin Complex", Medicine, "USA", 85, 2500, 590),
    item(5, "Zinc Tablets 50mg", Medicine, "Nigeria", 78, 600, 140),
    item(6, "Omega-3 Fish Oil", Medicine, "USA", 82, 3200, 750),
    item(7, "Fresh Oranges (6 pcs)", Fruit, "Nigeria", 90, 200, 50),
    item(8, "Organic Blueberries", Fruit, "USA", 87, 1500, 350),
    item(9, "Bananas (1 bunch)", Fruit, "Nigeria", 93, 150, 40),
    item(10, "Avocado (3 pcs)", Fruit, "Nigeria", 82, 300, 70),
    item(11, "Strawberries (1 cup)", Fruit, "USA", 85, 1800, 420),
    item(12, "Pineapple (1 pc)", Fruit, "Nigeria", 88, 250, 60),
    item(13, "Fresh Spinach (1 bunch)", Vegetable, "Nigeria", 85, 250, 60),
    item(14, "Organic Kale", Vegetable, "USA", 80, 800, 190),
    item(15, "Broccoli (1 head)", Vegetable, "Nigeria", 75, 400, 90),
    item(16, "Carrots (1 kg)", Vegetable, "Nigeria", 88, 180, 40),
    item(17, "Bell Peppers (3 pcs)", Vegetable, "Nigeria", 82, 350, 80),
    item(18, "Sweet Potatoes (1 kg)", Vegetable, "Nigeria", 89, 200, 50),
    item(19, "Plantain (6 pcs)", Food, "Nigeria", 92, 300, 70),
    item(20, "Quinoa (500g)", Food, "USA", 78, 2200, 520),
    item(21, "Brown Rice (1 kg)", Food, "Nigeria", 85, 450, 110),
    item(22, "Organic Oats (500g)", Food, "USA", 83, 1200, 280),
    item(23, "Honey (500ml)", Food, "Nigeria", 91, 800, 190),
    item(24, "Almonds (250g)", Food, "USA", 86, 2800, 660),
];

pub fn find_item(id: u32) -> Option<&'static CatalogItem> {
    CATALOG.iter().find(|i| i.id == id)
}

pub fn page_count() -> usize {
    CATALOG.len().div_ceil(PAGE_SIZE)
}

/// One-based page of the catalog; past the end is empty.
pub fn page(number: usize) -> &'static [CatalogItem] {
    let start = number.max(1).saturating_sub(1).saturating_mul(PAGE_SIZE);
    if start >= CATALOG.len() {
        return &[];
    }
    let end = (start + PAGE_SIZE).min(CATALOG.len());
    &CATALOG[start..end]
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CartError {
    #[error("Unknown catalog item {0}")]
    UnknownItem(u32),

    #[error("Item {0} is not in the cart")]
    NotInCart(u32),

    #[error("Quantity {0} is out of range (1-99)")]
    InvalidQuantity(i64),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Please fill in all delivery details (missing {0})")]
    MissingDelivery(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: u32,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryDetails {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
}

impl DeliveryDetails {
    pub fn validate(&self) -> Result<(), CartError> {
        for (field, value) in [("name", &self.name), ("phone", &self.phone), ("address", &self.address)] {
            if value.trim().is_empty() {
                return Err(CartError::MissingDelivery(field));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub reference: Uuid,
    pub lines: Vec<CartLine>,
    pub total: Money,
    pub delivery: DeliveryDetails,
}

impl Receipt {
    /// Ledger input line for the purchase.
    pub fn summary(&self) -> String {
        let items: Vec<String> = self
            .lines
            .iter()
            .filter_map(|l| find_item(l.item_id).map(|i| format!("{} x{}", i.name, l.quantity)))
            .collect();
        format!("Checkout for {}: {}", self.total, items.join(", "))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn item_count(&self) -> u32 {
        self.lines.iter().fold(0u32, |n, l| n.saturating_add(l.quantity))
    }

    /// Add one of an item; repeated adds increase the quantity up to [`MAX_QUANTITY`].
    pub fn add(&mut self, item_id: u32) -> Result<(), CartError> {
        find_item(item_id).ok_or(CartError::UnknownItem(item_id))?;
        match self.lines.iter_mut().find(|l| l.item_id == item_id) {
            Some(line) if line.quantity >= MAX_QUANTITY => {
                return Err(CartError::InvalidQuantity(i64::from(line.quantity) + 1))
            }
            Some(line) => line.quantity += 1,
            None => self.lines.push(CartLine { item_id, quantity: 1 }),
        }
        Ok(())
    }

    pub fn remove(&mut self, item_id: u32) {
        self.lines.retain(|l| l.item_id != item_id);
    }

    /// Set a line's quantity; zero or less removes it, above [`MAX_QUANTITY`] is rejected.
    pub fn set_quantity(&mut self, item_id: u32, quantity: i64) -> Result<(), CartError> {
        if quantity <= 0 {
            self.remove(item_id);
            return Ok(());
        }
        let quantity = u32::try_from(quantity)
            .ok()
            .filter(|q| *q <= MAX_QUANTITY)
            .ok_or(CartError::InvalidQuantity(quantity))?;
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.item_id == item_id)
            .ok_or(CartError::NotInCart(item_id))?;
        line.quantity = quantity;
        Ok(())
    }

    pub fn total(&self, currency: Currency) -> Money {
        let minor = self
            .lines
            .iter()
            .filter_map(|l| find_item(l.item_id).map(|i| i.unit_price(currency).minor * u64::from(l.quantity)))
            .sum();
        Money { currency, minor }
    }

    /// Validate delivery details, produce a receipt and empty the cart.
    pub fn checkout(&mut self, delivery: DeliveryDetails, currency: Currency) -> Result<Receipt, CartError> {
        delivery.validate()?;
        if self.is_empty() {
            return Err(CartError::EmptyCart);
        }
        let receipt = Receipt {
            reference: Uuid::new_v4(),
            lines: self.lines.clone(),
            total: self.total(currency),
            delivery,
        };
        self.lines.clear();
        Ok(receipt)
    }
}
