//! Per-user cart operations and checkout.

use medsync_core::marketplace::{self, CartLine, CatalogItem, Money, Receipt};
use medsync_core::{
    ActivityKind, AgentType, Cart, CartError, Currency, DeliveryDetails, MedsyncError,
    UserContext,
};
use serde::Serialize;
use thiserror::Error;

use crate::state::AppState;
use crate::subsystems::advice::record_activity;

pub const PURCHASE_DESCRIPTION: &str = "Marketplace purchase completed";

#[derive(Error, Debug)]
pub enum PurchaseError {
    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Store(#[from] MedsyncError),
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogPage {
    pub page: usize,
    pub total_pages: usize,
    pub currency: Currency,
    pub items: Vec<PricedItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PricedItem {
    #[serde(flatten)]
    pub item: CatalogItem,
    pub price: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub item_count: u32,
    pub total: Money,
}

pub fn catalog_page(page: usize, currency: Currency) -> CatalogPage {
    let page = page.max(1);
    CatalogPage {
        page,
        total_pages: marketplace::page_count(),
        currency,
        items: marketplace::page(page)
            .iter()
            .map(|item| PricedItem {
                item: *item,
                price: item.unit_price(currency),
            })
            .collect(),
    }
}

fn view(cart: &Cart, currency: Currency) -> CartView {
    CartView {
        lines: cart.lines().to_vec(),
        item_count: cart.item_count(),
        total: cart.total(currency),
    }
}

pub async fn cart(state: &AppState, user: &UserContext, currency: Currency) -> CartView {
    let Some(slot) = state.carts.get(user.id).await else {
        return view(&Cart::new(), currency);
    };
    let cart = slot.lock().await;
    view(&cart, currency)
}

async fn release_if_empty(state: &AppState, user: &UserContext) {
    state.carts.release_if(user.id, Cart::is_empty).await;
}

pub async fn add_item(
    state: &AppState,
    user: &UserContext,
    item_id: u32,
    currency: Currency,
) -> Result<CartView, CartError> {
    let result = {
        let slot = state.carts.slot(user.id).await;
        let mut cart = slot.lock().await;
        let added = cart.add(item_id);
        added.map(|()| view(&cart, currency))
    };
    release_if_empty(state, user).await;
    result
}

pub async fn set_quantity(
    state: &AppState,
    user: &UserContext,
    item_id: u32,
    quantity: i64,
    currency: Currency,
) -> Result<CartView, CartError> {
    let result = {
        let slot = state.carts.slot(user.id).await;
        let mut cart = slot.lock().await;
        let updated = cart.set_quantity(item_id, quantity);
        updated.map(|()| view(&cart, currency))
    };
    release_if_empty(state, user).await;
    result
}

pub async fn remove_item(
    state: &AppState,
    user: &UserContext,
    item_id: u32,
    currency: Currency,
) -> CartView {
    let snapshot = {
        let slot = state.carts.slot(user.id).await;
        let mut cart = slot.lock().await;
        cart.remove(item_id);
        view(&cart, currency)
    };
    release_if_empty(state, user).await;
    snapshot
}

/// Check out the user's cart. The purchase is written to the ledger and the
/// activity feed; payment itself is out of scope.
pub async fn checkout(
    state: &AppState,
    user: &UserContext,
    delivery: DeliveryDetails,
    currency: Currency,
) -> Result<Receipt, PurchaseError> {
    let receipt = {
        let slot = state.carts.slot(user.id).await;
        let mut cart = slot.lock().await;
        cart.checkout(delivery, currency)
    };
    release_if_empty(state, user).await;
    let receipt = receipt?;

    let session_id = state
        .ledger
        .create_session(user.id, AgentType::Purchase, &receipt.summary())
        .await?;
    state
        .ledger
        .update_session(
            session_id,
            &format!("Checkout initiated for {}", receipt.total),
            serde_json::json!({ "reference": receipt.reference, "lines": receipt.lines }),
        )
        .await?;

    record_activity(state, user.id, ActivityKind::Purchase, PURCHASE_DESCRIPTION).await;
    tracing::info!(user_id = %user.id, reference = %receipt.reference, total = %receipt.total, "Checkout completed");
    Ok(receipt)
}
