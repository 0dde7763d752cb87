use axum::{routing::get, Router};

use ledgerdesk_parties::PartyKind;

pub mod accounts;
pub mod audit;
pub mod bills;
pub mod common;
pub mod company;
pub mod credit_notes;
pub mod invoices;
pub mod parties;
pub mod products;
pub mod purchase_orders;
pub mod purchase_returns;
pub mod sales_orders;
pub mod sales_returns;
pub mod stock;
pub mod system;

/// Every tenant-scoped endpoint, mounted under `/api`.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/my-company", company::router())
        .nest("/accounts", accounts::router())
        .nest("/account-balances", accounts::balances_router())
        .nest("/products", products::router())
        .nest("/customers", parties::router(PartyKind::Customer))
        .nest("/suppliers", parties::router(PartyKind::Supplier))
        .nest("/stock", stock::router())
        .nest("/sales-orders", sales_orders::router())
        .nest("/invoices", invoices::router())
        .nest("/purchase-orders", purchase_orders::router())
        .nest("/bills", bills::router())
        .nest("/sales-returns", sales_returns::router())
        .nest("/purchase-returns", purchase_returns::router())
        .nest("/credit-notes", credit_notes::router())
        .nest("/audit-logs", audit::router())
}
