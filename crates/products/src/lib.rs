//! Products domain module (event-sourced).
//!
//! Catalogue items with their sale price, standard cost and default tax rate.
//! Pure domain logic (no IO, no HTTP, no storage).

pub mod product;

pub use product::{
    ActivateProduct, ArchiveProduct, CreateProduct, Product, ProductActivated, ProductArchived,
    ProductCommand, ProductCreated, ProductEvent, ProductId, ProductPricing, ProductPricingUpdated,
    ProductStatus, UpdateProductPricing,
};
