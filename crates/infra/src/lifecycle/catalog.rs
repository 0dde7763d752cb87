//! Reference data lookups shared by the coordinators: products, parties and
//! the company's document defaults.

use std::collections::HashMap;

use serde_json::Value as JsonValue;
use uuid::Uuid;

use ledgerdesk_core::{DomainError, TenantId};
use ledgerdesk_events::{EventBus, EventEnvelope};
use ledgerdesk_parties::{Company, CompanyId, Party, PartyId, PartyKind};
use ledgerdesk_posting::ItemPolicy;
use ledgerdesk_pricing::{DocumentLine, PricingSettings};
use ledgerdesk_products::{Product, ProductId};

use super::inputs::LineInput;
use super::{Lifecycle, LifecycleResult};
use crate::event_store::EventStore;

/// Which product price fills a line that names none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PriceBasis {
    Sale,
    Cost,
}

impl<S, B> Lifecycle<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub(crate) fn party_as(
        &self,
        tenant_id: TenantId,
        party_id: PartyId,
        kind: PartyKind,
    ) -> LifecycleResult<Party> {
        let party = self.load::<Party>(tenant_id, party_id.0)?;
        party.ensure_can_transact_as(kind)?;
        Ok(party)
    }

    /// Company defaults as pricing settings for a new document.
    pub(crate) fn default_settings(&self, tenant_id: TenantId) -> LifecycleResult<PricingSettings> {
        let company = self.load::<Company>(tenant_id, CompanyId::for_tenant(tenant_id).0)?;
        let defaults = company.defaults();
        Ok(PricingSettings {
            tax_inclusive: defaults.tax_inclusive,
            discount_placement: defaults.discount_placement,
            shipping_tax_rate_bp: defaults.default_tax_rate_bp,
            ..PricingSettings::default()
        })
    }

    /// Turn line inputs into priced lines. Every product must exist and be
    /// active.
    pub(crate) fn resolve_lines(
        &self,
        tenant_id: TenantId,
        inputs: &[LineInput],
        basis: PriceBasis,
    ) -> LifecycleResult<Vec<DocumentLine>> {
        let mut products: HashMap<ProductId, Product> = HashMap::new();
        let mut lines = Vec::with_capacity(inputs.len());
        for input in inputs {
            if !products.contains_key(&input.product_id) {
                let product =
                    self.load_existing::<Product>(tenant_id, input.product_id.0, "product")?;
                if !product.can_be_sold() {
                    return Err(DomainError::validation(format!(
                        "product {} is not active",
                        product.sku()
                    ))
                    .into());
                }
                products.insert(input.product_id, product);
            }
            let Some(product) = products.get(&input.product_id) else {
                continue;
            };
            let pricing = product.pricing();
            let default_price = match basis {
                PriceBasis::Sale => pricing.sale_price,
                PriceBasis::Cost => pricing.standard_cost,
            };
            lines.push(DocumentLine {
                line_id: input.line_id.unwrap_or_else(Uuid::now_v7),
                product_id: input.product_id,
                description: input
                    .description
                    .clone()
                    .unwrap_or_else(|| product.name().to_string()),
                quantity: input.quantity,
                unit_price: input.unit_price.unwrap_or(default_price),
                discount: input.discount,
                tax_rate_bp: input.tax_rate_bp.unwrap_or(pricing.tax_rate_bp),
            });
        }
        Ok(lines)
    }

    /// Stock and cost policy for each product on a document. Archived
    /// products still resolve so existing documents can be re-posted.
    pub(crate) fn item_policies(
        &self,
        tenant_id: TenantId,
        lines: &[DocumentLine],
    ) -> LifecycleResult<HashMap<ProductId, ItemPolicy>> {
        self.policies_for(tenant_id, lines.iter().map(|l| l.product_id))
    }

    pub(crate) fn policies_for(
        &self,
        tenant_id: TenantId,
        product_ids: impl IntoIterator<Item = ProductId>,
    ) -> LifecycleResult<HashMap<ProductId, ItemPolicy>> {
        let mut items = HashMap::new();
        for product_id in product_ids {
            if items.contains_key(&product_id) {
                continue;
            }
            let product = self.load_existing::<Product>(tenant_id, product_id.0, "product")?;
            items.insert(
                product_id,
                ItemPolicy {
                    track_inventory: product.tracks_inventory(),
                    standard_cost: product.pricing().standard_cost,
                },
            );
        }
        Ok(items)
    }
}
