use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerdesk_core::{
    Aggregate, AggregateId, AggregateRoot, Amount, DomainError, RATE_SCALE, RateBp, TenantId,
};
use ledgerdesk_events::Event;

/// Product identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Draft,
    Active,
    Archived,
}

/// Prices and tax defaults copied onto document lines.
///
/// All amounts are minor currency units. `sale_price` is entered the way the
/// company prices documents (tax-inclusive or not); `standard_cost` is always
/// tax-exclusive and is the cost basis for COGS.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductPricing {
    pub sale_price: Amount,
    pub standard_cost: Amount,
    pub tax_rate_bp: RateBp,
}

impl ProductPricing {
    fn validate(&self) -> Result<(), DomainError> {
        if self.sale_price < 0 {
            return Err(DomainError::validation("sale price cannot be negative"));
        }
        if self.standard_cost < 0 {
            return Err(DomainError::validation("standard cost cannot be negative"));
        }
        if self.tax_rate_bp as i64 > RATE_SCALE {
            return Err(DomainError::validation("tax rate cannot exceed 100%"));
        }
        Ok(())
    }
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    tenant_id: Option<TenantId>,
    sku: String,
    name: String,
    status: ProductStatus,
    pricing: ProductPricing,
    track_inventory: bool,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: String::new(),
            name: String::new(),
            status: ProductStatus::Draft,
            pricing: ProductPricing::default(),
            track_inventory: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn pricing(&self) -> &ProductPricing {
        &self.pricing
    }

    /// Whether document lines for this product move stock and post COGS.
    pub fn tracks_inventory(&self) -> bool {
        self.track_inventory
    }

    /// Only active products can be put on new document lines.
    pub fn can_be_sold(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub pricing: ProductPricing,
    pub track_inventory: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProductPricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProductPricing {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub pricing: ProductPricing,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ActivateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ArchiveProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProductPricing(UpdateProductPricing),
    ActivateProduct(ActivateProduct),
    ArchiveProduct(ArchiveProduct),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub pricing: ProductPricing,
    pub track_inventory: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductPricingUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPricingUpdated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub pricing: ProductPricing,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductActivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductActivated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductArchived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductArchived {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductPricingUpdated(ProductPricingUpdated),
    ProductActivated(ProductActivated),
    ProductArchived(ProductArchived),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::ProductPricingUpdated(_) => "products.product.pricing_updated",
            ProductEvent::ProductActivated(_) => "products.product.activated",
            ProductEvent::ProductArchived(_) => "products.product.archived",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductPricingUpdated(e) => e.occurred_at,
            ProductEvent::ProductActivated(e) => e.occurred_at,
            ProductEvent::ProductArchived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.tenant_id = Some(e.tenant_id);
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.status = ProductStatus::Draft;
                self.pricing = e.pricing.clone();
                self.track_inventory = e.track_inventory;
                self.created = true;
            }
            ProductEvent::ProductPricingUpdated(e) => {
                self.pricing = e.pricing.clone();
            }
            ProductEvent::ProductActivated(_) => {
                self.status = ProductStatus::Active;
            }
            ProductEvent::ProductArchived(_) => {
                self.status = ProductStatus::Archived;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProductPricing(cmd) => self.handle_update_pricing(cmd),
            ProductCommand::ActivateProduct(cmd) => self.handle_activate(cmd),
            ProductCommand::ArchiveProduct(cmd) => self.handle_archive(cmd),
        }
    }
}

impl Product {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, tenant_id: TenantId, product_id: ProductId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("product"));
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_product_id(product_id)
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.sku.trim().is_empty() {
            return Err(DomainError::validation("SKU cannot be empty"));
        }
        cmd.pricing.validate()?;

        // SKU uniqueness per tenant is checked against the read model before dispatch.
        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            sku: cmd.sku.trim().to_string(),
            name: cmd.name.trim().to_string(),
            pricing: cmd.pricing.clone(),
            track_inventory: cmd.track_inventory,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_pricing(
        &self,
        cmd: &UpdateProductPricing,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.product_id)?;
        if self.status == ProductStatus::Archived {
            return Err(DomainError::invariant("archived products cannot be repriced"));
        }
        cmd.pricing.validate()?;
        if cmd.pricing == self.pricing {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::ProductPricingUpdated(ProductPricingUpdated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            pricing: cmd.pricing.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.product_id)?;

        if self.status == ProductStatus::Active {
            return Err(DomainError::conflict("product is already active"));
        }
        if self.status == ProductStatus::Archived {
            return Err(DomainError::invariant("archived products cannot be activated"));
        }

        Ok(vec![ProductEvent::ProductActivated(ProductActivated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_archive(&self, cmd: &ArchiveProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.product_id)?;

        if self.status == ProductStatus::Archived {
            return Err(DomainError::conflict("product is already archived"));
        }

        Ok(vec![ProductEvent::ProductArchived(ProductArchived {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn widget_pricing() -> ProductPricing {
        ProductPricing {
            sale_price: 5_500,
            standard_cost: 3_000,
            tax_rate_bp: 1_000,
        }
    }

    fn create_cmd(tenant_id: TenantId, product_id: ProductId) -> CreateProduct {
        CreateProduct {
            tenant_id,
            product_id,
            sku: "SKU-001".to_string(),
            name: "Widget".to_string(),
            pricing: widget_pricing(),
            track_inventory: true,
            occurred_at: test_time(),
        }
    }

    fn created(tenant_id: TenantId, product_id: ProductId) -> Product {
        let mut product = Product::empty(product_id);
        let events = product
            .handle(&ProductCommand::CreateProduct(create_cmd(tenant_id, product_id)))
            .unwrap();
        product.apply(&events[0]);
        product
    }

    fn activate(product: &mut Product, tenant_id: TenantId) {
        let cmd = ActivateProduct {
            tenant_id,
            product_id: product.id_typed(),
            occurred_at: test_time(),
        };
        let events = product.handle(&ProductCommand::ActivateProduct(cmd)).unwrap();
        product.apply(&events[0]);
    }

    #[test]
    fn create_product_emits_product_created_event() {
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();
        let product = Product::empty(product_id);

        let events = product
            .handle(&ProductCommand::CreateProduct(create_cmd(tenant_id, product_id)))
            .unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ProductEvent::ProductCreated(e) => {
                assert_eq!(e.tenant_id, tenant_id);
                assert_eq!(e.sku, "SKU-001");
                assert_eq!(e.pricing.standard_cost, 3_000);
                assert!(e.track_inventory);
            }
            _ => panic!("Expected ProductCreated event"),
        }
    }

    #[test]
    fn create_product_rejects_blank_name_or_sku() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);

        let mut cmd = create_cmd(test_tenant_id(), product_id);
        cmd.name = "   ".into();
        let err = product.handle(&ProductCommand::CreateProduct(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let mut cmd = create_cmd(test_tenant_id(), product_id);
        cmd.sku = "".into();
        let err = product.handle(&ProductCommand::CreateProduct(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_product_rejects_negative_cost_and_excess_tax() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);

        let mut cmd = create_cmd(test_tenant_id(), product_id);
        cmd.pricing.standard_cost = -1;
        assert!(product.handle(&ProductCommand::CreateProduct(cmd)).is_err());

        let mut cmd = create_cmd(test_tenant_id(), product_id);
        cmd.pricing.tax_rate_bp = 10_001;
        assert!(product.handle(&ProductCommand::CreateProduct(cmd)).is_err());
    }

    #[test]
    fn create_product_rejects_duplicate_creation() {
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();
        let product = created(tenant_id, product_id);

        let err = product
            .handle(&ProductCommand::CreateProduct(create_cmd(tenant_id, product_id)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn update_pricing_replaces_prices() {
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();
        let mut product = created(tenant_id, product_id);

        let pricing = ProductPricing {
            sale_price: 6_000,
            ..widget_pricing()
        };
        let cmd = UpdateProductPricing {
            tenant_id,
            product_id,
            pricing: pricing.clone(),
            occurred_at: test_time(),
        };
        let events = product.handle(&ProductCommand::UpdateProductPricing(cmd.clone())).unwrap();
        product.apply(&events[0]);
        assert_eq!(product.pricing(), &pricing);

        // Same pricing again is a no-op.
        let events = product.handle(&ProductCommand::UpdateProductPricing(cmd)).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn activate_then_archive_controls_sellability() {
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();
        let mut product = created(tenant_id, product_id);
        assert!(!product.can_be_sold());

        activate(&mut product, tenant_id);
        assert!(product.can_be_sold());

        let err = product
            .handle(&ProductCommand::ActivateProduct(ActivateProduct {
                tenant_id,
                product_id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        let events = product
            .handle(&ProductCommand::ArchiveProduct(ArchiveProduct {
                tenant_id,
                product_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);
        assert!(!product.can_be_sold());
        assert_eq!(product.status(), ProductStatus::Archived);

        let err = product
            .handle(&ProductCommand::ActivateProduct(ActivateProduct {
                tenant_id,
                product_id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn archive_product_rejects_non_existent_product() {
        let product = Product::empty(test_product_id());
        let err = product
            .handle(&ProductCommand::ArchiveProduct(ArchiveProduct {
                tenant_id: test_tenant_id(),
                product_id: product.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn commands_for_another_tenant_are_rejected() {
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();
        let product = created(tenant_id, product_id);

        let err = product
            .handle(&ProductCommand::ArchiveProduct(ArchiveProduct {
                tenant_id: test_tenant_id(),
                product_id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();
        let product = created(tenant_id, product_id);
        let before = product.clone();

        let cmd = ProductCommand::ActivateProduct(ActivateProduct {
            tenant_id,
            product_id,
            occurred_at: test_time(),
        });
        let events1 = product.handle(&cmd).unwrap();
        let events2 = product.handle(&cmd).unwrap();

        assert_eq!(product, before);
        assert_eq!(events1, events2);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            #[test]
            fn apply_is_deterministic(
                sku in "[A-Z0-9]{1,20}",
                name in "[A-Za-z][A-Za-z0-9 ]{0,40}",
                sale_price in 0i64..1_000_000,
                standard_cost in 0i64..1_000_000,
                tax_rate_bp in 0u32..=10_000,
            ) {
                let tenant_id = test_tenant_id();
                let product_id = test_product_id();
                let at = test_time();

                let events = vec![
                    ProductEvent::ProductCreated(ProductCreated {
                        tenant_id,
                        product_id,
                        sku,
                        name,
                        pricing: ProductPricing { sale_price, standard_cost, tax_rate_bp },
                        track_inventory: true,
                        occurred_at: at,
                    }),
                    ProductEvent::ProductActivated(ProductActivated { tenant_id, product_id, occurred_at: at }),
                ];

                let mut a = Product::empty(product_id);
                let mut b = Product::empty(product_id);
                for e in &events {
                    a.apply(e);
                    b.apply(e);
                }

                prop_assert_eq!(&a, &b);
                prop_assert_eq!(a.version(), 2);
                prop_assert!(a.can_be_sold());
            }
        }
    }
}
